/*
 * Staff identity and capability policy.
 *
 * Authentication itself happens upstream: the gateway verifies the session
 * and forwards the verified identity as trusted headers. This module only
 * extracts that identity and answers "may this role perform this operation".
 */

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::errors::ServiceError;

pub const STAFF_EMAIL_HEADER: &str = "X-Staff-Email";
pub const STAFF_ROLE_HEADER: &str = "X-Staff-Role";

/// Role attached to a staff member. `Owner` is the business owner account,
/// `Staff` is everyone else.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    utoipa::ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum StaffRole {
    Owner,
    Staff,
}

impl Default for StaffRole {
    fn default() -> Self {
        StaffRole::Staff
    }
}

/// Verified staff identity extracted from the gateway headers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStaff {
    pub email: String,
    pub role: StaffRole,
}

impl AuthStaff {
    pub fn is_owner(&self) -> bool {
        self.role == StaffRole::Owner
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthStaff
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let email = parts
            .headers
            .get(STAFF_EMAIL_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                ServiceError::AuthError(format!("Missing {} header", STAFF_EMAIL_HEADER))
            })?
            .to_string();

        let role = match parts.headers.get(STAFF_ROLE_HEADER) {
            None => StaffRole::default(),
            Some(value) => {
                let raw = value.to_str().map_err(|_| {
                    ServiceError::AuthError(format!("Invalid {} header", STAFF_ROLE_HEADER))
                })?;
                StaffRole::from_str(raw.trim()).map_err(|_| {
                    ServiceError::AuthError(format!("Unknown staff role '{}'", raw.trim()))
                })?
            }
        };

        Ok(AuthStaff { email, role })
    }
}

/// One protected operation. Every handler that mutates or reports names the
/// capability it needs; the allow table below is the whole policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Capability {
    ProductView,
    ProductCreate,
    ProductUpdate,
    ProductDelete,
    ProductRestore,
    CustomerView,
    CustomerCreate,
    CustomerUpdate,
    CustomerDelete,
    CustomerRestore,
    OrderView,
    OrderCreate,
    OrderUpdate,
    OrderCancel,
    OrderDelete,
    OrderMarkPaid,
    ReportsView,
}

impl StaffRole {
    /// Explicit allow table. Owners can do everything; the match spells out
    /// the staff column so adding a capability forces a policy decision here.
    pub fn allows(&self, capability: Capability) -> bool {
        match self {
            StaffRole::Owner => true,
            StaffRole::Staff => matches!(
                capability,
                Capability::ProductView
                    | Capability::CustomerView
                    | Capability::CustomerCreate
                    | Capability::CustomerUpdate
                    | Capability::OrderView
                    | Capability::OrderCreate
                    | Capability::OrderUpdate
                    | Capability::OrderCancel
            ),
        }
    }
}

/// Check a capability against a role, mapping deny to a 403.
pub fn require(role: StaffRole, capability: Capability) -> Result<(), ServiceError> {
    if role.allows(capability) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!(
            "Role '{}' is not allowed to perform '{}'",
            role, capability
        )))
    }
}
