//! Tenant resolution middleware
//!
//! Every request under `/api/v1` names its tenant through the `X-Tenant-Id`
//! header. The middleware resolves that header to an active tenant row and
//! threads a [`TenantContext`] through request extensions; handlers receive
//! it via the extractor and pass the id explicitly into every service call.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use sea_orm::EntityTrait;
use serde::Serialize;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::tenant;
use crate::errors::ServiceError;

/// Header name for the tenant ID
pub const TENANT_ID_HEADER: &str = "x-tenant-id";

/// Resolved tenant for the current request.
#[derive(Debug, Clone, Serialize)]
pub struct TenantContext {
    pub tenant_id: Uuid,
    pub name: String,
    pub currency: String,
    pub timezone: String,
}

impl From<tenant::Model> for TenantContext {
    fn from(model: tenant::Model) -> Self {
        Self {
            tenant_id: model.id,
            name: model.name,
            currency: model.currency,
            timezone: model.timezone,
        }
    }
}

/// Parse the tenant header. Absent, empty, or non-UUID values are all
/// treated as a missing tenant id.
fn extract_tenant_id(headers: &HeaderMap) -> Result<Uuid, ServiceError> {
    headers
        .get(TENANT_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| Uuid::parse_str(value).ok())
        .ok_or(ServiceError::MissingTenant)
}

/// Tenant resolution middleware
///
/// 1. Parses `X-Tenant-Id` (absent or malformed rejects with 400)
/// 2. Loads the tenant row (unknown or inactive rejects with 403)
/// 3. Inserts a [`TenantContext`] into request extensions
pub async fn tenant_middleware(
    State(db): State<Arc<DbPool>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let tenant_id = extract_tenant_id(request.headers())?;

    let tenant = tenant::Entity::find_by_id(tenant_id)
        .one(db.as_ref())
        .await
        .map_err(ServiceError::DatabaseError)?
        .filter(|row| row.is_active)
        .ok_or(ServiceError::InvalidTenant)?;

    tracing::debug!(tenant_id = %tenant_id, tenant = %tenant.name, "resolved tenant");

    request.extensions_mut().insert(TenantContext::from(tenant));

    Ok(next.run(request).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<TenantContext>().cloned().ok_or_else(|| {
            // Only reachable when a route skips the tenant middleware.
            ServiceError::InternalError("Tenant context missing from request".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use axum::http::HeaderValue;

    fn headers_with(value: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(value) = value {
            headers.insert(TENANT_ID_HEADER, HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    #[test]
    fn parses_a_valid_uuid_header() {
        let id = Uuid::new_v4();
        let headers = headers_with(Some(&id.to_string()));
        assert_eq!(extract_tenant_id(&headers).unwrap(), id);
    }

    #[test]
    fn missing_header_is_rejected() {
        let headers = headers_with(None);
        assert_matches!(extract_tenant_id(&headers), Err(ServiceError::MissingTenant));
    }

    #[test]
    fn empty_and_malformed_headers_are_rejected() {
        for raw in ["", "   ", "not-a-uuid", "1234"] {
            let headers = headers_with(Some(raw));
            assert_matches!(
                extract_tenant_id(&headers),
                Err(ServiceError::MissingTenant),
                "value {:?} should be rejected",
                raw
            );
        }
    }
}
