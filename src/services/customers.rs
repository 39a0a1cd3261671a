use crate::{
    db::DbPool,
    entities::{customer, order},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Request/Response types for the customer service
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateCustomerRequest {
    #[validate(length(
        min = 1,
        max = 255,
        message = "Customer name must be between 1 and 255 characters"
    ))]
    pub name: String,
    #[validate(email(message = "Email must be a valid address"))]
    pub email: Option<String>,
    #[validate(length(max = 20, message = "Phone cannot exceed 20 characters"))]
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateCustomerRequest {
    #[validate(length(
        min = 1,
        max = 255,
        message = "Customer name must be between 1 and 255 characters"
    ))]
    pub name: Option<String>,
    #[validate(email(message = "Email must be a valid address"))]
    pub email: Option<String>,
    #[validate(length(max = 20, message = "Phone cannot exceed 20 characters"))]
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CustomerResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<customer::Model> for CustomerResponse {
    fn from(model: customer::Model) -> Self {
        Self {
            id: model.id,
            tenant_id: model.tenant_id,
            name: model.name,
            email: model.email,
            phone: model.phone,
            address: model.address,
            created_at: model.created_at,
            updated_at: model.updated_at,
            deleted_at: model.deleted_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CustomerListResponse {
    pub customers: Vec<CustomerResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Service for the tenant customer directory
#[derive(Clone)]
pub struct CustomerService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
}

impl CustomerService {
    /// Creates a new customer service instance
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Creates a new customer
    #[instrument(skip(self, request), fields(tenant_id = %tenant_id))]
    pub async fn create_customer(
        &self,
        tenant_id: Uuid,
        request: CreateCustomerRequest,
    ) -> Result<CustomerResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let db = &*self.db_pool;
        let customer_id = Uuid::new_v4();

        let active_model = customer::ActiveModel {
            id: Set(customer_id),
            tenant_id: Set(tenant_id),
            name: Set(request.name.clone()),
            email: Set(request.email.clone()),
            phone: Set(request.phone.clone()),
            address: Set(request.address.clone()),
            deleted_at: Set(None),
            ..Default::default()
        };

        let model = active_model.insert(db).await.map_err(|e| {
            error!(error = %e, customer_id = %customer_id, "Failed to create customer in database");
            ServiceError::DatabaseError(e)
        })?;

        info!(customer_id = %customer_id, "Customer created successfully");

        if let Err(e) = self
            .event_sender
            .send(Event::CustomerCreated(customer_id))
            .await
        {
            warn!(error = %e, customer_id = %customer_id, "Failed to send customer created event");
        }

        Ok(model.into())
    }

    /// Retrieves a live customer by ID
    #[instrument(skip(self), fields(tenant_id = %tenant_id, customer_id = %customer_id))]
    pub async fn get_customer(
        &self,
        tenant_id: Uuid,
        customer_id: Uuid,
    ) -> Result<CustomerResponse, ServiceError> {
        let model = self.find_live_model(tenant_id, customer_id).await?;
        Ok(model.into())
    }

    /// Lists live customers, optionally filtered by a search term on
    /// name, email or phone, newest first
    #[instrument(skip(self, search), fields(tenant_id = %tenant_id))]
    pub async fn list_customers(
        &self,
        tenant_id: Uuid,
        search: Option<String>,
        page: u64,
        per_page: u64,
    ) -> Result<CustomerListResponse, ServiceError> {
        let db = &*self.db_pool;
        let page = page.max(1);

        let mut query = customer::Entity::find()
            .filter(customer::Column::TenantId.eq(tenant_id))
            .filter(customer::Column::DeletedAt.is_null());

        if let Some(search) = search.as_deref().filter(|s| !s.trim().is_empty()) {
            let pattern = format!("%{}%", search.trim());
            query = query.filter(
                Condition::any()
                    .add(customer::Column::Name.like(&pattern))
                    .add(customer::Column::Email.like(&pattern))
                    .add(customer::Column::Phone.like(&pattern)),
            );
        }

        let paginator = query
            .order_by_desc(customer::Column::CreatedAt)
            .paginate(db, per_page);

        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count customers");
            ServiceError::DatabaseError(e)
        })?;

        let customers = paginator.fetch_page(page - 1).await.map_err(|e| {
            error!(error = %e, page = page, per_page = per_page, "Failed to fetch customers page");
            ServiceError::DatabaseError(e)
        })?;

        Ok(CustomerListResponse {
            customers: customers.into_iter().map(Into::into).collect(),
            total,
            page,
            per_page,
        })
    }

    /// Applies a partial update to a live customer
    #[instrument(skip(self, request), fields(tenant_id = %tenant_id, customer_id = %customer_id))]
    pub async fn update_customer(
        &self,
        tenant_id: Uuid,
        customer_id: Uuid,
        request: UpdateCustomerRequest,
    ) -> Result<CustomerResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let db = &*self.db_pool;
        let existing = self.find_live_model(tenant_id, customer_id).await?;

        let mut active_model: customer::ActiveModel = existing.into();
        if let Some(name) = request.name {
            active_model.name = Set(name);
        }
        if let Some(email) = request.email {
            active_model.email = Set(Some(email));
        }
        if let Some(phone) = request.phone {
            active_model.phone = Set(Some(phone));
        }
        if let Some(address) = request.address {
            active_model.address = Set(Some(address));
        }

        let model = active_model.update(db).await.map_err(|e| {
            error!(error = %e, customer_id = %customer_id, "Failed to update customer in database");
            ServiceError::DatabaseError(e)
        })?;

        info!(customer_id = %customer_id, "Customer updated successfully");

        if let Err(e) = self
            .event_sender
            .send(Event::CustomerUpdated(customer_id))
            .await
        {
            warn!(error = %e, customer_id = %customer_id, "Failed to send customer updated event");
        }

        Ok(model.into())
    }

    /// Soft-deletes a customer that has no orders
    #[instrument(skip(self), fields(tenant_id = %tenant_id, customer_id = %customer_id))]
    pub async fn delete_customer(
        &self,
        tenant_id: Uuid,
        customer_id: Uuid,
    ) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let existing = self.find_live_model(tenant_id, customer_id).await?;

        let referenced = order::Entity::find()
            .filter(order::Column::CustomerId.eq(customer_id))
            .count(db)
            .await
            .map_err(|e| {
                error!(error = %e, customer_id = %customer_id, "Failed to count orders for customer");
                ServiceError::DatabaseError(e)
            })?;
        if referenced > 0 {
            return Err(ServiceError::Conflict(
                "Cannot delete customer with existing orders. Consider archiving instead."
                    .to_string(),
            ));
        }

        let mut active_model: customer::ActiveModel = existing.into();
        active_model.deleted_at = Set(Some(Utc::now()));
        active_model.update(db).await.map_err(|e| {
            error!(error = %e, customer_id = %customer_id, "Failed to soft-delete customer");
            ServiceError::DatabaseError(e)
        })?;

        info!(customer_id = %customer_id, "Customer deleted successfully");

        if let Err(e) = self
            .event_sender
            .send(Event::CustomerDeleted(customer_id))
            .await
        {
            warn!(error = %e, customer_id = %customer_id, "Failed to send customer deleted event");
        }

        Ok(())
    }

    /// Restores a soft-deleted customer
    #[instrument(skip(self), fields(tenant_id = %tenant_id, customer_id = %customer_id))]
    pub async fn restore_customer(
        &self,
        tenant_id: Uuid,
        customer_id: Uuid,
    ) -> Result<CustomerResponse, ServiceError> {
        let db = &*self.db_pool;

        let existing = customer::Entity::find()
            .filter(customer::Column::Id.eq(customer_id))
            .filter(customer::Column::TenantId.eq(tenant_id))
            .filter(customer::Column::DeletedAt.is_not_null())
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, customer_id = %customer_id, "Failed to fetch customer for restore");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound("Customer not found".to_string()))?;

        let mut active_model: customer::ActiveModel = existing.into();
        active_model.deleted_at = Set(None);
        let model = active_model.update(db).await.map_err(|e| {
            error!(error = %e, customer_id = %customer_id, "Failed to restore customer");
            ServiceError::DatabaseError(e)
        })?;

        info!(customer_id = %customer_id, "Customer restored successfully");

        if let Err(e) = self
            .event_sender
            .send(Event::CustomerRestored(customer_id))
            .await
        {
            warn!(error = %e, customer_id = %customer_id, "Failed to send customer restored event");
        }

        Ok(model.into())
    }

    /// Fetches a live (not soft-deleted) customer of the tenant
    async fn find_live_model(
        &self,
        tenant_id: Uuid,
        customer_id: Uuid,
    ) -> Result<customer::Model, ServiceError> {
        let db = &*self.db_pool;
        customer::Entity::find()
            .filter(customer::Column::Id.eq(customer_id))
            .filter(customer::Column::TenantId.eq(tenant_id))
            .filter(customer::Column::DeletedAt.is_null())
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, customer_id = %customer_id, "Failed to fetch customer from database");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound("Customer not found".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_requires_a_name() {
        let request = CreateCustomerRequest {
            name: "".to_string(),
            email: None,
            phone: None,
            address: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn create_request_accepts_missing_email() {
        let request = CreateCustomerRequest {
            name: "Ada Lovelace".to_string(),
            email: None,
            phone: Some("555-0100".to_string()),
            address: None,
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn create_request_rejects_malformed_email() {
        let request = CreateCustomerRequest {
            name: "Ada Lovelace".to_string(),
            email: Some("not-an-address".to_string()),
            phone: None,
            address: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn update_request_allows_empty_payload() {
        let request = UpdateCustomerRequest {
            name: None,
            email: None,
            phone: None,
            address: None,
        };
        assert!(request.validate().is_ok());
    }
}
