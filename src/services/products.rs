use crate::{
    db::DbPool,
    entities::{order_item, product},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

fn validate_decimal_min_zero(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        return Err(ValidationError::new("decimal_min_zero"));
    }
    Ok(())
}

/// Request/Response types for the product service
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateProductRequest {
    #[validate(length(
        min = 1,
        max = 255,
        message = "Product name must be between 1 and 255 characters"
    ))]
    pub name: String,
    #[validate(length(max = 2000, message = "Description cannot exceed 2000 characters"))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 100, message = "SKU must be between 1 and 100 characters"))]
    pub sku: String,
    #[validate(custom = "validate_decimal_min_zero")]
    pub price: Decimal,
    #[validate(range(min = 0, message = "Stock quantity cannot be negative"))]
    pub stock_quantity: Option<i32>,
    #[validate(range(min = 0, message = "Low stock threshold cannot be negative"))]
    pub low_stock_threshold: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateProductRequest {
    #[validate(length(
        min = 1,
        max = 255,
        message = "Product name must be between 1 and 255 characters"
    ))]
    pub name: Option<String>,
    #[validate(length(max = 2000, message = "Description cannot exceed 2000 characters"))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 100, message = "SKU must be between 1 and 100 characters"))]
    pub sku: Option<String>,
    #[validate(custom = "validate_decimal_min_zero")]
    pub price: Option<Decimal>,
    #[validate(range(min = 0, message = "Stock quantity cannot be negative"))]
    pub stock_quantity: Option<i32>,
    #[validate(range(min = 0, message = "Low stock threshold cannot be negative"))]
    pub low_stock_threshold: Option<i32>,
    pub is_active: Option<bool>,
}

/// Optional list filters, all combinable
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductListFilter {
    pub search: Option<String>,
    pub is_active: Option<bool>,
    pub low_stock: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub sku: String,
    pub price: Decimal,
    pub stock_quantity: i32,
    pub low_stock_threshold: i32,
    pub is_active: bool,
    /// Stock at or below the threshold
    pub is_low_stock: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<product::Model> for ProductResponse {
    fn from(model: product::Model) -> Self {
        let is_low_stock = model.is_low_stock();
        Self {
            id: model.id,
            tenant_id: model.tenant_id,
            name: model.name,
            description: model.description,
            sku: model.sku,
            price: model.price,
            stock_quantity: model.stock_quantity,
            low_stock_threshold: model.low_stock_threshold,
            is_active: model.is_active,
            is_low_stock,
            created_at: model.created_at,
            updated_at: model.updated_at,
            deleted_at: model.deleted_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductListResponse {
    pub products: Vec<ProductResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Service for the tenant product catalog
#[derive(Clone)]
pub struct ProductService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
}

impl ProductService {
    /// Creates a new product service instance
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Creates a new product in the tenant catalog
    #[instrument(skip(self, request), fields(tenant_id = %tenant_id, sku = %request.sku))]
    pub async fn create_product(
        &self,
        tenant_id: Uuid,
        request: CreateProductRequest,
    ) -> Result<ProductResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let db = &*self.db_pool;
        self.ensure_sku_available(tenant_id, &request.sku, None)
            .await?;

        let product_id = Uuid::new_v4();
        let mut active_model = product::ActiveModel {
            id: Set(product_id),
            tenant_id: Set(tenant_id),
            name: Set(request.name.clone()),
            description: Set(request.description.clone()),
            sku: Set(request.sku.clone()),
            price: Set(request.price),
            deleted_at: Set(None),
            ..Default::default()
        };
        if let Some(quantity) = request.stock_quantity {
            active_model.stock_quantity = Set(quantity);
        }
        if let Some(threshold) = request.low_stock_threshold {
            active_model.low_stock_threshold = Set(threshold);
        }
        if let Some(is_active) = request.is_active {
            active_model.is_active = Set(is_active);
        }

        let model = active_model.insert(db).await.map_err(|e| {
            error!(error = %e, product_id = %product_id, "Failed to create product in database");
            ServiceError::DatabaseError(e)
        })?;

        info!(product_id = %product_id, sku = %model.sku, "Product created successfully");

        if let Err(e) = self.event_sender.send(Event::ProductCreated(product_id)).await {
            warn!(error = %e, product_id = %product_id, "Failed to send product created event");
        }

        Ok(model.into())
    }

    /// Retrieves a live product by ID
    #[instrument(skip(self), fields(tenant_id = %tenant_id, product_id = %product_id))]
    pub async fn get_product(
        &self,
        tenant_id: Uuid,
        product_id: Uuid,
    ) -> Result<ProductResponse, ServiceError> {
        let db = &*self.db_pool;

        let model = product::Entity::find()
            .filter(product::Column::Id.eq(product_id))
            .filter(product::Column::TenantId.eq(tenant_id))
            .filter(product::Column::DeletedAt.is_null())
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, product_id = %product_id, "Failed to fetch product from database");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))?;

        Ok(model.into())
    }

    /// Lists live products with filters and pagination, newest first
    #[instrument(skip(self, filter), fields(tenant_id = %tenant_id))]
    pub async fn list_products(
        &self,
        tenant_id: Uuid,
        filter: ProductListFilter,
        page: u64,
        per_page: u64,
    ) -> Result<ProductListResponse, ServiceError> {
        let db = &*self.db_pool;
        let page = page.max(1);

        let mut query = product::Entity::find()
            .filter(product::Column::TenantId.eq(tenant_id))
            .filter(product::Column::DeletedAt.is_null());

        if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
            let pattern = format!("%{}%", search.trim());
            query = query.filter(
                Condition::any()
                    .add(product::Column::Name.like(&pattern))
                    .add(product::Column::Sku.like(&pattern)),
            );
        }
        if let Some(is_active) = filter.is_active {
            query = query.filter(product::Column::IsActive.eq(is_active));
        }
        if filter.low_stock == Some(true) {
            query = query.filter(
                Expr::col(product::Column::StockQuantity)
                    .lte(Expr::col(product::Column::LowStockThreshold)),
            );
        }

        let paginator = query
            .order_by_desc(product::Column::CreatedAt)
            .paginate(db, per_page);

        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count products");
            ServiceError::DatabaseError(e)
        })?;

        let products = paginator.fetch_page(page - 1).await.map_err(|e| {
            error!(error = %e, page = page, per_page = per_page, "Failed to fetch products page");
            ServiceError::DatabaseError(e)
        })?;

        Ok(ProductListResponse {
            products: products.into_iter().map(Into::into).collect(),
            total,
            page,
            per_page,
        })
    }

    /// Applies a partial update to a live product
    #[instrument(skip(self, request), fields(tenant_id = %tenant_id, product_id = %product_id))]
    pub async fn update_product(
        &self,
        tenant_id: Uuid,
        product_id: Uuid,
        request: UpdateProductRequest,
    ) -> Result<ProductResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let db = &*self.db_pool;
        let existing = self.find_live_model(tenant_id, product_id).await?;

        if let Some(sku) = request.sku.as_deref() {
            if sku != existing.sku {
                self.ensure_sku_available(tenant_id, sku, Some(product_id))
                    .await?;
            }
        }

        let mut active_model: product::ActiveModel = existing.into();
        if let Some(name) = request.name {
            active_model.name = Set(name);
        }
        if let Some(description) = request.description {
            active_model.description = Set(Some(description));
        }
        if let Some(sku) = request.sku {
            active_model.sku = Set(sku);
        }
        if let Some(price) = request.price {
            active_model.price = Set(price);
        }
        if let Some(quantity) = request.stock_quantity {
            active_model.stock_quantity = Set(quantity);
        }
        if let Some(threshold) = request.low_stock_threshold {
            active_model.low_stock_threshold = Set(threshold);
        }
        if let Some(is_active) = request.is_active {
            active_model.is_active = Set(is_active);
        }

        let model = active_model.update(db).await.map_err(|e| {
            error!(error = %e, product_id = %product_id, "Failed to update product in database");
            ServiceError::DatabaseError(e)
        })?;

        info!(product_id = %product_id, "Product updated successfully");

        if let Err(e) = self.event_sender.send(Event::ProductUpdated(product_id)).await {
            warn!(error = %e, product_id = %product_id, "Failed to send product updated event");
        }

        Ok(model.into())
    }

    /// Soft-deletes a product that has no order lines
    #[instrument(skip(self), fields(tenant_id = %tenant_id, product_id = %product_id))]
    pub async fn delete_product(
        &self,
        tenant_id: Uuid,
        product_id: Uuid,
    ) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let existing = self.find_live_model(tenant_id, product_id).await?;

        let referenced = order_item::Entity::find()
            .filter(order_item::Column::ProductId.eq(product_id))
            .count(db)
            .await
            .map_err(|e| {
                error!(error = %e, product_id = %product_id, "Failed to count order lines for product");
                ServiceError::DatabaseError(e)
            })?;
        if referenced > 0 {
            return Err(ServiceError::Conflict(
                "Cannot delete product with existing orders. Consider deactivating instead."
                    .to_string(),
            ));
        }

        let mut active_model: product::ActiveModel = existing.into();
        active_model.deleted_at = Set(Some(Utc::now()));
        active_model.update(db).await.map_err(|e| {
            error!(error = %e, product_id = %product_id, "Failed to soft-delete product");
            ServiceError::DatabaseError(e)
        })?;

        info!(product_id = %product_id, "Product deleted successfully");

        if let Err(e) = self.event_sender.send(Event::ProductDeleted(product_id)).await {
            warn!(error = %e, product_id = %product_id, "Failed to send product deleted event");
        }

        Ok(())
    }

    /// Restores a soft-deleted product
    #[instrument(skip(self), fields(tenant_id = %tenant_id, product_id = %product_id))]
    pub async fn restore_product(
        &self,
        tenant_id: Uuid,
        product_id: Uuid,
    ) -> Result<ProductResponse, ServiceError> {
        let db = &*self.db_pool;

        let existing = product::Entity::find()
            .filter(product::Column::Id.eq(product_id))
            .filter(product::Column::TenantId.eq(tenant_id))
            .filter(product::Column::DeletedAt.is_not_null())
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, product_id = %product_id, "Failed to fetch product for restore");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))?;

        let mut active_model: product::ActiveModel = existing.into();
        active_model.deleted_at = Set(None);
        let model = active_model.update(db).await.map_err(|e| {
            error!(error = %e, product_id = %product_id, "Failed to restore product");
            ServiceError::DatabaseError(e)
        })?;

        info!(product_id = %product_id, "Product restored successfully");

        if let Err(e) = self.event_sender.send(Event::ProductRestored(product_id)).await {
            warn!(error = %e, product_id = %product_id, "Failed to send product restored event");
        }

        Ok(model.into())
    }

    /// Fetches a live (not soft-deleted) product of the tenant
    async fn find_live_model(
        &self,
        tenant_id: Uuid,
        product_id: Uuid,
    ) -> Result<product::Model, ServiceError> {
        let db = &*self.db_pool;
        product::Entity::find()
            .filter(product::Column::Id.eq(product_id))
            .filter(product::Column::TenantId.eq(tenant_id))
            .filter(product::Column::DeletedAt.is_null())
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, product_id = %product_id, "Failed to fetch product from database");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))
    }

    /// SKU uniqueness is scoped to the tenant; soft-deleted rows still hold
    /// their SKU.
    async fn ensure_sku_available(
        &self,
        tenant_id: Uuid,
        sku: &str,
        exclude_id: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let mut query = product::Entity::find()
            .filter(product::Column::TenantId.eq(tenant_id))
            .filter(product::Column::Sku.eq(sku));
        if let Some(id) = exclude_id {
            query = query.filter(product::Column::Id.ne(id));
        }

        let existing = query.one(db).await.map_err(|e| {
            error!(error = %e, sku = %sku, "Failed to check SKU uniqueness");
            ServiceError::DatabaseError(e)
        })?;

        if existing.is_some() {
            return Err(ServiceError::ValidationError(
                "The SKU must be unique within your business.".to_string(),
            ));
        }
        Ok(())
    }
}
