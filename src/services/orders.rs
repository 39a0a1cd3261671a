use crate::{
    db::DbPool,
    entities::order::{self, OrderStatus},
    entities::{customer, order_item, product},
    errors::ServiceError,
    events::{Event, EventSender},
    services::stock,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

const ORDER_NUMBER_TOKEN_LEN: usize = 12;
const ORDER_NUMBER_ATTEMPTS: usize = 5;

/// Request/Response types for the order service
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    pub customer_id: Option<Uuid>,
    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub items: Vec<OrderItemRequest>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateOrderRequest {
    pub notes: Option<String>,
}

/// Optional list filters, all combinable
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderListFilter {
    pub status: Option<OrderStatus>,
    pub customer_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub product_sku: String,
    pub quantity: i32,
    /// Product price at the time the order was placed
    pub unit_price: Decimal,
    pub total_price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderCustomerSummary {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub notes: Option<String>,
    pub customer: Option<OrderCustomerSummary>,
    pub items: Vec<OrderItemResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

fn generate_order_number() -> String {
    let token: String = thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ORDER_NUMBER_TOKEN_LEN)
        .map(|b| (b as char).to_ascii_uppercase())
        .collect();
    format!("ORD-{}", token)
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn next_day_start(date: NaiveDate) -> DateTime<Utc> {
    day_start(date + chrono::Duration::days(1))
}

/// Service for the order workflow: creation with atomic stock reservation,
/// cancellation and deletion with compensating stock restoration, and the
/// pending -> paid transition.
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
}

impl OrderService {
    /// Creates a new order service instance
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Creates an order from a list of (product, quantity) pairs.
    ///
    /// Line prices are snapshots of the current product price. Stock is
    /// decremented per line through the guarded update, and the whole
    /// operation runs in one transaction: a failure on any line rolls back
    /// every decrement and every write.
    #[instrument(skip(self, request), fields(tenant_id = %tenant_id, item_count = request.items.len()))]
    pub async fn create_order(
        &self,
        tenant_id: Uuid,
        request: CreateOrderRequest,
    ) -> Result<OrderResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let db = &*self.db_pool;

        let customer = match request.customer_id {
            Some(customer_id) => Some(self.find_live_customer(tenant_id, customer_id).await?),
            None => None,
        };

        // Validation pass before the transaction opens: tenant ownership,
        // active flag, quantity and sufficiency. The guarded decrement
        // re-enforces sufficiency under concurrency.
        for item in &request.items {
            if item.quantity < 1 {
                return Err(ServiceError::ValidationError(format!(
                    "Quantity must be at least 1 for product {}",
                    item.product_id
                )));
            }

            let product = product::Entity::find()
                .filter(product::Column::Id.eq(item.product_id))
                .filter(product::Column::TenantId.eq(tenant_id))
                .filter(product::Column::DeletedAt.is_null())
                .one(db)
                .await
                .map_err(|e| {
                    error!(error = %e, product_id = %item.product_id, "Failed to fetch product for order validation");
                    ServiceError::DatabaseError(e)
                })?
                .ok_or_else(|| {
                    ServiceError::ValidationError(format!(
                        "Product {} not found in your business.",
                        item.product_id
                    ))
                })?;

            if !product.is_active {
                return Err(ServiceError::ValidationError(format!(
                    "Product '{}' is not active.",
                    product.name
                )));
            }
            if !product.has_sufficient_stock(item.quantity) {
                return Err(ServiceError::InsufficientStock(format!(
                    "Insufficient stock for '{}'. Available: {}",
                    product.name, product.stock_quantity
                )));
            }
        }

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order creation");
            ServiceError::DatabaseError(e)
        })?;

        let order_id = Uuid::new_v4();
        let mut total_amount = Decimal::ZERO;
        let mut line_items = Vec::with_capacity(request.items.len());

        for item in &request.items {
            // Re-read inside the transaction so the price snapshot and the
            // decrement see the same row state.
            let product = product::Entity::find()
                .filter(product::Column::Id.eq(item.product_id))
                .filter(product::Column::TenantId.eq(tenant_id))
                .one(&txn)
                .await
                .map_err(|e| {
                    error!(error = %e, product_id = %item.product_id, "Failed to fetch product inside order transaction");
                    ServiceError::DatabaseError(e)
                })?
                .ok_or_else(|| {
                    ServiceError::ValidationError(format!(
                        "Product {} not found in your business.",
                        item.product_id
                    ))
                })?;

            let unit_price = product.price;
            let total_price = unit_price * Decimal::from(item.quantity);
            total_amount += total_price;

            stock::decrement(&txn, tenant_id, product.id, item.quantity).await?;

            line_items.push((product, item.quantity, unit_price, total_price));
        }

        let order_number = self.unique_order_number(&txn).await?;

        let order_model = order::ActiveModel {
            id: Set(order_id),
            tenant_id: Set(tenant_id),
            customer_id: Set(request.customer_id),
            order_number: Set(order_number),
            status: Set(OrderStatus::Pending),
            total_amount: Set(total_amount),
            notes: Set(request.notes.clone()),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to create order in database");
            ServiceError::DatabaseError(e)
        })?;

        let mut item_responses = Vec::with_capacity(line_items.len());
        for (product, quantity, unit_price, total_price) in line_items {
            let line = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(product.id),
                quantity: Set(quantity),
                unit_price: Set(unit_price),
                total_price: Set(total_price),
                ..Default::default()
            }
            .insert(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, product_id = %product.id, "Failed to create order line");
                ServiceError::DatabaseError(e)
            })?;

            item_responses.push(OrderItemResponse {
                id: line.id,
                product_id: product.id,
                product_name: product.name,
                product_sku: product.sku,
                quantity,
                unit_price,
                total_price,
            });
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit order creation transaction");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order_id, order_number = %order_model.order_number, total_amount = %total_amount, "Order created successfully");

        if let Err(e) = self
            .event_sender
            .send(Event::OrderCreated {
                order_id,
                tenant_id,
                total_amount,
            })
            .await
        {
            warn!(error = %e, order_id = %order_id, "Failed to send order created event");
        }

        Ok(OrderResponse {
            id: order_model.id,
            tenant_id: order_model.tenant_id,
            order_number: order_model.order_number,
            status: order_model.status,
            total_amount: order_model.total_amount,
            notes: order_model.notes,
            customer: customer.map(|c| OrderCustomerSummary {
                id: c.id,
                name: c.name,
                email: c.email,
            }),
            items: item_responses,
            created_at: order_model.created_at,
            updated_at: order_model.updated_at,
        })
    }

    /// Cancels an order, restoring stock for every line. Cancelling an
    /// already-cancelled order is an idempotent no-op.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, order_id = %order_id))]
    pub async fn cancel_order(
        &self,
        tenant_id: Uuid,
        order_id: Uuid,
    ) -> Result<OrderResponse, ServiceError> {
        let db = &*self.db_pool;
        let existing = self.find_order(tenant_id, order_id).await?;

        if existing.status == OrderStatus::Cancelled {
            return self.get_order(tenant_id, order_id).await;
        }

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to start transaction for order cancellation");
            ServiceError::DatabaseError(e)
        })?;

        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to fetch order lines for cancellation");
                ServiceError::DatabaseError(e)
            })?;

        for item in &items {
            stock::increment(&txn, tenant_id, item.product_id, item.quantity).await?;
        }

        let mut active_model: order::ActiveModel = existing.into();
        active_model.status = Set(OrderStatus::Cancelled);
        active_model.updated_at = Set(Some(Utc::now()));
        active_model.update(&txn).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to mark order cancelled");
            ServiceError::DatabaseError(e)
        })?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit order cancellation transaction");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order_id, restored_lines = items.len(), "Order cancelled successfully");

        if let Err(e) = self
            .event_sender
            .send(Event::OrderCancelled {
                order_id,
                tenant_id,
            })
            .await
        {
            warn!(error = %e, order_id = %order_id, "Failed to send order cancelled event");
        }

        self.get_order(tenant_id, order_id).await
    }

    /// Marks a pending order as paid. Pure status transition; stock was
    /// already committed at creation.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, order_id = %order_id))]
    pub async fn mark_as_paid(
        &self,
        tenant_id: Uuid,
        order_id: Uuid,
    ) -> Result<OrderResponse, ServiceError> {
        let db = &*self.db_pool;
        let existing = self.find_order(tenant_id, order_id).await?;

        if existing.status != OrderStatus::Pending {
            return Err(ServiceError::Conflict(
                "Only pending orders can be marked as paid".to_string(),
            ));
        }

        let mut active_model: order::ActiveModel = existing.into();
        active_model.status = Set(OrderStatus::Paid);
        active_model.updated_at = Set(Some(Utc::now()));
        active_model.update(db).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to mark order paid");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order_id, "Order marked as paid");

        if let Err(e) = self
            .event_sender
            .send(Event::OrderPaid {
                order_id,
                tenant_id,
            })
            .await
        {
            warn!(error = %e, order_id = %order_id, "Failed to send order paid event");
        }

        self.get_order(tenant_id, order_id).await
    }

    /// Edits the notes of a pending order. Items and customer are immutable
    /// once the order exists.
    #[instrument(skip(self, request), fields(tenant_id = %tenant_id, order_id = %order_id))]
    pub async fn update_order(
        &self,
        tenant_id: Uuid,
        order_id: Uuid,
        request: UpdateOrderRequest,
    ) -> Result<OrderResponse, ServiceError> {
        let db = &*self.db_pool;
        let existing = self.find_order(tenant_id, order_id).await?;

        if existing.status != OrderStatus::Pending {
            return Err(ServiceError::Conflict(
                "Only pending orders can be updated".to_string(),
            ));
        }

        let mut active_model: order::ActiveModel = existing.into();
        active_model.notes = Set(request.notes);
        active_model.updated_at = Set(Some(Utc::now()));
        active_model.update(db).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to update order notes");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order_id, "Order updated successfully");

        self.get_order(tenant_id, order_id).await
    }

    /// Deletes a pending order, restoring stock for all lines and removing
    /// the order and its lines in one transaction.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, order_id = %order_id))]
    pub async fn delete_order(&self, tenant_id: Uuid, order_id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let existing = self.find_order(tenant_id, order_id).await?;

        if existing.status != OrderStatus::Pending {
            return Err(ServiceError::Conflict(
                "Only pending orders can be deleted".to_string(),
            ));
        }

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to start transaction for order deletion");
            ServiceError::DatabaseError(e)
        })?;

        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to fetch order lines for deletion");
                ServiceError::DatabaseError(e)
            })?;

        for item in &items {
            stock::increment(&txn, tenant_id, item.product_id, item.quantity).await?;
        }

        order_item::Entity::delete_many()
            .filter(order_item::Column::OrderId.eq(order_id))
            .exec(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to delete order lines");
                ServiceError::DatabaseError(e)
            })?;

        order::Entity::delete_by_id(order_id)
            .exec(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to delete order");
                ServiceError::DatabaseError(e)
            })?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit order deletion transaction");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order_id, restored_lines = items.len(), "Order deleted successfully");

        if let Err(e) = self
            .event_sender
            .send(Event::OrderDeleted {
                order_id,
                tenant_id,
            })
            .await
        {
            warn!(error = %e, order_id = %order_id, "Failed to send order deleted event");
        }

        Ok(())
    }

    /// Retrieves an order with its lines, product summaries and customer
    #[instrument(skip(self), fields(tenant_id = %tenant_id, order_id = %order_id))]
    pub async fn get_order(
        &self,
        tenant_id: Uuid,
        order_id: Uuid,
    ) -> Result<OrderResponse, ServiceError> {
        let order = self.find_order(tenant_id, order_id).await?;
        let mut responses = self.assemble_responses(vec![order]).await?;
        responses
            .pop()
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))
    }

    /// Lists orders with filters and pagination, newest first
    #[instrument(skip(self, filter), fields(tenant_id = %tenant_id))]
    pub async fn list_orders(
        &self,
        tenant_id: Uuid,
        filter: OrderListFilter,
        page: u64,
        per_page: u64,
    ) -> Result<OrderListResponse, ServiceError> {
        let db = &*self.db_pool;
        let page = page.max(1);

        let mut query = order::Entity::find().filter(order::Column::TenantId.eq(tenant_id));

        if let Some(status) = filter.status {
            query = query.filter(order::Column::Status.eq(status));
        }
        if let Some(customer_id) = filter.customer_id {
            query = query.filter(order::Column::CustomerId.eq(customer_id));
        }
        if let Some(start_date) = filter.start_date {
            query = query.filter(order::Column::CreatedAt.gte(day_start(start_date)));
        }
        if let Some(end_date) = filter.end_date {
            query = query.filter(order::Column::CreatedAt.lt(next_day_start(end_date)));
        }

        let paginator = query
            .order_by_desc(order::Column::CreatedAt)
            .paginate(db, per_page);

        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count orders");
            ServiceError::DatabaseError(e)
        })?;

        let orders = paginator.fetch_page(page - 1).await.map_err(|e| {
            error!(error = %e, page = page, per_page = per_page, "Failed to fetch orders page");
            ServiceError::DatabaseError(e)
        })?;

        let orders = self.assemble_responses(orders).await?;

        Ok(OrderListResponse {
            orders,
            total,
            page,
            per_page,
        })
    }

    async fn find_order(
        &self,
        tenant_id: Uuid,
        order_id: Uuid,
    ) -> Result<order::Model, ServiceError> {
        let db = &*self.db_pool;
        order::Entity::find()
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::TenantId.eq(tenant_id))
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to fetch order from database");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))
    }

    async fn find_live_customer(
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
                error!(error = %e, customer_id = %customer_id, "Failed to fetch customer for order");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| {
                ServiceError::ValidationError("Customer not found in your business.".to_string())
            })
    }

    /// Order numbers are globally unique; on the rare collision a fresh
    /// token is generated.
    async fn unique_order_number<C: sea_orm::ConnectionTrait>(
        &self,
        conn: &C,
    ) -> Result<String, ServiceError> {
        for _ in 0..ORDER_NUMBER_ATTEMPTS {
            let candidate = generate_order_number();
            let taken = order::Entity::find()
                .filter(order::Column::OrderNumber.eq(&candidate))
                .one(conn)
                .await
                .map_err(|e| {
                    error!(error = %e, "Failed to check order number uniqueness");
                    ServiceError::DatabaseError(e)
                })?
                .is_some();
            if !taken {
                return Ok(candidate);
            }
        }
        Err(ServiceError::InternalError(
            "Could not generate a unique order number".to_string(),
        ))
    }

    /// Batch-loads lines, product summaries and customers for a page of
    /// orders and assembles the response shapes.
    async fn assemble_responses(
        &self,
        orders: Vec<order::Model>,
    ) -> Result<Vec<OrderResponse>, ServiceError> {
        let db = &*self.db_pool;

        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.is_in(order_ids))
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch order lines");
                ServiceError::DatabaseError(e)
            })?;

        let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let products: HashMap<Uuid, product::Model> = if product_ids.is_empty() {
            HashMap::new()
        } else {
            product::Entity::find()
                .filter(product::Column::Id.is_in(product_ids))
                .all(db)
                .await
                .map_err(|e| {
                    error!(error = %e, "Failed to fetch products for order lines");
                    ServiceError::DatabaseError(e)
                })?
                .into_iter()
                .map(|p| (p.id, p))
                .collect()
        };

        let customer_ids: Vec<Uuid> = orders.iter().filter_map(|o| o.customer_id).collect();
        let customers: HashMap<Uuid, customer::Model> = if customer_ids.is_empty() {
            HashMap::new()
        } else {
            customer::Entity::find()
                .filter(customer::Column::Id.is_in(customer_ids))
                .all(db)
                .await
                .map_err(|e| {
                    error!(error = %e, "Failed to fetch customers for orders");
                    ServiceError::DatabaseError(e)
                })?
                .into_iter()
                .map(|c| (c.id, c))
                .collect()
        };

        let mut items_by_order: HashMap<Uuid, Vec<OrderItemResponse>> = HashMap::new();
        for item in items {
            let (product_name, product_sku) = match products.get(&item.product_id) {
                Some(p) => (p.name.clone(), p.sku.clone()),
                None => (String::new(), String::new()),
            };
            items_by_order
                .entry(item.order_id)
                .or_default()
                .push(OrderItemResponse {
                    id: item.id,
                    product_id: item.product_id,
                    product_name,
                    product_sku,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    total_price: item.total_price,
                });
        }

        Ok(orders
            .into_iter()
            .map(|order| {
                let customer = order
                    .customer_id
                    .and_then(|id| customers.get(&id))
                    .map(|c| OrderCustomerSummary {
                        id: c.id,
                        name: c.name.clone(),
                        email: c.email.clone(),
                    });
                OrderResponse {
                    id: order.id,
                    tenant_id: order.tenant_id,
                    order_number: order.order_number,
                    status: order.status,
                    total_amount: order.total_amount,
                    notes: order.notes,
                    customer,
                    items: items_by_order.remove(&order.id).unwrap_or_default(),
                    created_at: order.created_at,
                    updated_at: order.updated_at,
                }
            })
            .collect())
    }
}
