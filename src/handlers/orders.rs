use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use uuid::Uuid;

use crate::auth::{require, AuthStaff, Capability};
use crate::errors::ServiceError;
use crate::middleware_helpers::tenant::TenantContext;
use crate::services::orders::{
    CreateOrderRequest, OrderListFilter, OrderResponse, UpdateOrderRequest,
};
use crate::{ApiResponse, AppState, ListQuery, PaginatedResponse};

/// List orders with pagination and filtering
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    tag = "orders",
    params(
        ("X-Tenant-Id" = String, Header, description = "Tenant UUID"),
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page (default: 20)"),
        ("status" = Option<String>, Query, description = "Filter by order status (pending, paid, cancelled)"),
        ("customer_id" = Option<Uuid>, Query, description = "Filter by customer"),
        ("start_date" = Option<String>, Query, description = "Orders created on or after this date (YYYY-MM-DD)"),
        ("end_date" = Option<String>, Query, description = "Orders created on or before this date (YYYY-MM-DD)"),
    ),
    responses(
        (status = 200, description = "Orders retrieved successfully", body = ApiResponse<PaginatedResponse<OrderResponse>>),
        (status = 400, description = "Missing or malformed tenant header", body = crate::errors::ErrorResponse),
        (status = 403, description = "Unknown or inactive tenant", body = crate::errors::ErrorResponse),
    )
)]
pub async fn list_orders(
    State(state): State<AppState>,
    tenant: TenantContext,
    auth: AuthStaff,
    Query(pagination): Query<ListQuery>,
    Query(filter): Query<OrderListFilter>,
) -> Result<Json<ApiResponse<PaginatedResponse<OrderResponse>>>, ServiceError> {
    require(auth.role, Capability::OrderView)?;

    let limit = pagination.limit.clamp(1, 100);
    let result = state
        .services
        .orders
        .list_orders(tenant.tenant_id, filter, pagination.page, limit)
        .await?;
    let total_pages = (result.total + limit - 1) / limit;
    Ok(Json(ApiResponse::success(PaginatedResponse {
        items: result.orders,
        total: result.total,
        page: result.page,
        limit,
        total_pages,
    })))
}

/// Create a new order
///
/// Decrements stock for every line inside one transaction; any insufficient
/// line rejects the whole order with no stock mutation.
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    tag = "orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created successfully", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Validation failed (unknown product or customer, inactive product)", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock for a line", body = crate::errors::ErrorResponse),
    )
)]
pub async fn create_order(
    State(state): State<AppState>,
    tenant: TenantContext,
    auth: AuthStaff,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderResponse>>), ServiceError> {
    require(auth.role, Capability::OrderCreate)?;

    let order = state
        .services
        .orders
        .create_order(tenant.tenant_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(order))))
}

/// Get a single order with its lines
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    tag = "orders",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order retrieved successfully", body = ApiResponse<OrderResponse>),
        (status = 404, description = "Order not found in this tenant", body = crate::errors::ErrorResponse),
    )
)]
pub async fn get_order(
    State(state): State<AppState>,
    tenant: TenantContext,
    auth: AuthStaff,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    require(auth.role, Capability::OrderView)?;

    let order = state.services.orders.get_order(tenant.tenant_id, id).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Update an order's notes (pending orders only)
#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}",
    tag = "orders",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = UpdateOrderRequest,
    responses(
        (status = 200, description = "Order updated successfully", body = ApiResponse<OrderResponse>),
        (status = 404, description = "Order not found in this tenant", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order is no longer pending", body = crate::errors::ErrorResponse),
    )
)]
pub async fn update_order(
    State(state): State<AppState>,
    tenant: TenantContext,
    auth: AuthStaff,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateOrderRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    require(auth.role, Capability::OrderUpdate)?;

    let order = state
        .services
        .orders
        .update_order(tenant.tenant_id, id, request)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Delete a pending order, restoring stock for every line
#[utoipa::path(
    delete,
    path = "/api/v1/orders/{id}",
    tag = "orders",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order deleted successfully", body = ApiResponse<OrderResponse>),
        (status = 404, description = "Order not found in this tenant", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order is no longer pending", body = crate::errors::ErrorResponse),
    )
)]
pub async fn delete_order(
    State(state): State<AppState>,
    tenant: TenantContext,
    auth: AuthStaff,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    require(auth.role, Capability::OrderDelete)?;

    state
        .services
        .orders
        .delete_order(tenant.tenant_id, id)
        .await?;
    Ok(Json(ApiResponse::message(
        "Order deleted successfully".to_string(),
    )))
}

/// Cancel an order, restoring stock (idempotent)
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel",
    tag = "orders",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order cancelled (or already cancelled)", body = ApiResponse<OrderResponse>),
        (status = 404, description = "Order not found in this tenant", body = crate::errors::ErrorResponse),
    )
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    tenant: TenantContext,
    auth: AuthStaff,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    require(auth.role, Capability::OrderCancel)?;

    let order = state
        .services
        .orders
        .cancel_order(tenant.tenant_id, id)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Mark a pending order as paid
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/mark-as-paid",
    tag = "orders",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order marked as paid", body = ApiResponse<OrderResponse>),
        (status = 403, description = "Role not allowed to mark orders paid", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found in this tenant", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order is no longer pending", body = crate::errors::ErrorResponse),
    )
)]
pub async fn mark_as_paid(
    State(state): State<AppState>,
    tenant: TenantContext,
    auth: AuthStaff,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    require(auth.role, Capability::OrderMarkPaid)?;

    let order = state
        .services
        .orders
        .mark_as_paid(tenant.tenant_id, id)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders).post(create_order))
        .route(
            "/:id",
            get(get_order).put(update_order).delete(delete_order),
        )
        .route("/:id/cancel", post(cancel_order))
        .route("/:id/mark-as-paid", post(mark_as_paid))
}
