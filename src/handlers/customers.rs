use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{require, AuthStaff, Capability};
use crate::errors::ServiceError;
use crate::middleware_helpers::tenant::TenantContext;
use crate::services::customers::{
    CreateCustomerRequest, CustomerResponse, UpdateCustomerRequest,
};
use crate::{ApiResponse, AppState, ListQuery, PaginatedResponse};

#[derive(Debug, Default, Deserialize)]
pub struct CustomerSearchParams {
    /// Matched against name, email and phone
    pub search: Option<String>,
}

/// List customers with pagination and search
#[utoipa::path(
    get,
    path = "/api/v1/customers",
    tag = "customers",
    params(
        ("X-Tenant-Id" = String, Header, description = "Tenant UUID"),
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page (default: 20)"),
        ("search" = Option<String>, Query, description = "Match against name, email or phone"),
    ),
    responses(
        (status = 200, description = "Customers retrieved successfully", body = ApiResponse<PaginatedResponse<CustomerResponse>>),
        (status = 400, description = "Missing or malformed tenant header", body = crate::errors::ErrorResponse),
        (status = 403, description = "Unknown or inactive tenant", body = crate::errors::ErrorResponse),
    )
)]
pub async fn list_customers(
    State(state): State<AppState>,
    tenant: TenantContext,
    auth: AuthStaff,
    Query(pagination): Query<ListQuery>,
    Query(params): Query<CustomerSearchParams>,
) -> Result<Json<ApiResponse<PaginatedResponse<CustomerResponse>>>, ServiceError> {
    require(auth.role, Capability::CustomerView)?;

    let limit = pagination.limit.clamp(1, 100);
    let result = state
        .services
        .customers
        .list_customers(tenant.tenant_id, params.search, pagination.page, limit)
        .await?;
    let total_pages = (result.total + limit - 1) / limit;
    Ok(Json(ApiResponse::success(PaginatedResponse {
        items: result.customers,
        total: result.total,
        page: result.page,
        limit,
        total_pages,
    })))
}

/// Create a new customer
#[utoipa::path(
    post,
    path = "/api/v1/customers",
    tag = "customers",
    request_body = CreateCustomerRequest,
    responses(
        (status = 201, description = "Customer created successfully", body = ApiResponse<CustomerResponse>),
        (status = 400, description = "Validation failed", body = crate::errors::ErrorResponse),
    )
)]
pub async fn create_customer(
    State(state): State<AppState>,
    tenant: TenantContext,
    auth: AuthStaff,
    Json(request): Json<CreateCustomerRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CustomerResponse>>), ServiceError> {
    require(auth.role, Capability::CustomerCreate)?;

    let customer = state
        .services
        .customers
        .create_customer(tenant.tenant_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(customer))))
}

/// Get a single customer
#[utoipa::path(
    get,
    path = "/api/v1/customers/{id}",
    tag = "customers",
    params(("id" = Uuid, Path, description = "Customer ID")),
    responses(
        (status = 200, description = "Customer retrieved successfully", body = ApiResponse<CustomerResponse>),
        (status = 404, description = "Customer not found in this tenant", body = crate::errors::ErrorResponse),
    )
)]
pub async fn get_customer(
    State(state): State<AppState>,
    tenant: TenantContext,
    auth: AuthStaff,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<CustomerResponse>>, ServiceError> {
    require(auth.role, Capability::CustomerView)?;

    let customer = state
        .services
        .customers
        .get_customer(tenant.tenant_id, id)
        .await?;
    Ok(Json(ApiResponse::success(customer)))
}

/// Update a customer
#[utoipa::path(
    put,
    path = "/api/v1/customers/{id}",
    tag = "customers",
    params(("id" = Uuid, Path, description = "Customer ID")),
    request_body = UpdateCustomerRequest,
    responses(
        (status = 200, description = "Customer updated successfully", body = ApiResponse<CustomerResponse>),
        (status = 400, description = "Validation failed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Customer not found in this tenant", body = crate::errors::ErrorResponse),
    )
)]
pub async fn update_customer(
    State(state): State<AppState>,
    tenant: TenantContext,
    auth: AuthStaff,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateCustomerRequest>,
) -> Result<Json<ApiResponse<CustomerResponse>>, ServiceError> {
    require(auth.role, Capability::CustomerUpdate)?;

    let customer = state
        .services
        .customers
        .update_customer(tenant.tenant_id, id, request)
        .await?;
    Ok(Json(ApiResponse::success(customer)))
}

/// Soft-delete a customer
#[utoipa::path(
    delete,
    path = "/api/v1/customers/{id}",
    tag = "customers",
    params(("id" = Uuid, Path, description = "Customer ID")),
    responses(
        (status = 200, description = "Customer deleted successfully", body = ApiResponse<CustomerResponse>),
        (status = 404, description = "Customer not found in this tenant", body = crate::errors::ErrorResponse),
        (status = 409, description = "Customer has existing orders", body = crate::errors::ErrorResponse),
    )
)]
pub async fn delete_customer(
    State(state): State<AppState>,
    tenant: TenantContext,
    auth: AuthStaff,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<CustomerResponse>>, ServiceError> {
    require(auth.role, Capability::CustomerDelete)?;

    state
        .services
        .customers
        .delete_customer(tenant.tenant_id, id)
        .await?;
    Ok(Json(ApiResponse::message(
        "Customer deleted successfully".to_string(),
    )))
}

/// Restore a soft-deleted customer
#[utoipa::path(
    post,
    path = "/api/v1/customers/{id}/restore",
    tag = "customers",
    params(("id" = Uuid, Path, description = "Customer ID")),
    responses(
        (status = 200, description = "Customer restored successfully", body = ApiResponse<CustomerResponse>),
        (status = 404, description = "No soft-deleted customer with this ID", body = crate::errors::ErrorResponse),
    )
)]
pub async fn restore_customer(
    State(state): State<AppState>,
    tenant: TenantContext,
    auth: AuthStaff,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<CustomerResponse>>, ServiceError> {
    require(auth.role, Capability::CustomerRestore)?;

    let customer = state
        .services
        .customers
        .restore_customer(tenant.tenant_id, id)
        .await?;
    Ok(Json(ApiResponse::success(customer)))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_customers).post(create_customer))
        .route(
            "/:id",
            get(get_customer)
                .put(update_customer)
                .delete(delete_customer),
        )
        .route("/:id/restore", post(restore_customer))
}
