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
use crate::services::products::{
    CreateProductRequest, ProductListFilter, ProductResponse, UpdateProductRequest,
};
use crate::{ApiResponse, AppState, ListQuery, PaginatedResponse};

/// List products with pagination and filtering
#[utoipa::path(
    get,
    path = "/api/v1/products",
    tag = "products",
    params(
        ("X-Tenant-Id" = String, Header, description = "Tenant UUID"),
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page (default: 20)"),
        ("search" = Option<String>, Query, description = "Match against name or SKU"),
        ("is_active" = Option<bool>, Query, description = "Filter by active flag"),
        ("low_stock" = Option<bool>, Query, description = "Only products at or below their threshold"),
    ),
    responses(
        (status = 200, description = "Products retrieved successfully", body = ApiResponse<PaginatedResponse<ProductResponse>>),
        (status = 400, description = "Missing or malformed tenant header", body = crate::errors::ErrorResponse),
        (status = 403, description = "Unknown or inactive tenant", body = crate::errors::ErrorResponse),
    )
)]
pub async fn list_products(
    State(state): State<AppState>,
    tenant: TenantContext,
    auth: AuthStaff,
    Query(pagination): Query<ListQuery>,
    Query(filter): Query<ProductListFilter>,
) -> Result<Json<ApiResponse<PaginatedResponse<ProductResponse>>>, ServiceError> {
    require(auth.role, Capability::ProductView)?;

    let limit = pagination.limit.clamp(1, 100);
    let result = state
        .services
        .products
        .list_products(tenant.tenant_id, filter, pagination.page, limit)
        .await?;
    let total_pages = (result.total + limit - 1) / limit;
    Ok(Json(ApiResponse::success(PaginatedResponse {
        items: result.products,
        total: result.total,
        page: result.page,
        limit,
        total_pages,
    })))
}

/// Create a new product
#[utoipa::path(
    post,
    path = "/api/v1/products",
    tag = "products",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created successfully", body = ApiResponse<ProductResponse>),
        (status = 400, description = "Validation failed (including duplicate SKU)", body = crate::errors::ErrorResponse),
        (status = 403, description = "Role not allowed to create products", body = crate::errors::ErrorResponse),
    )
)]
pub async fn create_product(
    State(state): State<AppState>,
    tenant: TenantContext,
    auth: AuthStaff,
    Json(request): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ProductResponse>>), ServiceError> {
    require(auth.role, Capability::ProductCreate)?;

    let product = state
        .services
        .products
        .create_product(tenant.tenant_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(product))))
}

/// Get a single product
#[utoipa::path(
    get,
    path = "/api/v1/products/{id}",
    tag = "products",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product retrieved successfully", body = ApiResponse<ProductResponse>),
        (status = 404, description = "Product not found in this tenant", body = crate::errors::ErrorResponse),
    )
)]
pub async fn get_product(
    State(state): State<AppState>,
    tenant: TenantContext,
    auth: AuthStaff,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ProductResponse>>, ServiceError> {
    require(auth.role, Capability::ProductView)?;

    let product = state
        .services
        .products
        .get_product(tenant.tenant_id, id)
        .await?;
    Ok(Json(ApiResponse::success(product)))
}

/// Update a product
#[utoipa::path(
    put,
    path = "/api/v1/products/{id}",
    tag = "products",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Product updated successfully", body = ApiResponse<ProductResponse>),
        (status = 400, description = "Validation failed (including duplicate SKU)", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found in this tenant", body = crate::errors::ErrorResponse),
    )
)]
pub async fn update_product(
    State(state): State<AppState>,
    tenant: TenantContext,
    auth: AuthStaff,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateProductRequest>,
) -> Result<Json<ApiResponse<ProductResponse>>, ServiceError> {
    require(auth.role, Capability::ProductUpdate)?;

    let product = state
        .services
        .products
        .update_product(tenant.tenant_id, id, request)
        .await?;
    Ok(Json(ApiResponse::success(product)))
}

/// Soft-delete a product
#[utoipa::path(
    delete,
    path = "/api/v1/products/{id}",
    tag = "products",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product deleted successfully", body = ApiResponse<ProductResponse>),
        (status = 404, description = "Product not found in this tenant", body = crate::errors::ErrorResponse),
        (status = 409, description = "Product is referenced by existing orders", body = crate::errors::ErrorResponse),
    )
)]
pub async fn delete_product(
    State(state): State<AppState>,
    tenant: TenantContext,
    auth: AuthStaff,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ProductResponse>>, ServiceError> {
    require(auth.role, Capability::ProductDelete)?;

    state
        .services
        .products
        .delete_product(tenant.tenant_id, id)
        .await?;
    Ok(Json(ApiResponse::message(
        "Product deleted successfully".to_string(),
    )))
}

/// Restore a soft-deleted product
#[utoipa::path(
    post,
    path = "/api/v1/products/{id}/restore",
    tag = "products",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product restored successfully", body = ApiResponse<ProductResponse>),
        (status = 404, description = "No soft-deleted product with this ID", body = crate::errors::ErrorResponse),
    )
)]
pub async fn restore_product(
    State(state): State<AppState>,
    tenant: TenantContext,
    auth: AuthStaff,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ProductResponse>>, ServiceError> {
    require(auth.role, Capability::ProductRestore)?;

    let product = state
        .services
        .products
        .restore_product(tenant.tenant_id, id)
        .await?;
    Ok(Json(ApiResponse::success(product)))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route(
            "/:id",
            get(get_product)
                .put(update_product)
                .delete(delete_product),
        )
        .route("/:id/restore", post(restore_product))
}
