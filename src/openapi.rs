use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "1.0.0",
        description = r#"
# Storefront Back Office API

Multi-tenant back office for small retail businesses: catalog and stock,
customers, the order workflow, and sales reporting.

## Tenancy

Every `/api/v1` endpoint is tenant-scoped. Send the tenant UUID in the
`X-Tenant-Id` header; requests without it are rejected with `400` and
unknown or deactivated tenants with `403`. Resources belonging to another
tenant behave as if they do not exist (`404`).

## Staff identity

Write operations are attributed to a staff member via two headers:

```
X-Staff-Email: ana@example.com
X-Staff-Role: owner | staff
```

Owners can do everything. Staff can view the catalog, manage customers, and
work orders (create, update, cancel). Catalog changes, deletes, restores,
mark-as-paid, and all reports are owner-only and answer `403` for staff.

## Pagination

List endpoints accept `page` (default: 1) and `limit` (default: 20, max: 100)
and return a paginated payload with `items`, `total`, `page`, `limit`, and
`total_pages`.

## Error Handling

Errors use a consistent envelope with appropriate HTTP status codes. The
`code` field is present only for errors clients are expected to branch on
(`tenant_id_missing`, `tenant_invalid`, `insufficient_stock`):

```json
{
  "error": "Unprocessable Entity",
  "message": "Insufficient stock: Insufficient stock for 'Espresso Beans 1kg'. Available: 3",
  "code": "insufficient_stock",
  "request_id": "req-abc123xyz",
  "timestamp": "2025-01-01T00:00:00Z"
}
```
        "#,
        contact(
            name = "Storefront Support",
            email = "support@storefront.local"
        ),
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080/api/v1", description = "Local development")
    ),
    tags(
        (name = "products", description = "Catalog and stock endpoints"),
        (name = "customers", description = "Customer directory endpoints"),
        (name = "orders", description = "Order workflow endpoints"),
        (name = "reports", description = "Sales and stock reporting endpoints")
    ),
    paths(
        // Products
        crate::handlers::products::list_products,
        crate::handlers::products::create_product,
        crate::handlers::products::get_product,
        crate::handlers::products::update_product,
        crate::handlers::products::delete_product,
        crate::handlers::products::restore_product,

        // Customers
        crate::handlers::customers::list_customers,
        crate::handlers::customers::create_customer,
        crate::handlers::customers::get_customer,
        crate::handlers::customers::update_customer,
        crate::handlers::customers::delete_customer,
        crate::handlers::customers::restore_customer,

        // Orders
        crate::handlers::orders::list_orders,
        crate::handlers::orders::create_order,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_order,
        crate::handlers::orders::delete_order,
        crate::handlers::orders::cancel_order,
        crate::handlers::orders::mark_as_paid,

        // Reports
        crate::handlers::reports::daily_sales,
        crate::handlers::reports::top_products,
        crate::handlers::reports::low_stock,
    ),
    components(
        schemas(
            // Common types
            crate::ApiResponse<serde_json::Value>,
            crate::PaginatedResponse<serde_json::Value>,
            crate::ListQuery,

            // Product types
            crate::services::products::ProductResponse,
            crate::services::products::CreateProductRequest,
            crate::services::products::UpdateProductRequest,

            // Customer types
            crate::services::customers::CustomerResponse,
            crate::services::customers::CreateCustomerRequest,
            crate::services::customers::UpdateCustomerRequest,

            // Order types
            crate::services::orders::OrderResponse,
            crate::services::orders::OrderItemResponse,
            crate::services::orders::OrderCustomerSummary,
            crate::services::orders::CreateOrderRequest,
            crate::services::orders::OrderItemRequest,
            crate::services::orders::UpdateOrderRequest,
            crate::entities::order::OrderStatus,

            // Report types
            crate::services::reports::DailySalesReport,
            crate::services::reports::SummarySource,
            crate::services::reports::TopProductRow,
            crate::services::reports::LowStockProductRow,
            crate::handlers::reports::DailySalesResponse,
            crate::handlers::reports::TopProductsReport,
            crate::handlers::reports::TopProductsQueued,
            crate::handlers::reports::LowStockReport,

            // Error types
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_generation() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("Storefront API"));
        assert!(json.contains("/api/v1/orders"));
        assert!(json.contains("/api/v1/reports/top-products"));
    }
}
