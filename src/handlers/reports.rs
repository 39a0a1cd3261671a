use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;

use crate::auth::{require, AuthStaff, Capability};
use crate::errors::ServiceError;
use crate::events::Event;
use crate::jobs::{enqueue_top_products_email, TopProductsEmailJob};
use crate::middleware_helpers::tenant::TenantContext;
use crate::services::reports::{
    DailySalesReport, LowStockProductRow, TopProductRow, TopProductsOutcome,
};
use crate::{ApiResponse, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct DailySalesParams {
    /// Defaults to yesterday (UTC)
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TopProductsParams {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DailySalesResponse {
    pub date: NaiveDate,
    pub summary: DailySalesReport,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TopProductsReport {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub generated: String,
    pub days_processed: i64,
    pub top_products: Vec<TopProductRow>,
}

/// Acknowledgement for a report that will arrive by email
#[derive(Debug, Serialize, ToSchema)]
pub struct TopProductsQueued {
    pub message: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days_processed: i64,
    pub email: String,
    pub estimated_time: String,
    pub note: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LowStockReport {
    pub generated: String,
    pub timestamp: String,
    pub low_stock_products: Vec<LowStockProductRow>,
    pub count: usize,
}

/// Daily sales summary for one date
#[utoipa::path(
    get,
    path = "/api/v1/reports/daily-sales",
    tag = "reports",
    params(
        ("X-Tenant-Id" = String, Header, description = "Tenant UUID"),
        ("date" = Option<String>, Query, description = "Report date (YYYY-MM-DD, default: yesterday)"),
    ),
    responses(
        (status = 200, description = "Daily sales retrieved", body = ApiResponse<DailySalesResponse>),
        (status = 400, description = "Date is malformed or in the future", body = crate::errors::ErrorResponse),
        (status = 403, description = "Reports are owner-only", body = crate::errors::ErrorResponse),
    )
)]
pub async fn daily_sales(
    State(state): State<AppState>,
    tenant: TenantContext,
    auth: AuthStaff,
    Query(params): Query<DailySalesParams>,
) -> Result<Json<ApiResponse<DailySalesResponse>>, ServiceError> {
    require(auth.role, Capability::ReportsView)?;

    let summary = state
        .services
        .reports
        .daily_sales(tenant.tenant_id, params.date)
        .await?;
    Ok(Json(ApiResponse::success(DailySalesResponse {
        date: summary.date,
        summary,
    })))
}

/// Top products by quantity sold
///
/// Short ranges return the rows inline; ranges beyond the configured
/// threshold are queued and the report is emailed to the requester.
#[utoipa::path(
    get,
    path = "/api/v1/reports/top-products",
    tag = "reports",
    params(
        ("X-Tenant-Id" = String, Header, description = "Tenant UUID"),
        ("start_date" = Option<String>, Query, description = "Range start (YYYY-MM-DD)"),
        ("end_date" = Option<String>, Query, description = "Range end (YYYY-MM-DD, default: today)"),
    ),
    responses(
        (status = 200, description = "Report computed immediately", body = ApiResponse<TopProductsReport>),
        (status = 202, description = "Report queued for email delivery", body = ApiResponse<TopProductsQueued>),
        (status = 400, description = "Invalid date range", body = crate::errors::ErrorResponse),
        (status = 403, description = "Reports are owner-only", body = crate::errors::ErrorResponse),
    )
)]
pub async fn top_products(
    State(state): State<AppState>,
    tenant: TenantContext,
    auth: AuthStaff,
    Query(params): Query<TopProductsParams>,
) -> Result<Response, ServiceError> {
    require(auth.role, Capability::ReportsView)?;

    let outcome = state
        .services
        .reports
        .top_products(
            tenant.tenant_id,
            params.start_date,
            params.end_date,
            &auth.email,
        )
        .await?;

    match outcome {
        TopProductsOutcome::Immediate {
            window,
            top_products,
        } => Ok(Json(ApiResponse::success(TopProductsReport {
            start_date: window.start,
            end_date: window.end,
            generated: "immediate".to_string(),
            days_processed: window.days,
            top_products,
        }))
        .into_response()),
        TopProductsOutcome::Deferred {
            window,
            email,
            threshold_days,
        } => {
            let job = TopProductsEmailJob {
                tenant_id: tenant.tenant_id,
                start_date: window.start,
                end_date: window.end,
                email: email.clone(),
            };
            enqueue_top_products_email(state.services.queue.as_ref(), &job).await?;

            if let Err(e) = state
                .event_sender
                .send(Event::TopProductsReportQueued {
                    tenant_id: tenant.tenant_id,
                    recipient: email.clone(),
                })
                .await
            {
                warn!(error = %e, "Failed to send report queued event");
            }

            Ok((
                StatusCode::ACCEPTED,
                Json(ApiResponse::success(TopProductsQueued {
                    message: "Report generation queued for email delivery".to_string(),
                    start_date: window.start,
                    end_date: window.end,
                    days_processed: window.days,
                    email,
                    estimated_time: "5-10 minutes".to_string(),
                    note: format!(
                        "Reports exceeding {} days are sent via email",
                        threshold_days
                    ),
                })),
            )
                .into_response())
        }
    }
}

/// Products at or below their low-stock threshold
#[utoipa::path(
    get,
    path = "/api/v1/reports/low-stock",
    tag = "reports",
    params(("X-Tenant-Id" = String, Header, description = "Tenant UUID")),
    responses(
        (status = 200, description = "Low stock report", body = ApiResponse<LowStockReport>),
        (status = 403, description = "Reports are owner-only", body = crate::errors::ErrorResponse),
    )
)]
pub async fn low_stock(
    State(state): State<AppState>,
    tenant: TenantContext,
    auth: AuthStaff,
) -> Result<Json<ApiResponse<LowStockReport>>, ServiceError> {
    require(auth.role, Capability::ReportsView)?;

    let products = state.services.reports.low_stock(tenant.tenant_id).await?;
    Ok(Json(ApiResponse::success(LowStockReport {
        generated: "immediate".to_string(),
        timestamp: Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        count: products.len(),
        low_stock_products: products,
    })))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/daily-sales", get(daily_sales))
        .route("/top-products", get(top_products))
        .route("/low-stock", get(low_stock))
}
