//! Integration tests for the reporting endpoints: daily sales with the
//! precomputed-summary fallback, the immediate and deferred top-products
//! paths including worker-driven email delivery, and the low-stock report.

mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use common::{read_json, TestApp, OWNER_EMAIL};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

/// Computed money fields go through division and may lose trailing zeros,
/// so compare them numerically rather than as strings.
fn as_decimal(value: &Value) -> Decimal {
    serde_json::from_value(value.clone()).expect("value should deserialize as a decimal")
}

async fn create_paid_order(app: &TestApp, items: Value) -> String {
    let response = app
        .as_owner(Method::POST, "/api/v1/orders", Some(json!({"items": items})))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json(response).await;
    let order_id = body["data"]["id"].as_str().expect("order id").to_string();

    let response = app
        .as_owner(
            Method::POST,
            &format!("/api/v1/orders/{}/mark-as-paid", order_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    order_id
}

// ==================== Daily sales ====================

#[tokio::test]
async fn daily_sales_aggregates_paid_orders_on_demand() {
    let app = TestApp::new().await;
    let product = app
        .seed_product(app.tenant_id, "House Blend", "BLEND-01", dec!(40.00), 50)
        .await;
    let today = Utc::now().date_naive();

    create_paid_order(&app, json!([{"product_id": product.id, "quantity": 1}])).await;
    create_paid_order(&app, json!([{"product_id": product.id, "quantity": 2}])).await;

    // A pending and a cancelled order on the same day must not count.
    let response = app
        .as_owner(
            Method::POST,
            "/api/v1/orders",
            Some(json!({"items": [{"product_id": product.id, "quantity": 1}]})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let pending = read_json(response).await;

    let response = app
        .as_owner(
            Method::POST,
            "/api/v1/orders",
            Some(json!({"items": [{"product_id": product.id, "quantity": 1}]})),
        )
        .await;
    let cancelled = read_json(response).await;
    let cancelled_id = cancelled["data"]["id"].as_str().expect("order id");
    let response = app
        .as_owner(
            Method::POST,
            &format!("/api/v1/orders/{}/cancel", cancelled_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(pending["data"]["status"], "pending");

    let response = app
        .as_owner(
            Method::GET,
            &format!("/api/v1/reports/daily-sales?date={}", today),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["date"], today.to_string());
    let summary = &body["data"]["summary"];
    assert_eq!(summary["source"], "on-demand");
    assert_eq!(summary["total_orders"], 2);
    assert_eq!(as_decimal(&summary["total_sales"]), dec!(120.00));
    assert_eq!(as_decimal(&summary["average_order_value"]), dec!(60.00));
}

#[tokio::test]
async fn daily_sales_prefers_the_precomputed_summary() {
    let app = TestApp::new().await;
    let product = app
        .seed_product(app.tenant_id, "Cold Brew", "BREW-01", dec!(40.00), 50)
        .await;
    let today = Utc::now().date_naive();

    create_paid_order(&app, json!([{"product_id": product.id, "quantity": 1}])).await;
    app.state
        .services
        .reports
        .generate_daily_summary(app.tenant_id, today)
        .await
        .expect("summary generation should succeed");

    // New sales after the summary was generated are invisible until the
    // summary is recomputed; the stale row still wins.
    create_paid_order(&app, json!([{"product_id": product.id, "quantity": 2}])).await;

    let response = app
        .as_owner(
            Method::GET,
            &format!("/api/v1/reports/daily-sales?date={}", today),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    let summary = &body["data"]["summary"];
    assert_eq!(summary["source"], "pre-generated");
    assert_eq!(summary["total_orders"], 1);
    assert_eq!(as_decimal(&summary["total_sales"]), dec!(40.00));

    // Regenerating picks up the later order.
    app.state
        .services
        .reports
        .generate_daily_summary(app.tenant_id, today)
        .await
        .expect("summary regeneration should succeed");

    let response = app
        .as_owner(
            Method::GET,
            &format!("/api/v1/reports/daily-sales?date={}", today),
            None,
        )
        .await;
    let body = read_json(response).await;
    let summary = &body["data"]["summary"];
    assert_eq!(summary["source"], "pre-generated");
    assert_eq!(summary["total_orders"], 2);
    assert_eq!(as_decimal(&summary["total_sales"]), dec!(120.00));
}

#[tokio::test]
async fn daily_sales_defaults_to_yesterday_and_zeroes_empty_days() {
    let app = TestApp::new().await;
    let yesterday = Utc::now().date_naive() - Duration::days(1);

    let response = app
        .as_owner(Method::GET, "/api/v1/reports/daily-sales", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["date"], yesterday.to_string());
    let summary = &body["data"]["summary"];
    assert_eq!(summary["source"], "on-demand");
    assert_eq!(summary["total_orders"], 0);
    assert_eq!(as_decimal(&summary["total_sales"]), Decimal::ZERO);
    assert_eq!(as_decimal(&summary["average_order_value"]), Decimal::ZERO);
}

#[tokio::test]
async fn daily_sales_rejects_future_dates() {
    let app = TestApp::new().await;
    let tomorrow = Utc::now().date_naive() + Duration::days(1);

    let response = app
        .as_owner(
            Method::GET,
            &format!("/api/v1/reports/daily-sales?date={}", tomorrow),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(
        body["message"],
        "Validation error: date cannot be in the future"
    );
}

// ==================== Top products ====================

#[tokio::test]
async fn top_products_short_ranges_compute_inline() {
    let app = TestApp::new().await;
    let kettle = app
        .seed_product(app.tenant_id, "Kettle", "KET-01", dec!(20.00), 40)
        .await;
    let scale = app
        .seed_product(app.tenant_id, "Scale", "SCALE-01", dec!(10.00), 40)
        .await;
    let timer = app
        .seed_product(app.tenant_id, "Timer", "TIMER-01", dec!(5.00), 40)
        .await;
    let today = Utc::now().date_naive();
    let start = today - Duration::days(3);

    create_paid_order(
        &app,
        json!([
            {"product_id": kettle.id, "quantity": 3},
            {"product_id": scale.id, "quantity": 4},
        ]),
    )
    .await;
    create_paid_order(
        &app,
        json!([
            {"product_id": kettle.id, "quantity": 2},
            {"product_id": scale.id, "quantity": 5},
        ]),
    )
    .await;
    create_paid_order(&app, json!([{"product_id": timer.id, "quantity": 2}])).await;

    // Pending orders never enter the ranking.
    let response = app
        .as_owner(
            Method::POST,
            "/api/v1/orders",
            Some(json!({"items": [{"product_id": timer.id, "quantity": 9}]})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .as_owner(
            Method::GET,
            &format!("/api/v1/reports/top-products?start_date={}", start),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    let data = &body["data"];
    assert_eq!(data["generated"], "immediate");
    assert_eq!(data["start_date"], start.to_string());
    assert_eq!(data["end_date"], today.to_string());
    assert_eq!(data["days_processed"], 3);

    let rows = data["top_products"].as_array().expect("top products rows");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["sku"], "SCALE-01");
    assert_eq!(rows[0]["total_quantity"], 9);
    assert_eq!(as_decimal(&rows[0]["total_revenue"]), dec!(90.00));
    assert_eq!(as_decimal(&rows[0]["average_price"]), dec!(10.00));
    assert_eq!(rows[1]["sku"], "KET-01");
    assert_eq!(rows[1]["total_quantity"], 5);
    assert_eq!(as_decimal(&rows[1]["total_revenue"]), dec!(100.00));
    assert_eq!(rows[2]["sku"], "TIMER-01");
    assert_eq!(rows[2]["total_quantity"], 2);
}

#[tokio::test]
async fn top_products_long_ranges_are_queued_and_emailed() {
    let app = TestApp::new().await;
    let product = app
        .seed_product(app.tenant_id, "Roaster", "ROAST-01", dec!(250.00), 10)
        .await;
    let today = Utc::now().date_naive();
    let start = today - Duration::days(30);

    create_paid_order(&app, json!([{"product_id": product.id, "quantity": 2}])).await;

    let response = app
        .as_owner(
            Method::GET,
            &format!("/api/v1/reports/top-products?start_date={}", start),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = read_json(response).await;
    let data = &body["data"];
    assert_eq!(data["message"], "Report generation queued for email delivery");
    assert_eq!(data["email"], OWNER_EMAIL);
    assert_eq!(data["days_processed"], 30);
    assert_eq!(data["estimated_time"], "5-10 minutes");
    assert_eq!(data["note"], "Reports exceeding 7 days are sent via email");

    // Nothing is delivered until the worker runs.
    assert!(app.mailer.sent_messages().is_empty());
    assert_eq!(app.drain_worker().await, 1);

    let sent = app.mailer.sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, OWNER_EMAIL);
    assert_eq!(
        sent[0].subject,
        format!("Top Products Report: {} to {}", start, today)
    );
    assert!(sent[0].html_body.contains("Test Business"));
    assert!(sent[0].html_body.contains("Roaster"));

    // The queue is empty afterwards; a second drain is a no-op.
    assert_eq!(app.drain_worker().await, 0);
    assert_eq!(app.mailer.sent_messages().len(), 1);
}

#[tokio::test]
async fn top_products_rejects_inverted_ranges() {
    let app = TestApp::new().await;
    let today = Utc::now().date_naive();
    let start = today;
    let end = today - Duration::days(2);

    let response = app
        .as_owner(
            Method::GET,
            &format!(
                "/api/v1/reports/top-products?start_date={}&end_date={}",
                start, end
            ),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(
        body["message"],
        "Validation error: start_date must be before or equal to end_date"
    );
}

#[tokio::test]
async fn top_products_with_no_sales_returns_an_empty_ranking() {
    let app = TestApp::new().await;
    let today = Utc::now().date_naive();
    let start = today - Duration::days(5);

    let response = app
        .as_owner(
            Method::GET,
            &format!("/api/v1/reports/top-products?start_date={}", start),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["generated"], "immediate");
    assert_eq!(
        body["data"]["top_products"].as_array().expect("rows").len(),
        0
    );
}

// ==================== Low stock ====================

#[tokio::test]
async fn low_stock_report_lists_active_products_at_or_below_threshold() {
    let app = TestApp::new().await;
    let empty = app
        .seed_product(app.tenant_id, "Empty Shelf", "EMPTY-01", dec!(8.00), 0)
        .await;
    let at_threshold = app
        .seed_product(app.tenant_id, "At Threshold", "EDGE-01", dec!(6.00), 10)
        .await;
    app.seed_product(app.tenant_id, "Well Stocked", "FULL-01", dec!(9.00), 60)
        .await;

    // Inactive and soft-deleted products stay out of the report even when low.
    let hidden = app
        .seed_product(app.tenant_id, "Retired Item", "RET-01", dec!(4.00), 1)
        .await;
    let response = app
        .as_owner(
            Method::PUT,
            &format!("/api/v1/products/{}", hidden.id),
            Some(json!({"is_active": false})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let deleted = app
        .seed_product(app.tenant_id, "Gone Item", "GONE-01", dec!(4.00), 1)
        .await;
    let response = app
        .as_owner(
            Method::DELETE,
            &format!("/api/v1/products/{}", deleted.id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .as_owner(Method::GET, "/api/v1/reports/low-stock", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    let data = &body["data"];
    assert_eq!(data["generated"], "immediate");
    assert_eq!(data["count"], 2);
    assert!(data["timestamp"].as_str().expect("timestamp").len() >= 19);

    let rows = data["low_stock_products"].as_array().expect("rows");
    assert_eq!(rows.len(), 2);
    // Ordered by stock ascending.
    assert_eq!(rows[0]["id"], empty.id.to_string());
    assert_eq!(rows[0]["stock_quantity"], 0);
    assert_eq!(rows[0]["needs_restocking"], json!(true));
    assert_eq!(rows[1]["id"], at_threshold.id.to_string());
    assert_eq!(rows[1]["stock_quantity"], 10);
    // At the threshold exactly: low, but not yet due for a reorder.
    assert_eq!(rows[1]["needs_restocking"], json!(false));
}

// ==================== Roles ====================

#[tokio::test]
async fn reports_are_owner_only() {
    let app = TestApp::new().await;

    for uri in [
        "/api/v1/reports/daily-sales",
        "/api/v1/reports/top-products",
        "/api/v1/reports/low-stock",
    ] {
        let response = app.as_staff(Method::GET, uri, None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "uri {}", uri);
        let body = read_json(response).await;
        assert_eq!(
            body["message"],
            "Forbidden: Role 'staff' is not allowed to perform 'reports_view'"
        );
    }
}
