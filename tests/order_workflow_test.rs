//! End-to-end tests for the order workflow: creation with guarded stock
//! decrements, price snapshots, payment, cancellation with stock
//! restoration, and the pending-only mutation rules.

mod common;

use axum::http::{Method, StatusCode};
use common::{read_json, TestApp};
use rust_decimal_macros::dec;
use serde_json::{json, Value};

async fn product_stock(app: &TestApp, product_id: &str) -> i64 {
    let response = app
        .as_owner(Method::GET, &format!("/api/v1/products/{}", product_id), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    body["data"]["stock_quantity"]
        .as_i64()
        .expect("stock_quantity should be a number")
}

// ==================== Creation ====================

#[tokio::test]
async fn create_order_snapshots_prices_and_decrements_stock() {
    let app = TestApp::new().await;
    let coffee = app
        .seed_product(app.tenant_id, "Coffee Beans", "COF-001", dec!(50.00), 100)
        .await;
    let mug = app
        .seed_product(app.tenant_id, "Ceramic Mug", "MUG-001", dec!(25.00), 50)
        .await;
    let customer = app.seed_customer(app.tenant_id, "Ada Lovelace").await;

    let response = app
        .as_owner(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "customer_id": customer.id,
                "items": [
                    {"product_id": coffee.id, "quantity": 2},
                    {"product_id": mug.id, "quantity": 3},
                ],
                "notes": "First sale of the day",
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = read_json(response).await;
    assert_eq!(body["success"], json!(true));
    let order = &body["data"];
    assert_eq!(order["status"], "pending");
    assert_eq!(order["total_amount"], "175.00");
    assert_eq!(order["notes"], "First sale of the day");
    assert_eq!(order["customer"]["name"], "Ada Lovelace");
    assert!(order["order_number"]
        .as_str()
        .expect("order_number should be a string")
        .starts_with("ORD-"));

    let items = order["items"].as_array().expect("items should be an array");
    assert_eq!(items.len(), 2);
    let coffee_line = items
        .iter()
        .find(|line| line["product_sku"] == "COF-001")
        .expect("coffee line should be present");
    assert_eq!(coffee_line["quantity"], 2);
    assert_eq!(coffee_line["unit_price"], "50.00");
    assert_eq!(coffee_line["total_price"], "100.00");

    assert_eq!(product_stock(&app, &coffee.id.to_string()).await, 98);
    assert_eq!(product_stock(&app, &mug.id.to_string()).await, 47);
}

#[tokio::test]
async fn order_total_survives_later_price_changes() {
    let app = TestApp::new().await;
    let product = app
        .seed_product(app.tenant_id, "Notebook", "NOTE-001", dec!(12.50), 30)
        .await;

    let response = app
        .as_owner(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "items": [{"product_id": product.id, "quantity": 4}],
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let order = read_json(response).await;
    let order_id = order["data"]["id"].as_str().expect("order id").to_string();

    let response = app
        .as_owner(
            Method::PUT,
            &format!("/api/v1/products/{}", product.id),
            Some(json!({"price": "99.99"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .as_owner(Method::GET, &format!("/api/v1/orders/{}", order_id), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["total_amount"], "50.00");
    assert_eq!(body["data"]["items"][0]["unit_price"], "12.50");
}

#[tokio::test]
async fn insufficient_stock_rejects_the_whole_order() {
    let app = TestApp::new().await;
    let scarce = app
        .seed_product(app.tenant_id, "Limited Print", "PRINT-001", dec!(80.00), 5)
        .await;
    let plenty = app
        .seed_product(app.tenant_id, "Postcard", "CARD-001", dec!(2.00), 100)
        .await;

    let response = app
        .as_owner(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "items": [
                    {"product_id": plenty.id, "quantity": 1},
                    {"product_id": scarce.id, "quantity": 10},
                ],
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = read_json(response).await;
    assert_eq!(body["code"], "insufficient_stock");
    let message = body["message"].as_str().expect("error message");
    assert!(message.contains("Insufficient stock for 'Limited Print'"));
    assert!(message.contains("Available: 5"));

    // All-or-nothing: the sufficient line must not have been decremented.
    assert_eq!(product_stock(&app, &plenty.id.to_string()).await, 100);
    assert_eq!(product_stock(&app, &scarce.id.to_string()).await, 5);
}

#[tokio::test]
async fn orders_reject_unknown_and_foreign_products() {
    let app = TestApp::new().await;
    let other_tenant = app.seed_tenant("Other Shop").await;
    let foreign = app
        .seed_product(other_tenant, "Foreign Goods", "FOR-001", dec!(10.00), 10)
        .await;

    let response = app
        .as_owner(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "items": [{"product_id": uuid::Uuid::new_v4(), "quantity": 1}],
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert!(body["message"]
        .as_str()
        .expect("error message")
        .contains("not found in your business"));

    // A product owned by another tenant is indistinguishable from a missing one.
    let response = app
        .as_owner(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "items": [{"product_id": foreign.id, "quantity": 1}],
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(product_stock(&app, &foreign.id.to_string()).await, 10);
}

#[tokio::test]
async fn orders_reject_unknown_customers_and_zero_quantities() {
    let app = TestApp::new().await;
    let product = app
        .seed_product(app.tenant_id, "Tea Tin", "TEA-001", dec!(15.00), 20)
        .await;

    let response = app
        .as_owner(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "customer_id": uuid::Uuid::new_v4(),
                "items": [{"product_id": product.id, "quantity": 1}],
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert!(body["message"]
        .as_str()
        .expect("error message")
        .contains("Customer not found in your business."));

    let response = app
        .as_owner(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "items": [{"product_id": product.id, "quantity": 0}],
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert!(body["message"]
        .as_str()
        .expect("error message")
        .contains("Quantity must be at least 1"));
    assert_eq!(product_stock(&app, &product.id.to_string()).await, 20);
}

// ==================== Cancellation ====================

#[tokio::test]
async fn cancel_restores_stock_and_is_idempotent() {
    let app = TestApp::new().await;
    let product = app
        .seed_product(app.tenant_id, "Desk Lamp", "LAMP-001", dec!(45.00), 10)
        .await;

    let response = app
        .as_owner(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "items": [{"product_id": product.id, "quantity": 4}],
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let order = read_json(response).await;
    let order_id = order["data"]["id"].as_str().expect("order id").to_string();
    assert_eq!(product_stock(&app, &product.id.to_string()).await, 6);

    let response = app
        .as_owner(
            Method::POST,
            &format!("/api/v1/orders/{}/cancel", order_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["status"], "cancelled");
    assert_eq!(product_stock(&app, &product.id.to_string()).await, 10);

    // A second cancel must not restore stock again.
    let response = app
        .as_owner(
            Method::POST,
            &format!("/api/v1/orders/{}/cancel", order_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["status"], "cancelled");
    assert_eq!(product_stock(&app, &product.id.to_string()).await, 10);
}

#[tokio::test]
async fn cancel_restores_stock_from_paid_orders() {
    let app = TestApp::new().await;
    let product = app
        .seed_product(app.tenant_id, "Wall Clock", "CLOCK-001", dec!(60.00), 8)
        .await;

    let response = app
        .as_owner(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "items": [{"product_id": product.id, "quantity": 3}],
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let order = read_json(response).await;
    let order_id = order["data"]["id"].as_str().expect("order id").to_string();

    let response = app
        .as_owner(
            Method::POST,
            &format!("/api/v1/orders/{}/mark-as-paid", order_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(product_stock(&app, &product.id.to_string()).await, 5);

    let response = app
        .as_owner(
            Method::POST,
            &format!("/api/v1/orders/{}/cancel", order_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["status"], "cancelled");
    assert_eq!(product_stock(&app, &product.id.to_string()).await, 8);
}

// ==================== Pending-only mutations ====================

#[tokio::test]
async fn updating_and_deleting_pending_orders() {
    let app = TestApp::new().await;
    let product = app
        .seed_product(app.tenant_id, "Spice Rack", "SPICE-001", dec!(35.00), 12)
        .await;

    let response = app
        .as_owner(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "items": [{"product_id": product.id, "quantity": 5}],
                "notes": "Call before delivery",
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let order = read_json(response).await;
    let order_id = order["data"]["id"].as_str().expect("order id").to_string();
    assert_eq!(product_stock(&app, &product.id.to_string()).await, 7);

    let response = app
        .as_owner(
            Method::PUT,
            &format!("/api/v1/orders/{}", order_id),
            Some(json!({"notes": "Leave at the back door"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["notes"], "Leave at the back door");

    let response = app
        .as_owner(Method::DELETE, &format!("/api/v1/orders/{}", order_id), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["message"], "Order deleted successfully");
    assert_eq!(body["data"], Value::Null);

    // Deletion restores the stock and removes the order entirely.
    assert_eq!(product_stock(&app, &product.id.to_string()).await, 12);
    let response = app
        .as_owner(Method::GET, &format!("/api/v1/orders/{}", order_id), None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn paid_orders_refuse_updates_deletes_and_double_payment() {
    let app = TestApp::new().await;
    let product = app
        .seed_product(app.tenant_id, "Bookend Pair", "BOOK-001", dec!(22.00), 9)
        .await;

    let response = app
        .as_owner(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "items": [{"product_id": product.id, "quantity": 2}],
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let order = read_json(response).await;
    let order_id = order["data"]["id"].as_str().expect("order id").to_string();

    let response = app
        .as_owner(
            Method::POST,
            &format!("/api/v1/orders/{}/mark-as-paid", order_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["status"], "paid");

    let response = app
        .as_owner(
            Method::PUT,
            &format!("/api/v1/orders/{}", order_id),
            Some(json!({"notes": "too late"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = read_json(response).await;
    assert_eq!(body["message"], "Conflict: Only pending orders can be updated");

    let response = app
        .as_owner(Method::DELETE, &format!("/api/v1/orders/{}", order_id), None)
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = read_json(response).await;
    assert_eq!(body["message"], "Conflict: Only pending orders can be deleted");

    let response = app
        .as_owner(
            Method::POST,
            &format!("/api/v1/orders/{}/mark-as-paid", order_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = read_json(response).await;
    assert_eq!(
        body["message"],
        "Conflict: Only pending orders can be marked as paid"
    );
}

// ==================== Roles ====================

#[tokio::test]
async fn marking_paid_requires_the_owner_role() {
    let app = TestApp::new().await;
    let product = app
        .seed_product(app.tenant_id, "Apron", "APRON-001", dec!(18.00), 6)
        .await;

    // Staff may create orders.
    let response = app
        .as_staff(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "items": [{"product_id": product.id, "quantity": 1}],
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let order = read_json(response).await;
    let order_id = order["data"]["id"].as_str().expect("order id").to_string();

    let response = app
        .as_staff(
            Method::POST,
            &format!("/api/v1/orders/{}/mark-as-paid", order_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = read_json(response).await;
    assert_eq!(
        body["message"],
        "Forbidden: Role 'staff' is not allowed to perform 'order_mark_paid'"
    );

    let response = app
        .as_owner(
            Method::POST,
            &format!("/api/v1/orders/{}/mark-as-paid", order_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["status"], "paid");
}

// ==================== Listing ====================

#[tokio::test]
async fn listing_orders_filters_by_status() {
    let app = TestApp::new().await;
    let product = app
        .seed_product(app.tenant_id, "Vase", "VASE-001", dec!(28.00), 40)
        .await;

    let mut order_ids = Vec::new();
    for _ in 0..3 {
        let response = app
            .as_owner(
                Method::POST,
                "/api/v1/orders",
                Some(json!({
                    "items": [{"product_id": product.id, "quantity": 1}],
                })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = read_json(response).await;
        order_ids.push(body["data"]["id"].as_str().expect("order id").to_string());
    }

    let response = app
        .as_owner(
            Method::POST,
            &format!("/api/v1/orders/{}/cancel", order_ids[0]),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .as_owner(Method::GET, "/api/v1/orders?status=cancelled", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["id"], order_ids[0].as_str());

    let response = app
        .as_owner(Method::GET, "/api/v1/orders?status=pending", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["total"], 2);
}
