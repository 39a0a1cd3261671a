// Shared by every integration test binary; not every suite touches every helper.
#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use storefront_api::{
    config::AppConfig,
    db,
    entities::tenant,
    events::{self, EventSender},
    handlers::AppServices,
    jobs::ReportWorker,
    message_queue::InMemoryMessageQueue,
    notifications::InMemoryMailer,
    services::{
        customers::{CreateCustomerRequest, CustomerResponse},
        products::{CreateProductRequest, ProductResponse},
    },
    AppState,
};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

pub const OWNER_EMAIL: &str = "owner@example.com";
pub const STAFF_EMAIL: &str = "staff@example.com";

static TRACING: Lazy<()> = Lazy::new(|| {
    if std::env::var("RUST_LOG").is_ok() {
        storefront_api::config::init_tracing("debug", false);
    }
});

/// Test harness: the production router backed by a throwaway SQLite file,
/// with the in-memory queue and mailer kept reachable for assertions.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub tenant_id: Uuid,
    pub queue: Arc<InMemoryMessageQueue>,
    pub mailer: Arc<InMemoryMailer>,
    worker: ReportWorker,
    _event_task: tokio::task::JoinHandle<()>,
    _db_dir: TempDir,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        Lazy::force(&TRACING);

        let db_dir = TempDir::new().expect("create temp dir for test database");
        let db_path = db_dir.path().join("storefront_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "redis://127.0.0.1:6379".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.auto_migrate = true;
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let queue = Arc::new(InMemoryMessageQueue::new());
        let mailer = Arc::new(InMemoryMailer::new());

        let services = AppServices::new(
            db_arc.clone(),
            event_sender.clone(),
            queue.clone(),
            mailer.clone(),
            &cfg,
        );

        // Not spawned: tests drive the worker synchronously via drain_once.
        let worker = ReportWorker::new(
            db_arc.clone(),
            services.reports.clone(),
            queue.clone(),
            mailer.clone(),
            event_sender.clone(),
            "Sales Reports".to_string(),
        );

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        let router = storefront_api::app_router(state.clone(), CorsLayer::permissive());

        let mut app = Self {
            router,
            state,
            tenant_id: Uuid::nil(),
            queue,
            mailer,
            worker,
            _event_task: event_task,
            _db_dir: db_dir,
        };
        app.tenant_id = app.seed_tenant("Test Business").await;
        app
    }

    /// Insert an active tenant row and return its id.
    pub async fn seed_tenant(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        tenant::ActiveModel {
            id: Set(id),
            name: Set(name.to_string()),
            currency: Set("USD".to_string()),
            timezone: Set("UTC".to_string()),
            ..Default::default()
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("seed tenant for tests");
        id
    }

    /// Insert a deactivated tenant row and return its id.
    pub async fn seed_inactive_tenant(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        tenant::ActiveModel {
            id: Set(id),
            name: Set(name.to_string()),
            currency: Set("USD".to_string()),
            timezone: Set("UTC".to_string()),
            is_active: Set(false),
            ..Default::default()
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("seed inactive tenant for tests");
        id
    }

    pub async fn seed_product(
        &self,
        tenant_id: Uuid,
        name: &str,
        sku: &str,
        price: Decimal,
        stock: i32,
    ) -> ProductResponse {
        self.state
            .services
            .products
            .create_product(
                tenant_id,
                CreateProductRequest {
                    name: name.to_string(),
                    description: None,
                    sku: sku.to_string(),
                    price,
                    stock_quantity: Some(stock),
                    low_stock_threshold: None,
                    is_active: Some(true),
                },
            )
            .await
            .expect("seed product for tests")
    }

    pub async fn seed_customer(&self, tenant_id: Uuid, name: &str) -> CustomerResponse {
        self.state
            .services
            .customers
            .create_customer(
                tenant_id,
                CreateCustomerRequest {
                    name: name.to_string(),
                    email: Some(format!(
                        "{}@example.com",
                        name.to_lowercase().replace(' ', ".")
                    )),
                    phone: None,
                    address: None,
                },
            )
            .await
            .expect("seed customer for tests")
    }

    /// Run one pass of the report worker over both job topics.
    pub async fn drain_worker(&self) -> usize {
        self.worker
            .drain_once()
            .await
            .expect("report worker drain should succeed")
    }

    /// Send a request with explicit headers. No tenant or staff headers are
    /// added; use the role helpers for the common case.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Request against the default tenant as the business owner.
    pub async fn as_owner(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let tenant = self.tenant_id.to_string();
        self.request(
            method,
            uri,
            body,
            &[
                ("x-tenant-id", tenant.as_str()),
                ("x-staff-email", OWNER_EMAIL),
                ("x-staff-role", "owner"),
            ],
        )
        .await
    }

    /// Request against the default tenant as a regular staff member.
    pub async fn as_staff(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let tenant = self.tenant_id.to_string();
        self.request(
            method,
            uri,
            body,
            &[
                ("x-tenant-id", tenant.as_str()),
                ("x-staff-email", STAFF_EMAIL),
                ("x-staff-role", "staff"),
            ],
        )
        .await
    }

    /// Owner request against an explicit tenant, for cross-tenant tests.
    pub async fn as_owner_of(
        &self,
        tenant_id: Uuid,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let tenant = tenant_id.to_string();
        self.request(
            method,
            uri,
            body,
            &[
                ("x-tenant-id", tenant.as_str()),
                ("x-staff-email", OWNER_EMAIL),
                ("x-staff-role", "owner"),
            ],
        )
        .await
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// Deserialize a response body as JSON.
pub async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body should be json")
}
