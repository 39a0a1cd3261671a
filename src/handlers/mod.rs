pub mod customers;
pub mod orders;
pub mod products;
pub mod reports;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::message_queue::MessageQueue;
use crate::notifications::Mailer;
use crate::services::{
    customers::CustomerService, orders::OrderService, products::ProductService,
    reports::ReportService,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub products: ProductService,
    pub customers: CustomerService,
    pub orders: OrderService,
    pub reports: ReportService,
    pub queue: Arc<dyn MessageQueue>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: EventSender,
        queue: Arc<dyn MessageQueue>,
        mailer: Arc<dyn Mailer>,
        config: &AppConfig,
    ) -> Self {
        Self {
            products: ProductService::new(db_pool.clone(), event_sender.clone()),
            customers: CustomerService::new(db_pool.clone(), event_sender.clone()),
            orders: OrderService::new(db_pool.clone(), event_sender.clone()),
            reports: ReportService::new(db_pool, event_sender, config),
            queue,
            mailer,
        }
    }
}
