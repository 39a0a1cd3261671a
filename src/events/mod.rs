use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

use crate::metrics;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

// Define the various events that can occur in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Order events
    OrderCreated {
        order_id: Uuid,
        tenant_id: Uuid,
        total_amount: Decimal,
    },
    OrderPaid {
        order_id: Uuid,
        tenant_id: Uuid,
    },
    OrderCancelled {
        order_id: Uuid,
        tenant_id: Uuid,
    },
    OrderDeleted {
        order_id: Uuid,
        tenant_id: Uuid,
    },

    // Catalog events
    ProductCreated(Uuid),
    ProductUpdated(Uuid),
    ProductDeleted(Uuid),
    ProductRestored(Uuid),

    // Customer events
    CustomerCreated(Uuid),
    CustomerUpdated(Uuid),
    CustomerDeleted(Uuid),
    CustomerRestored(Uuid),

    // Reporting events
    TopProductsReportQueued {
        tenant_id: Uuid,
        recipient: String,
    },
    TopProductsReportSent {
        tenant_id: Uuid,
        recipient: String,
    },
    DailySummaryGenerated {
        tenant_id: Uuid,
        date: NaiveDate,
    },
}

/// Drains the event channel, logging each event and keeping the business
/// counters current. Runs for the lifetime of the process; exits when every
/// sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCreated {
                order_id,
                tenant_id,
                total_amount,
            } => {
                metrics::ORDERS_CREATED.inc();
                info!(
                    order_id = %order_id,
                    tenant_id = %tenant_id,
                    total_amount = %total_amount,
                    "order created"
                );
            }
            Event::OrderPaid {
                order_id,
                tenant_id,
            } => {
                metrics::ORDERS_PAID.inc();
                info!(order_id = %order_id, tenant_id = %tenant_id, "order paid");
            }
            Event::OrderCancelled {
                order_id,
                tenant_id,
            } => {
                metrics::ORDERS_CANCELLED.inc();
                info!(order_id = %order_id, tenant_id = %tenant_id, "order cancelled");
            }
            Event::OrderDeleted {
                order_id,
                tenant_id,
            } => {
                info!(order_id = %order_id, tenant_id = %tenant_id, "order deleted");
            }
            Event::ProductCreated(id) => info!(product_id = %id, "product created"),
            Event::ProductUpdated(id) => info!(product_id = %id, "product updated"),
            Event::ProductDeleted(id) => info!(product_id = %id, "product deleted"),
            Event::ProductRestored(id) => info!(product_id = %id, "product restored"),
            Event::CustomerCreated(id) => info!(customer_id = %id, "customer created"),
            Event::CustomerUpdated(id) => info!(customer_id = %id, "customer updated"),
            Event::CustomerDeleted(id) => info!(customer_id = %id, "customer deleted"),
            Event::CustomerRestored(id) => info!(customer_id = %id, "customer restored"),
            Event::TopProductsReportQueued {
                tenant_id,
                recipient,
            } => {
                metrics::REPORTS_DEFERRED.inc();
                info!(
                    tenant_id = %tenant_id,
                    recipient = %recipient,
                    "top products report queued for email delivery"
                );
            }
            Event::TopProductsReportSent {
                tenant_id,
                recipient,
            } => {
                info!(
                    tenant_id = %tenant_id,
                    recipient = %recipient,
                    "top products report email delivered"
                );
            }
            Event::DailySummaryGenerated { tenant_id, date } => {
                info!(tenant_id = %tenant_id, date = %date, "daily sales summary generated");
            }
        }
    }

    error!("Event processing loop terminated: all senders dropped");
}
