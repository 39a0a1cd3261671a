/*!
 * # Background Jobs
 *
 * Deferred report work flows through the message queue: long-range top
 * products reports become email jobs, and the nightly scheduler enqueues one
 * summary job per active tenant. The worker drains both topics.
 */

use crate::{
    db::DbPool,
    entities::tenant,
    errors::ServiceError,
    events::{Event, EventSender},
    message_queue::{Message, MessageQueue},
    metrics,
    notifications::{
        render::{render_top_products_email, top_products_subject},
        EmailMessage, Mailer,
    },
    services::reports::ReportService,
};
use chrono::{NaiveDate, Utc};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::{interval, sleep, Duration};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

pub const TOPIC_TOP_PRODUCTS_EMAIL: &str = "reports.top_products_email";
pub const TOPIC_DAILY_SUMMARY: &str = "reports.daily_summary";

/// Payload for a deferred top products report delivered by email
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopProductsEmailJob {
    pub tenant_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub email: String,
}

/// Payload for one tenant-date summary recomputation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailySummaryJob {
    pub tenant_id: Uuid,
    pub date: NaiveDate,
}

pub async fn enqueue_top_products_email(
    queue: &dyn MessageQueue,
    job: &TopProductsEmailJob,
) -> Result<(), ServiceError> {
    let payload = serde_json::to_value(job)
        .map_err(|e| ServiceError::QueueError(format!("Failed to encode report email job: {}", e)))?;
    queue
        .publish(Message::new(TOPIC_TOP_PRODUCTS_EMAIL.to_string(), payload))
        .await?;
    Ok(())
}

pub async fn enqueue_daily_summary(
    queue: &dyn MessageQueue,
    job: &DailySummaryJob,
) -> Result<(), ServiceError> {
    let payload = serde_json::to_value(job).map_err(|e| {
        ServiceError::QueueError(format!("Failed to encode daily summary job: {}", e))
    })?;
    queue
        .publish(Message::new(TOPIC_DAILY_SUMMARY.to_string(), payload))
        .await?;
    Ok(())
}

/// Consumes report jobs from the queue. Failed jobs are handed back for
/// retry; a job that exhausts its retries is dropped with an error log.
pub struct ReportWorker {
    db_pool: Arc<DbPool>,
    reports: ReportService,
    queue: Arc<dyn MessageQueue>,
    mailer: Arc<dyn Mailer>,
    event_sender: EventSender,
    sender_name: String,
}

impl ReportWorker {
    pub fn new(
        db_pool: Arc<DbPool>,
        reports: ReportService,
        queue: Arc<dyn MessageQueue>,
        mailer: Arc<dyn Mailer>,
        event_sender: EventSender,
        sender_name: String,
    ) -> Self {
        Self {
            db_pool,
            reports,
            queue,
            mailer,
            event_sender,
            sender_name,
        }
    }

    /// Runs the worker loop for the lifetime of the process.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!("Starting report worker");
            loop {
                if let Err(e) = self.drain_once().await {
                    error!(error = %e, "Report worker drain failed");
                }
                sleep(Duration::from_millis(500)).await;
            }
        })
    }

    /// Drains currently queued messages from both report topics. Public so
    /// tests can drive the worker without a background task.
    pub async fn drain_once(&self) -> Result<usize, ServiceError> {
        let mut processed = 0;

        while let Some(message) = self.queue.subscribe(TOPIC_TOP_PRODUCTS_EMAIL).await? {
            self.handle_top_products_email(message).await;
            processed += 1;
        }

        while let Some(message) = self.queue.subscribe(TOPIC_DAILY_SUMMARY).await? {
            self.handle_daily_summary(message).await;
            processed += 1;
        }

        Ok(processed)
    }

    async fn handle_top_products_email(&self, message: Message) {
        let job: TopProductsEmailJob = match serde_json::from_value(message.payload.clone()) {
            Ok(job) => job,
            Err(e) => {
                // Undecodable payloads would fail on every retry
                error!(error = %e, message_id = %message.id, "Discarding undecodable report email job");
                metrics::JOBS_FAILED.inc();
                if let Err(e) = self.queue.ack(&message.id).await {
                    warn!(error = %e, "Failed to ack discarded message");
                }
                return;
            }
        };

        match self.send_top_products_email(&job).await {
            Ok(()) => {
                metrics::JOBS_PROCESSED.inc();
                if let Err(e) = self.queue.ack(&message.id).await {
                    warn!(error = %e, message_id = %message.id, "Failed to ack report email job");
                }
            }
            Err(e) => {
                metrics::JOBS_FAILED.inc();
                warn!(
                    error = %e,
                    tenant_id = %job.tenant_id,
                    retry_count = message.retry_count,
                    "Report email job failed"
                );
                match self.queue.nack(message).await {
                    Ok(true) => {}
                    Ok(false) => {
                        metrics::EMAILS_FAILED.inc();
                        error!(
                            tenant_id = %job.tenant_id,
                            recipient = %job.email,
                            "Report email job dropped after exhausting retries"
                        );
                    }
                    Err(e) => error!(error = %e, "Failed to requeue report email job"),
                }
            }
        }
    }

    #[instrument(skip(self, job), fields(tenant_id = %job.tenant_id, recipient = %job.email))]
    async fn send_top_products_email(&self, job: &TopProductsEmailJob) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let tenant = tenant::Entity::find_by_id(job.tenant_id)
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to load tenant for report email");
                ServiceError::DatabaseError(e)
            })?;

        // A tenant deleted after the report was queued is not an error; the
        // job just has nobody left to report on.
        let Some(tenant) = tenant else {
            warn!("Tenant no longer exists; skipping report email");
            return Ok(());
        };

        let rows = self
            .reports
            .top_product_rows(job.tenant_id, job.start_date, job.end_date)
            .await?;

        let email = EmailMessage {
            to: job.email.clone(),
            subject: top_products_subject(job.start_date, job.end_date),
            html_body: render_top_products_email(
                &tenant.name,
                job.start_date,
                job.end_date,
                &rows,
                &self.sender_name,
            ),
        };

        self.mailer.send(email).await.map_err(|e| {
            ServiceError::InternalError(format!("Report email delivery failed: {}", e))
        })?;

        metrics::EMAILS_SENT.inc();
        info!(rows = rows.len(), "Top products report email sent");

        if let Err(e) = self
            .event_sender
            .send(Event::TopProductsReportSent {
                tenant_id: job.tenant_id,
                recipient: job.email.clone(),
            })
            .await
        {
            warn!(error = %e, "Failed to send report delivered event");
        }

        Ok(())
    }

    async fn handle_daily_summary(&self, message: Message) {
        let job: DailySummaryJob = match serde_json::from_value(message.payload.clone()) {
            Ok(job) => job,
            Err(e) => {
                error!(error = %e, message_id = %message.id, "Discarding undecodable daily summary job");
                metrics::JOBS_FAILED.inc();
                if let Err(e) = self.queue.ack(&message.id).await {
                    warn!(error = %e, "Failed to ack discarded message");
                }
                return;
            }
        };

        match self.reports.generate_daily_summary(job.tenant_id, job.date).await {
            Ok(_) => {
                metrics::JOBS_PROCESSED.inc();
                if let Err(e) = self.queue.ack(&message.id).await {
                    warn!(error = %e, message_id = %message.id, "Failed to ack daily summary job");
                }
            }
            Err(e) => {
                metrics::JOBS_FAILED.inc();
                warn!(
                    error = %e,
                    tenant_id = %job.tenant_id,
                    date = %job.date,
                    retry_count = message.retry_count,
                    "Daily summary job failed"
                );
                match self.queue.nack(message).await {
                    Ok(true) => {}
                    Ok(false) => error!(
                        tenant_id = %job.tenant_id,
                        date = %job.date,
                        "Daily summary job dropped after exhausting retries"
                    ),
                    Err(e) => error!(error = %e, "Failed to requeue daily summary job"),
                }
            }
        }
    }
}

/// Ticks until the UTC date rolls over, then enqueues yesterday's summary
/// job for every active tenant. Summary generation is an idempotent upsert,
/// so the enqueue on process start cannot double-count a date.
pub fn spawn_summary_scheduler(
    db_pool: Arc<DbPool>,
    queue: Arc<dyn MessageQueue>,
    tick_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!(tick_secs = tick_secs, "Starting daily summary scheduler");
        let mut ticker = interval(Duration::from_secs(tick_secs.max(1)));
        let mut last_enqueued_on: Option<NaiveDate> = None;

        loop {
            ticker.tick().await;
            let today = Utc::now().date_naive();
            if last_enqueued_on == Some(today) {
                continue;
            }

            let target = today - chrono::Duration::days(1);
            match enqueue_summaries_for(&db_pool, queue.as_ref(), target).await {
                Ok(count) => {
                    info!(date = %target, tenants = count, "Enqueued daily summary jobs");
                    last_enqueued_on = Some(today);
                }
                Err(e) => {
                    error!(error = %e, date = %target, "Failed to enqueue daily summary jobs")
                }
            }
        }
    })
}

async fn enqueue_summaries_for(
    db: &DbPool,
    queue: &dyn MessageQueue,
    date: NaiveDate,
) -> Result<usize, ServiceError> {
    let tenants = tenant::Entity::find()
        .filter(tenant::Column::IsActive.eq(true))
        .all(db)
        .await
        .map_err(ServiceError::DatabaseError)?;

    let mut enqueued = 0;
    for tenant in tenants {
        enqueue_daily_summary(
            queue,
            &DailySummaryJob {
                tenant_id: tenant.id,
                date,
            },
        )
        .await?;
        enqueued += 1;
    }

    Ok(enqueued)
}
