use std::{net::SocketAddr, sync::Arc};

use axum::http::HeaderValue;
use tokio::{signal, sync::mpsc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use storefront_api as api;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }

    let db_arc = Arc::new(db_pool);

    // Init events
    let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
    let event_sender = api::events::EventSender::new(event_tx);
    tokio::spawn(api::events::process_events(event_rx));

    // Message queue backend for deferred report jobs
    let message_queue: Arc<dyn api::message_queue::MessageQueue> =
        match cfg.message_queue_backend.to_ascii_lowercase().as_str() {
            "redis" => match api::message_queue::RedisMessageQueue::connect(
                &cfg.redis_url,
                cfg.message_queue_namespace.clone(),
                cfg.message_queue_block_timeout_secs,
            )
            .await
            {
                Ok(queue) => Arc::new(queue),
                Err(err) => {
                    error!(
                        "Failed to initialize Redis message queue (falling back to in-memory): {}",
                        err
                    );
                    Arc::new(api::message_queue::InMemoryMessageQueue::new())
                }
            },
            _ => Arc::new(api::message_queue::InMemoryMessageQueue::new()),
        };

    // Outbound mail: HTTP relay when configured, log-only otherwise
    let mailer: Arc<dyn api::notifications::Mailer> = match cfg.mail_relay_url.as_deref() {
        Some(url) => Arc::new(api::notifications::HttpRelayMailer::new(
            url,
            cfg.mail_from_address.clone(),
            cfg.mail_from_name.clone(),
            cfg.mail_relay_signing_secret.clone(),
            cfg.mail_relay_timeout_secs,
        )?),
        None => {
            info!("Mail relay not configured; report emails are logged only");
            Arc::new(api::notifications::LogMailer)
        }
    };

    // Aggregate app services used by HTTP handlers
    let services = api::handlers::AppServices::new(
        db_arc.clone(),
        event_sender.clone(),
        message_queue.clone(),
        mailer.clone(),
        &cfg,
    );

    // Background worker: emailed top-products reports and daily summary jobs
    let sender_name = cfg
        .mail_from_name
        .clone()
        .unwrap_or_else(|| "Sales Reports".to_string());
    api::jobs::ReportWorker::new(
        db_arc.clone(),
        services.reports.clone(),
        message_queue.clone(),
        mailer.clone(),
        event_sender.clone(),
        sender_name,
    )
    .spawn();

    if cfg.summary_scheduler_enabled {
        api::jobs::spawn_summary_scheduler(
            db_arc.clone(),
            message_queue.clone(),
            cfg.summary_scheduler_tick_secs,
        );
    }

    // Compose shared app state
    let app_state = api::AppState {
        db: db_arc.clone(),
        config: cfg.clone(),
        event_sender,
        services,
    };

    // Build CORS layer from config
    let configured_origins: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    let cors_layer = if let Some(origins) = configured_origins {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
            .allow_credentials(cfg.cors_allow_credentials)
    } else if cfg.should_allow_permissive_cors() {
        info!(
            "Using permissive CORS because explicit origins were not configured ({})",
            if cfg.is_development() {
                "development environment"
            } else {
                "explicit override enabled"
            }
        );
        CorsLayer::permissive()
    } else {
        error!("Missing CORS configuration detected; set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true");
        return Err("Missing CORS configuration: set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true".into());
    };

    let app = api::app_router(app_state, cors_layer);

    // Bind and serve
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    info!("🚀 storefront-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
