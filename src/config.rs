use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::env as std_env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_MESSAGE_QUEUE_BACKEND: &str = "in-memory";
const DEFAULT_MESSAGE_QUEUE_NAMESPACE: &str = "storefront:mq";
const DEFAULT_MESSAGE_QUEUE_BLOCK_TIMEOUT_SECS: u64 = 5;
const DEFAULT_REPORT_IMMEDIATE_THRESHOLD_DAYS: i64 = 7;
const DEFAULT_REPORT_RANGE_DAYS: i64 = 30;
const DEFAULT_MAIL_FROM_ADDRESS: &str = "reports@storefront.local";
const DEFAULT_SUMMARY_SCHEDULER_TICK_SECS: u64 = 300;

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Redis connection URL
    pub redis_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback
    #[serde(default = "default_false_bool")]
    pub cors_allow_any_origin: bool,

    /// CORS: allow credentials
    #[serde(default)]
    pub cors_allow_credentials: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,
    /// Statement timeout (seconds), 0 = disabled
    #[serde(default)]
    pub db_statement_timeout_secs: Option<u64>,

    /// Message queue backend selection ("in-memory" or "redis")
    #[serde(default = "default_message_queue_backend")]
    #[validate(custom = "validate_message_queue_backend")]
    pub message_queue_backend: String,

    /// Namespace prefix for queue keys when using Redis backend
    #[serde(default = "default_message_queue_namespace")]
    pub message_queue_namespace: String,

    /// Blocking timeout (seconds) for queue subscriptions
    #[serde(default = "default_message_queue_block_timeout_secs")]
    pub message_queue_block_timeout_secs: u64,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Top-products report: ranges at most this many days are computed inline
    #[serde(default = "default_report_immediate_threshold_days")]
    pub report_immediate_threshold_days: i64,

    /// Top-products report: range length used when the request names no dates
    #[serde(default = "default_report_range_days")]
    #[validate(custom = "validate_report_range_days")]
    pub report_default_range_days: i64,

    /// Sender address for outgoing report mail
    #[serde(default = "default_mail_from_address")]
    pub mail_from_address: String,

    /// Sender display name for outgoing report mail
    #[serde(default)]
    pub mail_from_name: Option<String>,

    /// HTTP mail relay endpoint; when unset, mail is logged instead of sent
    #[serde(default)]
    pub mail_relay_url: Option<String>,

    /// Shared secret for signing relay requests (hex HMAC-SHA256)
    #[serde(default)]
    pub mail_relay_signing_secret: Option<String>,

    /// Relay request timeout (seconds)
    #[serde(default = "default_mail_relay_timeout_secs")]
    pub mail_relay_timeout_secs: u64,

    /// Enable the nightly daily-summary scheduler
    #[serde(default)]
    pub summary_scheduler_enabled: bool,

    /// Scheduler poll interval (seconds)
    #[serde(default = "default_summary_scheduler_tick_secs")]
    pub summary_scheduler_tick_secs: u64,
}

impl AppConfig {
    /// Gets database URL reference
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Creates a new configuration with defaults for everything not named
    pub fn new(
        database_url: String,
        redis_url: String,
        host: String,
        port: u16,
        environment: String,
    ) -> Self {
        Self {
            database_url,
            redis_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            cors_allow_credentials: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            db_statement_timeout_secs: None,
            message_queue_backend: default_message_queue_backend(),
            message_queue_namespace: default_message_queue_namespace(),
            message_queue_block_timeout_secs: default_message_queue_block_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            report_immediate_threshold_days: default_report_immediate_threshold_days(),
            report_default_range_days: default_report_range_days(),
            mail_from_address: default_mail_from_address(),
            mail_from_name: None,
            mail_relay_url: None,
            mail_relay_signing_secret: None,
            mail_relay_timeout_secs: default_mail_relay_timeout_secs(),
            summary_scheduler_enabled: false,
            summary_scheduler_tick_secs: default_summary_scheduler_tick_secs(),
        }
    }

    /// Gets Redis URL reference
    pub fn redis_url(&self) -> &str {
        &self.redis_url
    }

    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Returns true if explicit CORS origins are configured
    pub fn has_cors_allowed_origins(&self) -> bool {
        self.cors_allowed_origins
            .as_ref()
            .map(|raw| raw.split(',').any(|origin| !origin.trim().is_empty()))
            .unwrap_or(false)
    }

    /// Whether we should fall back to permissive CORS
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && !self.has_cors_allowed_origins() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some(
                "Set APP__CORS_ALLOWED_ORIGINS for non-development environments or explicitly opt-in via APP__CORS_ALLOW_ANY_ORIGIN=true".into(),
            );
            errors.add("cors_allowed_origins", err);
        }

        if self.mail_relay_signing_secret.is_some() && self.mail_relay_url.is_none() {
            let mut err = ValidationError::new("mail_relay_url_required");
            err.message = Some(
                "APP__MAIL_RELAY_SIGNING_SECRET is set but APP__MAIL_RELAY_URL is not; the secret would never be used".into(),
            );
            errors.add("mail_relay_url", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    16
}
fn default_db_min_connections() -> u32 {
    2
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_false_bool() -> bool {
    false
}
fn default_message_queue_backend() -> String {
    DEFAULT_MESSAGE_QUEUE_BACKEND.to_string()
}
fn default_message_queue_namespace() -> String {
    DEFAULT_MESSAGE_QUEUE_NAMESPACE.to_string()
}
fn default_message_queue_block_timeout_secs() -> u64 {
    DEFAULT_MESSAGE_QUEUE_BLOCK_TIMEOUT_SECS
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_report_immediate_threshold_days() -> i64 {
    DEFAULT_REPORT_IMMEDIATE_THRESHOLD_DAYS
}

fn default_report_range_days() -> i64 {
    DEFAULT_REPORT_RANGE_DAYS
}

fn default_mail_from_address() -> String {
    DEFAULT_MAIL_FROM_ADDRESS.to_string()
}

fn default_mail_relay_timeout_secs() -> u64 {
    10
}

fn default_summary_scheduler_tick_secs() -> u64 {
    DEFAULT_SUMMARY_SCHEDULER_TICK_SECS
}

fn validate_message_queue_backend(value: &str) -> Result<(), ValidationError> {
    match value.to_ascii_lowercase().as_str() {
        "in-memory" | "redis" => Ok(()),
        _ => {
            let mut err = ValidationError::new("message_queue_backend");
            err.message = Some("Must be one of: in-memory, redis".into());
            Err(err)
        }
    }
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_report_range_days(days: i64) -> Result<(), ValidationError> {
    if days < 1 {
        let mut err = ValidationError::new("report_default_range_days");
        err.message = Some("report_default_range_days must be at least 1".into());
        return Err(err);
    }
    Ok(())
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("storefront_api={},tower_http=debug", level);
    let filter_directive = std_env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Docker config (config/docker.toml) if DOCKER env var is set
/// 4. Environment variables (APP_*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let mut builder = Config::builder()
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .set_default("redis_url", "redis://localhost:6379")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", 8080)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false));

    if env::var("DOCKER").is_ok() {
        info!("Docker environment detected");
        builder =
            builder.add_source(File::with_name(&format!("{}/docker", CONFIG_DIR)).required(false));
    }

    let config = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod validation_tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite://storefront.db?mode=memory".into(),
            "redis://127.0.0.1:6379".into(),
            "127.0.0.1".into(),
            8080,
            "production".into(),
        )
    }

    #[test]
    fn non_dev_requires_cors_origins() {
        let cfg = base_config();
        assert!(cfg.validate_additional_constraints().is_err());
    }

    #[test]
    fn non_dev_allows_override_flag() {
        let mut cfg = base_config();
        cfg.cors_allow_any_origin = true;
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn non_dev_with_origins_passes() {
        let mut cfg = base_config();
        cfg.cors_allowed_origins = Some("https://example.com".into());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn development_allows_permissive_by_default() {
        let mut cfg = base_config();
        cfg.environment = "development".into();
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn signing_secret_without_relay_url_is_rejected() {
        let mut cfg = base_config();
        cfg.environment = "development".into();
        cfg.mail_relay_signing_secret = Some("sekrit".into());
        assert!(cfg.validate_additional_constraints().is_err());

        cfg.mail_relay_url = Some("https://relay.example.com/send".into());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn report_defaults_match_documented_values() {
        let cfg = base_config();
        assert_eq!(cfg.report_immediate_threshold_days, 7);
        assert_eq!(cfg.report_default_range_days, 30);
        assert_eq!(cfg.message_queue_backend, "in-memory");
    }

    #[test]
    fn queue_backend_must_be_known() {
        assert!(validate_message_queue_backend("in-memory").is_ok());
        assert!(validate_message_queue_backend("redis").is_ok());
        assert!(validate_message_queue_backend("kafka").is_err());
    }
}
