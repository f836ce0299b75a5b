//! # Structured Logging Module
//!
//! Environment-aware `tracing` setup plus a few helpers that give cache, task
//! and queue events a uniform field layout.

use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
///
/// Safe to call repeatedly. If the host process already installed a global
/// subscriber, that subscriber is kept.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));
        let json = std::env::var(crate::constants::env::LOG_FORMAT)
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let layer = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(true)
                .with_filter(filter)
                .boxed()
        };

        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
            return;
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            json = json,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var(crate::constants::env::ENVIRONMENT)
        .or_else(|_| std::env::var(crate::constants::env::APP_ENVIRONMENT))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Log structured data for cache operations
pub fn log_cache_operation(operation: &str, key: &str, tier: Option<&str>, outcome: &str) {
    tracing::debug!(
        operation = %operation,
        key = %key,
        tier = tier,
        outcome = %outcome,
        "🗄️ CACHE_OPERATION"
    );
}

/// Log structured data for task operations
pub fn log_task_operation(
    operation: &str,
    task_id: &uuid::Uuid,
    task_type: &str,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        task_id = %task_id,
        task_type = %task_type,
        status = %status,
        details = details,
        "📋 TASK_OPERATION"
    );
}

/// Log structured data for queue operations
pub fn log_queue_operation(
    operation: &str,
    queue_name: &str,
    message_id: Option<&str>,
    task_type: Option<&str>,
    status: &str,
) {
    tracing::info!(
        operation = %operation,
        queue_name = %queue_name,
        message_id = message_id,
        task_type = task_type,
        status = %status,
        "📬 QUEUE_OPERATION"
    );
}
