//! # Structured Logging
//!
//! Environment-aware tracing initialization for embedding hosts and tests.
//! Uses `WORKORDER_LOG` (falling back to `RUST_LOG`) for filter directives.

use std::sync::OnceLock;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging once per process.
///
/// Safe to call from multiple entry points; if a global subscriber is
/// already installed (for example by the embedding host), this is a no-op.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = std::env::var("WORKORDER_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| default_log_level().to_string());

        let subscriber = tracing_subscriber::registry().with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_filter(EnvFilter::new(filter)),
        );

        if subscriber.try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized");
        }
    });
}

fn default_log_level() -> &'static str {
    match std::env::var("APP_ENV").as_deref() {
        Ok("production") => "info",
        _ => "debug",
    }
}
