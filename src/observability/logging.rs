//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once at start-up
//! - Select JSON or human-readable output
//! - Provide the dedicated audit target
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level when set
//! - Audit records are ordinary tracing events on the `audit` target so
//!   they can be routed with a filter directive such as `audit=info`

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::ObservabilityConfig;

/// Target used for platform interaction audit records.
pub const AUDIT_TARGET: &str = "audit";

/// Build the filter from `RUST_LOG`, falling back to the configured level.
pub fn env_filter(config: &ObservabilityConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{level},platform_gateway={level},{AUDIT_TARGET}=info,tower_http=info",
            level = config.log_level
        ))
    })
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_logging(config: &ObservabilityConfig) {
    let json = config.json_logs;
    let result = tracing_subscriber::registry()
        .with(env_filter(config))
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .try_init();

    if result.is_err() {
        tracing::debug!("Global subscriber already installed");
    }
}
