//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize, fill platform defaults)
//!     → loader.rs (GATEWAY_* environment overrides)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is read once at startup and never re-read per call
//! - All fields have defaults to allow minimal configs
//! - Secrets (encryption key) come from the environment only

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, AdvisoryConfig, CircuitBreakerConfig, CredentialConfig, GatewayConfig,
    HttpClientConfig, MonitoringConfig, ObservabilityConfig, PlatformConfig, PlatformsConfig,
    RateLimitConfig, RetryConfig, SyncConfig, WebhookConfig,
};
