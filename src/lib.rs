//! Platform integration gateway library.

pub mod admin;
pub mod config;
pub mod connectors;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod platform;
pub mod resilience;
pub mod security;
pub mod sync;

pub use config::GatewayConfig;
pub use connectors::{ConnectorFactory, GatewayServices, PlatformConnector};
pub use error::{GatewayError, GatewayResult};
pub use lifecycle::Shutdown;
pub use platform::Platform;
