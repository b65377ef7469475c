//! Platform connectors.
//!
//! # Data Flow
//! ```text
//! ConnectorFactory::create("shopee")
//!     → ShopeeConnector (per-variant signing, pagination, field mapping)
//!         → ConnectorContext::send (shared SSRF/monitor/circuit/retry pipeline)
//!             → HttpTransport
//!     → Vec<Order> (canonical)
//! ```
//!
//! # Design Decisions
//! - One trait, one implementation per platform; platform quirks stay in
//!   private helpers of each variant
//! - Connectors are cached per platform for the process lifetime
//! - `authenticate` reports a platform rejection as `Ok(false)`; transport
//!   and configuration problems stay errors

pub mod context;
pub mod factory;
pub mod lazada;
pub mod order;
pub mod shopee;
pub mod shopify;
pub mod tiktok;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::RateLimitConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::platform::{FieldSpec, Platform};
use crate::security::vault::{validate_fields, Credentials};
use crate::security::webhook;

pub use context::{ConnectorContext, GatewayServices};
pub use factory::{ConnectorFactory, FactoryStatistics, PlatformInfo};
pub use order::{Order, OrderItem, OrderStatus};
pub use transport::{HttpTransport, OutboundRequest, OutboundResponse, ReqwestTransport};

/// Uniform capability set over every platform.
#[async_trait]
pub trait PlatformConnector: Send + Sync {
    fn context(&self) -> &ConnectorContext;

    fn platform(&self) -> Platform {
        self.context().platform()
    }

    /// Check the credentials against the platform with a lightweight call.
    async fn authenticate(&self, credentials: &Credentials) -> GatewayResult<bool>;

    /// Local schema check; no I/O.
    fn validate_credentials(&self, credentials: &Credentials) -> bool {
        validate_fields(self.platform(), credentials.fields()).is_ok()
    }

    /// Orders created or updated since `since` (platform default window
    /// when `None`), normalized.
    async fn fetch_orders(&self, since: Option<DateTime<Utc>>) -> GatewayResult<Vec<Order>>;

    /// Push a status change. `Ok(false)` when the platform has no action for
    /// the requested status.
    async fn update_order_status(&self, order_id: &str, status: OrderStatus) -> GatewayResult<bool>;

    fn configuration_schema(&self) -> BTreeMap<String, FieldSpec> {
        schema_map(self.platform())
    }

    /// Authenticate with the stored credentials. Never errors.
    async fn test_connection(&self) -> bool {
        let credentials = match self.context().credentials() {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(platform = %self.platform(), reason = e.reason_code(), "Connection test skipped");
                return false;
            }
        };
        match self.authenticate(&credentials).await {
            Ok(ok) => ok,
            Err(e) => {
                tracing::warn!(
                    platform = %self.platform(),
                    reason = e.reason_code(),
                    error = %e.sanitized_message(),
                    "Connection test failed"
                );
                false
            }
        }
    }

    fn rate_limits(&self) -> RateLimitConfig {
        self.context().config().rate_limit
    }

    /// Header carrying the webhook signature.
    fn webhook_signature_header(&self) -> &'static str {
        "authorization"
    }

    /// Credential field holding the webhook signing secret.
    fn webhook_secret_field(&self) -> &'static str;

    /// HMAC-SHA256 over the raw payload, compared in constant time.
    fn verify_webhook_signature(&self, payload: &[u8], signature: &str, secret: &str) -> bool {
        webhook::verify_signature(payload, signature, secret)
    }
}

/// Field specs keyed by field name.
pub fn schema_map(platform: Platform) -> BTreeMap<String, FieldSpec> {
    platform
        .credential_schema()
        .iter()
        .map(|spec| (spec.name.to_string(), spec.clone()))
        .collect()
}

/// Map an authentication error to `Ok(false)` for `authenticate`.
pub(crate) fn auth_outcome(result: GatewayResult<()>) -> GatewayResult<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(GatewayError::Authentication { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_map_keys() {
        let schema = schema_map(Platform::Shopee);
        let keys: Vec<_> = schema.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["partner_id", "partner_key", "shop_id"]);

        let value = serde_json::to_value(&schema).unwrap();
        for key in keys {
            assert!(value[key].get("type").is_some());
            assert!(value[key].get("required").is_some());
            assert!(value[key].get("description").is_some());
        }
    }

    #[test]
    fn test_auth_outcome() {
        assert!(auth_outcome(Ok(())).unwrap());
        assert!(!auth_outcome(Err(GatewayError::Authentication {
            platform: Platform::Lazada,
            reason: "expired".into(),
        }))
        .unwrap());
        assert!(auth_outcome(Err(GatewayError::Network("reset".into()))).is_err());
    }
}
