//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::platform::Platform;

/// Root configuration for the platform gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Outbound HTTP client settings.
    pub http: HttpClientConfig,

    /// Retry policy for transient failures.
    pub retries: RetryConfig,

    /// Circuit breaker thresholds.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Credential vault settings.
    pub credentials: CredentialConfig,

    /// Webhook verification settings.
    pub webhooks: WebhookConfig,

    /// Security monitoring settings.
    pub monitoring: MonitoringConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Order sync scheduler settings.
    pub sync: SyncConfig,

    /// Per-platform endpoints and limits.
    pub platforms: PlatformsConfig,
}

/// Outbound HTTP client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpClientConfig {
    /// Total request timeout in seconds.
    pub timeout_secs: u64,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Maximum redirects followed before the request is aborted.
    pub max_redirects: usize,

    /// Verify TLS certificates of platform endpoints.
    pub verify_ssl: bool,

    /// User-Agent sent to platforms.
    pub user_agent: String,
}

impl HttpClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 10,
            max_redirects: 3,
            verify_ssl: true,
            user_agent: format!("platform-gateway/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,

    /// Seconds the circuit stays open before probing.
    pub recovery_timeout_secs: u64,

    /// Trial calls admitted while half-open.
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_secs: 60,
            half_open_max_calls: 3,
        }
    }
}

/// Credential vault configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CredentialConfig {
    /// Maximum credential age before rotation is due.
    pub rotation_interval_days: u32,

    /// Optional path of the encrypted credential file. In-memory when unset.
    pub store_path: Option<String>,

    /// Environment variable holding the base64 encryption key.
    pub encryption_key_env: String,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            rotation_interval_days: 90,
            store_path: None,
            encryption_key_env: "GATEWAY_ENCRYPTION_KEY".to_string(),
        }
    }
}

/// Webhook verification configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Verify webhook signatures. Disabling is for local development only.
    pub verify_signatures: bool,

    /// Maximum accepted webhook body in bytes.
    pub max_body_bytes: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            verify_signatures: true,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Security monitoring configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Auth failures within the window that mark a platform suspicious.
    pub auth_failure_threshold: u32,

    /// Auth failure window in seconds.
    pub auth_failure_window_secs: u64,

    /// Security events retained per platform.
    pub event_retention: usize,

    /// Reject over-limit calls instead of only flagging them.
    pub enforce_rate_limits: bool,

    /// Known dependency advisories included in security reports.
    pub advisories: Vec<AdvisoryConfig>,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            auth_failure_threshold: 5,
            auth_failure_window_secs: 300,
            event_retention: 1000,
            enforce_rate_limits: false,
            advisories: Vec::new(),
        }
    }
}

/// A known vulnerability advisory.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct AdvisoryConfig {
    pub id: String,
    pub package: String,
    pub severity: String,
    pub summary: String,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // Validation refuses to start the admin API with an empty key.
            api_key: String::new(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Order sync scheduler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Run periodic order sync.
    pub enabled: bool,

    /// Seconds between sync rounds.
    pub interval_secs: u64,

    /// Look-back window for the first sync of a platform, in hours.
    pub initial_lookback_hours: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 300,
            initial_lookback_hours: 24,
        }
    }
}

/// Rate limits for one platform.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Sustained requests per minute.
    pub requests_per_minute: u32,

    /// Maximum requests within one burst window.
    pub burst_limit: u32,

    /// Burst window in seconds.
    pub burst_window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            burst_limit: 10,
            burst_window_secs: 1,
        }
    }
}

/// Endpoint and limit configuration for one platform.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Include the platform in sync rounds.
    pub enabled: bool,

    /// Use the sandbox endpoint.
    pub sandbox: bool,

    /// Production API base URL. Shopify derives it from the shop domain.
    pub base_url: String,

    /// Sandbox API base URL.
    pub sandbox_url: String,

    /// Hosts outbound calls may reach. `*.example.com` matches subdomains.
    pub allowed_domains: Vec<String>,

    /// API version segment, where the platform has one.
    pub api_version: String,

    /// Page size for order listing.
    pub page_size: u32,

    /// Rate limits.
    pub rate_limit: RateLimitConfig,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sandbox: false,
            base_url: String::new(),
            sandbox_url: String::new(),
            allowed_domains: Vec::new(),
            api_version: String::new(),
            page_size: 50,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl PlatformConfig {
    /// Base URL for the active environment.
    pub fn active_base_url(&self) -> &str {
        if self.sandbox && !self.sandbox_url.is_empty() {
            &self.sandbox_url
        } else {
            &self.base_url
        }
    }

    fn shopee() -> Self {
        Self {
            base_url: "https://partner.shopeemobile.com".to_string(),
            sandbox_url: "https://partner.test-stable.shopeemobile.com".to_string(),
            allowed_domains: vec![
                "partner.shopeemobile.com".to_string(),
                "partner.test-stable.shopeemobile.com".to_string(),
            ],
            page_size: 50,
            rate_limit: RateLimitConfig {
                requests_per_minute: 100,
                burst_limit: 20,
                burst_window_secs: 1,
            },
            ..Self::default()
        }
    }

    fn lazada() -> Self {
        Self {
            base_url: "https://api.lazada.com.my/rest".to_string(),
            sandbox_url: "https://api.lazada.test/rest".to_string(),
            allowed_domains: vec![
                "api.lazada.com.my".to_string(),
                "api.lazada.sg".to_string(),
                "api.lazada.co.th".to_string(),
                "api.lazada.com.ph".to_string(),
                "api.lazada.vn".to_string(),
                "api.lazada.co.id".to_string(),
                "api.lazada.test".to_string(),
            ],
            page_size: 100,
            rate_limit: RateLimitConfig {
                requests_per_minute: 60,
                burst_limit: 10,
                burst_window_secs: 1,
            },
            ..Self::default()
        }
    }

    fn shopify() -> Self {
        Self {
            allowed_domains: vec!["*.myshopify.com".to_string()],
            api_version: "2024-01".to_string(),
            page_size: 250,
            rate_limit: RateLimitConfig {
                requests_per_minute: 120,
                burst_limit: 40,
                burst_window_secs: 1,
            },
            ..Self::default()
        }
    }

    fn tiktok() -> Self {
        Self {
            base_url: "https://open-api.tiktokglobalshop.com".to_string(),
            sandbox_url: "https://open-api-sandbox.tiktokglobalshop.com".to_string(),
            allowed_domains: vec![
                "open-api.tiktokglobalshop.com".to_string(),
                "open-api-sandbox.tiktokglobalshop.com".to_string(),
            ],
            api_version: "202309".to_string(),
            page_size: 50,
            rate_limit: RateLimitConfig {
                requests_per_minute: 100,
                burst_limit: 20,
                burst_window_secs: 1,
            },
            ..Self::default()
        }
    }
}

/// Configuration of all supported platforms.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PlatformsConfig {
    pub shopee: PlatformConfig,
    pub lazada: PlatformConfig,
    pub shopify: PlatformConfig,
    pub tiktok: PlatformConfig,
}

impl Default for PlatformsConfig {
    fn default() -> Self {
        Self {
            shopee: PlatformConfig::shopee(),
            lazada: PlatformConfig::lazada(),
            shopify: PlatformConfig::shopify(),
            tiktok: PlatformConfig::tiktok(),
        }
    }
}

impl PlatformsConfig {
    pub fn get(&self, platform: Platform) -> &PlatformConfig {
        match platform {
            Platform::Shopee => &self.shopee,
            Platform::Lazada => &self.lazada,
            Platform::Shopify => &self.shopify,
            Platform::Tiktok => &self.tiktok,
        }
    }

    pub fn get_mut(&mut self, platform: Platform) -> &mut PlatformConfig {
        match platform {
            Platform::Shopee => &mut self.shopee,
            Platform::Lazada => &mut self.lazada,
            Platform::Shopify => &mut self.shopify,
            Platform::Tiktok => &mut self.tiktok,
        }
    }

    /// Restores built-in endpoints for fields a partial config left empty.
    ///
    /// A `[platforms.x]` table deserializes missing fields from
    /// `PlatformConfig::default()`, which carries no endpoints.
    pub fn fill_platform_defaults(&mut self) {
        let builtin = PlatformsConfig::default();
        for platform in Platform::ALL {
            let defaults = builtin.get(platform);
            let current = self.get_mut(platform);
            if current.base_url.is_empty() {
                current.base_url = defaults.base_url.clone();
            }
            if current.sandbox_url.is_empty() {
                current.sandbox_url = defaults.sandbox_url.clone();
            }
            if current.allowed_domains.is_empty() {
                current.allowed_domains = defaults.allowed_domains.clone();
            }
            if current.api_version.is_empty() {
                current.api_version = defaults.api_version.clone();
            }
        }
    }

    /// Platforms flagged as enabled.
    pub fn enabled(&self) -> Vec<Platform> {
        Platform::ALL
            .into_iter()
            .filter(|p| self.get(*p).enabled)
            .collect()
    }
}
