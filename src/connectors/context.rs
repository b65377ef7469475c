//! Shared outbound pipeline used by every connector.
//!
//! # Data Flow
//! ```text
//! connector builds signed request
//!     → SSRF validation against the platform allow-list
//!     → security monitor (count, flag, optional enforcement)
//!     → circuit breaker (keyed by platform)
//!         → retry loop → timeout → transport
//!     → status mapping (401/403, 429, 5xx)
//!     → audit record + metrics
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::json;
use url::Url;

use crate::config::{GatewayConfig, HttpClientConfig, PlatformConfig};
use crate::connectors::order::{decimal_to_minor, from_unix};
use crate::connectors::transport::{HttpTransport, OutboundRequest, OutboundResponse};
use crate::error::{GatewayError, GatewayResult};
use crate::observability::metrics;
use crate::platform::Platform;
use crate::resilience::{retry, with_timeout, CircuitBreakerRegistry, RetryPolicy};
use crate::security::monitor::{ApiInteraction, SecurityEventKind, SecurityMonitor};
use crate::security::ssrf::{DomainAllowList, SsrfGuard};
use crate::security::vault::{CredentialVault, Credentials};

/// Largest error body excerpt kept in an `Api` error.
const ERROR_EXCERPT_LEN: usize = 200;

/// Shared services handed to every connector.
#[derive(Clone)]
pub struct GatewayServices {
    pub http: HttpClientConfig,
    pub vault: Arc<CredentialVault>,
    pub guard: SsrfGuard,
    pub circuits: Arc<CircuitBreakerRegistry>,
    pub monitor: Arc<SecurityMonitor>,
    pub retry: RetryPolicy,
}

impl GatewayServices {
    /// Wire the shared services from configuration around a vault.
    pub fn new(config: &GatewayConfig, vault: Arc<CredentialVault>) -> Self {
        Self {
            http: config.http.clone(),
            vault,
            guard: SsrfGuard::new(config.http.max_redirects),
            circuits: Arc::new(CircuitBreakerRegistry::from_config(&config.circuit_breaker)),
            monitor: Arc::new(SecurityMonitor::new(&config.monitoring, &config.platforms)),
            retry: RetryPolicy::from(&config.retries),
        }
    }
}

/// Per-platform view of the pipeline.
pub struct ConnectorContext {
    platform: Platform,
    config: PlatformConfig,
    allow_list: DomainAllowList,
    timeout: Duration,
    services: GatewayServices,
    transport: Arc<dyn HttpTransport>,
}

impl ConnectorContext {
    pub fn new(
        platform: Platform,
        config: PlatformConfig,
        services: GatewayServices,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            platform,
            allow_list: DomainAllowList::new(&config.allowed_domains),
            timeout: services.http.timeout(),
            config,
            services,
            transport,
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    pub fn services(&self) -> &GatewayServices {
        &self.services
    }

    /// Stored credentials for this platform.
    pub fn credentials(&self) -> GatewayResult<Credentials> {
        self.services
            .vault
            .get_credentials(self.platform)?
            .ok_or(GatewayError::MissingCredentials(self.platform))
    }

    /// Validate an outbound target against this platform's allow-list.
    pub fn validate_target(&self, raw: &str) -> GatewayResult<Url> {
        self.services
            .guard
            .validate_url(raw, Some(&self.allow_list))
            .map_err(|e| {
                let host = Url::parse(raw)
                    .ok()
                    .and_then(|u| u.host_str().map(str::to_string))
                    .unwrap_or_default();
                tracing::warn!(platform = %self.platform, host = %host, "Outbound target rejected");
                self.services.monitor.monitor_suspicious_activity(
                    self.platform,
                    SecurityEventKind::Suspicious,
                    &json!({"reason": "ssrf_blocked", "host": host}),
                );
                e
            })
    }

    /// Join a path onto the active base URL and validate the result.
    pub fn endpoint(&self, path: &str) -> GatewayResult<Url> {
        let base = self.config.active_base_url().trim_end_matches('/');
        self.validate_target(&format!("{base}{path}"))
    }

    /// Send a request through the full pipeline.
    pub async fn send(&self, request: OutboundRequest) -> GatewayResult<OutboundResponse> {
        let request = OutboundRequest {
            url: self.validate_target(request.url.as_str())?,
            ..request
        };
        let method = request.method.to_string();
        let endpoint = request.url.path().to_string();

        let status = self.services.monitor.monitor_suspicious_activity(
            self.platform,
            SecurityEventKind::Request,
            &json!({"method": method, "endpoint": endpoint}),
        );
        if self.services.monitor.enforces_rate_limits() && status.over_request_limit() {
            return Err(GatewayError::RateLimitExceeded {
                platform: self.platform,
                retry_after: status.retry_after,
            });
        }

        let service = self.platform.as_str();
        let started = Instant::now();
        let result = self
            .services
            .circuits
            .execute(service, || {
                retry(&self.services.retry, service, |_| {
                    let attempt = request.clone();
                    async move {
                        let response =
                            with_timeout(self.timeout, self.transport.send(attempt)).await?;
                        self.check_status(response)
                    }
                })
            })
            .await;
        let elapsed = started.elapsed();

        let status_code = match &result {
            Ok(response) => Some(response.status),
            Err(GatewayError::Api { status, .. }) => Some(*status),
            Err(GatewayError::Authentication { .. }) => Some(401),
            Err(GatewayError::RateLimitExceeded { .. }) => Some(429),
            Err(_) => None,
        };
        self.services.monitor.log_api_interaction(
            self.platform,
            &ApiInteraction {
                method,
                endpoint,
                status_code,
                duration_ms: duration_ms(elapsed),
                details: json!({
                    "outcome": result.as_ref().map_or_else(|e| e.reason_code(), |_| "ok"),
                }),
            },
        );
        metrics::record_outbound_request(
            service,
            result.as_ref().map_or_else(|e| e.reason_code(), |_| "ok"),
            elapsed,
        );

        if let Err(GatewayError::Authentication { reason, .. }) = &result {
            self.record_auth_failure(reason);
        }
        result
    }

    fn check_status(&self, response: OutboundResponse) -> GatewayResult<OutboundResponse> {
        match response.status {
            200..=399 => Ok(response),
            401 | 403 => Err(GatewayError::Authentication {
                platform: self.platform,
                reason: format!("HTTP {}", response.status),
            }),
            429 => Err(GatewayError::RateLimitExceeded {
                platform: self.platform,
                retry_after: response
                    .header("retry-after")
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .map(Duration::from_secs),
            }),
            status => Err(GatewayError::Api {
                platform: self.platform,
                status,
                code: if status >= 500 { "server_error" } else { "client_error" }.to_string(),
                message: excerpt(&response.body),
            }),
        }
    }

    /// Decode a JSON body into a typed shape.
    pub fn decode<T: DeserializeOwned>(&self, response: &OutboundResponse) -> GatewayResult<T> {
        response.json().map_err(|e| GatewayError::Decode {
            platform: self.platform,
            message: e.to_string(),
        })
    }

    fn record_auth_failure(&self, reason: &str) {
        self.services.monitor.monitor_suspicious_activity(
            self.platform,
            SecurityEventKind::AuthFailure,
            &json!({"reason": reason}),
        );
    }

    /// Authentication error for in-body auth failures; also recorded as a
    /// security event.
    pub fn auth_error(&self, reason: impl Into<String>) -> GatewayError {
        let reason = reason.into();
        self.record_auth_failure(&reason);
        GatewayError::Authentication {
            platform: self.platform,
            reason,
        }
    }

    /// Application-level error reported inside a successful HTTP response.
    pub fn api_error(&self, code: impl Into<String>, message: impl Into<String>) -> GatewayError {
        GatewayError::Api {
            platform: self.platform,
            status: 200,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn decode_error(&self, message: impl Into<String>) -> GatewayError {
        GatewayError::Decode {
            platform: self.platform,
            message: message.into(),
        }
    }

    /// Decode error for an order field that cannot be normalized.
    pub fn invalid_field(&self, order_id: &str, field: &str, raw: impl fmt::Debug) -> GatewayError {
        tracing::warn!(platform = %self.platform, order_id, field, "Order field could not be normalized");
        self.decode_error(format!("order {order_id}: invalid {field} {raw:?}"))
    }

    /// Decimal amount in minor units, or a decode error naming the field.
    pub fn minor_amount(&self, order_id: &str, field: &str, raw: &str) -> GatewayResult<i64> {
        decimal_to_minor(raw).ok_or_else(|| self.invalid_field(order_id, field, raw))
    }

    /// Unix seconds as UTC, or a decode error naming the field.
    pub fn timestamp(&self, order_id: &str, field: &str, secs: i64) -> GatewayResult<DateTime<Utc>> {
        from_unix(secs).ok_or_else(|| self.invalid_field(order_id, field, secs))
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn duration_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

fn excerpt(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    text.chars().take(ERROR_EXCERPT_LEN).collect()
}
