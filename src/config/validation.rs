//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, thresholds > 0)
//! - Check platform endpoints are https and covered by their allow-lists
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use url::Url;

use crate::config::schema::GatewayConfig;
use crate::platform::Platform;
use crate::security::ssrf::DomainAllowList;

/// Upper bound accepted for `http.max_redirects`.
pub const MAX_REDIRECT_CAP: usize = 10;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a loaded configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.http.timeout_secs == 0 {
        errors.push(ValidationError::new("http.timeout_secs", "must be greater than 0"));
    }
    if config.http.connect_timeout_secs == 0 {
        errors.push(ValidationError::new("http.connect_timeout_secs", "must be greater than 0"));
    }
    if config.http.max_redirects > MAX_REDIRECT_CAP {
        errors.push(ValidationError::new(
            "http.max_redirects",
            format!("must be at most {MAX_REDIRECT_CAP}"),
        ));
    }

    if config.retries.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be at least 1"));
    }
    if config.retries.max_delay_ms < config.retries.base_delay_ms {
        errors.push(ValidationError::new(
            "retries.max_delay_ms",
            "must not be smaller than base_delay_ms",
        ));
    }

    let cb = &config.circuit_breaker;
    if cb.failure_threshold == 0 {
        errors.push(ValidationError::new(
            "circuit_breaker.failure_threshold",
            "must be greater than 0",
        ));
    }
    if cb.half_open_max_calls == 0 {
        errors.push(ValidationError::new(
            "circuit_breaker.half_open_max_calls",
            "must be greater than 0",
        ));
    }

    if config.credentials.rotation_interval_days == 0 {
        errors.push(ValidationError::new(
            "credentials.rotation_interval_days",
            "must be greater than 0",
        ));
    }

    if config.monitoring.auth_failure_threshold == 0 {
        errors.push(ValidationError::new(
            "monitoring.auth_failure_threshold",
            "must be greater than 0",
        ));
    }
    if config.monitoring.event_retention == 0 {
        errors.push(ValidationError::new("monitoring.event_retention", "must be greater than 0"));
    }

    if config.admin.enabled && config.admin.api_key.trim().len() < 16 {
        errors.push(ValidationError::new(
            "admin.api_key",
            "must be at least 16 characters when the admin API is enabled",
        ));
    }

    if config.sync.enabled && config.sync.interval_secs == 0 {
        errors.push(ValidationError::new("sync.interval_secs", "must be greater than 0"));
    }

    for platform in Platform::ALL {
        validate_platform(config, platform, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_platform(config: &GatewayConfig, platform: Platform, errors: &mut Vec<ValidationError>) {
    let pc = config.platforms.get(platform);
    let field = |name: &str| format!("platforms.{platform}.{name}");

    if pc.rate_limit.requests_per_minute == 0 {
        errors.push(ValidationError::new(
            field("rate_limit.requests_per_minute"),
            "must be greater than 0",
        ));
    }
    if pc.rate_limit.burst_limit == 0 || pc.rate_limit.burst_window_secs == 0 {
        errors.push(ValidationError::new(
            field("rate_limit"),
            "burst_limit and burst_window_secs must be greater than 0",
        ));
    }
    if pc.page_size == 0 {
        errors.push(ValidationError::new(field("page_size"), "must be greater than 0"));
    }

    if !pc.enabled {
        return;
    }

    if pc.allowed_domains.is_empty() {
        errors.push(ValidationError::new(
            field("allowed_domains"),
            "enabled platforms need at least one allowed domain",
        ));
        return;
    }

    // Shopify endpoints come from the shop domain in the credentials.
    if platform == Platform::Shopify {
        return;
    }

    let allow_list = DomainAllowList::new(&pc.allowed_domains);
    for (name, raw) in [("base_url", &pc.base_url), ("sandbox_url", &pc.sandbox_url)] {
        if raw.is_empty() {
            continue;
        }
        match Url::parse(raw) {
            Ok(url) if url.scheme() != "https" => {
                errors.push(ValidationError::new(field(name), "must use https"));
            }
            Ok(url) => {
                let covered = url.host_str().is_some_and(|host| allow_list.matches(host));
                if !covered {
                    errors.push(ValidationError::new(
                        field(name),
                        "host is not covered by allowed_domains",
                    ));
                }
            }
            Err(e) => errors.push(ValidationError::new(field(name), format!("invalid URL: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = GatewayConfig::default();
        config.http.timeout_secs = 0;
        config.circuit_breaker.failure_threshold = 0;
        config.http.max_redirects = 50;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.field == "http.max_redirects"));
    }

    #[test]
    fn test_enabled_platform_requires_https_covered_endpoint() {
        let mut config = GatewayConfig::default();
        config.platforms.shopee.enabled = true;
        config.platforms.shopee.base_url = "http://partner.shopeemobile.com".to_string();
        config.platforms.lazada.enabled = true;
        config.platforms.lazada.base_url = "https://api.lazada.example.org/rest".to_string();

        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.field == "platforms.shopee.base_url" && e.message == "must use https"));
        assert!(errors.iter().any(|e| e.field == "platforms.lazada.base_url"
            && e.message.contains("allowed_domains")));
    }

    #[test]
    fn test_admin_requires_strong_key() {
        let mut config = GatewayConfig::default();
        config.admin.enabled = true;
        config.admin.api_key = "short".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "admin.api_key");
    }
}
