//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};
use crate::platform::Platform;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: {value:?}")]
    Env { var: String, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration from an optional TOML file, apply environment
/// overrides and validate the result.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    load_config_with(path, |name| std::env::var(name).ok())
}

/// Same as [`load_config`] with an injectable environment lookup.
pub fn load_config_with<F>(path: Option<&Path>, env: F) -> Result<GatewayConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str::<GatewayConfig>(&content)?
        }
        None => GatewayConfig::default(),
    };
    config.platforms.fill_platform_defaults();

    apply_env_overrides(&mut config, env)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply `GATEWAY_*` environment overrides on top of file values.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, env: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let ov = Overrides { env: &env };

    ov.parse("GATEWAY_HTTP_TIMEOUT_SECS", &mut config.http.timeout_secs)?;
    ov.parse("GATEWAY_HTTP_CONNECT_TIMEOUT_SECS", &mut config.http.connect_timeout_secs)?;
    ov.parse("GATEWAY_HTTP_MAX_REDIRECTS", &mut config.http.max_redirects)?;
    ov.flag("GATEWAY_HTTP_VERIFY_SSL", &mut config.http.verify_ssl)?;

    ov.parse("GATEWAY_RETRY_MAX_ATTEMPTS", &mut config.retries.max_attempts)?;
    ov.parse("GATEWAY_RETRY_BASE_DELAY_MS", &mut config.retries.base_delay_ms)?;
    ov.parse("GATEWAY_RETRY_MAX_DELAY_MS", &mut config.retries.max_delay_ms)?;

    ov.parse("GATEWAY_CB_FAILURE_THRESHOLD", &mut config.circuit_breaker.failure_threshold)?;
    ov.parse(
        "GATEWAY_CB_RECOVERY_TIMEOUT_SECS",
        &mut config.circuit_breaker.recovery_timeout_secs,
    )?;
    ov.parse("GATEWAY_CB_HALF_OPEN_MAX_CALLS", &mut config.circuit_breaker.half_open_max_calls)?;

    ov.parse(
        "GATEWAY_CREDENTIAL_ROTATION_DAYS",
        &mut config.credentials.rotation_interval_days,
    )?;
    if let Some(path) = env("GATEWAY_CREDENTIAL_STORE_PATH") {
        config.credentials.store_path = Some(path);
    }

    ov.flag("GATEWAY_WEBHOOK_VERIFY_SIGNATURES", &mut config.webhooks.verify_signatures)?;
    ov.flag(
        "GATEWAY_MONITOR_ENFORCE_RATE_LIMITS",
        &mut config.monitoring.enforce_rate_limits,
    )?;

    ov.flag("GATEWAY_ADMIN_ENABLED", &mut config.admin.enabled)?;
    ov.string("GATEWAY_ADMIN_API_KEY", &mut config.admin.api_key);
    ov.string("GATEWAY_ADMIN_BIND_ADDRESS", &mut config.admin.bind_address);

    ov.string("GATEWAY_LOG_LEVEL", &mut config.observability.log_level);
    ov.flag("GATEWAY_LOG_JSON", &mut config.observability.json_logs)?;
    ov.flag("GATEWAY_METRICS_ENABLED", &mut config.observability.metrics_enabled)?;

    ov.flag("GATEWAY_SYNC_ENABLED", &mut config.sync.enabled)?;
    ov.parse("GATEWAY_SYNC_INTERVAL_SECS", &mut config.sync.interval_secs)?;

    for platform in Platform::ALL {
        let prefix = platform.env_prefix();
        let pc = config.platforms.get_mut(platform);
        ov.flag(&format!("{prefix}_ENABLED"), &mut pc.enabled)?;
        ov.flag(&format!("{prefix}_SANDBOX"), &mut pc.sandbox)?;
        ov.string(&format!("{prefix}_BASE_URL"), &mut pc.base_url);
        ov.string(&format!("{prefix}_SANDBOX_URL"), &mut pc.sandbox_url);
        ov.parse(
            &format!("{prefix}_REQUESTS_PER_MINUTE"),
            &mut pc.rate_limit.requests_per_minute,
        )?;
        ov.parse(&format!("{prefix}_BURST_LIMIT"), &mut pc.rate_limit.burst_limit)?;
        if let Some(raw) = env(&format!("{prefix}_ALLOWED_DOMAINS")) {
            pc.allowed_domains = raw
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string)
                .collect();
        }
    }

    Ok(())
}

struct Overrides<'a, F> {
    env: &'a F,
}

impl<F> Overrides<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, var: &str, target: &mut String) {
        if let Some(value) = (self.env)(var) {
            *target = value;
        }
    }

    fn parse<T: FromStr>(&self, var: &str, target: &mut T) -> Result<(), ConfigError> {
        if let Some(value) = (self.env)(var) {
            *target = value.trim().parse().map_err(|_| ConfigError::Env {
                var: var.to_string(),
                value: value.clone(),
            })?;
        }
        Ok(())
    }

    fn flag(&self, var: &str, target: &mut bool) -> Result<(), ConfigError> {
        if let Some(value) = (self.env)(var) {
            let normalized = value.trim().to_ascii_lowercase();
            *target = match normalized.as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::Env {
                        var: var.to_string(),
                        value,
                    })
                }
            };
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_env_overrides_replace_defaults() {
        let config = load_config_with(
            None,
            env_from(&[
                ("GATEWAY_HTTP_TIMEOUT_SECS", "12"),
                ("GATEWAY_CB_FAILURE_THRESHOLD", "7"),
                ("GATEWAY_WEBHOOK_VERIFY_SIGNATURES", "false"),
                ("GATEWAY_SHOPEE_REQUESTS_PER_MINUTE", "5"),
                ("GATEWAY_SHOPEE_ALLOWED_DOMAINS", "partner.shopeemobile.com, api.example.com"),
                ("GATEWAY_TIKTOK_SANDBOX", "yes"),
            ]),
        )
        .unwrap();

        assert_eq!(config.http.timeout_secs, 12);
        assert_eq!(config.circuit_breaker.failure_threshold, 7);
        assert!(!config.webhooks.verify_signatures);
        assert_eq!(config.platforms.shopee.rate_limit.requests_per_minute, 5);
        assert_eq!(
            config.platforms.shopee.allowed_domains,
            vec!["partner.shopeemobile.com", "api.example.com"]
        );
        assert!(config.platforms.tiktok.sandbox);
    }

    #[test]
    fn test_invalid_env_value_is_rejected() {
        let err = load_config_with(None, env_from(&[("GATEWAY_HTTP_MAX_REDIRECTS", "many")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { ref var, .. } if var == "GATEWAY_HTTP_MAX_REDIRECTS"));
    }

    #[test]
    fn test_env_override_wins_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.toml");
        fs::write(
            &path,
            "[circuit_breaker]\nfailure_threshold = 9\nrecovery_timeout_secs = 5\n",
        )
        .unwrap();

        let config = load_config_with(
            Some(&path),
            env_from(&[("GATEWAY_CB_RECOVERY_TIMEOUT_SECS", "30")]),
        )
        .unwrap();
        assert_eq!(config.circuit_breaker.failure_threshold, 9);
        assert_eq!(config.circuit_breaker.recovery_timeout_secs, 30);
    }

    #[test]
    fn test_validation_errors_surface() {
        let err = load_config_with(
            None,
            env_from(&[("GATEWAY_CB_FAILURE_THRESHOLD", "0"), ("GATEWAY_HTTP_TIMEOUT_SECS", "0")]),
        )
        .unwrap_err();
        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }
}
