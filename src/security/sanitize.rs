//! Input sanitization and log redaction.
//!
//! # Responsibilities
//! - Strip markup and script injection from credential values
//! - Redact sensitive keys from structured log payloads
//! - Mask secret values for display
//!
//! # Design Decisions
//! - Redaction matches key names case-insensitively by substring
//! - Masks are fixed length so they leak nothing about the secret

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// Replacement for redacted log values.
pub const REDACTED: &str = "[REDACTED]";

/// Fixed-length mask for secret values shown to operators.
pub const MASK: &str = "********";

/// Key fragments that mark a field as sensitive in log payloads.
pub const SENSITIVE_LOG_KEYS: &[&str] = &[
    "password",
    "secret",
    "key",
    "token",
    "access_token",
    "refresh_token",
    "partner_key",
    "app_secret",
];

/// Key fragments that mark a credential value for masking.
pub const SENSITIVE_CREDENTIAL_TERMS: &[&str] = &["password", "secret", "key", "token"];

static SCRIPT_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<\s*(script|style|iframe)\b[^>]*>.*?<\s*/\s*(script|style|iframe)\s*>")
        .expect("valid regex")
});

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));

static DANGLING_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<\s*/?\s*(script|style|iframe|img|svg|object|embed)\b").expect("valid regex")
});

static SCRIPT_SCHEME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(javascript|vbscript)\s*:").expect("valid regex")
});

/// Strip HTML tags, script blocks and script URL schemes from a value.
///
/// Applied repeatedly until the value is stable so nested payloads such as
/// `<scr<script>ipt>` cannot reassemble.
pub fn strip_markup(value: &str) -> String {
    let mut current = value.to_string();
    loop {
        let next: String = {
            let step = SCRIPT_BLOCK.replace_all(&current, "");
            let step = TAG.replace_all(&step, "");
            let step = DANGLING_TAG.replace_all(&step, "");
            let step = SCRIPT_SCHEME.replace_all(&step, "");
            step.chars().filter(|c| !c.is_control()).collect()
        };
        if next == current {
            break;
        }
        current = next;
    }
    current.trim().to_string()
}

/// Whether a key name matches one of the given sensitive fragments.
pub fn is_sensitive_key(key: &str, terms: &[&str]) -> bool {
    let lowered = key.to_ascii_lowercase();
    terms.iter().any(|term| lowered.contains(term))
}

/// Recursively redact sensitive keys from a JSON payload.
pub fn sanitize_log_data(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let v = if is_sensitive_key(k, SENSITIVE_LOG_KEYS) {
                        Value::String(REDACTED.to_string())
                    } else {
                        sanitize_log_data(v)
                    };
                    (k.clone(), v)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_log_data).collect()),
        other => other.clone(),
    }
}

/// Mask credential values whose key names are sensitive.
pub fn mask_credentials(fields: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    fields
        .iter()
        .map(|(k, v)| {
            let shown = if is_sensitive_key(k, SENSITIVE_CREDENTIAL_TERMS) {
                MASK.to_string()
            } else {
                v.clone()
            };
            (k.clone(), shown)
        })
        .collect()
}
