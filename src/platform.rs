//! Supported platforms and their credential schemas.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// E-commerce platform identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Shopee,
    Lazada,
    Shopify,
    Tiktok,
}

impl Platform {
    /// Every supported platform, in display order.
    pub const ALL: [Platform; 4] = [
        Platform::Shopee,
        Platform::Lazada,
        Platform::Shopify,
        Platform::Tiktok,
    ];

    /// Lowercase identifier, also used as the circuit breaker service name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Shopee => "shopee",
            Platform::Lazada => "lazada",
            Platform::Shopify => "shopify",
            Platform::Tiktok => "tiktok",
        }
    }

    /// Human readable name for the admin layer.
    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Shopee => "Shopee",
            Platform::Lazada => "Lazada",
            Platform::Shopify => "Shopify",
            Platform::Tiktok => "TikTok Shop",
        }
    }

    /// Authentication scheme used against the platform API.
    pub fn auth_scheme(&self) -> AuthScheme {
        match self {
            Platform::Shopee | Platform::Lazada => AuthScheme::SignedQuery,
            Platform::Shopify => AuthScheme::AccessTokenHeader,
            Platform::Tiktok => AuthScheme::SignedQueryWithTokenHeader,
        }
    }

    /// Credential fields this platform requires.
    pub fn credential_schema(&self) -> &'static [FieldSpec] {
        match self {
            Platform::Shopee => SHOPEE_FIELDS,
            Platform::Lazada => LAZADA_FIELDS,
            Platform::Shopify => SHOPIFY_FIELDS,
            Platform::Tiktok => TIKTOK_FIELDS,
        }
    }

    /// Prefix for per-platform environment overrides (e.g. `GATEWAY_SHOPEE`).
    pub fn env_prefix(&self) -> String {
        format!("GATEWAY_{}", self.as_str().to_ascii_uppercase())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shopee" => Ok(Platform::Shopee),
            "lazada" => Ok(Platform::Lazada),
            "shopify" => Ok(Platform::Shopify),
            "tiktok" => Ok(Platform::Tiktok),
            other => Err(GatewayError::UnsupportedPlatform(other.to_string())),
        }
    }
}

/// How requests are authenticated against a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    /// HMAC-signed query parameters.
    SignedQuery,
    /// Static access token sent in a header.
    AccessTokenHeader,
    /// Signed query parameters plus an access token header.
    SignedQueryWithTokenHeader,
}

/// Value type of a credential field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Numeric,
    Domain,
}

/// Description of one credential field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub required: bool,
    pub description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    /// Secret fields are masked wherever they are displayed.
    pub secret: bool,
}

impl FieldSpec {
    const fn new(
        name: &'static str,
        field_type: FieldType,
        description: &'static str,
        secret: bool,
    ) -> Self {
        Self {
            name,
            field_type,
            required: true,
            description,
            min_length: None,
            secret,
        }
    }

    const fn with_min_length(mut self, min: usize) -> Self {
        self.min_length = Some(min);
        self
    }
}

/// Minimum accepted length of a Shopee partner key.
pub const SHOPEE_PARTNER_KEY_MIN_LEN: usize = 32;

const SHOPEE_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("partner_id", FieldType::Numeric, "Shopee Open Platform partner ID", false),
    FieldSpec::new("partner_key", FieldType::String, "Partner key used to sign API requests", true)
        .with_min_length(SHOPEE_PARTNER_KEY_MIN_LEN),
    FieldSpec::new("shop_id", FieldType::Numeric, "Authorized shop ID", false),
];

const LAZADA_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("app_key", FieldType::String, "Lazada Open Platform app key", false),
    FieldSpec::new("app_secret", FieldType::String, "App secret used to sign API requests", true),
    FieldSpec::new("access_token", FieldType::String, "Seller access token", true),
];

const SHOPIFY_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("shop_domain", FieldType::Domain, "Shop domain, e.g. my-store.myshopify.com", false),
    FieldSpec::new("access_token", FieldType::String, "Admin API access token", true),
    FieldSpec::new("api_key", FieldType::String, "App API key", true),
    FieldSpec::new("api_secret", FieldType::String, "App API secret, also signs webhooks", true),
];

const TIKTOK_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("app_key", FieldType::String, "TikTok Shop app key", false),
    FieldSpec::new("app_secret", FieldType::String, "App secret used to sign API requests", true),
    FieldSpec::new("access_token", FieldType::String, "Shop access token", true),
    FieldSpec::new("shop_id", FieldType::String, "Authorized shop ID", false),
];
