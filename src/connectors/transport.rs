//! Outbound HTTP transport.
//!
//! # Responsibilities
//! - Carry signed requests to platform APIs
//! - Pin DNS resolution through the SSRF address rules
//! - Cap and re-validate redirects
//!
//! # Design Decisions
//! - The transport is a trait so the connector pipeline can be exercised
//!   against scripted responses
//! - Non-2xx statuses are returned, not raised; status mapping belongs to
//!   the pipeline

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::HttpClientConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::security::ssrf::{DomainAllowList, GuardedResolver, SsrfGuard};

/// A fully built outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl OutboundRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post_json(url: Url, body: String) -> Self {
        Self {
            method: Method::POST,
            url,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Some(body),
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Raw response from a platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl OutboundResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Sends outbound requests.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> GatewayResult<OutboundResponse>;
}

/// `reqwest` transport with guarded DNS and redirect policy.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(
        http: &HttpClientConfig,
        guard: &SsrfGuard,
        allow_list: Option<DomainAllowList>,
    ) -> GatewayResult<Self> {
        if !http.verify_ssl {
            tracing::warn!("TLS certificate verification is disabled for outbound calls");
        }
        let client = reqwest::Client::builder()
            .timeout(http.timeout())
            .connect_timeout(http.connect_timeout())
            .redirect(guard.redirect_policy(allow_list))
            .dns_resolver(Arc::new(GuardedResolver))
            .danger_accept_invalid_certs(!http.verify_ssl)
            .user_agent(http.user_agent.clone())
            .build()
            .map_err(|e| GatewayError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            timeout: http.timeout(),
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: OutboundRequest) -> GatewayResult<OutboundResponse> {
        let mut builder = self.client.request(request.method, request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let map_err = |e: reqwest::Error| map_reqwest_error(e, self.timeout);
        let response = builder.send().await.map_err(map_err)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = response.bytes().await.map_err(map_err)?.to_vec();

        Ok(OutboundResponse {
            status,
            headers,
            body,
        })
    }
}

/// Surface SSRF rejections raised inside the resolver or redirect policy
/// as `InvalidTarget`; everything else is transient.
fn map_reqwest_error(error: reqwest::Error, timeout: Duration) -> GatewayError {
    let mut source: Option<&(dyn StdError + 'static)> = error.source();
    while let Some(inner) = source {
        if let Some(GatewayError::InvalidTarget(reason)) = inner.downcast_ref::<GatewayError>() {
            return GatewayError::InvalidTarget(reason.clone());
        }
        source = inner.source();
    }
    if error.is_timeout() {
        return GatewayError::Timeout(timeout);
    }
    GatewayError::Network(error.without_url().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builders() {
        let url = Url::parse("https://api.lazada.com.my/rest/orders/get").unwrap();
        let request = OutboundRequest::get(url).header("X-Custom", "1");
        assert_eq!(request.header_value("x-custom"), Some("1"));
        assert_eq!(request.method, Method::GET);
    }

    #[test]
    fn test_response_helpers() {
        let response = OutboundResponse::new(200, r#"{"code":"0"}"#).with_header("Retry-After", "5");
        assert_eq!(response.header("retry-after"), Some("5"));
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["code"], "0");
    }

    #[test]
    fn test_client_builds_with_defaults() {
        let transport =
            ReqwestTransport::new(&HttpClientConfig::default(), &SsrfGuard::default(), None);
        assert!(transport.is_ok());
    }
}
