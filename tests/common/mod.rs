//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use platform_gateway::config::GatewayConfig;
use platform_gateway::connectors::{HttpTransport, OutboundRequest, OutboundResponse};
use platform_gateway::security::{CredentialCipher, CredentialVault};
use platform_gateway::{ConnectorFactory, GatewayResult, GatewayServices, Platform};

type Handler = dyn Fn(u32, OutboundRequest) -> Pin<Box<dyn Future<Output = GatewayResult<OutboundResponse>> + Send>>
    + Send
    + Sync;

/// Programmable platform stand-in. The handler receives the 1-based call
/// number and the request.
pub struct MockTransport {
    calls: AtomicU32,
    requests: Mutex<Vec<OutboundRequest>>,
    handler: Box<Handler>,
}

impl MockTransport {
    pub fn new<F, Fut>(f: F) -> Arc<Self>
    where
        F: Fn(u32, OutboundRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = GatewayResult<OutboundResponse>> + Send + 'static,
    {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
            handler: Box::new(move |n, req| Box::pin(f(n, req))),
        })
    }

    /// Same status and body for every call.
    pub fn fixed(status: u16, body: &'static str) -> Arc<Self> {
        Self::new(move |_, _| async move { Ok(OutboundResponse::new(status, body)) })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: OutboundRequest) -> GatewayResult<OutboundResponse> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(request.clone());
        (self.handler)(n, request).await
    }
}

/// Config with fast retries and every platform enabled.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.retries.max_attempts = 3;
    config.retries.base_delay_ms = 1;
    config.retries.max_delay_ms = 5;
    config.circuit_breaker.failure_threshold = 2;
    config.circuit_breaker.recovery_timeout_secs = 60;
    for platform in Platform::ALL {
        config.platforms.get_mut(platform).enabled = true;
    }
    config
}

pub fn factory(config: &GatewayConfig, transport: Arc<MockTransport>) -> Arc<ConnectorFactory> {
    let cipher = CredentialCipher::new(&[42u8; 32]).unwrap();
    let vault = CredentialVault::in_memory(cipher, config.credentials.rotation_interval_days);
    let services = GatewayServices::new(config, Arc::new(vault));
    Arc::new(ConnectorFactory::new(config.platforms.clone(), services).with_transport(transport))
}

pub fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn tiktok_credentials() -> BTreeMap<String, String> {
    fields(&[
        ("app_key", "app-key"),
        ("app_secret", "app-secret"),
        ("access_token", "token-123"),
        ("shop_id", "7001"),
    ])
}

pub fn lazada_credentials() -> BTreeMap<String, String> {
    fields(&[
        ("app_key", "100200"),
        ("app_secret", "lazada-secret"),
        ("access_token", "lazada-token"),
    ])
}

pub fn store(factory: &ConnectorFactory, platform: Platform, creds: BTreeMap<String, String>) {
    factory
        .services()
        .vault
        .store_credentials(platform, creds)
        .unwrap();
}
