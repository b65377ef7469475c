//! Scripted transport and context builders for connector unit tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::GatewayConfig;
use crate::connectors::context::{ConnectorContext, GatewayServices};
use crate::connectors::transport::{HttpTransport, OutboundRequest, OutboundResponse};
use crate::error::{GatewayError, GatewayResult};
use crate::platform::Platform;
use crate::resilience::{Backoff, RetryPolicy};
use crate::security::cipher::CredentialCipher;
use crate::security::vault::CredentialVault;

/// Replays queued responses and records every request.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<OutboundResponse>>,
    requests: Mutex<Vec<OutboundRequest>>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<OutboundResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn json(bodies: &[serde_json::Value]) -> Arc<Self> {
        Self::new(
            bodies
                .iter()
                .map(|b| OutboundResponse::new(200, b.to_string()))
                .collect(),
        )
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: OutboundRequest) -> GatewayResult<OutboundResponse> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| GatewayError::Network("no scripted response".into()))
    }
}

pub fn query(request: &OutboundRequest) -> BTreeMap<String, String> {
    request.url.query_pairs().into_owned().collect()
}

pub fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn services() -> GatewayServices {
    let config = GatewayConfig::default();
    let vault = CredentialVault::in_memory(CredentialCipher::new(&[7u8; 32]).unwrap(), 90);
    let mut services = GatewayServices::new(&config, Arc::new(vault));
    services.retry = RetryPolicy::new(
        2,
        Backoff::new(Duration::from_millis(1), Duration::from_millis(2)),
    );
    services
}

/// Context with the given credentials stored and the transport attached.
pub fn context(
    platform: Platform,
    creds: &[(&str, &str)],
    transport: Arc<ScriptedTransport>,
) -> ConnectorContext {
    let services = services();
    if !creds.is_empty() {
        services.vault.store_credentials(platform, fields(creds)).unwrap();
    }
    let config = GatewayConfig::default().platforms.get(platform).clone();
    ConnectorContext::new(platform, config, services, transport)
}
