use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::admin::AdminState;
use crate::connectors::{FactoryStatistics, PlatformInfo};
use crate::error::GatewayError;
use crate::observability::metrics;
use crate::platform::Platform;
use crate::resilience::CircuitSnapshot;
use crate::security::monitor::{SecurityEvent, SecurityMetrics, SecurityReport};
use crate::security::vault::RotationStatus;
use crate::security::SecurityEventKind;

/// Events included in a platform metrics view.
const RECENT_EVENTS: usize = 20;

/// Error body: reason code plus a sanitized message.
pub struct ApiError(GatewayError);

impl From<GatewayError> for ApiError {
    fn from(error: GatewayError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            GatewayError::UnsupportedPlatform(_) | GatewayError::MissingCredentials(_) => {
                StatusCode::NOT_FOUND
            }
            GatewayError::CredentialValidation(_) | GatewayError::InvalidTarget(_) => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::CircuitOpen { .. } | GatewayError::RateLimitExceeded { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::Crypto(_) | GatewayError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_GATEWAY,
        };
        let body = Json(json!({
            "error": self.0.reason_code(),
            "message": self.0.sanitized_message(),
        }));
        (status, body).into_response()
    }
}

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub enabled_platforms: usize,
    pub open_circuits: usize,
}

#[derive(Serialize)]
pub struct PlatformMetricsView {
    pub metrics: SecurityMetrics,
    pub recent_events: Vec<SecurityEvent>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let stats = state.factory.statistics();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if stats.open_circuits == 0 { "operational" } else { "degraded" },
        enabled_platforms: stats.enabled_platforms,
        open_circuits: stats.open_circuits,
    })
}

pub async fn list_platforms(State(state): State<AdminState>) -> Json<Vec<PlatformInfo>> {
    Json(state.factory.available_platforms())
}

pub async fn get_platform_schema(
    State(state): State<AdminState>,
    Path(platform): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let schema = state.factory.configuration_schema(&platform)?;
    Ok(Json(json!(schema)))
}

pub async fn get_platform_metrics(
    State(state): State<AdminState>,
    Path(platform): Path<String>,
) -> Result<Json<PlatformMetricsView>, ApiError> {
    let platform: Platform = platform.parse()?;
    let monitor = &state.factory.services().monitor;
    Ok(Json(PlatformMetricsView {
        metrics: monitor.get_security_metrics(platform),
        recent_events: monitor.recent_events(platform, RECENT_EVENTS),
    }))
}

pub async fn test_platform_connection(
    State(state): State<AdminState>,
    Path(platform): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let connector = state.factory.create(&platform)?;
    let connected = connector.test_connection().await;
    tracing::info!(platform = %connector.platform(), connected, "Connection test requested");
    Ok(Json(json!({
        "platform": connector.platform(),
        "connected": connected,
    })))
}

/// Credential fields submitted by an operator.
#[derive(Deserialize)]
pub struct CredentialsPayload {
    pub fields: BTreeMap<String, String>,
}

/// Stored credentials with every secret masked.
pub async fn get_platform_credentials(
    State(state): State<AdminState>,
    Path(platform): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let platform: Platform = platform.parse()?;
    let masked = state
        .factory
        .services()
        .vault
        .masked(platform)?
        .ok_or(GatewayError::MissingCredentials(platform))?;
    Ok(Json(json!({ "platform": platform, "fields": masked })))
}

/// Store a credential set, or rotate it when one already exists.
pub async fn put_platform_credentials(
    State(state): State<AdminState>,
    Path(platform): Path<String>,
    Json(payload): Json<CredentialsPayload>,
) -> Result<Json<Value>, ApiError> {
    let platform: Platform = platform.parse()?;
    let vault = &state.factory.services().vault;
    let rotated = vault.has_credentials(platform);
    if rotated {
        vault.rotate_credentials(platform, payload.fields)?;
    } else {
        vault.store_credentials(platform, payload.fields)?;
    }
    tracing::info!(platform = %platform, rotated, "Credentials updated via admin API");
    Ok(Json(json!({ "platform": platform, "stored": true, "rotated": rotated })))
}

pub async fn delete_platform_credentials(
    State(state): State<AdminState>,
    Path(platform): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let platform: Platform = platform.parse()?;
    let deleted = state.factory.services().vault.delete_credentials(platform)?;
    Ok(Json(json!({ "platform": platform, "deleted": deleted })))
}

pub async fn get_circuits(State(state): State<AdminState>) -> Json<Vec<CircuitSnapshot>> {
    Json(state.factory.services().circuits.snapshot())
}

pub async fn get_rotation_status(
    State(state): State<AdminState>,
) -> Result<Json<Vec<RotationStatus>>, ApiError> {
    Ok(Json(state.factory.services().vault.rotation_status()?))
}

pub async fn get_security_report(State(state): State<AdminState>) -> Json<SecurityReport> {
    Json(state.factory.services().monitor.generate_security_report())
}

pub async fn get_statistics(State(state): State<AdminState>) -> Json<FactoryStatistics> {
    Json(state.factory.statistics())
}

/// Verify and acknowledge a platform webhook.
pub async fn receive_webhook(
    State(state): State<AdminState>,
    Path(platform): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let connector = state.factory.create(&platform)?;
    let platform = connector.platform();

    if !state.webhooks.enabled() {
        metrics::record_webhook(platform.as_str(), "unverified");
        return Ok((
            StatusCode::ACCEPTED,
            Json(json!({ "accepted": true, "verified": false })),
        ));
    }

    let secret = state
        .factory
        .services()
        .vault
        .get_credentials(platform)?
        .and_then(|c| c.get(connector.webhook_secret_field()).map(str::to_string));
    let signature = headers
        .get(connector.webhook_signature_header())
        .and_then(|v| v.to_str().ok());

    let verified = match (secret.as_deref(), signature) {
        (Some(secret), Some(signature)) => {
            connector.verify_webhook_signature(&body, signature, secret)
        }
        _ => false,
    };

    if !verified {
        metrics::record_webhook(platform.as_str(), "rejected");
        state.factory.services().monitor.monitor_suspicious_activity(
            platform,
            SecurityEventKind::Suspicious,
            &json!({
                "reason": "webhook_signature_invalid",
                "signature_present": signature.is_some(),
                "bytes": body.len(),
            }),
        );
        tracing::warn!(platform = %platform, bytes = body.len(), "Webhook signature rejected");
        return Ok((StatusCode::UNAUTHORIZED, Json(json!({ "accepted": false }))));
    }

    metrics::record_webhook(platform.as_str(), "accepted");
    tracing::info!(platform = %platform, bytes = body.len(), "Webhook accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "accepted": true, "verified": true })),
    ))
}
