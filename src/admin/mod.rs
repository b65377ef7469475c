//! Admin API and webhook intake.
//!
//! # Data Flow
//! ```text
//! GET /admin/*            → bearer auth → read-only views over factory,
//!                           vault, monitor and circuit registry
//! POST /admin/platforms/{platform}/test
//!                         → bearer auth → connector.test_connection()
//! GET|PUT|DELETE /admin/platforms/{platform}/credentials
//!                         → bearer auth → vault (masked read, store or
//!                           rotate, delete)
//! POST /webhooks/{platform}
//!                         → body limit → signature check against the
//!                           platform's stored secret → 202 / 401
//! ```
//!
//! # Design Decisions
//! - Admin routes refuse every request when no API key is configured
//! - Webhook routes authenticate by signature, not by API key
//! - Responses never carry secret credential values

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{middleware, Router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::GatewayConfig;
use crate::connectors::ConnectorFactory;
use crate::lifecycle::Shutdown;
use crate::security::WebhookVerifier;

use self::auth::admin_auth_middleware;
use self::handlers::*;

/// Shared state for admin and webhook handlers.
#[derive(Clone)]
pub struct AdminState {
    pub factory: Arc<ConnectorFactory>,
    pub webhooks: WebhookVerifier,
    pub api_key: Arc<str>,
    pub max_body_bytes: usize,
}

impl AdminState {
    pub fn new(config: &GatewayConfig, factory: Arc<ConnectorFactory>) -> Self {
        Self {
            factory,
            webhooks: WebhookVerifier::new(config.webhooks.verify_signatures),
            api_key: Arc::from(config.admin.api_key.as_str()),
            max_body_bytes: config.webhooks.max_body_bytes,
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    let admin = Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/platforms", get(list_platforms))
        .route("/admin/platforms/{platform}/schema", get(get_platform_schema))
        .route("/admin/platforms/{platform}/metrics", get(get_platform_metrics))
        .route("/admin/platforms/{platform}/test", post(test_platform_connection))
        .route(
            "/admin/platforms/{platform}/credentials",
            get(get_platform_credentials)
                .put(put_platform_credentials)
                .delete(delete_platform_credentials),
        )
        .route("/admin/circuits", get(get_circuits))
        .route("/admin/credentials/rotation", get(get_rotation_status))
        .route("/admin/security/report", get(get_security_report))
        .route("/admin/statistics", get(get_statistics))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware));

    let webhooks = Router::new()
        .route("/webhooks/{platform}", post(receive_webhook))
        .layer(DefaultBodyLimit::max(state.max_body_bytes));

    admin
        .merge(webhooks)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until shutdown is triggered.
pub async fn serve(listener: TcpListener, state: AdminState, shutdown: Shutdown) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Admin API listening");
    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(shutdown.notified())
        .await
}
