//! Platform integration gateway.
//!
//! Talks to e-commerce platform APIs (Shopee, Lazada, Shopify, TikTok Shop)
//! on behalf of a back office, behind one security layer.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────┐
//!                     │                  PLATFORM GATEWAY                     │
//!                     │                                                       │
//!   sync ticker ──────┼─▶ SyncScheduler ──┐                                   │
//!                     │                   ▼                                   │
//!   admin / webhooks ─┼─▶ axum router ─▶ ConnectorFactory ─▶ PlatformConnector│
//!                     │                                        │              │
//!                     │                                        ▼              │
//!                     │   ┌───────────── ConnectorContext::send ───────────┐  │
//!                     │   │ vault → SSRF guard → monitor → circuit breaker │  │
//!                     │   │        → retry → timeout → HttpTransport       │──┼──▶ platform API
//!                     │   └────────────────────────────────────────────────┘  │
//!                     │                                                       │
//!                     │   config · logging/audit · metrics · lifecycle        │
//!                     └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use platform_gateway::admin::{self, AdminState};
use platform_gateway::config::load_config;
use platform_gateway::connectors::{ConnectorFactory, GatewayServices};
use platform_gateway::lifecycle::{wait_for_signal, Shutdown};
use platform_gateway::observability::{logging, metrics};
use platform_gateway::security::vault::{FileCredentialStore, InMemoryCredentialStore};
use platform_gateway::security::{CredentialCipher, CredentialStore, CredentialVault};
use platform_gateway::sync::{LoggingOrderSink, SyncScheduler};

const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "platform-gateway")]
#[command(about = "Security layer for e-commerce platform integrations", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    logging::init_logging(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "platform-gateway starting");
    tracing::info!(
        enabled_platforms = ?config.platforms.enabled(),
        sync_enabled = config.sync.enabled,
        admin_enabled = config.admin.enabled,
        timeout_secs = config.http.timeout_secs,
        "Configuration loaded"
    );
    if args.check_config {
        tracing::info!("Configuration is valid");
        return Ok(());
    }

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let cipher = CredentialCipher::from_env(&config.credentials.encryption_key_env)?;
    let store: Arc<dyn CredentialStore> = match &config.credentials.store_path {
        Some(path) => Arc::new(FileCredentialStore::open(path)?),
        None => {
            tracing::warn!("No credential store path configured, credentials live in memory only");
            Arc::new(InMemoryCredentialStore::new())
        }
    };
    let vault = Arc::new(CredentialVault::new(
        cipher,
        store,
        config.credentials.rotation_interval_days,
    ));
    for platform in vault.credentials_due_for_rotation()? {
        tracing::warn!(platform = %platform, "Credentials are due for rotation");
    }

    let services = GatewayServices::new(&config, vault);
    let factory = Arc::new(ConnectorFactory::new(config.platforms.clone(), services));

    let shutdown = Shutdown::new();
    let mut tasks = Vec::new();

    if config.sync.enabled {
        let scheduler = SyncScheduler::new(&config.sync, factory.clone(), Arc::new(LoggingOrderSink));
        tasks.push(tokio::spawn(scheduler.run(shutdown.subscribe())));
    }

    if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        let state = AdminState::new(&config, factory.clone());
        let admin_shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = admin::serve(listener, state, admin_shutdown).await {
                tracing::error!(error = %e, "Admin API stopped with error");
            }
        }));
    }

    if tasks.is_empty() {
        tracing::warn!("Neither order sync nor the admin API is enabled, nothing to run");
        return Ok(());
    }

    wait_for_signal().await;
    shutdown.trigger();
    Shutdown::drain(tasks, SHUTDOWN_DEADLINE).await;

    tracing::info!("Shutdown complete");
    Ok(())
}
