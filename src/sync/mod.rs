//! Periodic order synchronization.
//!
//! # Responsibilities
//! - Pull orders from every enabled platform on an interval
//! - Track a per-platform high-water mark
//! - Hand normalized orders to an `OrderSink`
//!
//! # Design Decisions
//! - Platforms sync concurrently; one failing platform never blocks another
//! - The cursor advances only after the sink accepted the batch
//! - The next window starts at the previous round's start time, so
//!   consecutive windows overlap rather than leave gaps

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::SyncConfig;
use crate::connectors::{ConnectorFactory, Order, PlatformConnector};
use crate::error::GatewayResult;
use crate::observability::metrics;
use crate::platform::Platform;

/// Destination for synchronized orders.
#[async_trait]
pub trait OrderSink: Send + Sync {
    async fn accept(&self, platform: Platform, orders: &[Order]) -> GatewayResult<()>;
}

/// Sink that only logs what arrived.
#[derive(Debug, Default)]
pub struct LoggingOrderSink;

#[async_trait]
impl OrderSink for LoggingOrderSink {
    async fn accept(&self, platform: Platform, orders: &[Order]) -> GatewayResult<()> {
        for order in orders {
            tracing::debug!(
                platform = %platform,
                order = %order.external_id,
                status = %order.status,
                total_minor = order.total_minor,
                currency = %order.currency,
                "Order synced"
            );
        }
        Ok(())
    }
}

/// Result of syncing one platform.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SyncReport {
    pub platform: Platform,
    pub orders: usize,
    pub skipped: bool,
    pub error: Option<&'static str>,
}

pub struct SyncScheduler {
    factory: Arc<ConnectorFactory>,
    sink: Arc<dyn OrderSink>,
    interval: Duration,
    initial_lookback: chrono::Duration,
    cursors: DashMap<Platform, DateTime<Utc>>,
}

impl SyncScheduler {
    pub fn new(config: &SyncConfig, factory: Arc<ConnectorFactory>, sink: Arc<dyn OrderSink>) -> Self {
        Self {
            factory,
            sink,
            interval: Duration::from_secs(config.interval_secs.max(1)),
            initial_lookback: chrono::Duration::hours(config.initial_lookback_hours.max(0)),
            cursors: DashMap::new(),
        }
    }

    /// Start of the next fetch window for a platform, if it has synced.
    pub fn cursor(&self, platform: Platform) -> Option<DateTime<Utc>> {
        self.cursors.get(&platform).map(|c| *c)
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Order sync starting");
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Order sync received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// One sync round over every enabled platform.
    pub async fn run_once(&self) -> Vec<SyncReport> {
        let connectors = self.factory.enabled_connectors();
        let reports = join_all(connectors.into_iter().map(|c| self.sync_platform(c))).await;
        let failed = reports.iter().filter(|r| r.error.is_some()).count();
        tracing::info!(platforms = reports.len(), failed, "Sync round complete");
        reports
    }

    async fn sync_platform(&self, connector: Arc<dyn PlatformConnector>) -> SyncReport {
        let platform = connector.platform();
        let mut report = SyncReport {
            platform,
            orders: 0,
            skipped: false,
            error: None,
        };
        if !self.factory.services().vault.has_credentials(platform) {
            tracing::debug!(platform = %platform, "No credentials stored, skipping sync");
            report.skipped = true;
            return report;
        }

        let started = Utc::now();
        let since = self.cursor(platform).unwrap_or(started - self.initial_lookback);
        let outcome = match connector.fetch_orders(Some(since)).await {
            Ok(orders) => self.sink.accept(platform, &orders).await.map(|()| orders.len()),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(count) => {
                self.cursors.insert(platform, started);
                metrics::record_orders_synced(platform.as_str(), count);
                tracing::info!(platform = %platform, orders = count, since = %since, "Platform synced");
                report.orders = count;
            }
            Err(e) => {
                tracing::warn!(
                    platform = %platform,
                    reason = e.reason_code(),
                    error = %e.sanitized_message(),
                    "Platform sync failed"
                );
                report.error = Some(e.reason_code());
            }
        }
        report
    }
}
