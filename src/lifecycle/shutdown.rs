//! Shutdown coordination for the gateway.

use std::future::Future;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Coordinator for graceful shutdown.
///
/// Background tasks subscribe to a broadcast channel and exit their loops
/// when it fires.
#[derive(Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Future resolving once shutdown is triggered, for servers that take a
    /// graceful-shutdown signal.
    pub fn notified(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.subscribe();
        async move {
            let _ = rx.recv().await;
        }
    }

    /// Tasks still holding a subscription.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Wait for background tasks, abandoning them after `deadline`.
    pub async fn drain(tasks: Vec<JoinHandle<()>>, deadline: Duration) {
        let total = tasks.len();
        match tokio::time::timeout(deadline, futures_util::future::join_all(tasks)).await {
            Ok(results) => {
                let panicked = results.iter().filter(|r| r.is_err()).count();
                if panicked > 0 {
                    tracing::error!(panicked, "Background tasks ended abnormally");
                }
                tracing::info!(tasks = total, "Background tasks stopped");
            }
            Err(_) => {
                tracing::warn!(
                    tasks = total,
                    deadline_secs = deadline.as_secs(),
                    "Shutdown deadline reached, abandoning remaining tasks"
                );
            }
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
