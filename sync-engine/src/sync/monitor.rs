//! Connectivity monitor
//!
//! Probes `GET /api/health` on a fixed interval and feeds the result to the
//! orchestrator, which handles the Offline/Online transitions.

use std::sync::Arc;
use std::time::Duration;

use pos_client::SyncApi;
use tokio_util::sync::CancellationToken;

use crate::sync::SyncOrchestrator;

pub struct ConnectivityMonitor {
    api: Arc<dyn SyncApi>,
    orchestrator: SyncOrchestrator,
    interval: Duration,
}

impl ConnectivityMonitor {
    pub fn new(api: Arc<dyn SyncApi>, orchestrator: SyncOrchestrator, interval: Duration) -> Self {
        Self {
            api,
            orchestrator,
            interval,
        }
    }

    /// One probe; returns whether the server answered
    pub async fn probe(&self) -> bool {
        match self.api.health().await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(error = %e, "Health probe failed");
                false
            }
        }
    }

    async fn check_once(&self) {
        let online = self.probe().await;
        if let Err(e) = self.orchestrator.set_online(online).await {
            tracing::error!(online, error = %e, "Connectivity transition failed");
        }
    }

    /// Run until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(interval_ms = self.interval.as_millis() as u64, "ConnectivityMonitor started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("ConnectivityMonitor shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.check_once().await;
                }
            }
        }

        tracing::info!("ConnectivityMonitor stopped");
    }
}
