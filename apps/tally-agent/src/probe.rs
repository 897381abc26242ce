//! Periodic health probe that feeds the [`ConnectivityMonitor`].
//!
//! Without a platform online/offline signal, reachability of the sync
//! server is the connectivity signal.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use tally_sync::{ConnectivityMonitor, SyncTransport};

/// Polls `GET /health` and reports the result as the online flag.
pub struct ConnectivityProbe {
    transport: Arc<dyn SyncTransport>,
    connectivity: Arc<ConnectivityMonitor>,
    period: Duration,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Stops a running probe.
#[derive(Clone)]
pub struct ProbeHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl ProbeHandle {
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

impl ConnectivityProbe {
    pub fn new(
        transport: Arc<dyn SyncTransport>,
        connectivity: Arc<ConnectivityMonitor>,
        period: Duration,
    ) -> (Self, ProbeHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let probe = ConnectivityProbe {
            transport,
            connectivity,
            period,
            shutdown_rx,
        };
        (probe, ProbeHandle { shutdown_tx })
    }

    /// One probe. Returns the observed state.
    pub async fn check(&self) -> bool {
        let online = match self.transport.health().await {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Health probe failed");
                false
            }
        };

        if let Some(transition) = self.connectivity.set_online(online) {
            info!(?transition, "Connectivity probe observed a change");
        }
        online
    }

    /// Runs until shutdown. Spawn as a background task.
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.check().await;
                }

                _ = self.shutdown_rx.recv() => {
                    debug!("Connectivity probe stopping");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_sync::testing::MockTransport;

    #[tokio::test]
    async fn test_probe_flips_connectivity() {
        let transport = Arc::new(MockTransport::new());
        let connectivity = Arc::new(ConnectivityMonitor::new(false));
        let (probe, _handle) =
            ConnectivityProbe::new(transport.clone(), connectivity.clone(), Duration::from_secs(60));

        assert!(probe.check().await);
        assert!(connectivity.is_online());

        transport.set_healthy(false);
        assert!(!probe.check().await);
        assert!(!connectivity.is_online());
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_polls_every_period() {
        let transport = Arc::new(MockTransport::new());
        let connectivity = Arc::new(ConnectivityMonitor::new(false));
        let (probe, handle) = ConnectivityProbe::new(
            transport.clone(),
            connectivity.clone(),
            Duration::from_secs(10),
        );

        let task = tokio::spawn(probe.run());
        tokio::time::sleep(Duration::from_secs(25)).await;

        // Ticks at 0s, 10s and 20s.
        assert_eq!(transport.health_checks(), 3);
        assert!(connectivity.is_online());

        handle.shutdown().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_probe_stops_on_shutdown() {
        let transport = Arc::new(MockTransport::new());
        let connectivity = Arc::new(ConnectivityMonitor::new(false));
        let (probe, handle) =
            ConnectivityProbe::new(transport, connectivity, Duration::from_millis(10));

        let task = tokio::spawn(probe.run());
        handle.shutdown().await;
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
