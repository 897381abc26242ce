//! # Sync Scheduler
//!
//! Decides when push and pull cycles run.
//!
//! ## Triggers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Scheduler Loop (select!)                         │
//! │                                                                         │
//! │   push interval (30s)  ─────────────┐                                   │
//! │   pull interval (120s) ─────────────┤                                   │
//! │   startup delay (2s, once)  ────────┤      online?                      │
//! │   offline → online          ────────┼────► ───────► spawn push / pull   │
//! │   local write (+100ms)      ────────┤       no: drop                    │
//! │   manual kick               ────────┘                                   │
//! │   shutdown                  ──► stop timers, wait for in-flight cycles  │
//! │                                                                         │
//! │   Overlap is handled by the engine's per-direction guards, so a tick   │
//! │   that fires during a running cycle becomes a no-op.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use tally_core::SyncDirection;

use crate::engine::SyncEngine;
use crate::error::SyncError;

/// Capacity of the kick queue. Extra kicks are dropped.
const KICK_QUEUE: usize = 16;

/// Requests sent to a running scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kick {
    /// Push now.
    Push,
    /// Pull now.
    Pull,
    /// A local record changed; push after the local-write delay.
    LocalWrite,
}

// =============================================================================
// Scheduler
// =============================================================================

/// Timer-driven driver for a [`SyncEngine`].
pub struct SyncScheduler {
    engine: Arc<SyncEngine>,
    push_interval: Duration,
    pull_interval: Duration,
    startup_delay: Duration,
    local_write_delay: Duration,
}

impl SyncScheduler {
    /// Uses the cadence from the engine's configuration.
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        let settings = &engine.config().sync;
        SyncScheduler {
            push_interval: settings.push_interval(),
            pull_interval: settings.pull_interval(),
            startup_delay: settings.startup_delay(),
            local_write_delay: settings.local_write_kick(),
            engine,
        }
    }

    pub fn with_intervals(mut self, push: Duration, pull: Duration) -> Self {
        self.push_interval = push;
        self.pull_interval = pull;
        self
    }

    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    pub fn with_local_write_delay(mut self, delay: Duration) -> Self {
        self.local_write_delay = delay;
        self
    }

    /// Spawns the scheduler loop.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(self) -> SchedulerHandle {
        let (kick_tx, kick_rx) = mpsc::channel(KICK_QUEUE);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        self.engine.attach_scheduler(kick_tx.clone());
        let engine = self.engine.clone();

        info!(
            push_secs = self.push_interval.as_secs(),
            pull_secs = self.pull_interval.as_secs(),
            startup_ms = self.startup_delay.as_millis() as u64,
            "Sync scheduler starting"
        );

        let task = tokio::spawn(self.run(kick_rx, shutdown_rx));

        SchedulerHandle {
            engine,
            kick_tx,
            shutdown_tx,
            task,
        }
    }

    async fn run(self, mut kick_rx: mpsc::Receiver<Kick>, mut shutdown_rx: mpsc::Receiver<()>) {
        let now = Instant::now();

        let mut push_timer = interval_at(now + self.push_interval, self.push_interval);
        push_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut pull_timer = interval_at(now + self.pull_interval, self.pull_interval);
        pull_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let startup = sleep(self.startup_delay);
        tokio::pin!(startup);
        let mut startup_pending = true;

        let local_write = sleep(Duration::ZERO);
        tokio::pin!(local_write);
        let mut local_write_armed = false;

        let mut online_rx: watch::Receiver<bool> = self.engine.connectivity().subscribe();
        let mut was_online = *online_rx.borrow_and_update();
        let mut watching = true;

        let mut cycles = JoinSet::new();
        let mut handle_alive = true;

        loop {
            tokio::select! {
                _ = push_timer.tick() => self.spawn_push(&mut cycles, "interval"),

                _ = pull_timer.tick() => self.spawn_pull(&mut cycles, "interval"),

                () = &mut startup, if startup_pending => {
                    startup_pending = false;
                    self.spawn_push(&mut cycles, "startup");
                    self.spawn_pull(&mut cycles, "startup");
                }

                changed = online_rx.changed(), if watching => {
                    if changed.is_err() {
                        watching = false;
                        continue;
                    }
                    let online = *online_rx.borrow_and_update();
                    if online && !was_online {
                        info!("Back online, pushing pending changes");
                        self.spawn_push(&mut cycles, "reconnect");
                    }
                    was_online = online;
                }

                Some(kick) = kick_rx.recv() => match kick {
                    Kick::Push => self.spawn_push(&mut cycles, "kick"),
                    Kick::Pull => self.spawn_pull(&mut cycles, "kick"),
                    Kick::LocalWrite => {
                        local_write.as_mut().reset(Instant::now() + self.local_write_delay);
                        local_write_armed = true;
                    }
                },

                () = &mut local_write, if local_write_armed => {
                    local_write_armed = false;
                    self.spawn_push(&mut cycles, "local_write");
                }

                Some(joined) = cycles.join_next(), if !cycles.is_empty() => {
                    if let Err(e) = joined {
                        error!(?e, "Sync cycle task panicked");
                    }
                }

                signal = shutdown_rx.recv(), if handle_alive => match signal {
                    Some(()) => {
                        info!("Sync scheduler shutting down");
                        break;
                    }
                    None => {
                        handle_alive = false;
                        warn!("Scheduler handle dropped without stop, scheduler keeps running");
                    }
                },
            }
        }

        self.engine.detach_scheduler();

        // In-flight cycles finish as a unit.
        while let Some(joined) = cycles.join_next().await {
            if let Err(e) = joined {
                error!(?e, "Sync cycle task panicked");
            }
        }

        info!("Sync scheduler stopped");
    }

    fn spawn_push(&self, cycles: &mut JoinSet<()>, trigger: &'static str) {
        self.spawn_cycle(cycles, SyncDirection::Push, trigger);
    }

    fn spawn_pull(&self, cycles: &mut JoinSet<()>, trigger: &'static str) {
        self.spawn_cycle(cycles, SyncDirection::Pull, trigger);
    }

    /// Runs one cycle in its own task. A panic inside the cycle is reported
    /// as a [`SyncError::Internal`] failure for that direction.
    fn spawn_cycle(
        &self,
        cycles: &mut JoinSet<()>,
        direction: SyncDirection,
        trigger: &'static str,
    ) {
        if !self.engine.connectivity().is_online() {
            debug!(trigger, %direction, "Offline, cycle not scheduled");
            return;
        }

        let engine = self.engine.clone();
        cycles.spawn(async move {
            let cycle = {
                let engine = engine.clone();
                tokio::spawn(async move {
                    match direction {
                        SyncDirection::Push => engine.push().await,
                        SyncDirection::Pull => engine.pull().await,
                    }
                })
            };

            match cycle.await {
                Ok(Ok(outcome)) => debug!(trigger, %direction, ?outcome, "Cycle finished"),
                Ok(Err(e)) => debug!(trigger, %direction, error = %e, "Cycle failed"),
                Err(e) => {
                    error!(trigger, %direction, ?e, "Sync cycle task panicked");
                    let err = SyncError::Internal(format!("{direction} cycle aborted: {e}"));
                    let _ = engine.finish(direction, Err(err));
                }
            }
        });
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Controls a running scheduler.
///
/// Dropping the handle leaves the scheduler running with no way to stop it.
#[must_use = "the scheduler can only be stopped through its handle"]
pub struct SchedulerHandle {
    engine: Arc<SyncEngine>,
    kick_tx: mpsc::Sender<Kick>,
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Queues a kick. Returns false if the queue is full or the loop is gone.
    pub fn kick(&self, kick: Kick) -> bool {
        self.kick_tx.try_send(kick).is_ok()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Cancels both timers and waits for in-flight cycles to finish.
    pub async fn stop(self) {
        self.engine.detach_scheduler();
        let _ = self.shutdown_tx.send(()).await;

        if let Err(e) = self.task.await {
            error!(?e, "Sync scheduler task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SequentialIds;
    use crate::config::SyncConfig;
    use crate::testing::MockTransport;
    use serde_json::Map;
    use tally_core::{Collection, SyncEventKind};
    use tally_db::{Database, DbConfig};

    const HOUR: Duration = Duration::from_secs(3600);

    async fn engine(transport: Arc<MockTransport>) -> Arc<SyncEngine> {
        let store = Arc::new(Database::new(DbConfig::in_memory()).await.unwrap());
        SyncEngine::builder(SyncConfig::default())
            .with_store(store)
            .with_transport(transport)
            .with_ids(Arc::new(SequentialIds::new("rec")))
            .build()
            .await
            .unwrap()
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_startup_kick_pushes_and_pulls() {
        let transport = Arc::new(MockTransport::new());
        let engine = engine(transport.clone()).await;
        engine
            .create_local(Collection::Customers, Map::new())
            .await
            .unwrap();

        let handle = SyncScheduler::new(engine.clone())
            .with_intervals(HOUR, HOUR)
            .with_startup_delay(Duration::from_millis(10))
            .start();

        wait_until(|| transport.pushes().len() == 1 && transport.pulls().len() == 1).await;
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_reconnect_triggers_push() {
        let transport = Arc::new(MockTransport::new());
        let engine = engine(transport.clone()).await;
        engine.connectivity().set_online(false);
        engine
            .create_local(Collection::Products, Map::new())
            .await
            .unwrap();

        let handle = SyncScheduler::new(engine.clone())
            .with_intervals(HOUR, HOUR)
            .with_startup_delay(Duration::ZERO)
            .start();

        sleep(Duration::from_millis(50)).await;
        assert!(transport.pushes().is_empty());

        engine.connectivity().set_online(true);
        wait_until(|| transport.pushes().len() == 1).await;
        assert!(transport.pulls().is_empty());
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_local_write_kick() {
        let transport = Arc::new(MockTransport::new());
        let engine = engine(transport.clone()).await;

        let handle = SyncScheduler::new(engine.clone())
            .with_intervals(HOUR, HOUR)
            .with_startup_delay(HOUR)
            .with_local_write_delay(Duration::from_millis(10))
            .start();

        engine
            .create_local(Collection::Sessions, Map::new())
            .await
            .unwrap();

        wait_until(|| transport.pushes().len() == 1).await;
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_no_cycles_after_stop() {
        let transport = Arc::new(MockTransport::new());
        let engine = engine(transport.clone()).await;

        let handle = SyncScheduler::new(engine.clone())
            .with_intervals(Duration::from_millis(20), Duration::from_millis(20))
            .with_startup_delay(HOUR)
            .start();

        wait_until(|| transport.pulls().len() >= 2).await;
        handle.stop().await;

        let pulls = transport.pulls().len();
        let probes = transport.health_checks();
        sleep(Duration::from_millis(100)).await;
        assert_eq!(transport.pulls().len(), pulls);
        assert_eq!(transport.health_checks(), probes);
    }

    #[tokio::test]
    async fn test_manual_kick() {
        let transport = Arc::new(MockTransport::new());
        let engine = engine(transport.clone()).await;

        let handle = SyncScheduler::new(engine)
            .with_intervals(HOUR, HOUR)
            .with_startup_delay(HOUR)
            .start();

        assert!(handle.kick(Kick::Pull));
        wait_until(|| transport.pulls().len() == 1).await;
        assert!(handle.is_running());
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_dropped_handle_keeps_scheduling() {
        let transport = Arc::new(MockTransport::new());
        let engine = engine(transport.clone()).await;

        let handle = SyncScheduler::new(engine.clone())
            .with_intervals(HOUR, HOUR)
            .with_startup_delay(HOUR)
            .with_local_write_delay(Duration::from_millis(10))
            .start();
        drop(handle);
        sleep(Duration::from_millis(20)).await;

        engine
            .create_local(Collection::Customers, Map::new())
            .await
            .unwrap();
        wait_until(|| transport.pushes().len() == 1).await;
    }

    #[tokio::test]
    async fn test_panicked_cycle_is_reported_and_recovers() {
        let transport = Arc::new(MockTransport::new());
        let engine = engine(transport.clone()).await;
        engine
            .create_local(Collection::Products, Map::new())
            .await
            .unwrap();
        let mut events = engine.events().subscribe();

        let handle = SyncScheduler::new(engine.clone())
            .with_intervals(HOUR, HOUR)
            .with_startup_delay(HOUR)
            .start();

        transport.crash_next_push();
        assert!(handle.kick(Kick::Push));

        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.kind, SyncEventKind::SyncError);
        assert_eq!(event.direction, SyncDirection::Push);
        assert!(event.error.unwrap().starts_with("Internal error"));
        assert!(!event.retryable);

        // The push guard was released, so the next kick sends the batch.
        assert!(handle.kick(Kick::Push));
        wait_until(|| transport.pushes().len() == 2).await;
        assert!(handle.is_running());
        handle.stop().await;
        assert_eq!(engine.stats().await.unwrap().pending, 0);
    }
}
