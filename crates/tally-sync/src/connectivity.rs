//! # Connectivity Monitor
//!
//! Online/offline state shared by the scheduler and the sync cycles.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  platform signal / health probe ──► set_online(bool)                   │
//! │                                          │                              │
//! │                                          ▼                              │
//! │                              watch::Sender<bool>                        │
//! │                                          │                              │
//! │           ┌──────────────────────────────┼─────────────────────┐        │
//! │           ▼                              ▼                     ▼        │
//! │   scheduler (offline→online       push/pull guards      stats()        │
//! │   ⇒ one immediate push)           (no cycle offline)                   │
//! │                                                                         │
//! │  online→offline only flips the flag; in-flight cycles are not cancelled│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tokio::sync::watch;
use tracing::info;

/// A change in connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    CameOnline,
    WentOffline,
}

/// Observable online flag.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    /// Creates a monitor seeded with the platform's current signal.
    pub fn new(initially_online: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_online);
        ConnectivityMonitor { tx }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Reports the latest connectivity signal.
    ///
    /// ## Returns
    /// The transition, or `None` if the state did not change.
    pub fn set_online(&self, online: bool) -> Option<Transition> {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });

        if !changed {
            return None;
        }

        let transition = if online {
            Transition::CameOnline
        } else {
            Transition::WentOffline
        };
        info!(?transition, "Connectivity changed");
        Some(transition)
    }

    /// A receiver that observes every change.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        let monitor = ConnectivityMonitor::new(false);
        assert!(!monitor.is_online());

        assert_eq!(monitor.set_online(true), Some(Transition::CameOnline));
        assert_eq!(monitor.set_online(true), None);
        assert!(monitor.is_online());

        assert_eq!(monitor.set_online(false), Some(Transition::WentOffline));
        assert!(!monitor.is_online());
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let monitor = ConnectivityMonitor::new(false);
        let mut rx = monitor.subscribe();

        monitor.set_online(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());

        // Repeating the same state does not wake subscribers.
        monitor.set_online(true);
        assert!(!rx.has_changed().unwrap());
    }
}
