//! In-memory [`SyncTransport`] for tests and offline demos.
//!
//! Replies are scripted per endpoint and consumed in order. An empty script
//! answers with an empty success. Every request is recorded.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::{watch, Notify};

use crate::error::{SyncError, SyncResult};
use crate::protocol::{BatchAck, BatchRequest, PullData, PullQuery};
use crate::transport::SyncTransport;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Scripted transport.
pub struct MockTransport {
    healthy: AtomicBool,
    push_replies: Mutex<VecDeque<SyncResult<BatchAck>>>,
    pull_replies: Mutex<VecDeque<SyncResult<PullData>>>,
    pushes: Mutex<Vec<BatchRequest>>,
    pulls: Mutex<Vec<PullQuery>>,
    health_checks: AtomicUsize,
    crash_next_push: AtomicBool,
    gate: watch::Sender<bool>,
    entered: Notify,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        let (gate, _rx) = watch::channel(false);
        MockTransport {
            healthy: AtomicBool::new(true),
            push_replies: Mutex::new(VecDeque::new()),
            pull_replies: Mutex::new(VecDeque::new()),
            pushes: Mutex::new(Vec::new()),
            pulls: Mutex::new(Vec::new()),
            health_checks: AtomicUsize::new(0),
            crash_next_push: AtomicBool::new(false),
            gate,
            entered: Notify::new(),
        }
    }

    /// Makes `health()` succeed or fail.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn push_reply(&self, reply: SyncResult<BatchAck>) {
        lock(&self.push_replies).push_back(reply);
    }

    /// Queues a successful push acknowledged with `server_timestamp`.
    pub fn ack_push(&self, server_timestamp: i64) {
        self.push_reply(Ok(BatchAck {
            server_timestamp: Some(server_timestamp),
            ..BatchAck::default()
        }));
    }

    /// Makes the next push call panic inside the transport.
    pub fn crash_next_push(&self) {
        self.crash_next_push.store(true, Ordering::SeqCst);
    }

    pub fn pull_reply(&self, reply: SyncResult<PullData>) {
        lock(&self.pull_replies).push_back(reply);
    }

    /// Queues a successful pull.
    pub fn serve_pull(&self, data: PullData) {
        self.pull_reply(Ok(data));
    }

    /// Blocks push and pull calls inside the transport until [`release`](Self::release).
    pub fn hold(&self) {
        self.gate.send_replace(true);
    }

    pub fn release(&self) {
        self.gate.send_replace(false);
    }

    /// Resolves once a push or pull call has entered the transport.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Recorded push requests, oldest first.
    pub fn pushes(&self) -> Vec<BatchRequest> {
        lock(&self.pushes).clone()
    }

    /// Recorded pull queries, oldest first.
    pub fn pulls(&self) -> Vec<PullQuery> {
        lock(&self.pulls).clone()
    }

    pub fn health_checks(&self) -> usize {
        self.health_checks.load(Ordering::SeqCst)
    }

    async fn pass_gate(&self) {
        self.entered.notify_one();
        let mut rx = self.gate.subscribe();
        // The sender lives as long as self.
        let _ = rx.wait_for(|held| !*held).await;
    }
}

#[async_trait]
impl SyncTransport for MockTransport {
    async fn health(&self) -> SyncResult<()> {
        self.health_checks.fetch_add(1, Ordering::SeqCst);
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SyncError::Network("mock server unreachable".into()))
        }
    }

    async fn push_batch(&self, request: &BatchRequest) -> SyncResult<BatchAck> {
        lock(&self.pushes).push(request.clone());
        if self.crash_next_push.swap(false, Ordering::SeqCst) {
            panic!("mock transport crashed during push");
        }
        self.pass_gate().await;
        lock(&self.push_replies)
            .pop_front()
            .unwrap_or_else(|| Ok(BatchAck::default()))
    }

    async fn pull(&self, query: &PullQuery) -> SyncResult<PullData> {
        lock(&self.pulls).push(query.clone());
        self.pass_gate().await;
        lock(&self.pull_replies)
            .pop_front()
            .unwrap_or_else(|| Ok(PullData::default()))
    }
}
