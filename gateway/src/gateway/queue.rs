//! Queue processor: absorbs bursts when no instance is eligible.
//!
//! Admission is bounded by a configured max depth (`QueueFull` is the
//! backpressure signal), entries drain in priority-then-FIFO order, and a
//! single drain task owns the pending collection. An entry is removed and
//! handed to the execution client in the same locked step, so the same
//! entry can never dispatch twice.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{oneshot, Mutex, Notify};
use uuid::Uuid;

use modelrelay_common::{ChatCompletionRequest, Priority};

use super::dispatch::{ExecutionClient, RouteOutcome};
use super::error::GatewayError;
use super::router::Router;

/// Configuration for the queue processor.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Admission ceiling; enqueue beyond this is rejected outright.
    pub max_depth: usize,
    /// Residency cap applied on top of the caller deadline, so no entry
    /// can starve regardless of priority.
    pub max_residency: Duration,
    /// Fallback drain interval when no release event arrives.
    pub poll_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_depth: 64,
            max_residency: Duration::from_secs(30),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// A request waiting for instance capacity.
struct PendingEntry {
    id: Uuid,
    model: String,
    payload: ChatCompletionRequest,
    priority: Priority,
    enqueued_at: Instant,
    deadline: Instant,
    /// Channel delivering the terminal result to the caller.
    response_tx: oneshot::Sender<Result<RouteOutcome, GatewayError>>,
}

/// Holds pending requests and redrives them as capacity frees up.
pub struct QueueProcessor {
    config: QueueConfig,
    pending: Mutex<Vec<PendingEntry>>,
    /// Signalled on enqueue so the drain task wakes promptly.
    notify: Notify,
}

impl QueueProcessor {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            pending: Mutex::new(Vec::new()),
            notify: Notify::new(),
        }
    }

    /// Admit a request, or reject it immediately with `QueueFull`.
    ///
    /// Returns a receiver that resolves to the request's terminal result.
    pub async fn enqueue(
        &self,
        model: String,
        payload: ChatCompletionRequest,
        priority: Priority,
        deadline: Instant,
    ) -> Result<oneshot::Receiver<Result<RouteOutcome, GatewayError>>, GatewayError> {
        let rx = {
            let mut pending = self.pending.lock().await;
            if pending.len() >= self.config.max_depth {
                return Err(GatewayError::QueueFull {
                    depth: pending.len(),
                });
            }
            let now = Instant::now();
            let (tx, rx) = oneshot::channel();
            pending.push(PendingEntry {
                id: Uuid::new_v4(),
                model,
                payload,
                priority,
                enqueued_at: now,
                deadline: deadline.min(now + self.config.max_residency),
                response_tx: tx,
            });
            rx
        };
        self.notify.notify_one();
        Ok(rx)
    }

    pub async fn depth(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Drain loop. Wakes on enqueue, on freed instance capacity, or on
    /// the polling interval, and runs until the gateway shuts down.
    pub async fn run(
        &self,
        router: Arc<Router>,
        executor: Arc<ExecutionClient>,
        capacity_freed: Arc<Notify>,
    ) {
        loop {
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = capacity_freed.notified() => {}
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
            self.drain_once(&router, &executor).await;
        }
    }

    /// One drain pass: expire, order, and dispatch what capacity allows.
    pub(crate) async fn drain_once(&self, router: &Router, executor: &Arc<ExecutionClient>) {
        let now = Instant::now();
        let mut pending = self.pending.lock().await;

        // Expired entries are reported before any selection attempt.
        let mut i = 0;
        while i < pending.len() {
            if pending[i].deadline <= now {
                let entry = pending.remove(i);
                tracing::debug!(entry = %entry.id, model = %entry.model, "queued entry expired");
                let _ = entry.response_tx.send(Err(GatewayError::Timeout {
                    elapsed_ms: entry.enqueued_at.elapsed().as_millis() as u64,
                }));
            } else {
                i += 1;
            }
        }

        pending.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.enqueued_at.cmp(&b.enqueued_at))
        });

        let mut i = 0;
        while i < pending.len() {
            // Acquisition is a non-blocking probe; entries whose model has
            // no free instance stay put and later entries still get a try.
            let model = pending[i].model.clone();
            match router.acquire(&model, &[], 0).await {
                Some(decision) => {
                    let entry = pending.remove(i);
                    let executor = executor.clone();
                    tokio::spawn(async move {
                        let result = executor
                            .execute(decision, &entry.model, &entry.payload, entry.deadline)
                            .await;
                        let _ = entry.response_tx.send(result);
                    });
                }
                None => i += 1,
            }
        }
    }
}
