//! Instance registry for tracking backend inference instances.
//!
//! The registry exclusively owns instance records. Membership lives behind
//! one `RwLock`ed map, but every mutable field of an instance is an atomic
//! inside a shared handle, so counter updates on one instance never block
//! routing decisions for another. `try_acquire` is the single
//! serialization point that prevents over-booking a slot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Notify, RwLock};

use modelrelay_common::{InstanceSnapshot, InstanceStatus};

use super::error::GatewayError;

/// Outcome of a finished dispatch attempt, reported on `release`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success { latency_ms: u64 },
    Error,
    Timeout,
}

/// Health probe thresholds applied by `record_probe`.
#[derive(Debug, Clone, Copy)]
pub struct HealthThresholds {
    /// Consecutive failures before healthy -> unhealthy.
    pub failure: u32,
    /// Consecutive successes before unhealthy -> healthy.
    pub success: u32,
}

const STATUS_HEALTHY: u8 = 0;
const STATUS_UNHEALTHY: u8 = 1;
const STATUS_DRAINING: u8 = 2;
const STATUS_OFFLINE: u8 = 3;

fn status_to_u8(status: InstanceStatus) -> u8 {
    match status {
        InstanceStatus::Healthy => STATUS_HEALTHY,
        InstanceStatus::Unhealthy => STATUS_UNHEALTHY,
        InstanceStatus::Draining => STATUS_DRAINING,
        InstanceStatus::Offline => STATUS_OFFLINE,
    }
}

fn status_from_u8(raw: u8) -> InstanceStatus {
    match raw {
        STATUS_HEALTHY => InstanceStatus::Healthy,
        STATUS_UNHEALTHY => InstanceStatus::Unhealthy,
        STATUS_DRAINING => InstanceStatus::Draining,
        _ => InstanceStatus::Offline,
    }
}

/// Shared per-instance state. Identity fields are immutable after
/// registration; everything mutable is atomic.
pub(crate) struct InstanceState {
    pub id: String,
    pub model: String,
    pub endpoint: String,
    pub max_load: u32,
    status: AtomicU8,
    current_load: AtomicU32,
    total_requests: AtomicU64,
    error_count: AtomicU64,
    /// EWMA of response latency in milliseconds; 0 until the first sample.
    avg_latency_ms: AtomicU64,
    consecutive_failures: AtomicU32,
    consecutive_successes: AtomicU32,
    /// Unix millis of the most recent probe; 0 before the first.
    last_health_check: AtomicI64,
}

impl InstanceState {
    fn new(id: String, model: String, endpoint: String, max_load: u32) -> Self {
        Self {
            id,
            model,
            endpoint,
            max_load,
            status: AtomicU8::new(STATUS_HEALTHY),
            current_load: AtomicU32::new(0),
            total_requests: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            avg_latency_ms: AtomicU64::new(0),
            consecutive_failures: AtomicU32::new(0),
            consecutive_successes: AtomicU32::new(0),
            last_health_check: AtomicI64::new(0),
        }
    }

    pub fn status(&self) -> InstanceStatus {
        status_from_u8(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, status: InstanceStatus) {
        self.status.store(status_to_u8(status), Ordering::Release);
    }

    pub fn load(&self) -> u32 {
        self.current_load.load(Ordering::Acquire)
    }

    /// Atomically claim a slot. Fails when the instance is not healthy or
    /// already at `max_load`.
    fn try_acquire(&self) -> bool {
        if self.status() != InstanceStatus::Healthy {
            return false;
        }
        self.current_load
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |load| {
                (load < self.max_load).then_some(load + 1)
            })
            .is_ok()
    }

    fn release(&self, outcome: AttemptOutcome) {
        if self
            .current_load
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |load| {
                load.checked_sub(1)
            })
            .is_err()
        {
            tracing::warn!(instance = %self.id, "release without matching acquire");
        }
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        match outcome {
            AttemptOutcome::Success { latency_ms } => self.record_latency(latency_ms),
            AttemptOutcome::Error | AttemptOutcome::Timeout => {
                self.error_count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn record_latency(&self, sample_ms: u64) {
        // EWMA with alpha 1/8; the first sample seeds the average.
        let _ = self
            .avg_latency_ms
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |prev| {
                Some(if prev == 0 {
                    sample_ms
                } else {
                    (prev * 7 + sample_ms) / 8
                })
            });
    }

    /// Apply one probe result. Returns the new status when it flipped.
    ///
    /// Only the healthy/unhealthy pair is ever changed here; draining and
    /// offline are operator-owned states.
    fn record_probe(&self, ok: bool, thresholds: HealthThresholds) -> Option<InstanceStatus> {
        self.last_health_check
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        let status = self.status();
        if ok {
            self.consecutive_failures.store(0, Ordering::Relaxed);
            let successes = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
            if status == InstanceStatus::Unhealthy && successes >= thresholds.success {
                self.set_status(InstanceStatus::Healthy);
                self.consecutive_successes.store(0, Ordering::Relaxed);
                return Some(InstanceStatus::Healthy);
            }
        } else {
            self.consecutive_successes.store(0, Ordering::Relaxed);
            let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
            if status == InstanceStatus::Healthy && failures >= thresholds.failure {
                self.set_status(InstanceStatus::Unhealthy);
                self.consecutive_failures.store(0, Ordering::Relaxed);
                return Some(InstanceStatus::Unhealthy);
            }
        }
        None
    }

    fn snapshot(&self) -> InstanceSnapshot {
        let probed_at = self.last_health_check.load(Ordering::Relaxed);
        InstanceSnapshot {
            id: self.id.clone(),
            model: self.model.clone(),
            endpoint: self.endpoint.clone(),
            status: self.status(),
            current_load: self.load(),
            max_load: self.max_load,
            avg_latency_ms: self.avg_latency_ms.load(Ordering::Relaxed),
            total_requests: self.total_requests.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            last_health_check: (probed_at > 0)
                .then(|| DateTime::<Utc>::from_timestamp_millis(probed_at))
                .flatten(),
        }
    }
}

/// Registry of backend instances.
#[derive(Default)]
pub struct InstanceRegistry {
    instances: RwLock<HashMap<String, Arc<InstanceState>>>,
    /// Signalled whenever a slot frees up or an instance turns healthy,
    /// so the queue processor can redrive without busy-polling.
    capacity_freed: Arc<Notify>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self {
            instances: RwLock::new(HashMap::new()),
            capacity_freed: Arc::new(Notify::new()),
        }
    }

    /// Notifier fired whenever routing capacity may have appeared.
    pub fn capacity_notifier(&self) -> Arc<Notify> {
        self.capacity_freed.clone()
    }

    /// Register a new instance with status healthy and zero load.
    pub async fn register(
        &self,
        id: String,
        model: String,
        endpoint: String,
        max_load: u32,
    ) -> Result<(), GatewayError> {
        let mut instances = self.instances.write().await;
        if instances.contains_key(&id) {
            return Err(GatewayError::DuplicateInstance(id));
        }
        let endpoint = endpoint.trim_end_matches('/').to_string();
        instances.insert(
            id.clone(),
            Arc::new(InstanceState::new(id, model, endpoint, max_load)),
        );
        drop(instances);
        self.capacity_freed.notify_one();
        Ok(())
    }

    /// Mark an instance offline. In-flight executions against it are left
    /// to complete or fail on their own; the record is retained so that
    /// late releases and status reporting still resolve.
    pub async fn deregister(&self, id: &str) -> Result<(), GatewayError> {
        self.set_status(id, InstanceStatus::Offline).await
    }

    /// Set an instance's status directly. Used by the health checker and
    /// by operator drain/deregister actions; never by the request path.
    pub async fn set_status(&self, id: &str, status: InstanceStatus) -> Result<(), GatewayError> {
        let instances = self.instances.read().await;
        let instance = instances
            .get(id)
            .ok_or_else(|| GatewayError::UnknownInstance(id.to_string()))?;
        instance.set_status(status);
        drop(instances);
        if status == InstanceStatus::Healthy {
            self.capacity_freed.notify_one();
        }
        Ok(())
    }

    /// Atomically claim a slot on the instance. Returns false when the
    /// instance is unknown, not healthy, or saturated.
    pub async fn try_acquire(&self, id: &str) -> bool {
        let instances = self.instances.read().await;
        match instances.get(id) {
            Some(instance) => instance.try_acquire(),
            None => false,
        }
    }

    /// Release a previously acquired slot and fold the outcome into the
    /// instance's counters.
    pub async fn release(&self, id: &str, outcome: AttemptOutcome) {
        let instance = {
            let instances = self.instances.read().await;
            instances.get(id).cloned()
        };
        match instance {
            Some(instance) => {
                instance.release(outcome);
                self.capacity_freed.notify_one();
            }
            None => tracing::warn!(instance = %id, "release for unknown instance"),
        }
    }

    /// Apply a probe result through the instance's threshold counters.
    /// Returns the new status when it flipped.
    pub async fn record_probe(
        &self,
        id: &str,
        ok: bool,
        thresholds: HealthThresholds,
    ) -> Option<InstanceStatus> {
        let instance = {
            let instances = self.instances.read().await;
            instances.get(id).cloned()
        }?;
        let flipped = instance.record_probe(ok, thresholds);
        if flipped == Some(InstanceStatus::Healthy) {
            self.capacity_freed.notify_one();
        }
        flipped
    }

    /// Immutable copies of all instances, ordered by id.
    pub async fn snapshot(&self) -> Vec<InstanceSnapshot> {
        let instances = self.instances.read().await;
        let mut snapshots: Vec<_> = instances.values().map(|i| i.snapshot()).collect();
        snapshots.sort_by(|a, b| a.id.cmp(&b.id));
        snapshots
    }

    /// Shared handles for out-of-line probing; copied out of the lock so
    /// a slow probe never holds the map.
    pub(crate) async fn handles(&self) -> Vec<Arc<InstanceState>> {
        self.instances.read().await.values().cloned().collect()
    }

    pub(crate) async fn get(&self, id: &str) -> Option<Arc<InstanceState>> {
        self.instances.read().await.get(id).cloned()
    }
}
