//! Background health checker for registered instances.
//!
//! Runs on a fixed interval independent of request traffic. Each probe is
//! a lightweight GET with its own short timeout; results feed the
//! per-instance consecutive counters so a single transient error never
//! flips a healthy instance. Probe errors are recorded and the loop moves
//! on; nothing here can take the checker down.

use std::sync::Arc;
use std::time::Duration;

use modelrelay_common::InstanceStatus;

use super::registry::{HealthThresholds, InstanceRegistry};

/// Health checker configuration.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Interval between sweeps over the fleet.
    pub interval: Duration,
    /// Per-probe timeout, distinct from request timeouts.
    pub probe_timeout: Duration,
    /// Path probed on each instance endpoint.
    pub probe_path: String,
    /// Consecutive failures before healthy -> unhealthy.
    pub failure_threshold: u32,
    /// Consecutive successes before unhealthy -> healthy.
    pub success_threshold: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(2),
            probe_path: "/health".to_string(),
            failure_threshold: 3,
            success_threshold: 2,
        }
    }
}

pub struct HealthChecker {
    registry: Arc<InstanceRegistry>,
    http: reqwest::Client,
    config: HealthConfig,
}

impl HealthChecker {
    pub fn new(registry: Arc<InstanceRegistry>, config: HealthConfig) -> Self {
        Self {
            registry,
            http: reqwest::Client::builder()
                .timeout(config.probe_timeout)
                .build()
                .expect("Failed to create HTTP client"),
            config,
        }
    }

    /// Run the probe loop indefinitely.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.config.interval);
        loop {
            ticker.tick().await;
            self.check_all().await;
        }
    }

    /// Probe every registered instance once.
    ///
    /// Handles are copied out of the registry lock first; the probes
    /// themselves never hold it.
    pub async fn check_all(&self) {
        let thresholds = HealthThresholds {
            failure: self.config.failure_threshold,
            success: self.config.success_threshold,
        };

        for instance in self.registry.handles().await {
            // Deregistered endpoints are gone; skip rather than spam them.
            if instance.status() == InstanceStatus::Offline {
                continue;
            }
            let ok = self.probe(&instance.endpoint).await;
            if let Some(new_status) = self.registry.record_probe(&instance.id, ok, thresholds).await
            {
                tracing::info!(
                    instance = %instance.id,
                    status = ?new_status,
                    "instance status changed"
                );
            }
        }
    }

    async fn probe(&self, endpoint: &str) -> bool {
        let url = format!("{}{}", endpoint, self.config.probe_path);
        match self.http.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "health probe failed");
                false
            }
        }
    }
}
