pub mod mock_instance;

use std::time::Duration;

use crate::gateway::{ExecutionConfig, HealthConfig, QueueConfig};

/// Health config tuned for fast tests: short interval, quick probes.
pub fn fast_health_config() -> HealthConfig {
    HealthConfig {
        interval: Duration::from_millis(20),
        probe_timeout: Duration::from_millis(200),
        probe_path: "/health".to_string(),
        failure_threshold: 3,
        success_threshold: 2,
    }
}

/// Queue config tuned for fast tests.
pub fn fast_queue_config() -> QueueConfig {
    QueueConfig {
        max_depth: 16,
        max_residency: Duration::from_secs(5),
        poll_interval: Duration::from_millis(10),
    }
}

/// Execution config tuned for fast tests: tiny backoff, short timeouts.
pub fn fast_execution_config() -> ExecutionConfig {
    ExecutionConfig {
        request_timeout: Duration::from_secs(2),
        max_retries: 2,
        backoff_base: Duration::from_millis(2),
        backoff_cap: Duration::from_millis(10),
    }
}
