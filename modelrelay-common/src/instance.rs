//! Instance fleet data model.
//!
//! Descriptors are what operators (or configuration) hand to the gateway
//! when registering a backend instance; snapshots are what the gateway
//! reports back for status and metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Static identity of a backend inference instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceDescriptor {
    /// Stable instance identifier.
    pub id: String,
    /// Model this instance serves (e.g., "llama3:8b").
    pub model: String,
    /// HTTP base URL (e.g., "http://10.0.0.12:8080"). When absent, the
    /// gateway consults its model catalog at registration time.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Maximum concurrent in-flight requests.
    #[serde(default = "default_max_load")]
    pub max_load: u32,
}

fn default_max_load() -> u32 {
    4
}

impl InstanceDescriptor {
    pub fn new(id: impl Into<String>, model: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            endpoint: Some(endpoint.into()),
            max_load: default_max_load(),
        }
    }

    pub fn with_max_load(mut self, max_load: u32) -> Self {
        self.max_load = max_load;
        self
    }
}

/// Live status of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    /// Passing health checks and eligible for routing.
    Healthy,
    /// Failed the consecutive-failure threshold; skipped by the router.
    Unhealthy,
    /// Operator-initiated wind-down; in-flight requests complete.
    Draining,
    /// Deregistered.
    Offline,
}

impl InstanceStatus {
    /// Whether the router may send new requests to this instance.
    pub fn is_routable(&self) -> bool {
        matches!(self, InstanceStatus::Healthy)
    }
}

/// Point-in-time copy of an instance's identity and counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceSnapshot {
    pub id: String,
    pub model: String,
    pub endpoint: String,
    pub status: InstanceStatus,
    pub current_load: u32,
    pub max_load: u32,
    /// Rolling average response time in milliseconds (0 until first sample).
    pub avg_latency_ms: u64,
    pub total_requests: u64,
    pub error_count: u64,
    #[serde(default)]
    pub last_health_check: Option<DateTime<Utc>>,
}

impl InstanceSnapshot {
    pub fn has_capacity(&self) -> bool {
        self.current_load < self.max_load
    }
}

/// Request priority for queue ordering.
///
/// Interactive entries drain before batch entries; within a priority the
/// queue is FIFO.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Batch,
    #[default]
    Interactive,
}

impl Priority {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "interactive" => Some(Self::Interactive),
            "batch" => Some(Self::Batch),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interactive => "interactive",
            Self::Batch => "batch",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_defaults() {
        let json = r#"{"id": "i-1", "model": "llama3:8b"}"#;
        let desc: InstanceDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(desc.max_load, 4);
        assert!(desc.endpoint.is_none());
    }

    #[test]
    fn test_only_healthy_is_routable() {
        assert!(InstanceStatus::Healthy.is_routable());
        assert!(!InstanceStatus::Unhealthy.is_routable());
        assert!(!InstanceStatus::Draining.is_routable());
        assert!(!InstanceStatus::Offline.is_routable());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Interactive > Priority::Batch);
        assert_eq!(Priority::default(), Priority::Interactive);
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!(Priority::parse("interactive"), Some(Priority::Interactive));
        assert_eq!(Priority::parse("BATCH"), Some(Priority::Batch));
        assert_eq!(Priority::parse("urgent"), None);
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&InstanceStatus::Draining).unwrap();
        assert_eq!(json, r#""draining""#);
    }
}
