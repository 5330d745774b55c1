//! Router/scheduler: picks the best eligible instance for a model.
//!
//! Selection works off an immutable registry snapshot; acquisition goes
//! back through `InstanceRegistry::try_acquire`, and a lost race simply
//! re-selects with the loser excluded. The router never blocks, queues,
//! or retries.

use std::sync::Arc;

use modelrelay_common::InstanceStatus;

use super::registry::InstanceRegistry;

/// A single dispatch grant: the chosen instance and which attempt this is
/// (0 for the initial dispatch).
#[derive(Debug, Clone)]
pub struct RouteDecision {
    pub instance_id: String,
    pub attempt: u32,
}

pub struct Router {
    registry: Arc<InstanceRegistry>,
}

impl Router {
    pub fn new(registry: Arc<InstanceRegistry>) -> Self {
        Self { registry }
    }

    /// Best candidate for `model`, or None when no instance is eligible.
    ///
    /// Eligible: serves the model, healthy, below max load, not excluded.
    /// Ranked by ascending load, then ascending rolling latency, then id,
    /// so selection is deterministic for tests.
    pub async fn select(&self, model: &str, exclude: &[String]) -> Option<String> {
        let mut candidates: Vec<_> = self
            .registry
            .snapshot()
            .await
            .into_iter()
            .filter(|i| {
                i.model == model
                    && i.status == InstanceStatus::Healthy
                    && i.has_capacity()
                    && !exclude.iter().any(|e| e == &i.id)
            })
            .collect();
        candidates.sort_by(|a, b| {
            a.current_load
                .cmp(&b.current_load)
                .then(a.avg_latency_ms.cmp(&b.avg_latency_ms))
                .then(a.id.cmp(&b.id))
        });
        candidates.into_iter().next().map(|i| i.id)
    }

    /// Select and acquire in one logical step.
    ///
    /// When `try_acquire` loses a race to a concurrent caller the failed
    /// id is excluded and selection re-runs, so callers never see a
    /// spurious failure while eligible capacity remains.
    pub async fn acquire(
        &self,
        model: &str,
        exclude: &[String],
        attempt: u32,
    ) -> Option<RouteDecision> {
        let mut exclude = exclude.to_vec();
        loop {
            let instance_id = self.select(model, &exclude).await?;
            if self.registry.try_acquire(&instance_id).await {
                return Some(RouteDecision {
                    instance_id,
                    attempt,
                });
            }
            exclude.push(instance_id);
        }
    }

    /// Whether any registered instance serves `model`, regardless of
    /// current status or load.
    pub async fn serves_model(&self, model: &str) -> bool {
        self.registry
            .snapshot()
            .await
            .iter()
            .any(|i| i.model == model)
    }
}
