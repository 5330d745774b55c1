//! Inference gateway core.
//!
//! This module provides:
//! - Instance registry with atomic load/health accounting
//! - Background health checker
//! - Router for least-loaded instance selection
//! - Queue processor with admission control
//! - Execution client with bounded retries
//!
//! The [`Gateway`] facade wires them together and is what the HTTP layer
//! talks to.

mod dispatch;
mod error;
mod health;
mod queue;
mod registry;
mod router;

pub use dispatch::{ExecutionClient, ExecutionConfig, RouteOutcome};
pub use error::{AttemptFailure, GatewayError};
pub use health::{HealthChecker, HealthConfig};
pub use queue::{QueueConfig, QueueProcessor};
pub use registry::{AttemptOutcome, InstanceRegistry};
pub use router::{RouteDecision, Router};

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use modelrelay_common::{
    ChatCompletionRequest, InstanceDescriptor, InstanceSnapshot, InstanceStatus, Priority,
};

use crate::catalog::ModelCatalog;

/// Snapshot of the whole gateway for status/metrics reporting.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayStatus {
    pub instances: Vec<InstanceSnapshot>,
    pub queue_depth: usize,
}

/// The inference gateway.
pub struct Gateway {
    registry: Arc<InstanceRegistry>,
    router: Arc<Router>,
    queue: Arc<QueueProcessor>,
    executor: Arc<ExecutionClient>,
    checker: Arc<HealthChecker>,
    catalog: Arc<dyn ModelCatalog>,
}

impl Gateway {
    pub fn new(
        health: HealthConfig,
        queue: QueueConfig,
        execution: ExecutionConfig,
        catalog: Arc<dyn ModelCatalog>,
    ) -> Arc<Self> {
        let registry = Arc::new(InstanceRegistry::new());
        let router = Arc::new(Router::new(registry.clone()));
        let executor = Arc::new(ExecutionClient::new(
            registry.clone(),
            router.clone(),
            execution,
        ));
        let checker = Arc::new(HealthChecker::new(registry.clone(), health));
        Arc::new(Self {
            registry,
            router,
            queue: Arc::new(QueueProcessor::new(queue)),
            executor,
            checker,
            catalog,
        })
    }

    /// Spawn the health checker and queue drain tasks.
    pub fn start(&self) {
        let checker = self.checker.clone();
        tokio::spawn(async move {
            checker.run().await;
        });

        let queue = self.queue.clone();
        let router = self.router.clone();
        let executor = self.executor.clone();
        let capacity_freed = self.registry.capacity_notifier();
        tokio::spawn(async move {
            queue.run(router, executor, capacity_freed).await;
        });
    }

    /// Register an instance, resolving its endpoint through the model
    /// catalog when the descriptor does not carry one.
    pub async fn register(&self, descriptor: InstanceDescriptor) -> Result<(), GatewayError> {
        let endpoint = match descriptor.endpoint {
            Some(endpoint) => endpoint,
            None => self
                .catalog
                .endpoint_for(&descriptor.model)
                .ok_or_else(|| GatewayError::MissingEndpoint(descriptor.model.clone()))?,
        };
        tracing::info!(
            instance = %descriptor.id,
            model = %descriptor.model,
            endpoint = %endpoint,
            "registering instance"
        );
        self.registry
            .register(descriptor.id, descriptor.model, endpoint, descriptor.max_load)
            .await
    }

    /// Mark an instance offline. In-flight requests complete or fail on
    /// their own.
    pub async fn deregister(&self, id: &str) -> Result<(), GatewayError> {
        tracing::info!(instance = %id, "deregistering instance");
        self.registry.deregister(id).await
    }

    /// Operator wind-down: stop routing to the instance while in-flight
    /// requests complete.
    pub async fn drain(&self, id: &str) -> Result<(), GatewayError> {
        tracing::info!(instance = %id, "draining instance");
        self.registry.set_status(id, InstanceStatus::Draining).await
    }

    /// Route a request to a terminal outcome.
    ///
    /// Dispatches immediately when an instance is eligible; otherwise the
    /// request is queued and this call resolves when the entry reaches a
    /// terminal state. Fails fast with `InstanceUnavailable` when no
    /// registered instance serves the model at all.
    pub async fn route(
        &self,
        model: &str,
        payload: ChatCompletionRequest,
        priority: Priority,
        deadline: Duration,
    ) -> Result<RouteOutcome, GatewayError> {
        if !self.router.serves_model(model).await {
            return Err(GatewayError::InstanceUnavailable(model.to_string()));
        }
        let deadline = Instant::now() + deadline;

        match self.router.acquire(model, &[], 0).await {
            Some(decision) => {
                self.executor
                    .execute(decision, model, &payload, deadline)
                    .await
            }
            None => {
                let rx = self
                    .queue
                    .enqueue(model.to_string(), payload, priority, deadline)
                    .await?;
                rx.await.unwrap_or_else(|_| {
                    Err(GatewayError::Internal(
                        "request dropped before completion".to_string(),
                    ))
                })
            }
        }
    }

    /// Instance snapshots plus queue depth.
    pub async fn status(&self) -> GatewayStatus {
        GatewayStatus {
            instances: self.registry.snapshot().await,
            queue_depth: self.queue.depth().await,
        }
    }

    /// Registry access for tests and advanced wiring.
    pub fn registry(&self) -> &Arc<InstanceRegistry> {
        &self.registry
    }
}
