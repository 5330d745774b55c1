//! Execution client: dispatches a routed request to its instance and owns
//! the retry loop end to end.
//!
//! Every attempt runs under `min(per-attempt timeout, time to deadline)`
//! and releases its slot on every exit path, so a hung backend can never
//! hold capacity past the bound. Failed attempts are recorded, backed off,
//! and re-routed with the attempted instances excluded.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;

use modelrelay_common::{ChatCompletionRequest, ChatCompletionResponse};

use super::error::{AttemptFailure, GatewayError};
use super::registry::{AttemptOutcome, InstanceRegistry};
use super::router::{RouteDecision, Router};

/// Tunables for dispatch and retry.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Upper bound for a single attempt.
    pub request_timeout: Duration,
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Backoff before retry n is `base * 2^n`, capped and jittered.
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_retries: 2,
            backoff_base: Duration::from_millis(100),
            backoff_cap: Duration::from_secs(2),
        }
    }
}

/// Terminal result of a successfully executed request.
#[derive(Debug, Clone)]
pub struct RouteOutcome {
    pub response: ChatCompletionResponse,
    /// Instance that produced the response.
    pub instance_id: String,
    /// Total attempts made, including the successful one.
    pub attempts: u32,
}

pub struct ExecutionClient {
    registry: Arc<InstanceRegistry>,
    router: Arc<Router>,
    http: reqwest::Client,
    config: ExecutionConfig,
}

impl ExecutionClient {
    pub fn new(
        registry: Arc<InstanceRegistry>,
        router: Arc<Router>,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            registry,
            router,
            // Attempt timeouts are enforced per call; the client itself
            // stays unbounded.
            http: reqwest::Client::builder()
                .build()
                .expect("Failed to create HTTP client"),
            config,
        }
    }

    /// Run a request to a terminal state, starting from an already
    /// acquired route decision.
    ///
    /// The caller must have claimed the slot via `Router::acquire`; this
    /// method releases it (and any slots claimed for retries) on every
    /// path.
    pub async fn execute(
        &self,
        first: RouteDecision,
        model: &str,
        payload: &ChatCompletionRequest,
        deadline: Instant,
    ) -> Result<RouteOutcome, GatewayError> {
        let started = Instant::now();
        let mut decision = first;
        let mut attempted: Vec<AttemptFailure> = Vec::new();

        loop {
            match self.dispatch_once(&decision.instance_id, payload, deadline).await {
                Ok(response) => {
                    return Ok(RouteOutcome {
                        response,
                        instance_id: decision.instance_id,
                        attempts: decision.attempt + 1,
                    });
                }
                Err(failure) => {
                    tracing::warn!(
                        instance = %decision.instance_id,
                        attempt = decision.attempt,
                        error = %failure,
                        "dispatch attempt failed"
                    );
                    attempted.push(AttemptFailure {
                        instance_id: decision.instance_id.clone(),
                        reason: failure.to_string(),
                    });

                    if Instant::now() >= deadline {
                        return Err(GatewayError::Timeout {
                            elapsed_ms: started.elapsed().as_millis() as u64,
                        });
                    }
                    if decision.attempt >= self.config.max_retries {
                        return Err(GatewayError::AllAttemptsFailed { attempts: attempted });
                    }

                    self.backoff(decision.attempt, deadline).await;
                    if Instant::now() >= deadline {
                        return Err(GatewayError::Timeout {
                            elapsed_ms: started.elapsed().as_millis() as u64,
                        });
                    }

                    let exclude: Vec<String> = attempted
                        .iter()
                        .map(|a| a.instance_id.clone())
                        .collect();
                    decision = match self
                        .router
                        .acquire(model, &exclude, decision.attempt + 1)
                        .await
                    {
                        Some(next) => next,
                        // No alternate left; the attempts so far are the
                        // whole story.
                        None => return Err(GatewayError::AllAttemptsFailed { attempts: attempted }),
                    };
                }
            }
        }
    }

    /// One dispatch attempt. Releases the instance slot on every path.
    async fn dispatch_once(
        &self,
        instance_id: &str,
        payload: &ChatCompletionRequest,
        deadline: Instant,
    ) -> Result<ChatCompletionResponse, GatewayError> {
        let instance = match self.registry.get(instance_id).await {
            Some(instance) => instance,
            None => {
                return Err(GatewayError::BackendError {
                    instance_id: instance_id.to_string(),
                    reason: "instance record disappeared".to_string(),
                });
            }
        };

        let started = Instant::now();
        let budget = deadline
            .saturating_duration_since(started)
            .min(self.config.request_timeout);
        if budget.is_zero() {
            self.registry.release(instance_id, AttemptOutcome::Timeout).await;
            return Err(GatewayError::BackendError {
                instance_id: instance_id.to_string(),
                reason: "deadline exhausted before dispatch".to_string(),
            });
        }

        let url = format!("{}/v1/chat/completions", instance.endpoint);
        tracing::debug!(instance = %instance_id, url = %url, "dispatching request");

        let result =
            tokio::time::timeout(budget, self.http.post(&url).json(payload).send()).await;

        match result {
            Ok(Ok(response)) if response.status().is_success() => {
                match response.json::<ChatCompletionResponse>().await {
                    Ok(body) => {
                        self.registry
                            .release(
                                instance_id,
                                AttemptOutcome::Success {
                                    latency_ms: started.elapsed().as_millis() as u64,
                                },
                            )
                            .await;
                        Ok(body)
                    }
                    Err(e) => {
                        self.registry.release(instance_id, AttemptOutcome::Error).await;
                        Err(GatewayError::BackendError {
                            instance_id: instance_id.to_string(),
                            reason: format!("invalid response body: {e}"),
                        })
                    }
                }
            }
            Ok(Ok(response)) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                self.registry.release(instance_id, AttemptOutcome::Error).await;
                Err(GatewayError::BackendError {
                    instance_id: instance_id.to_string(),
                    reason: format!("HTTP {status}: {body}"),
                })
            }
            Ok(Err(e)) => {
                self.registry.release(instance_id, AttemptOutcome::Error).await;
                Err(GatewayError::BackendError {
                    instance_id: instance_id.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                self.registry.release(instance_id, AttemptOutcome::Timeout).await;
                Err(GatewayError::BackendError {
                    instance_id: instance_id.to_string(),
                    reason: format!("attempt timed out after {}ms", budget.as_millis()),
                })
            }
        }
    }

    /// Exponential backoff with a cap and +/-25% jitter, never sleeping
    /// past the deadline.
    async fn backoff(&self, attempt: u32, deadline: Instant) {
        let exp = self
            .config
            .backoff_base
            .saturating_mul(1u32 << attempt.min(10));
        let capped = exp.min(self.config.backoff_cap);
        let jittered = capped.mul_f64(rand::thread_rng().gen_range(0.75..=1.25));
        let remaining = deadline.saturating_duration_since(Instant::now());
        tokio::time::sleep(jittered.min(remaining)).await;
    }
}
