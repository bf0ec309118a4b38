//! Resilient generation: retry rounds over an ordered model chain.
//!
//! A request walks the plan `(attempt, model)` for `attempt` in
//! `0..max_retries` and each model in the chain, primary first. The first
//! success wins. A non-retryable failure ends the plan at once. Between
//! rounds the orchestrator sleeps `base_delay * 2^attempt` (capped), except
//! after the last round.
//!
//! Every terminal outcome (success, non-retryable failure, exhausted plan)
//! is folded into the shared [`HealthTracker`] exactly once.

use crate::classifier::{ErrorClassifier, FailureClass};
use persona_config::OrchestratorConfig;
use persona_core::error::ProviderError;
use persona_core::message::Message;
use persona_core::provider::{Provider, ProviderRequest, ProviderResponse, TokenReceiver};
use persona_telemetry::{HealthReport, HealthStatus, HealthTracker};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Per-request knobs.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    /// Models to try, in priority order.
    pub model_chain: Vec<String>,
    pub max_tokens: Option<u32>,
    pub temperature: f32,
    /// Number of rounds over the chain. Values below 1 are treated as 1.
    pub max_retries: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self::from(&OrchestratorConfig::default())
    }
}

impl From<&OrchestratorConfig> for GenerationOptions {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            model_chain: config.model_chain.clone(),
            max_tokens: Some(config.max_tokens),
            temperature: config.temperature,
            max_retries: config.max_retries,
        }
    }
}

/// Orchestrator-wide timing.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Bound on each upstream call. Expiry counts as a retryable failure.
    pub call_timeout: Duration,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&OrchestratorConfig::default())
    }
}

impl From<&OrchestratorConfig> for OrchestratorSettings {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            call_timeout: Duration::from_secs(config.timeout_secs),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl OrchestratorSettings {
    /// Delay after round `attempt` (0-based): `base * 2^attempt`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// A successful buffered generation.
#[derive(Debug, Clone)]
pub struct Generation {
    pub response: ProviderResponse,
    /// The chain entry that answered.
    pub model: String,
    /// 1-based round in which the answer arrived.
    pub attempt: u32,
    /// Upstream calls made, including the successful one.
    pub calls: u32,
    pub elapsed: Duration,
}

impl Generation {
    pub fn content(&self) -> &str {
        &self.response.message.content
    }
}

/// A live token stream from the first model that accepted the request.
#[derive(Debug)]
pub struct GenerationStream {
    pub receiver: TokenReceiver,
    pub model: String,
    pub attempt: u32,
    pub calls: u32,
}

/// The plan ended without a result.
#[derive(Debug, Clone, thiserror::Error)]
#[error("generation failed after {calls} call(s) over {attempts} round(s): {error}")]
pub struct GenerationFailure {
    /// The last upstream error seen.
    pub error: ProviderError,
    pub attempts: u32,
    pub calls: u32,
    /// False when the chain stopped on a non-retryable error.
    pub retryable: bool,
}

struct Answered<T> {
    value: T,
    model: String,
    attempt: u32,
    calls: u32,
    elapsed: Duration,
}

pub struct GenerationOrchestrator {
    classifier: ErrorClassifier,
    health: Arc<HealthTracker>,
    settings: OrchestratorSettings,
}

impl GenerationOrchestrator {
    pub fn new(
        classifier: ErrorClassifier,
        health: Arc<HealthTracker>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            classifier,
            health,
            settings,
        }
    }

    /// Build from the `[orchestrator]` config section.
    pub fn from_config(config: &OrchestratorConfig, health: Arc<HealthTracker>) -> Self {
        Self::new(
            ErrorClassifier::from(config),
            health,
            OrchestratorSettings::from(config),
        )
    }

    pub fn health(&self) -> HealthStatus {
        self.health.snapshot()
    }

    pub fn tracker(&self) -> &Arc<HealthTracker> {
        &self.health
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Buffered generation over the retry/fallback plan.
    pub async fn generate(
        &self,
        provider: &dyn Provider,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Generation, GenerationFailure> {
        let answered = self
            .run_chain(options, |model| {
                provider.complete(build_request(model, messages, options, false))
            })
            .await?;

        Ok(Generation {
            response: answered.value,
            model: answered.model,
            attempt: answered.attempt,
            calls: answered.calls,
            elapsed: answered.elapsed,
        })
    }

    /// Streaming generation. Fallback applies only until a stream opens;
    /// errors after that arrive on the receiver and are not retried.
    pub async fn generate_stream(
        &self,
        provider: &dyn Provider,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<GenerationStream, GenerationFailure> {
        let answered = self
            .run_chain(options, |model| {
                provider.stream(build_request(model, messages, options, true))
            })
            .await?;

        Ok(GenerationStream {
            receiver: answered.value,
            model: answered.model,
            attempt: answered.attempt,
            calls: answered.calls,
        })
    }

    /// Active probe: one tiny completion against the primary model.
    pub async fn health_check(
        &self,
        provider: &dyn Provider,
        options: &GenerationOptions,
    ) -> HealthReport {
        let Some(model) = options.model_chain.first().cloned() else {
            return HealthReport::Unhealthy {
                model: String::new(),
                error: "no model configured".into(),
            };
        };

        let request = ProviderRequest {
            model: model.clone(),
            messages: vec![Message::user("ping")],
            temperature: 0.0,
            max_tokens: Some(5),
            stream: false,
        };

        let started = Instant::now();
        let result = tokio::time::timeout(self.settings.call_timeout, provider.complete(request))
            .await
            .unwrap_or_else(|_| Err(self.timeout_error(&model)));

        match result {
            Ok(_) => {
                let elapsed = started.elapsed();
                self.health.record_success(elapsed);
                info!(model = %model, elapsed_ms = elapsed.as_millis() as u64, "Health probe succeeded");
                HealthReport::Healthy {
                    model,
                    response_time_ms: elapsed.as_millis() as u64,
                }
            }
            Err(e) => {
                self.health.record_failure(format!("health check: {e}"));
                warn!(model = %model, error = %e, "Health probe failed");
                HealthReport::Unhealthy {
                    model,
                    error: e.to_string(),
                }
            }
        }
    }

    fn timeout_error(&self, model: &str) -> ProviderError {
        ProviderError::Timeout(format!(
            "model '{model}' did not respond within {}s",
            self.settings.call_timeout.as_secs()
        ))
    }

    /// Walk the `(attempt, model)` plan, calling `call` for each step until
    /// one succeeds or the plan ends.
    async fn run_chain<T, F, Fut>(
        &self,
        options: &GenerationOptions,
        mut call: F,
    ) -> Result<Answered<T>, GenerationFailure>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let chain = &options.model_chain;
        if chain.is_empty() {
            return Err(GenerationFailure {
                error: ProviderError::NotConfigured("model chain is empty".into()),
                attempts: 0,
                calls: 0,
                retryable: false,
            });
        }

        let rounds = options.max_retries.max(1);
        let started = Instant::now();
        let mut calls = 0u32;
        let mut last_error = None;

        for attempt in 0..rounds {
            for model in chain {
                calls += 1;
                debug!(model = %model, attempt = attempt + 1, rounds, "Trying model");

                let result = tokio::time::timeout(self.settings.call_timeout, call(model.clone()))
                    .await
                    .unwrap_or_else(|_| Err(self.timeout_error(model)));

                let error = match result {
                    Ok(value) => {
                        let elapsed = started.elapsed();
                        self.health.record_success(elapsed);
                        info!(
                            model = %model,
                            attempt = attempt + 1,
                            calls,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "Generation succeeded"
                        );
                        return Ok(Answered {
                            value,
                            model: model.clone(),
                            attempt: attempt + 1,
                            calls,
                            elapsed,
                        });
                    }
                    Err(error) => error,
                };

                if self.classifier.classify(&error) == FailureClass::NonRetryable {
                    warn!(model = %model, error = %error, kind = error.kind(), "Non-retryable failure, aborting chain");
                    self.health.record_failure(error.to_string());
                    return Err(GenerationFailure {
                        error,
                        attempts: attempt + 1,
                        calls,
                        retryable: false,
                    });
                }

                warn!(model = %model, attempt = attempt + 1, error = %error, "Model failed, falling back");
                last_error = Some(error);
            }

            if attempt + 1 < rounds {
                let delay = self.settings.backoff(attempt);
                debug!(delay_ms = delay.as_millis() as u64, "All models failed this round, backing off");
                tokio::time::sleep(delay).await;
            }
        }

        let error = last_error
            .unwrap_or_else(|| ProviderError::NotConfigured("model chain is empty".into()));
        warn!(calls, rounds, error = %error, "Retry budget exhausted");
        self.health.record_failure(error.to_string());

        Err(GenerationFailure {
            error,
            attempts: rounds,
            calls,
            retryable: true,
        })
    }
}

fn build_request(
    model: String,
    messages: &[Message],
    options: &GenerationOptions,
    stream: bool,
) -> ProviderRequest {
    ProviderRequest {
        model,
        messages: messages.to_vec(),
        temperature: options.temperature,
        max_tokens: options.max_tokens,
        stream,
    }
}
