use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::entity_store::StoreError;
use crate::models::entity::EntityModel;
use crate::models::message::{JobEnvelope, JobPayload};
use crate::models::outcome::JobOutcome;
use crate::services::breaker::CircuitBreaker;
use crate::services::cache::{CacheError, SharedCache};
use crate::services::providers::{AiUsage, ProviderError};
use crate::services::queue::QueueError;
use crate::services::rate_limit::RateLimiter;

pub mod ai_operation;
pub mod image_gen;
pub mod seo;
pub mod tagging;
pub mod translate;

/// Retry budget shared by all AI-backed jobs.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Service keys used for circuit breaker / rate limiter bookkeeping.
pub const ANTHROPIC_SERVICE: &str = "anthropic";
pub const TRANSLATION_SERVICE: &str = "google";
pub const IMAGE_SERVICE: &str = "openai";

/// Queue group tag for AI-backed operations.
pub const AI_OPERATIONS_GROUP: &str = "ai_operations";

/// Cache prefix invalidated whenever a job succeeds, so rendered content
/// picks up the new data.
const CONTENT_CACHE_PREFIX: &str = "content:";

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Envelope payload does not match job type")]
    PayloadMismatch,

    #[error("Entity not found: {model} {id}")]
    EntityNotFound { model: EntityModel, id: Uuid },

    #[error("No target locales configured")]
    NoLocalesConfigured,

    #[error("No translatable fields with content")]
    NothingToTranslate,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// A unit of background work. Implementations hold their own collaborators
/// and interpret one envelope payload variant.
#[async_trait]
pub trait Job: Send + Sync {
    /// Concrete type name, used as `group_name` in structured logs.
    fn job_type(&self) -> &'static str;

    fn max_attempts(&self) -> u32 {
        DEFAULT_MAX_ATTEMPTS
    }

    async fn run(&self, envelope: &JobEnvelope) -> Result<JobOutcome, JobError>;
}

/// Execution wrapper shared by every job: structured start/finish logging,
/// error capture, metrics, and content-cache invalidation on success. The
/// queue consumer never sees an error escape a job body.
pub struct JobRunner {
    cache: Arc<dyn SharedCache>,
}

impl JobRunner {
    pub fn new(cache: Arc<dyn SharedCache>) -> Self {
        Self { cache }
    }

    pub async fn execute(&self, job: &dyn Job, envelope: &JobEnvelope) -> JobOutcome {
        let job_type = job.job_type();
        let started = Instant::now();
        tracing::info!(
            group_name = job_type,
            job_id = %envelope.id,
            attempt = envelope.attempt,
            "Job started"
        );

        let outcome = match job.run(envelope).await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::error!(
                    group_name = job_type,
                    job_id = %envelope.id,
                    attempt = envelope.attempt,
                    error = %error,
                    "Job failed"
                );
                JobOutcome::Rejected
            }
        };

        match &outcome {
            JobOutcome::Acknowledged => {
                if let Err(error) = self.cache.clear_prefix(CONTENT_CACHE_PREFIX).await {
                    tracing::warn!(group_name = job_type, error = %error, "Cache invalidation failed");
                }
                tracing::info!(
                    group_name = job_type,
                    job_id = %envelope.id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Job completed"
                );
                metrics::counter!("jobs_processed_total", "job_type" => job_type).increment(1);
            }
            JobOutcome::Rejected => {
                metrics::counter!("jobs_rejected_total", "job_type" => job_type).increment(1);
            }
            JobOutcome::Requeued {
                delay_seconds,
                reason,
            } => {
                tracing::info!(
                    group_name = job_type,
                    job_id = %envelope.id,
                    attempt = envelope.attempt,
                    delay_seconds,
                    reason,
                    "Job will be retried"
                );
                metrics::counter!("jobs_requeued_total", "job_type" => job_type).increment(1);
            }
        }
        metrics::histogram!("job_duration_seconds", "job_type" => job_type)
            .record(started.elapsed().as_secs_f64());

        outcome
    }
}

/// Preflight verdict for an AI provider call.
#[derive(Debug, PartialEq)]
pub enum GatePass {
    Proceed,
    CircuitOpen,
    RateLimited(Vec<String>),
}

/// Circuit breaker + rate limiter checks performed before every external
/// AI call, and the matching success/failure bookkeeping afterwards.
#[derive(Clone)]
pub struct AiGate {
    breaker: CircuitBreaker,
    limiter: RateLimiter,
}

impl AiGate {
    pub fn new(breaker: CircuitBreaker, limiter: RateLimiter) -> Self {
        Self { breaker, limiter }
    }

    /// Check the breaker, then the budgets. A `Proceed` verdict already
    /// consumed one request from the hourly budget.
    pub async fn preflight(&self, service: &str) -> Result<GatePass, JobError> {
        if self.breaker.is_open(service).await? {
            metrics::counter!("ai_circuit_open_skips_total", "service" => service.to_string())
                .increment(1);
            return Ok(GatePass::CircuitOpen);
        }
        let decision = self.limiter.check_limits(service).await?;
        if !decision.allowed {
            metrics::counter!("ai_rate_limited_total", "service" => service.to_string())
                .increment(1);
            return Ok(GatePass::RateLimited(decision.reasons));
        }
        self.limiter.record_request(service).await?;
        Ok(GatePass::Proceed)
    }

    /// Reset the breaker and account cost/token usage for a successful
    /// call. Bookkeeping failures are logged and swallowed: a paid
    /// provider result must never be discarded over a cache write.
    pub async fn record_success(&self, service: &str, usage: &AiUsage) {
        if let Err(error) = self.breaker.reset(service).await {
            tracing::warn!(service, error = %error, "Failed to reset circuit breaker");
        }
        if let Some(cost) = usage.cost_usd {
            if let Err(error) = self.limiter.record_cost(service, cost).await {
                tracing::warn!(service, error = %error, "Failed to record AI spend");
            }
            metrics::counter!("ai_cost_usd_total", "service" => service.to_string())
                .increment((cost * 1_000_000.0) as u64);
        }
        if let Some(tokens) = usage.tokens_used {
            metrics::counter!("ai_tokens_total", "service" => service.to_string())
                .increment(tokens);
        }
    }

    /// Count a provider failure toward the breaker. Best-effort for the
    /// same reason as [`AiGate::record_success`]: the retry decision still
    /// has to happen when the cache is down.
    pub async fn record_failure(&self, service: &str) {
        if let Err(error) = self.breaker.record_failure(service).await {
            tracing::warn!(service, error = %error, "Failed to record provider failure");
        }
    }
}

/// At-most-once-in-flight key for jobs that declare uniqueness.
pub fn unique_key_for(payload: &JobPayload) -> Option<String> {
    match payload {
        JobPayload::TranslateEntity(p) => Some(format!("translate:{}:{}", p.model, p.id)),
        JobPayload::SeoUpdate(p) => Some(format!("seo_update:{}:{}", p.model, p.id)),
        JobPayload::TagUpdate(p) => Some(format!("tag_update:{}", p.id)),
        JobPayload::ImageGeneration(p) => Some(format!("image_generation:{}:{}", p.model, p.id)),
        JobPayload::AiOperation(_) => None,
    }
}

/// Build the envelope for an enqueue, applying the group tag and the
/// uniqueness key the payload calls for.
pub fn envelope_for(payload: JobPayload) -> JobEnvelope {
    let unique_key = unique_key_for(&payload);
    let is_ai_operation = matches!(payload, JobPayload::AiOperation(_));
    let mut envelope = JobEnvelope::new(payload);
    if is_ai_operation {
        envelope = envelope.with_group(AI_OPERATIONS_GROUP);
    }
    if let Some(key) = unique_key {
        envelope = envelope.with_unique_key(key);
    }
    envelope
}

/// Route one dequeued envelope to its job implementation and run it under
/// the shared runner.
pub async fn dispatch(state: &AppState, envelope: &JobEnvelope) -> JobOutcome {
    match &envelope.payload {
        JobPayload::TranslateEntity(_) => {
            let job = translate::TranslateJob::from_state(state);
            state.runner.execute(&job, envelope).await
        }
        JobPayload::SeoUpdate(_) => {
            let job = seo::SeoUpdateJob::from_state(state);
            state.runner.execute(&job, envelope).await
        }
        JobPayload::TagUpdate(_) => {
            let job = tagging::TagUpdateJob::from_state(state);
            state.runner.execute(&job, envelope).await
        }
        JobPayload::ImageGeneration(_) => {
            let job = image_gen::ImageGenerationJob::from_state(state);
            state.runner.execute(&job, envelope).await
        }
        JobPayload::AiOperation(_) => {
            let job = ai_operation::AiOperationJob::from_state(state);
            state.runner.execute(&job, envelope).await
        }
    }
}
