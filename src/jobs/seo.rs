use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::app_state::AppState;
use crate::db::entity_store::EntityStore;
use crate::jobs::{AiGate, GatePass, Job, JobError, ANTHROPIC_SERVICE};
use crate::models::entity::ContentEntity;
use crate::models::message::{JobEnvelope, JobPayload};
use crate::models::outcome::JobOutcome;
use crate::services::providers::{ProviderRegistry, SeoContent};
use crate::services::queue::Queue;
use crate::services::retry::{RetryScheduler, RATE_LIMIT_DELAY_SECS};

/// Generates SEO metadata for an entity through the AI provider and saves
/// it back onto the entity's fields.
pub struct SeoUpdateJob {
    store: Arc<dyn EntityStore>,
    providers: Arc<ProviderRegistry>,
    queue: Arc<dyn Queue>,
    gate: AiGate,
}

/// Copy generated SEO values onto the entity, skipping blanks so an
/// absent social description never clobbers an existing one.
pub(crate) fn apply_seo_content(entity: &mut ContentEntity, seo: &SeoContent) {
    let pairs = [
        ("meta_title", &seo.meta_title),
        ("meta_description", &seo.meta_description),
        ("meta_keywords", &seo.meta_keywords),
        ("facebook_description", &seo.facebook_description),
        ("linkedin_description", &seo.linkedin_description),
        ("instagram_description", &seo.instagram_description),
        ("twitter_description", &seo.twitter_description),
    ];
    for (field, value) in pairs {
        if !value.trim().is_empty() {
            entity.set_field(field, Value::String(value.clone()));
        }
    }
}

impl SeoUpdateJob {
    pub fn new(
        store: Arc<dyn EntityStore>,
        providers: Arc<ProviderRegistry>,
        queue: Arc<dyn Queue>,
        gate: AiGate,
    ) -> Self {
        Self {
            store,
            providers,
            queue,
            gate,
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            state.store.clone(),
            state.providers.clone(),
            state.queue.clone(),
            state.gate.clone(),
        )
    }
}

#[async_trait]
impl Job for SeoUpdateJob {
    fn job_type(&self) -> &'static str {
        "seo_update"
    }

    async fn run(&self, envelope: &JobEnvelope) -> Result<JobOutcome, JobError> {
        let JobPayload::SeoUpdate(payload) = &envelope.payload else {
            return Err(JobError::PayloadMismatch);
        };

        let mut entity = self
            .store
            .get(payload.model, payload.id)
            .await?
            .ok_or(JobError::EntityNotFound {
                model: payload.model,
                id: payload.id,
            })?;

        match self.gate.preflight(ANTHROPIC_SERVICE).await? {
            GatePass::Proceed => {}
            GatePass::CircuitOpen => {
                tracing::warn!(
                    group_name = self.job_type(),
                    entity_id = %payload.id,
                    service = ANTHROPIC_SERVICE,
                    "Circuit breaker open, skipping SEO generation"
                );
                return Ok(JobOutcome::Rejected);
            }
            GatePass::RateLimited(reasons) => {
                tracing::info!(
                    group_name = self.job_type(),
                    entity_id = %payload.id,
                    reasons = ?reasons,
                    "Rate limited, rescheduling SEO generation"
                );
                self.queue
                    .push_successor(&envelope.reschedule(), RATE_LIMIT_DELAY_SECS)
                    .await?;
                return Ok(JobOutcome::Acknowledged);
            }
        }

        let title = entity
            .field_str("title")
            .unwrap_or(&payload.display_name)
            .to_string();
        let content = entity
            .field_str("body")
            .or_else(|| entity.field_str("description"))
            .unwrap_or("")
            .to_string();

        let provider = self.providers.ai(ANTHROPIC_SERVICE)?;
        match provider.generate_seo(&title, &content).await {
            Ok(result) => {
                self.gate
                    .record_success(ANTHROPIC_SERVICE, &result.usage)
                    .await;
                apply_seo_content(&mut entity, &result.data);
                self.store.save(&entity).await?;
                tracing::info!(
                    group_name = self.job_type(),
                    model = %payload.model,
                    entity_id = %payload.id,
                    display_name = %payload.display_name,
                    "SEO metadata generated and saved"
                );
                Ok(JobOutcome::Acknowledged)
            }
            Err(error) => {
                self.gate.record_failure(ANTHROPIC_SERVICE).await;
                if let Some(outcome) =
                    RetryScheduler::decide(envelope, self.max_attempts(), &error.to_string())
                {
                    return Ok(outcome);
                }
                Err(error.into())
            }
        }
    }
}
