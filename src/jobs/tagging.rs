use std::sync::Arc;

use async_trait::async_trait;

use crate::app_state::AppState;
use crate::db::entity_store::EntityStore;
use crate::jobs::seo::apply_seo_content;
use crate::jobs::{AiGate, GatePass, Job, JobError, ANTHROPIC_SERVICE};
use crate::models::entity::EntityModel;
use crate::models::message::{JobEnvelope, JobPayload};
use crate::models::outcome::JobOutcome;
use crate::services::providers::ProviderRegistry;
use crate::services::queue::Queue;
use crate::services::retry::{RetryScheduler, RATE_LIMIT_DELAY_SECS};

/// Generates SEO metadata for a tag. Tags have no body, so the prompt is
/// built from the title and whatever description exists.
pub struct TagUpdateJob {
    store: Arc<dyn EntityStore>,
    providers: Arc<ProviderRegistry>,
    queue: Arc<dyn Queue>,
    gate: AiGate,
}

impl TagUpdateJob {
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
impl Job for TagUpdateJob {
    fn job_type(&self) -> &'static str {
        "tag_update"
    }

    async fn run(&self, envelope: &JobEnvelope) -> Result<JobOutcome, JobError> {
        let JobPayload::TagUpdate(payload) = &envelope.payload else {
            return Err(JobError::PayloadMismatch);
        };

        let mut entity = self
            .store
            .get(EntityModel::Tags, payload.id)
            .await?
            .ok_or(JobError::EntityNotFound {
                model: EntityModel::Tags,
                id: payload.id,
            })?;

        match self.gate.preflight(ANTHROPIC_SERVICE).await? {
            GatePass::Proceed => {}
            GatePass::CircuitOpen => {
                tracing::warn!(
                    group_name = self.job_type(),
                    tag_id = %payload.id,
                    service = ANTHROPIC_SERVICE,
                    "Circuit breaker open, skipping tag SEO generation"
                );
                return Ok(JobOutcome::Rejected);
            }
            GatePass::RateLimited(reasons) => {
                tracing::info!(
                    group_name = self.job_type(),
                    tag_id = %payload.id,
                    reasons = ?reasons,
                    "Rate limited, rescheduling tag SEO generation"
                );
                self.queue
                    .push_successor(&envelope.reschedule(), RATE_LIMIT_DELAY_SECS)
                    .await?;
                return Ok(JobOutcome::Acknowledged);
            }
        }

        let title = entity
            .field_str("title")
            .unwrap_or(&payload.title)
            .to_string();
        let description = entity.field_str("description").unwrap_or("").to_string();

        let provider = self.providers.ai(ANTHROPIC_SERVICE)?;
        match provider.generate_seo(&title, &description).await {
            Ok(result) => {
                self.gate
                    .record_success(ANTHROPIC_SERVICE, &result.usage)
                    .await;
                apply_seo_content(&mut entity, &result.data);
                self.store.save(&entity).await?;
                tracing::info!(
                    group_name = self.job_type(),
                    tag_id = %payload.id,
                    title = %payload.title,
                    "Tag SEO metadata saved"
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::entity_store::MemoryEntityStore;
    use crate::models::entity::ContentEntity;
    use crate::models::message::TagUpdatePayload;
    use crate::services::breaker::CircuitBreaker;
    use crate::services::cache::MemoryCache;
    use crate::services::providers::{
        AiProvider, AiResult, AiUsage, ImageAnalysis, ProviderError, SentimentAnalysis, SeoContent,
    };
    use crate::services::queue::MemoryQueue;
    use crate::services::rate_limit::RateLimiter;
    use serde_json::json;
    use uuid::Uuid;

    struct SeoOnlyAi;

    #[async_trait]
    impl AiProvider for SeoOnlyAi {
        async fn generate_seo(
            &self,
            title: &str,
            _content: &str,
        ) -> Result<AiResult<SeoContent>, ProviderError> {
            Ok(AiResult {
                data: SeoContent {
                    meta_title: format!("{title} | Site"),
                    meta_description: format!("Everything about {title}"),
                    meta_keywords: title.to_lowercase(),
                    facebook_description: String::new(),
                    linkedin_description: String::new(),
                    instagram_description: String::new(),
                    twitter_description: String::new(),
                },
                usage: AiUsage::default(),
            })
        }

        async fn generate_tags(
            &self,
            _content: &str,
        ) -> Result<AiResult<Vec<String>>, ProviderError> {
            Err(ProviderError::Empty("unused".to_string()))
        }

        async fn analyze_image(
            &self,
            _image_url: &str,
        ) -> Result<AiResult<ImageAnalysis>, ProviderError> {
            Err(ProviderError::Empty("unused".to_string()))
        }

        async fn analyze_sentiment(
            &self,
            _text: &str,
        ) -> Result<AiResult<SentimentAnalysis>, ProviderError> {
            Err(ProviderError::Empty("unused".to_string()))
        }

        async fn summarize(&self, _content: &str) -> Result<AiResult<String>, ProviderError> {
            Err(ProviderError::Empty("unused".to_string()))
        }

        async fn translate_text(
            &self,
            _text: &str,
            _target_language: &str,
        ) -> Result<AiResult<String>, ProviderError> {
            Err(ProviderError::Empty("unused".to_string()))
        }
    }

    #[tokio::test]
    async fn generates_seo_for_a_tag() {
        let id = Uuid::new_v4();
        let tag = ContentEntity::new(
            EntityModel::Tags,
            id,
            json!({"title": "Sensors", "description": "Industrial sensors"})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let store = Arc::new(MemoryEntityStore::new().with_entity(tag));
        let cache = Arc::new(MemoryCache::new());
        let mut registry = ProviderRegistry::new();
        registry.register_ai(ANTHROPIC_SERVICE, Arc::new(SeoOnlyAi));

        let job = TagUpdateJob::new(
            store.clone(),
            Arc::new(registry),
            Arc::new(MemoryQueue::new()),
            AiGate::new(
                CircuitBreaker::new(cache.clone()),
                RateLimiter::new(cache, 0, 0.0),
            ),
        );

        let envelope = JobEnvelope::new(JobPayload::TagUpdate(TagUpdatePayload {
            id,
            title: "Sensors".to_string(),
        }));
        let outcome = job.run(&envelope).await.unwrap();
        assert!(outcome.is_acknowledged());

        let saved = store.get(EntityModel::Tags, id).await.unwrap().unwrap();
        assert_eq!(saved.field_str("meta_title"), Some("Sensors | Site"));
        assert_eq!(saved.field_str("meta_keywords"), Some("sensors"));
    }

    #[tokio::test]
    async fn missing_tag_is_an_error() {
        let cache = Arc::new(MemoryCache::new());
        let mut registry = ProviderRegistry::new();
        registry.register_ai(ANTHROPIC_SERVICE, Arc::new(SeoOnlyAi));
        let job = TagUpdateJob::new(
            Arc::new(MemoryEntityStore::new()),
            Arc::new(registry),
            Arc::new(MemoryQueue::new()),
            AiGate::new(
                CircuitBreaker::new(cache.clone()),
                RateLimiter::new(cache, 0, 0.0),
            ),
        );

        let envelope = JobEnvelope::new(JobPayload::TagUpdate(TagUpdatePayload {
            id: Uuid::new_v4(),
            title: "Ghost".to_string(),
        }));
        assert!(matches!(
            job.run(&envelope).await.unwrap_err(),
            JobError::EntityNotFound { .. }
        ));
    }
}
