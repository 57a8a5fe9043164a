use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::app_state::AppState;
use crate::db::entity_store::EntityStore;
use crate::jobs::{AiGate, GatePass, Job, JobError, IMAGE_SERVICE};
use crate::models::message::{JobEnvelope, JobPayload};
use crate::models::outcome::JobOutcome;
use crate::services::providers::ProviderRegistry;
use crate::services::queue::Queue;
use crate::services::retry::{RetryScheduler, RATE_LIMIT_DELAY_SECS};

/// Generates a hero image for an entity and stores its URL and alt text.
pub struct ImageGenerationJob {
    store: Arc<dyn EntityStore>,
    providers: Arc<ProviderRegistry>,
    queue: Arc<dyn Queue>,
    gate: AiGate,
}

impl ImageGenerationJob {
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
impl Job for ImageGenerationJob {
    fn job_type(&self) -> &'static str {
        "image_generation"
    }

    async fn run(&self, envelope: &JobEnvelope) -> Result<JobOutcome, JobError> {
        let JobPayload::ImageGeneration(payload) = &envelope.payload else {
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

        match self.gate.preflight(IMAGE_SERVICE).await? {
            GatePass::Proceed => {}
            GatePass::CircuitOpen => {
                tracing::warn!(
                    group_name = self.job_type(),
                    entity_id = %payload.id,
                    service = IMAGE_SERVICE,
                    "Circuit breaker open, skipping image generation"
                );
                return Ok(JobOutcome::Rejected);
            }
            GatePass::RateLimited(reasons) => {
                tracing::info!(
                    group_name = self.job_type(),
                    entity_id = %payload.id,
                    reasons = ?reasons,
                    "Rate limited, rescheduling image generation"
                );
                self.queue
                    .push_successor(&envelope.reschedule(), RATE_LIMIT_DELAY_SECS)
                    .await?;
                return Ok(JobOutcome::Acknowledged);
            }
        }

        let prompt = payload
            .prompt_hint
            .clone()
            .unwrap_or_else(|| format!("Illustration for: {}", entity.display_name()));

        let provider = self.providers.images(IMAGE_SERVICE)?;
        match provider.generate_image(&prompt).await {
            Ok(result) => {
                self.gate.record_success(IMAGE_SERVICE, &result.usage).await;
                entity.set_field("image_url", Value::String(result.data.url.clone()));
                entity.set_field("alt_text", Value::String(result.data.alt_text.clone()));
                self.store.save(&entity).await?;
                tracing::info!(
                    group_name = self.job_type(),
                    model = %payload.model,
                    entity_id = %payload.id,
                    image_url = %result.data.url,
                    "Generated image saved"
                );
                Ok(JobOutcome::Acknowledged)
            }
            Err(error) => {
                self.gate.record_failure(IMAGE_SERVICE).await;
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
    use crate::models::entity::{ContentEntity, EntityModel};
    use crate::models::message::ImageGenerationPayload;
    use crate::services::breaker::CircuitBreaker;
    use crate::services::cache::MemoryCache;
    use crate::services::providers::{
        AiResult, AiUsage, GeneratedImage, ImageProvider, ProviderError,
    };
    use crate::services::queue::MemoryQueue;
    use crate::services::rate_limit::RateLimiter;
    use serde_json::json;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct RecordingImages {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ImageProvider for RecordingImages {
        async fn generate_image(
            &self,
            prompt: &str,
        ) -> Result<AiResult<GeneratedImage>, ProviderError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(AiResult {
                data: GeneratedImage {
                    url: "https://img.example.com/generated.png".to_string(),
                    alt_text: prompt.to_string(),
                },
                usage: AiUsage {
                    tokens_used: None,
                    model_used: Some("test-images".to_string()),
                    cost_usd: Some(0.04),
                },
            })
        }
    }

    fn job_with(store: Arc<MemoryEntityStore>, images: Arc<RecordingImages>) -> ImageGenerationJob {
        let cache = Arc::new(MemoryCache::new());
        let mut registry = ProviderRegistry::new();
        registry.register_images(IMAGE_SERVICE, images);
        ImageGenerationJob::new(
            store,
            Arc::new(registry),
            Arc::new(MemoryQueue::new()),
            AiGate::new(
                CircuitBreaker::new(cache.clone()),
                RateLimiter::new(cache, 0, 0.0),
            ),
        )
    }

    #[tokio::test]
    async fn saves_generated_image_onto_entity() {
        let id = Uuid::new_v4();
        let entity = ContentEntity::new(
            EntityModel::Articles,
            id,
            json!({"title": "Widget"}).as_object().cloned().unwrap(),
        );
        let store = Arc::new(MemoryEntityStore::new().with_entity(entity));
        let images = Arc::new(RecordingImages {
            prompts: Mutex::new(Vec::new()),
        });
        let job = job_with(store.clone(), images.clone());

        let envelope = JobEnvelope::new(JobPayload::ImageGeneration(ImageGenerationPayload {
            model: EntityModel::Articles,
            id,
            prompt_hint: None,
        }));
        let outcome = job.run(&envelope).await.unwrap();
        assert!(outcome.is_acknowledged());

        let saved = store.get(EntityModel::Articles, id).await.unwrap().unwrap();
        assert_eq!(
            saved.field_str("image_url"),
            Some("https://img.example.com/generated.png")
        );
        // Default prompt is derived from the display name.
        assert_eq!(
            images.prompts.lock().unwrap()[0],
            "Illustration for: Widget"
        );
    }

    #[tokio::test]
    async fn explicit_prompt_hint_wins() {
        let id = Uuid::new_v4();
        let entity = ContentEntity::new(
            EntityModel::Products,
            id,
            json!({"title": "Widget"}).as_object().cloned().unwrap(),
        );
        let store = Arc::new(MemoryEntityStore::new().with_entity(entity));
        let images = Arc::new(RecordingImages {
            prompts: Mutex::new(Vec::new()),
        });
        let job = job_with(store, images.clone());

        let envelope = JobEnvelope::new(JobPayload::ImageGeneration(ImageGenerationPayload {
            model: EntityModel::Products,
            id,
            prompt_hint: Some("A macro photo of a brass widget".to_string()),
        }));
        job.run(&envelope).await.unwrap();

        assert_eq!(
            images.prompts.lock().unwrap()[0],
            "A macro photo of a brass widget"
        );
    }
}
