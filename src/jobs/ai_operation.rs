use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::app_state::AppState;
use crate::db::entity_store::EntityStore;
use crate::jobs::{AiGate, GatePass, Job, JobError};
use crate::models::entity::ContentEntity;
use crate::models::message::{AiOperationPayload, AiOperationRequest, JobEnvelope, JobPayload};
use crate::models::outcome::JobOutcome;
use crate::services::providers::{AiUsage, ProviderRegistry};
use crate::services::queue::Queue;
use crate::services::retry::{RetryScheduler, RATE_LIMIT_DELAY_SECS};

/// Generic AI operation job: one payload enum covers every provider
/// operation, so callers enqueue an operation instead of a dedicated job
/// type. Results are written back onto the target entity when one is
/// named, otherwise only logged and counted.
pub struct AiOperationJob {
    store: Arc<dyn EntityStore>,
    providers: Arc<ProviderRegistry>,
    queue: Arc<dyn Queue>,
    gate: AiGate,
}

impl AiOperationJob {
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

    /// Run the provider call for one operation variant. Returns the usage
    /// plus the field updates to apply to the target entity, if any.
    async fn perform(
        &self,
        payload: &AiOperationPayload,
    ) -> Result<(AiUsage, Vec<(&'static str, Value)>), JobError> {
        let provider = self.providers.ai(&payload.service)?;

        match &payload.request {
            AiOperationRequest::GenerateSeo { title, content } => {
                let result = provider.generate_seo(title, content).await?;
                let seo = result.data;
                let updates = vec![
                    ("meta_title", json!(seo.meta_title)),
                    ("meta_description", json!(seo.meta_description)),
                    ("meta_keywords", json!(seo.meta_keywords)),
                ];
                Ok((result.usage, updates))
            }
            AiOperationRequest::AnalyzeImage { image_url } => {
                let result = provider.analyze_image(image_url).await?;
                let analysis = result.data;
                Ok((
                    result.usage,
                    vec![
                        ("name", json!(analysis.name)),
                        ("alt_text", json!(analysis.alt_text)),
                        ("keywords", json!(analysis.keywords.join(","))),
                    ],
                ))
            }
            AiOperationRequest::GenerateTags { content } => {
                let result = provider.generate_tags(content).await?;
                Ok((result.usage, vec![("tags", json!(result.data))]))
            }
            AiOperationRequest::AnalyzeSentiment { text } => {
                let result = provider.analyze_sentiment(text).await?;
                Ok((
                    result.usage,
                    vec![
                        ("sentiment", json!(result.data.sentiment)),
                        ("sentiment_confidence", json!(result.data.confidence)),
                    ],
                ))
            }
            AiOperationRequest::TranslateContent {
                text,
                target_language,
            } => {
                let result = provider.translate_text(text, target_language).await?;
                Ok((result.usage, vec![("translated_text", json!(result.data))]))
            }
            AiOperationRequest::GenerateSummary { content } => {
                let result = provider.summarize(content).await?;
                Ok((result.usage, vec![("summary", json!(result.data))]))
            }
        }
    }

    async fn apply_updates(
        &self,
        payload: &AiOperationPayload,
        updates: Vec<(&'static str, Value)>,
    ) -> Result<(), JobError> {
        let (Some(model), Some(entity_id)) = (payload.model, payload.entity_id) else {
            return Ok(());
        };
        let mut entity: ContentEntity = self
            .store
            .get(model, entity_id)
            .await?
            .ok_or(JobError::EntityNotFound {
                model,
                id: entity_id,
            })?;
        for (field, value) in updates {
            entity.set_field(field, value);
        }
        self.store.save(&entity).await?;
        Ok(())
    }
}

#[async_trait]
impl Job for AiOperationJob {
    fn job_type(&self) -> &'static str {
        "ai_operation"
    }

    async fn run(&self, envelope: &JobEnvelope) -> Result<JobOutcome, JobError> {
        let JobPayload::AiOperation(payload) = &envelope.payload else {
            return Err(JobError::PayloadMismatch);
        };
        let operation = payload.request.name();

        match self.gate.preflight(&payload.service).await? {
            GatePass::Proceed => {}
            GatePass::CircuitOpen => {
                tracing::warn!(
                    group_name = self.job_type(),
                    service = %payload.service,
                    operation,
                    "Circuit breaker open, skipping AI operation"
                );
                return Ok(JobOutcome::Rejected);
            }
            GatePass::RateLimited(reasons) => {
                tracing::info!(
                    group_name = self.job_type(),
                    service = %payload.service,
                    operation,
                    reasons = ?reasons,
                    "Rate limited, rescheduling AI operation"
                );
                self.queue
                    .push_successor(&envelope.reschedule(), RATE_LIMIT_DELAY_SECS)
                    .await?;
                return Ok(JobOutcome::Acknowledged);
            }
        }

        match self.perform(payload).await {
            Ok((usage, updates)) => {
                self.gate.record_success(&payload.service, &usage).await;
                metrics::counter!(
                    "ai_operations_total",
                    "service" => payload.service.clone(),
                    "operation" => operation,
                )
                .increment(1);
                self.apply_updates(payload, updates).await?;
                tracing::info!(
                    group_name = self.job_type(),
                    service = %payload.service,
                    operation,
                    tokens = usage.tokens_used,
                    model_used = usage.model_used.as_deref().unwrap_or("unknown"),
                    "AI operation completed"
                );
                Ok(JobOutcome::Acknowledged)
            }
            Err(JobError::Provider(error)) => {
                self.gate.record_failure(&payload.service).await;
                if let Some(outcome) =
                    RetryScheduler::decide(envelope, self.max_attempts(), &error.to_string())
                {
                    return Ok(outcome);
                }
                Err(JobError::Provider(error))
            }
            Err(other) => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::entity_store::MemoryEntityStore;
    use crate::models::entity::EntityModel;
    use crate::services::breaker::CircuitBreaker;
    use crate::services::cache::MemoryCache;
    use crate::services::providers::{
        AiProvider, AiResult, ImageAnalysis, ProviderError, SentimentAnalysis, SeoContent,
    };
    use crate::services::queue::MemoryQueue;
    use crate::services::rate_limit::RateLimiter;
    use serde_json::json as j;
    use uuid::Uuid;

    struct TagsAndSentimentAi;

    #[async_trait]
    impl AiProvider for TagsAndSentimentAi {
        async fn generate_seo(
            &self,
            _title: &str,
            _content: &str,
        ) -> Result<AiResult<SeoContent>, ProviderError> {
            Err(ProviderError::Empty("unused".to_string()))
        }

        async fn generate_tags(
            &self,
            _content: &str,
        ) -> Result<AiResult<Vec<String>>, ProviderError> {
            Ok(AiResult {
                data: vec!["rust".to_string(), "async".to_string()],
                usage: AiUsage {
                    tokens_used: Some(40),
                    model_used: Some("test-model".to_string()),
                    cost_usd: Some(0.002),
                },
            })
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
            Ok(AiResult {
                data: SentimentAnalysis {
                    sentiment: "positive".to_string(),
                    confidence: 0.92,
                },
                usage: AiUsage::default(),
            })
        }

        async fn summarize(&self, _content: &str) -> Result<AiResult<String>, ProviderError> {
            Err(ProviderError::Empty("no summary".to_string()))
        }

        async fn translate_text(
            &self,
            _text: &str,
            _target_language: &str,
        ) -> Result<AiResult<String>, ProviderError> {
            Err(ProviderError::Api {
                status: 503,
                message: "service unavailable".to_string(),
            })
        }
    }

    fn job(store: Arc<MemoryEntityStore>) -> AiOperationJob {
        let cache = Arc::new(MemoryCache::new());
        let mut registry = ProviderRegistry::new();
        registry.register_ai("anthropic", Arc::new(TagsAndSentimentAi));
        AiOperationJob::new(
            store,
            Arc::new(registry),
            Arc::new(MemoryQueue::new()),
            AiGate::new(
                CircuitBreaker::new(cache.clone()),
                RateLimiter::new(cache, 0, 0.0),
            ),
        )
    }

    fn envelope(request: AiOperationRequest, entity: Option<(EntityModel, Uuid)>) -> JobEnvelope {
        JobEnvelope::new(JobPayload::AiOperation(AiOperationPayload {
            service: "anthropic".to_string(),
            request,
            model: entity.map(|(m, _)| m),
            entity_id: entity.map(|(_, id)| id),
        }))
    }

    #[tokio::test]
    async fn writes_results_back_to_the_target_entity() {
        let id = Uuid::new_v4();
        let entity = ContentEntity::new(
            EntityModel::Articles,
            id,
            j!({"title": "Post"}).as_object().cloned().unwrap(),
        );
        let store = Arc::new(MemoryEntityStore::new().with_entity(entity));
        let job = job(store.clone());

        let outcome = job
            .run(&envelope(
                AiOperationRequest::GenerateTags {
                    content: "Rust async content".to_string(),
                },
                Some((EntityModel::Articles, id)),
            ))
            .await
            .unwrap();
        assert!(outcome.is_acknowledged());

        let saved = store.get(EntityModel::Articles, id).await.unwrap().unwrap();
        assert_eq!(saved.fields["tags"], j!(["rust", "async"]));
    }

    #[tokio::test]
    async fn operations_without_a_target_entity_still_succeed() {
        let job = job(Arc::new(MemoryEntityStore::new()));
        let outcome = job
            .run(&envelope(
                AiOperationRequest::AnalyzeSentiment {
                    text: "Great product".to_string(),
                },
                None,
            ))
            .await
            .unwrap();
        assert!(outcome.is_acknowledged());
    }

    #[tokio::test]
    async fn transient_provider_failure_requests_backoff_retry() {
        let job = job(Arc::new(MemoryEntityStore::new()));
        let outcome = job
            .run(&envelope(
                AiOperationRequest::TranslateContent {
                    text: "hello".to_string(),
                    target_language: "fr".to_string(),
                },
                None,
            ))
            .await
            .unwrap();
        match outcome {
            JobOutcome::Requeued { delay_seconds, .. } => assert_eq!(delay_seconds, 60),
            other => panic!("expected retry, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn permanent_provider_failure_is_an_error() {
        let job = job(Arc::new(MemoryEntityStore::new()));
        let result = job
            .run(&envelope(
                AiOperationRequest::GenerateSummary {
                    content: "text".to_string(),
                },
                None,
            ))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unknown_service_is_rejected_not_retried() {
        let job = job(Arc::new(MemoryEntityStore::new()));
        let mut env = envelope(
            AiOperationRequest::GenerateTags {
                content: "text".to_string(),
            },
            None,
        );
        if let JobPayload::AiOperation(p) = &mut env.payload {
            p.service = "nonexistent".to_string();
        }
        let error = job.run(&env).await.unwrap_err();
        assert!(matches!(
            error,
            JobError::Provider(ProviderError::UnknownService(_))
        ));
    }
}
