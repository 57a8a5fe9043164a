use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::app_state::AppState;
use crate::db::entity_store::EntityStore;
use crate::jobs::{Job, JobError, TRANSLATION_SERVICE};
use crate::models::entity::{ContentEntity, EntityModel};
use crate::models::message::{JobEnvelope, JobPayload, TranslatePayload};
use crate::models::outcome::JobOutcome;
use crate::services::providers::ProviderRegistry;
use crate::services::queue::Queue;

/// Wait-loop bound for the SEO soft dependency. Once spent, the job is
/// permanently rejected.
pub const SEO_WAIT_MAX_ATTEMPTS: u32 = 5;

/// Wait delay grows linearly: 10s, 20s, 30s, 40s, 50s.
pub const SEO_WAIT_BASE_DELAY_SECS: u64 = 10;

/// Which fields are translated for a model, and which of them carry HTML.
pub struct TranslationPlan {
    pub fields: &'static [&'static str],
    pub html_fields: &'static [&'static str],
    pub use_html: bool,
}

pub fn plan_for(model: EntityModel) -> TranslationPlan {
    match model {
        EntityModel::Articles => TranslationPlan {
            fields: &[
                "title",
                "body",
                "meta_title",
                "meta_description",
                "meta_keywords",
            ],
            html_fields: &["body"],
            use_html: false,
        },
        EntityModel::Tags => TranslationPlan {
            fields: &[
                "title",
                "description",
                "meta_title",
                "meta_description",
                "meta_keywords",
            ],
            html_fields: &[],
            use_html: false,
        },
        EntityModel::Products => TranslationPlan {
            fields: &[
                "title",
                "description",
                "meta_title",
                "meta_description",
                "meta_keywords",
            ],
            html_fields: &["description"],
            use_html: false,
        },
    }
}

/// Translates an entity's configured fields into every enabled locale.
///
/// Translation depends on SEO fields generated by a separate job; when
/// they are still empty, the job re-enqueues itself with a growing delay
/// instead of failing, bounded by [`SEO_WAIT_MAX_ATTEMPTS`].
pub struct TranslateJob {
    store: Arc<dyn EntityStore>,
    providers: Arc<ProviderRegistry>,
    queue: Arc<dyn Queue>,
    locales: Vec<String>,
}

impl TranslateJob {
    pub fn new(
        store: Arc<dyn EntityStore>,
        providers: Arc<ProviderRegistry>,
        queue: Arc<dyn Queue>,
        locales: Vec<String>,
    ) -> Self {
        Self {
            store,
            providers,
            queue,
            locales,
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            state.store.clone(),
            state.providers.clone(),
            state.queue.clone(),
            state.config.locales(),
        )
    }

    async fn wait_for_seo(
        &self,
        envelope: &JobEnvelope,
        payload: &TranslatePayload,
        missing: &[&str],
    ) -> Result<JobOutcome, JobError> {
        if payload.seo_wait_attempt >= SEO_WAIT_MAX_ATTEMPTS {
            tracing::error!(
                group_name = self.job_type(),
                model = %payload.model,
                entity_id = %payload.id,
                display_name = %payload.display_name,
                missing_fields = ?missing,
                "SEO fields still empty after maximum wait attempts, giving up"
            );
            return Ok(JobOutcome::Rejected);
        }

        let delay = SEO_WAIT_BASE_DELAY_SECS * u64::from(payload.seo_wait_attempt + 1);
        let mut next_payload = payload.clone();
        next_payload.seo_wait_attempt += 1;

        let mut successor = envelope.reschedule();
        successor.payload = JobPayload::TranslateEntity(next_payload);
        self.queue.push_successor(&successor, delay).await?;

        tracing::info!(
            group_name = self.job_type(),
            model = %payload.model,
            entity_id = %payload.id,
            wait_attempt = payload.seo_wait_attempt + 1,
            delay_seconds = delay,
            "SEO fields not ready, translation postponed"
        );
        Ok(JobOutcome::Acknowledged)
    }

    fn translatable_fields(
        entity: &ContentEntity,
        plan: &TranslationPlan,
    ) -> HashMap<String, String> {
        let mut fields = HashMap::new();
        for name in plan.fields {
            if let Some(value) = entity.field_str(name) {
                if !value.trim().is_empty() {
                    fields.insert((*name).to_string(), value.to_string());
                }
            }
        }
        fields
    }
}

#[async_trait]
impl Job for TranslateJob {
    fn job_type(&self) -> &'static str {
        "translate_entity"
    }

    async fn run(&self, envelope: &JobEnvelope) -> Result<JobOutcome, JobError> {
        let JobPayload::TranslateEntity(payload) = &envelope.payload else {
            return Err(JobError::PayloadMismatch);
        };

        if self.locales.is_empty() {
            return Err(JobError::NoLocalesConfigured);
        }

        let entity = self
            .store
            .get(payload.model, payload.id)
            .await?
            .ok_or(JobError::EntityNotFound {
                model: payload.model,
                id: payload.id,
            })?;

        let missing = entity.empty_seo_fields();
        if !missing.is_empty() {
            return self.wait_for_seo(envelope, payload, &missing).await;
        }

        let plan = plan_for(payload.model);
        let fields = Self::translatable_fields(&entity, &plan);
        if fields.is_empty() {
            return Err(JobError::NothingToTranslate);
        }

        let html_fields: Vec<String> = plan.html_fields.iter().map(|f| f.to_string()).collect();
        let translator = self.providers.translation(TRANSLATION_SERVICE)?;
        let translated = translator
            .translate_content(&fields, &html_fields, plan.use_html, &self.locales)
            .await?;

        // One durable save per locale, in configured order. A crash
        // mid-loop leaves earlier locales saved; re-running overwrites.
        let mut saved = 0u32;
        for locale in &self.locales {
            let Some(values) = translated.get(locale) else {
                tracing::warn!(
                    group_name = self.job_type(),
                    entity_id = %payload.id,
                    locale,
                    "Provider returned no translation for locale"
                );
                continue;
            };
            let mut map = Map::new();
            for (field, value) in values {
                map.insert(field.clone(), Value::String(value.clone()));
            }
            self.store
                .save_translation(payload.model, payload.id, locale, &map)
                .await?;
            saved += 1;
            tracing::info!(
                group_name = self.job_type(),
                model = %payload.model,
                entity_id = %payload.id,
                locale,
                fields = map.len(),
                "Translation saved"
            );
        }

        if saved == 0 {
            return Err(JobError::Provider(
                crate::services::providers::ProviderError::Empty(
                    "provider returned no locales".to_string(),
                ),
            ));
        }
        Ok(JobOutcome::Acknowledged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::entity_store::MemoryEntityStore;
    use crate::services::providers::{ProviderError, TranslationProvider};
    use crate::services::queue::MemoryQueue;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    struct EchoTranslator {
        calls: AtomicU32,
    }

    impl EchoTranslator {
        fn new() -> Self {
            Self {
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl TranslationProvider for EchoTranslator {
        async fn translate_content(
            &self,
            fields: &HashMap<String, String>,
            _html_fields: &[String],
            _use_html: bool,
            locales: &[String],
        ) -> Result<HashMap<String, HashMap<String, String>>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut out = HashMap::new();
            for locale in locales {
                let translated: HashMap<String, String> = fields
                    .iter()
                    .map(|(k, v)| (k.clone(), format!("[{locale}] {v}")))
                    .collect();
                out.insert(locale.clone(), translated);
            }
            Ok(out)
        }
    }

    fn ready_entity(id: Uuid) -> ContentEntity {
        ContentEntity::new(
            EntityModel::Articles,
            id,
            json!({
                "title": "Widget",
                "body": "<p>Widget body</p>",
                "meta_title": "Widget",
                "meta_description": "About widgets",
                "meta_keywords": "widget",
            })
            .as_object()
            .cloned()
            .unwrap(),
        )
    }

    fn job_with(
        store: MemoryEntityStore,
        queue: Arc<MemoryQueue>,
        locales: &[&str],
    ) -> TranslateJob {
        let mut registry = ProviderRegistry::new();
        registry.register_translation(TRANSLATION_SERVICE, Arc::new(EchoTranslator::new()));
        TranslateJob::new(
            Arc::new(store),
            Arc::new(registry),
            queue,
            locales.iter().map(|l| l.to_string()).collect(),
        )
    }

    fn envelope(payload: TranslatePayload) -> JobEnvelope {
        JobEnvelope::new(JobPayload::TranslateEntity(payload))
    }

    fn payload(id: Uuid) -> TranslatePayload {
        TranslatePayload {
            model: EntityModel::Articles,
            id,
            display_name: "Widget".to_string(),
            seo_wait_attempt: 0,
        }
    }

    #[tokio::test]
    async fn translates_and_saves_each_locale() {
        let id = Uuid::new_v4();
        let store = MemoryEntityStore::new().with_entity(ready_entity(id));
        let store = Arc::new(store);
        let queue = Arc::new(MemoryQueue::new());

        let mut registry = ProviderRegistry::new();
        registry.register_translation(TRANSLATION_SERVICE, Arc::new(EchoTranslator::new()));
        let job = TranslateJob::new(
            store.clone(),
            Arc::new(registry),
            queue.clone(),
            vec!["fr".to_string(), "de".to_string()],
        );

        let outcome = job.run(&envelope(payload(id))).await.unwrap();
        assert!(outcome.is_acknowledged());

        let fr = store
            .get_translation(EntityModel::Articles, id, "fr")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fr["title"], json!("[fr] Widget"));
        let de = store
            .get_translation(EntityModel::Articles, id, "de")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(de["meta_keywords"], json!("[de] widget"));
        assert!(queue.pushed().await.is_empty());
        assert!(queue.requeued().await.is_empty());
    }

    #[tokio::test]
    async fn rerunning_overwrites_instead_of_duplicating() {
        let id = Uuid::new_v4();
        let store = Arc::new(MemoryEntityStore::new().with_entity(ready_entity(id)));
        let queue = Arc::new(MemoryQueue::new());
        let mut registry = ProviderRegistry::new();
        registry.register_translation(TRANSLATION_SERVICE, Arc::new(EchoTranslator::new()));
        let job = TranslateJob::new(
            store.clone(),
            Arc::new(registry),
            queue,
            vec!["fr".to_string()],
        );

        job.run(&envelope(payload(id))).await.unwrap();
        job.run(&envelope(payload(id))).await.unwrap();

        let fr = store
            .get_translation(EntityModel::Articles, id, "fr")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fr["title"], json!("[fr] Widget"));
    }

    #[tokio::test]
    async fn postpones_when_seo_fields_are_empty() {
        let id = Uuid::new_v4();
        let entity = ContentEntity::new(
            EntityModel::Articles,
            id,
            json!({"title": "Widget"}).as_object().cloned().unwrap(),
        );
        let queue = Arc::new(MemoryQueue::new());
        let job = job_with(
            MemoryEntityStore::new().with_entity(entity),
            queue.clone(),
            &["fr"],
        );

        let outcome = job.run(&envelope(payload(id))).await.unwrap();
        assert!(outcome.is_acknowledged());

        // Successors go through the lock-takeover path, never the fresh
        // enqueue that a held uniqueness marker would drop.
        assert!(queue.pushed().await.is_empty());
        let requeued = queue.requeued().await;
        assert_eq!(requeued.len(), 1);
        let (successor, delay) = &requeued[0];
        assert_eq!(*delay, 10);
        match &successor.payload {
            JobPayload::TranslateEntity(p) => assert_eq!(p.seo_wait_attempt, 1),
            other => panic!("unexpected payload: {other:?}"),
        }
        // Retry counter is untouched; this is a wait, not a failure.
        assert_eq!(successor.attempt, 1);
    }

    #[tokio::test]
    async fn wait_delay_grows_linearly() {
        let id = Uuid::new_v4();
        let entity = ContentEntity::new(
            EntityModel::Articles,
            id,
            json!({"title": "Widget"}).as_object().cloned().unwrap(),
        );
        let queue = Arc::new(MemoryQueue::new());
        let job = job_with(
            MemoryEntityStore::new().with_entity(entity),
            queue.clone(),
            &["fr"],
        );

        let mut p = payload(id);
        p.seo_wait_attempt = 3;
        job.run(&envelope(p)).await.unwrap();

        let requeued = queue.requeued().await;
        assert_eq!(requeued[0].1, 40);
    }

    #[tokio::test]
    async fn rejects_after_wait_budget_is_spent() {
        let id = Uuid::new_v4();
        let entity = ContentEntity::new(
            EntityModel::Articles,
            id,
            json!({"title": "Widget"}).as_object().cloned().unwrap(),
        );
        let queue = Arc::new(MemoryQueue::new());
        let job = job_with(
            MemoryEntityStore::new().with_entity(entity),
            queue.clone(),
            &["fr"],
        );

        let mut p = payload(id);
        p.seo_wait_attempt = SEO_WAIT_MAX_ATTEMPTS;
        let outcome = job.run(&envelope(p)).await.unwrap();
        assert!(outcome.is_rejected());
        assert!(queue.pushed().await.is_empty());
        assert!(queue.requeued().await.is_empty());
    }

    #[tokio::test]
    async fn rejects_when_no_locales_enabled() {
        let id = Uuid::new_v4();
        let queue = Arc::new(MemoryQueue::new());
        let job = job_with(
            MemoryEntityStore::new().with_entity(ready_entity(id)),
            queue,
            &[],
        );

        let error = job.run(&envelope(payload(id))).await.unwrap_err();
        assert!(matches!(error, JobError::NoLocalesConfigured));
    }

    #[tokio::test]
    async fn missing_entity_is_an_error() {
        let queue = Arc::new(MemoryQueue::new());
        let job = job_with(MemoryEntityStore::new(), queue, &["fr"]);

        let error = job.run(&envelope(payload(Uuid::new_v4()))).await.unwrap_err();
        assert!(matches!(error, JobError::EntityNotFound { .. }));
    }
}
