use std::sync::Arc;

use sqlx::PgPool;

use crate::config::AppConfig;
use crate::db::entity_store::{EntityStore, PgEntityStore};
use crate::jobs::{AiGate, JobRunner, ANTHROPIC_SERVICE, IMAGE_SERVICE, TRANSLATION_SERVICE};
use crate::services::breaker::CircuitBreaker;
use crate::services::cache::SharedCache;
use crate::services::providers::anthropic::AnthropicClient;
use crate::services::providers::google::GoogleTranslateClient;
use crate::services::providers::images::OpenAiImageClient;
use crate::services::providers::ProviderRegistry;
use crate::services::queue::Queue;

/// Shared application state for the worker and CLI. Doubles as the job
/// context: jobs pull their collaborators from here at dispatch time.
pub struct AppState {
    pub config: AppConfig,
    pub pool: PgPool,
    pub cache: Arc<dyn SharedCache>,
    pub queue: Arc<dyn Queue>,
    pub store: Arc<dyn EntityStore>,
    pub providers: Arc<ProviderRegistry>,
    pub gate: AiGate,
    pub runner: JobRunner,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        pool: PgPool,
        cache: Arc<dyn SharedCache>,
        queue: Arc<dyn Queue>,
    ) -> Self {
        let store: Arc<dyn EntityStore> = Arc::new(PgEntityStore::new(pool.clone()));
        let providers = Arc::new(build_registry(&config));
        let gate = AiGate::new(
            CircuitBreaker::new(cache.clone()),
            crate::services::rate_limit::RateLimiter::new(
                cache.clone(),
                config.ai_hourly_limit,
                config.ai_daily_cost_limit,
            ),
        );
        let runner = JobRunner::new(cache.clone());

        Self {
            config,
            pool,
            cache,
            queue,
            store,
            providers,
            gate,
            runner,
        }
    }
}

/// Register the real provider clients under their service keys.
fn build_registry(config: &AppConfig) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register_ai(
        ANTHROPIC_SERVICE,
        Arc::new(AnthropicClient::new(&config.anthropic_api_key)),
    );
    registry.register_translation(
        TRANSLATION_SERVICE,
        Arc::new(GoogleTranslateClient::new(&config.google_api_key)),
    );
    if let Some(key) = &config.openai_api_key {
        registry.register_images(IMAGE_SERVICE, Arc::new(OpenAiImageClient::new(key)));
    }
    registry
}
