use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod anthropic;
pub mod google;
pub mod images;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to parse provider response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Provider API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Provider returned an empty result: {0}")]
    Empty(String),

    #[error("No provider registered for service: {0}")]
    UnknownService(String),
}

/// Token/cost accounting reported alongside a provider result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AiUsage {
    pub tokens_used: Option<u64>,
    pub model_used: Option<String>,
    pub cost_usd: Option<f64>,
}

/// A provider result plus its usage metadata.
#[derive(Debug, Clone)]
pub struct AiResult<T> {
    pub data: T,
    pub usage: AiUsage,
}

/// SEO metadata generated for a content entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeoContent {
    pub meta_title: String,
    pub meta_description: String,
    pub meta_keywords: String,
    #[serde(default)]
    pub facebook_description: String,
    #[serde(default)]
    pub linkedin_description: String,
    #[serde(default)]
    pub instagram_description: String,
    #[serde(default)]
    pub twitter_description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageAnalysis {
    pub name: String,
    pub alt_text: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SentimentAnalysis {
    pub sentiment: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratedImage {
    pub url: String,
    pub alt_text: String,
}

/// Stateless AI content operations. Implementations must signal failure by
/// returning an error; jobs treat empty results and errors identically.
#[async_trait]
pub trait AiProvider: Send + Sync {
    async fn generate_seo(
        &self,
        title: &str,
        content: &str,
    ) -> Result<AiResult<SeoContent>, ProviderError>;

    async fn generate_tags(&self, content: &str) -> Result<AiResult<Vec<String>>, ProviderError>;

    async fn analyze_image(
        &self,
        image_url: &str,
    ) -> Result<AiResult<ImageAnalysis>, ProviderError>;

    async fn analyze_sentiment(
        &self,
        text: &str,
    ) -> Result<AiResult<SentimentAnalysis>, ProviderError>;

    async fn summarize(&self, content: &str) -> Result<AiResult<String>, ProviderError>;

    async fn translate_text(
        &self,
        text: &str,
        target_language: &str,
    ) -> Result<AiResult<String>, ProviderError>;
}

/// Batch translation of entity fields into multiple locales.
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    /// Translate `fields` into each requested locale. Fields listed in
    /// `html_fields` (or all fields when `use_html` is set) are translated
    /// preserving markup. Returns locale → field → translated value.
    async fn translate_content(
        &self,
        fields: &HashMap<String, String>,
        html_fields: &[String],
        use_html: bool,
        locales: &[String],
    ) -> Result<HashMap<String, HashMap<String, String>>, ProviderError>;
}

/// Image generation, separated from content operations because it is
/// typically served by a different vendor.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    async fn generate_image(
        &self,
        prompt: &str,
    ) -> Result<AiResult<GeneratedImage>, ProviderError>;
}

/// Explicit service-name → provider mapping populated at startup.
#[derive(Default)]
pub struct ProviderRegistry {
    ai: HashMap<String, Arc<dyn AiProvider>>,
    translation: HashMap<String, Arc<dyn TranslationProvider>>,
    images: HashMap<String, Arc<dyn ImageProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_ai(&mut self, service: &str, provider: Arc<dyn AiProvider>) {
        self.ai.insert(service.to_string(), provider);
    }

    pub fn register_translation(&mut self, service: &str, provider: Arc<dyn TranslationProvider>) {
        self.translation.insert(service.to_string(), provider);
    }

    pub fn register_images(&mut self, service: &str, provider: Arc<dyn ImageProvider>) {
        self.images.insert(service.to_string(), provider);
    }

    pub fn ai(&self, service: &str) -> Result<Arc<dyn AiProvider>, ProviderError> {
        self.ai
            .get(service)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownService(service.to_string()))
    }

    pub fn translation(&self, service: &str) -> Result<Arc<dyn TranslationProvider>, ProviderError> {
        self.translation
            .get(service)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownService(service.to_string()))
    }

    pub fn images(&self, service: &str) -> Result<Arc<dyn ImageProvider>, ProviderError> {
        self.images
            .get(service)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownService(service.to_string()))
    }
}
