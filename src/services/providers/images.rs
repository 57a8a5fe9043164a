use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{AiResult, AiUsage, GeneratedImage, ImageProvider, ProviderError};

const API_URL: &str = "https://api.openai.com/v1/images/generations";
const DEFAULT_MODEL: &str = "dall-e-3";
const IMAGE_SIZE: &str = "1024x1024";

/// Flat per-image price for the default model/size.
const COST_PER_IMAGE_USD: f64 = 0.04;

/// Client for the OpenAI image generation endpoint.
pub struct OpenAiImageClient {
    http: Client,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct ImagesResponse {
    data: Vec<ImageDatum>,
}

#[derive(Deserialize)]
struct ImageDatum {
    url: String,
    #[serde(default)]
    revised_prompt: Option<String>,
}

impl OpenAiImageClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

#[async_trait]
impl ImageProvider for OpenAiImageClient {
    async fn generate_image(
        &self,
        prompt: &str,
    ) -> Result<AiResult<GeneratedImage>, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "n": 1,
            "size": IMAGE_SIZE,
        });

        let response = self
            .http
            .post(API_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ImagesResponse = response.json().await?;
        let datum = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Empty("no images returned".to_string()))?;

        Ok(AiResult {
            data: GeneratedImage {
                url: datum.url,
                alt_text: datum.revised_prompt.unwrap_or_else(|| prompt.to_string()),
            },
            usage: AiUsage {
                tokens_used: None,
                model_used: Some(self.model.clone()),
                cost_usd: Some(COST_PER_IMAGE_USD),
            },
        })
    }
}
