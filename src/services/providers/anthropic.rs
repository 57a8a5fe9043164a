use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;

use super::{
    AiProvider, AiResult, AiUsage, ImageAnalysis, ProviderError, SentimentAnalysis, SeoContent,
};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
const MAX_TOKENS: u32 = 1024;

/// Rough blended per-1k-token rate used for spend accounting.
const COST_PER_1K_TOKENS_USD: f64 = 0.004;

/// Client for the Anthropic Messages API.
pub struct AnthropicClient {
    http: Client,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    model: String,
    usage: Usage,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

impl AnthropicClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Send one message turn and return the response text plus usage.
    async fn complete(
        &self,
        content: serde_json::Value,
    ) -> Result<(String, AiUsage), ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "messages": [{"role": "user", "content": content}],
        });

        let response = self
            .http
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
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

        let parsed: MessagesResponse = response.json().await?;
        let text = parsed
            .content
            .first()
            .map(|block| block.text.clone())
            .unwrap_or_default();
        if text.is_empty() {
            return Err(ProviderError::Empty("no content blocks returned".to_string()));
        }

        let tokens = parsed.usage.input_tokens + parsed.usage.output_tokens;
        Ok((
            text,
            AiUsage {
                tokens_used: Some(tokens),
                model_used: Some(parsed.model),
                cost_usd: Some(tokens as f64 / 1000.0 * COST_PER_1K_TOKENS_USD),
            },
        ))
    }

    /// Models occasionally wrap JSON answers in markdown fences; strip them
    /// before parsing.
    fn extract_json(text: &str) -> &str {
        let trimmed = text.trim();
        trimmed
            .strip_prefix("```json")
            .or_else(|| trimmed.strip_prefix("```"))
            .and_then(|s| s.strip_suffix("```"))
            .map(str::trim)
            .unwrap_or(trimmed)
    }
}

#[async_trait]
impl AiProvider for AnthropicClient {
    async fn generate_seo(
        &self,
        title: &str,
        content: &str,
    ) -> Result<AiResult<SeoContent>, ProviderError> {
        let prompt = format!(
            concat!(
                "Generate SEO metadata for the following content as JSON with exactly these ",
                "fields: meta_title, meta_description, meta_keywords, facebook_description, ",
                "linkedin_description, instagram_description, twitter_description. ",
                "Return ONLY valid JSON.\n\nTitle: {}\n\nContent:\n{}"
            ),
            title, content
        );
        let (text, usage) = self.complete(serde_json::json!(prompt)).await?;
        let data: SeoContent = serde_json::from_str(Self::extract_json(&text))?;
        Ok(AiResult { data, usage })
    }

    async fn generate_tags(&self, content: &str) -> Result<AiResult<Vec<String>>, ProviderError> {
        let prompt = format!(
            concat!(
                "Suggest up to 8 topical tags for the following content. ",
                "Return ONLY a JSON array of lowercase tag strings.\n\n{}"
            ),
            content
        );
        let (text, usage) = self.complete(serde_json::json!(prompt)).await?;
        let data: Vec<String> = serde_json::from_str(Self::extract_json(&text))?;
        if data.is_empty() {
            return Err(ProviderError::Empty("no tags suggested".to_string()));
        }
        Ok(AiResult { data, usage })
    }

    async fn analyze_image(
        &self,
        image_url: &str,
    ) -> Result<AiResult<ImageAnalysis>, ProviderError> {
        // Vision input requires the image bytes inline.
        let image_response = self.http.get(image_url).send().await?;
        let media_type = image_response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();
        let bytes = image_response.bytes().await?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);

        let content = serde_json::json!([
            {
                "type": "image",
                "source": {"type": "base64", "media_type": media_type, "data": encoded},
            },
            {
                "type": "text",
                "text": concat!(
                    "Describe this image for a CMS media library. Return ONLY JSON with ",
                    "fields: name (short filename-style title), alt_text (accessible ",
                    "description), keywords (array of strings).",
                ),
            },
        ]);

        let (text, usage) = self.complete(content).await?;
        let data: ImageAnalysis = serde_json::from_str(Self::extract_json(&text))?;
        Ok(AiResult { data, usage })
    }

    async fn analyze_sentiment(
        &self,
        text: &str,
    ) -> Result<AiResult<SentimentAnalysis>, ProviderError> {
        let prompt = format!(
            concat!(
                "Classify the sentiment of the following text. Return ONLY JSON with ",
                "fields: sentiment (one of positive, neutral, negative) and confidence ",
                "(number between 0 and 1).\n\n{}"
            ),
            text
        );
        let (response_text, usage) = self.complete(serde_json::json!(prompt)).await?;
        let data: SentimentAnalysis = serde_json::from_str(Self::extract_json(&response_text))?;
        Ok(AiResult { data, usage })
    }

    async fn summarize(&self, content: &str) -> Result<AiResult<String>, ProviderError> {
        let prompt = format!(
            "Summarize the following content in at most three sentences:\n\n{content}"
        );
        let (text, usage) = self.complete(serde_json::json!(prompt)).await?;
        Ok(AiResult { data: text, usage })
    }

    async fn translate_text(
        &self,
        text: &str,
        target_language: &str,
    ) -> Result<AiResult<String>, ProviderError> {
        let prompt = format!(
            "Translate the following text into {target_language}. Return only the translation.\n\n{text}"
        );
        let (translated, usage) = self.complete(serde_json::json!(prompt)).await?;
        Ok(AiResult {
            data: translated,
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_strips_markdown_fences() {
        assert_eq!(
            AnthropicClient::extract_json("```json\n{\"a\": 1}\n```"),
            "{\"a\": 1}"
        );
        assert_eq!(AnthropicClient::extract_json("{\"a\": 1}"), "{\"a\": 1}");
        assert_eq!(
            AnthropicClient::extract_json("```\n[1, 2]\n```"),
            "[1, 2]"
        );
    }
}
