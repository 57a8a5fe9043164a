use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{ProviderError, TranslationProvider};

const API_URL: &str = "https://translation.googleapis.com/language/translate/v2";

/// Client for the Google Cloud Translation v2 API.
pub struct GoogleTranslateClient {
    http: Client,
    api_key: String,
}

#[derive(Deserialize)]
struct TranslateResponse {
    data: TranslateData,
}

#[derive(Deserialize)]
struct TranslateData {
    translations: Vec<Translation>,
}

#[derive(Deserialize)]
struct Translation {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

impl GoogleTranslateClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.to_string(),
        }
    }

    async fn translate_batch(
        &self,
        texts: &[&str],
        target: &str,
        html: bool,
    ) -> Result<Vec<String>, ProviderError> {
        let body = serde_json::json!({
            "q": texts,
            "target": target,
            "format": if html { "html" } else { "text" },
        });

        let response = self
            .http
            .post(API_URL)
            .query(&[("key", self.api_key.as_str())])
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

        let parsed: TranslateResponse = response.json().await?;
        if parsed.data.translations.len() != texts.len() {
            return Err(ProviderError::Empty(format!(
                "expected {} translations, got {}",
                texts.len(),
                parsed.data.translations.len()
            )));
        }
        Ok(parsed
            .data
            .translations
            .into_iter()
            .map(|t| t.translated_text)
            .collect())
    }
}

#[async_trait]
impl TranslationProvider for GoogleTranslateClient {
    async fn translate_content(
        &self,
        fields: &HashMap<String, String>,
        html_fields: &[String],
        use_html: bool,
        locales: &[String],
    ) -> Result<HashMap<String, HashMap<String, String>>, ProviderError> {
        // Stable field order so request and response batches line up.
        let mut names: Vec<&String> = fields.keys().collect();
        names.sort();

        let (html_names, plain_names): (Vec<&String>, Vec<&String>) = names
            .into_iter()
            .partition(|name| use_html || html_fields.iter().any(|f| f == *name));

        let mut result = HashMap::new();
        for locale in locales {
            let mut translated = HashMap::new();

            for (batch, html) in [(&html_names, true), (&plain_names, false)] {
                if batch.is_empty() {
                    continue;
                }
                let texts: Vec<&str> = batch.iter().map(|name| fields[*name].as_str()).collect();
                let values = self.translate_batch(&texts, locale, html).await?;
                for (name, value) in batch.iter().zip(values) {
                    translated.insert((*name).clone(), value);
                }
            }

            result.insert(locale.clone(), translated);
        }
        Ok(result)
    }
}
