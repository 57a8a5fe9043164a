use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for the job queue and shared cache
    pub redis_url: String,

    /// Anthropic API key for AI content operations
    pub anthropic_api_key: String,

    /// Google API key for translation
    pub google_api_key: String,

    /// OpenAI API key for image generation. Image jobs are rejected when
    /// unset.
    #[serde(default)]
    pub openai_api_key: Option<String>,

    /// Locales translations are produced for (comma-separated, e.g. "de,fr,es").
    /// Empty means translations are disabled.
    #[serde(default)]
    pub enabled_locales: String,

    /// Hourly request budget per AI service (0 = unlimited)
    #[serde(default = "default_hourly_limit")]
    pub ai_hourly_limit: u64,

    /// Daily spend budget per AI service in USD (0 = unlimited)
    #[serde(default = "default_daily_cost_limit")]
    pub ai_daily_cost_limit: f64,

    /// Prometheus exporter bind address for the worker. Optional for the CLI.
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,
}

fn default_hourly_limit() -> u64 {
    100
}

fn default_daily_cost_limit() -> f64 {
    50.0
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9187".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Enabled target locales, filtered of empty segments.
    pub fn locales(&self) -> Vec<String> {
        self.enabled_locales
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_locales(raw: &str) -> AppConfig {
        AppConfig {
            database_url: String::new(),
            redis_url: String::new(),
            anthropic_api_key: String::new(),
            google_api_key: String::new(),
            openai_api_key: None,
            enabled_locales: raw.to_string(),
            ai_hourly_limit: 100,
            ai_daily_cost_limit: 50.0,
            metrics_addr: String::new(),
        }
    }

    #[test]
    fn locales_parses_and_trims() {
        let config = config_with_locales(" de, fr ,es");
        assert_eq!(config.locales(), vec!["de", "fr", "es"]);
    }

    #[test]
    fn locales_empty_when_unset() {
        let config = config_with_locales("");
        assert!(config.locales().is_empty());
    }
}
