//! Runtime configuration.
//!
//! Every setting is a CLI flag with an environment fallback, so a `.env` file
//! loaded before parsing configures the service the same way the shell does.

use crate::ai::AiSettings;
use crate::error::{Error, Result};
use crate::orchestrator::{Timeouts, Ttls};
use crate::upstream::{openai, openweather};
use clap::Args;
use std::time::Duration;

/// Provider credentials, models and cache tuning.
#[derive(Debug, Clone, Args)]
pub struct ProviderArgs {
    /// OpenWeather API key (required).
    #[arg(long, env = "OPENWEATHER_API_KEY", hide_env_values = true)]
    pub openweather_api_key: Option<String>,

    #[arg(long, env = "OPENWEATHER_BASE_URL", default_value = openweather::DEFAULT_BASE_URL)]
    pub openweather_base_url: String,

    /// OpenAI API key. AI routes answer 503 when absent.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = openai::DEFAULT_BASE_URL)]
    pub openai_base_url: String,

    #[arg(long, env = "OPENAI_SUMMARY_MODEL", default_value = "gpt-4o-mini")]
    pub summary_model: String,

    /// Defaults to the summary model.
    #[arg(long, env = "OPENAI_ALERTS_MODEL")]
    pub alerts_model: Option<String>,

    /// Defaults to the summary model.
    #[arg(long, env = "OPENAI_CHAT_MODEL")]
    pub chat_model: Option<String>,

    /// Language AI replies are written in.
    #[arg(long, env = "AI_REPLY_LANGUAGE", default_value = "Vietnamese")]
    pub language: String,

    /// Bound on each geocoding or weather fetch, in milliseconds.
    #[arg(long, env = "WEATHER_TIMEOUT_MS", default_value_t = 5_000)]
    pub weather_timeout_ms: u64,

    /// Bound on each AI completion, in milliseconds.
    #[arg(long, env = "AI_TIMEOUT_MS", default_value_t = 10_000)]
    pub ai_timeout_ms: u64,

    /// Freshness window for every route kind unless overridden below.
    #[arg(long, env = "CACHE_TTL_SECS", default_value_t = 90)]
    pub cache_ttl_secs: u64,

    #[arg(long, env = "GEOCODE_TTL_SECS")]
    pub geocode_ttl_secs: Option<u64>,

    #[arg(long, env = "WEATHER_TTL_SECS")]
    pub weather_ttl_secs: Option<u64>,

    #[arg(long, env = "AI_TTL_SECS")]
    pub ai_ttl_secs: Option<u64>,

    /// How often expired entries are swept, in seconds.
    #[arg(long, env = "CACHE_SWEEP_SECS", default_value_t = 60)]
    pub sweep_secs: u64,
}

/// Validated settings the orchestrator is built from.
#[derive(Debug, Clone)]
pub struct Settings {
    pub openweather_api_key: String,
    pub openweather_base_url: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub ai: AiSettings,
    pub timeouts: Timeouts,
    pub ttls: Ttls,
    pub sweep_interval: Duration,
}

impl ProviderArgs {
    pub fn into_settings(self) -> Result<Settings> {
        let openweather_api_key = non_blank(self.openweather_api_key).ok_or_else(|| {
            Error::Config("OPENWEATHER_API_KEY is not set. Add it to the environment or .env".into())
        })?;

        let summary_model = self.summary_model.trim().to_string();
        if summary_model.is_empty() {
            return Err(Error::Config("OPENAI_SUMMARY_MODEL must not be empty".into()));
        }
        let ai = AiSettings {
            alerts_model: non_blank(self.alerts_model).unwrap_or_else(|| summary_model.clone()),
            chat_model: non_blank(self.chat_model).unwrap_or_else(|| summary_model.clone()),
            summary_model,
            language: non_blank(Some(self.language)).unwrap_or_else(|| "Vietnamese".into()),
        };

        let ttl = |name: &str, secs: Option<u64>| positive(name, secs.unwrap_or(self.cache_ttl_secs))
            .map(Duration::from_secs);
        let ttls = Ttls {
            geocode: ttl("GEOCODE_TTL_SECS", self.geocode_ttl_secs)?,
            weather: ttl("WEATHER_TTL_SECS", self.weather_ttl_secs)?,
            ai: ttl("AI_TTL_SECS", self.ai_ttl_secs)?,
        };

        let timeouts = Timeouts {
            weather: Duration::from_millis(positive("WEATHER_TIMEOUT_MS", self.weather_timeout_ms)?),
            ai: Duration::from_millis(positive("AI_TIMEOUT_MS", self.ai_timeout_ms)?),
        };

        Ok(Settings {
            openweather_api_key,
            openweather_base_url: self.openweather_base_url,
            openai_api_key: non_blank(self.openai_api_key),
            openai_base_url: self.openai_base_url,
            ai,
            timeouts,
            ttls,
            sweep_interval: Duration::from_secs(positive("CACHE_SWEEP_SECS", self.sweep_secs)?),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn positive(name: &str, value: u64) -> Result<u64> {
    if value == 0 {
        return Err(Error::Config(format!("{} must be greater than zero", name)));
    }
    Ok(value)
}
