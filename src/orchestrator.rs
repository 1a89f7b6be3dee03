//! Cache-aside wrappers around every logical upstream operation.
//!
//! Each operation validates and normalizes its input into a [`CacheKey`],
//! then delegates to the matching [`FreshnessCache`] with a closure that runs
//! the blocking upstream client on the blocking pool. Errors pass through
//! unchanged and are never cached.

use crate::ai::{self, AiEnricher, AiOperation, AiReply, AiStatus};
use crate::cache::key::normalize_query;
use crate::cache::{CacheKey, CacheStats, FreshnessCache};
use crate::config::Settings;
use crate::error::{Error, Provider, Result, UpstreamError};
use crate::upstream::http::mask_key;
use crate::upstream::{
    CompletionProvider, Geocoder, Location, OpenAiClient, OpenWeatherClient, Units,
    WeatherSnapshot, WeatherSource,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Freshness window per route kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ttls {
    pub geocode: Duration,
    pub weather: Duration,
    pub ai: Duration,
}

impl Default for Ttls {
    fn default() -> Self {
        let ninety = Duration::from_secs(90);
        Self {
            geocode: ninety,
            weather: ninety,
            ai: ninety,
        }
    }
}

/// Upper bound on a single fetch, including time spent queued for a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub weather: Duration,
    pub ai: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            weather: Duration::from_secs(5),
            ai: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct OrchestratorStats {
    pub geocode: CacheStats,
    pub weather: CacheStats,
    pub ai: CacheStats,
}

/// Weather source plus its cache. Cloned into AI fetches so the snapshot is
/// only resolved when the AI cache misses.
#[derive(Clone)]
struct WeatherLane {
    source: Arc<dyn WeatherSource>,
    cache: FreshnessCache<WeatherSnapshot>,
    ttl: Duration,
}

impl WeatherLane {
    /// `location` must already be snapped to key precision.
    async fn get(&self, location: Location, units: Units) -> Result<Arc<WeatherSnapshot>, UpstreamError> {
        let key = CacheKey::weather(&location, units);
        let source = Arc::clone(&self.source);
        self.cache
            .get_or_fetch(key, self.ttl, move || {
                run_blocking(Provider::Weather, move || source.fetch(&location, units))
            })
            .await
    }
}

pub struct Orchestrator {
    geocoder: Arc<dyn Geocoder>,
    weather: WeatherLane,
    enricher: Arc<AiEnricher>,
    ttls: Ttls,
    geocode_cache: FreshnessCache<Location>,
    ai_cache: FreshnessCache<AiReply>,
}

impl Orchestrator {
    pub fn new(
        geocoder: Arc<dyn Geocoder>,
        weather: Arc<dyn WeatherSource>,
        enricher: AiEnricher,
        ttls: Ttls,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            geocoder,
            weather: WeatherLane {
                source: weather,
                cache: FreshnessCache::new(Provider::Weather, timeouts.weather),
                ttl: ttls.weather,
            },
            enricher: Arc::new(enricher),
            ttls,
            geocode_cache: FreshnessCache::new(Provider::Geocoding, timeouts.weather),
            ai_cache: FreshnessCache::new(Provider::Ai, timeouts.ai),
        }
    }

    /// Wire the real provider clients from resolved settings.
    pub fn from_settings(settings: &Settings) -> Self {
        let openweather = Arc::new(OpenWeatherClient::new(
            settings.openweather_api_key.clone(),
            settings.openweather_base_url.clone(),
            settings.timeouts.weather,
        ));

        let completion: Option<Arc<dyn CompletionProvider>> =
            settings.openai_api_key.as_ref().map(|key| {
                Arc::new(OpenAiClient::new(
                    key.clone(),
                    settings.openai_base_url.clone(),
                    settings.timeouts.ai,
                )) as Arc<dyn CompletionProvider>
            });
        let key_hint = mask_key(settings.openai_api_key.as_deref().unwrap_or(""));
        let enricher = AiEnricher::new(completion, settings.ai.clone()).with_key_hint(key_hint);

        info!(
            openweather_key = %mask_key(&settings.openweather_api_key),
            ai_enabled = enricher.is_enabled(),
            "upstream clients configured"
        );

        Self::new(
            openweather.clone(),
            openweather,
            enricher,
            settings.ttls,
            settings.timeouts,
        )
    }

    // ─── Operations ─────────────────────────────────────────────────────

    pub async fn geocode(&self, query: &str) -> Result<Arc<Location>> {
        // The provider sees the same spelling the key is built from, so the
        // cached name never depends on which caller fetched first.
        let query = normalize_query(query);
        if query.is_empty() {
            return Err(Error::validation("Missing 'query' parameter"));
        }

        let key = CacheKey::geocode(&query);
        let geocoder = Arc::clone(&self.geocoder);
        let location = self
            .geocode_cache
            .get_or_fetch(key, self.ttls.geocode, move || {
                run_blocking(Provider::Geocoding, move || geocoder.resolve(&query))
            })
            .await?;
        Ok(location)
    }

    /// Weather for a coordinate, fetched at cache-key precision.
    pub async fn weather(&self, location: &Location, units: Units) -> Result<Arc<WeatherSnapshot>> {
        Ok(self.weather.get(location.normalized(), units).await?)
    }

    pub async fn ai_insights(&self, location: &Location) -> Result<Arc<AiReply>> {
        self.enrich(location, AiOperation::Insights).await
    }

    pub async fn ai_alerts(&self, location: &Location) -> Result<Arc<AiReply>> {
        self.enrich(location, AiOperation::Alerts).await
    }

    pub async fn ai_ask(&self, location: &Location, question: &str) -> Result<Arc<AiReply>> {
        let question = ai::validate_question(question)?;
        self.enrich(location, AiOperation::Ask(question)).await
    }

    /// Disabled check first, then the AI cache. Only a miss resolves metric
    /// weather (through the weather cache) and runs the completion.
    async fn enrich(&self, location: &Location, op: AiOperation) -> Result<Arc<AiReply>> {
        let provider = self.enricher.ensure_enabled()?;
        let location = location.normalized();

        let key = match &op {
            AiOperation::Insights => CacheKey::ai_insights(&location),
            AiOperation::Alerts => CacheKey::ai_alerts(&location),
            AiOperation::Ask(question) => CacheKey::ai_ask(&location, question),
        };

        let enricher = Arc::clone(&self.enricher);
        let weather = self.weather.clone();
        let reply = self
            .ai_cache
            .get_or_fetch(key, self.ttls.ai, move || async move {
                let snapshot = weather.get(location, Units::Metric).await?;
                let request = enricher.prepare(&op, &snapshot);
                run_blocking(Provider::Ai, move || {
                    ai::complete_and_parse(provider.as_ref(), &op, &request)
                })
                .await
            })
            .await?;
        Ok(reply)
    }

    // ─── Introspection ──────────────────────────────────────────────────

    pub fn ai_status(&self) -> AiStatus {
        self.enricher.status()
    }

    pub fn stats(&self) -> OrchestratorStats {
        OrchestratorStats {
            geocode: self.geocode_cache.stats(),
            weather: self.weather.cache.stats(),
            ai: self.ai_cache.stats(),
        }
    }

    /// One expiry sweeper per cache.
    pub fn spawn_sweepers(&self, every: Duration) -> Vec<JoinHandle<()>> {
        vec![
            self.geocode_cache.spawn_sweeper(every),
            self.weather.cache.spawn_sweeper(every),
            self.ai_cache.spawn_sweeper(every),
        ]
    }
}

/// Run a blocking client call on the blocking pool.
async fn run_blocking<T, F>(provider: Provider, call: F) -> Result<T, UpstreamError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, UpstreamError> + Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| UpstreamError::unavailable(provider, format!("worker failed: {}", e)))?
}
