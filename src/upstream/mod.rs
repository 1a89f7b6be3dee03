//! Upstream provider clients.
//!
//! Each capability sits behind a small blocking trait so the orchestrator can
//! be exercised with in-memory fakes. Implementations never retry and always
//! return a classified [`UpstreamError`].

pub mod http;
pub mod openai;
pub mod openweather;
pub mod types;

pub use openai::OpenAiClient;
pub use openweather::OpenWeatherClient;
pub use types::{
    Condition, CurrentConditions, DailyForecast, DailyTemperature, HourlyForecast, Location,
    Units, WeatherSnapshot, DAILY_LIMIT, HOURLY_LIMIT,
};

use crate::error::UpstreamError;

/// Resolve free text into a named location.
pub trait Geocoder: Send + Sync {
    fn resolve(&self, query: &str) -> Result<Location, UpstreamError>;
}

/// Current conditions plus hourly and daily forecasts for a coordinate.
pub trait WeatherSource: Send + Sync {
    fn fetch(&self, location: &Location, units: Units) -> Result<WeatherSnapshot, UpstreamError>;
}

/// A single model completion.
pub trait CompletionProvider: Send + Sync {
    fn complete(&self, request: &CompletionRequest) -> Result<Completion, UpstreamError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    pub temperature: f32,
    /// Ask the provider for a JSON object response.
    pub json_output: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    /// Model that actually served the request.
    pub model: String,
}
