//! Error taxonomy shared by the upstream clients, the cache and the routes.
//!
//! Upstream clients only ever produce [`UpstreamError`]. The orchestrator wraps
//! those in [`Error`] untouched, and the route layer is the single place that
//! turns an [`Error`] into an HTTP status.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Which external dependency an upstream error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Geocoding,
    Weather,
    Ai,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Geocoding => write!(f, "OpenWeather geocoding"),
            Self::Weather => write!(f, "OpenWeather"),
            Self::Ai => write!(f, "OpenAI"),
        }
    }
}

/// A classified upstream failure.
///
/// Clonable because one failed fetch is handed to every caller that was
/// waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    #[error("{provider} is unavailable: {detail}")]
    Unavailable { provider: Provider, detail: String },

    #[error("{provider} rate limited the request")]
    RateLimited {
        provider: Provider,
        retry_after_secs: Option<u64>,
    },

    #[error("{provider} returned an unusable response: {detail}")]
    BadResponse { provider: Provider, detail: String },

    #[error("No location found for '{0}'")]
    NotFound(String),
}

impl UpstreamError {
    pub fn unavailable(provider: Provider, detail: impl Into<String>) -> Self {
        Self::Unavailable {
            provider,
            detail: detail.into(),
        }
    }

    pub fn bad_response(provider: Provider, detail: impl Into<String>) -> Self {
        Self::BadResponse {
            provider,
            detail: detail.into(),
        }
    }

    pub fn timed_out(provider: Provider, after: Duration) -> Self {
        Self::unavailable(provider, format!("timed out after {} ms", after.as_millis()))
    }

    /// Stable machine-readable code used in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unavailable { .. } => "UPSTREAM_UNAVAILABLE",
            Self::RateLimited { .. } => "UPSTREAM_RATE_LIMITED",
            Self::BadResponse { .. } => "UPSTREAM_BAD_RESPONSE",
            Self::NotFound(_) => "NOT_FOUND",
        }
    }
}

/// Crate-level error returned by the orchestrator and configuration code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// No AI credential configured. Raised locally, before any provider call.
    #[error("AI features are disabled: {0}")]
    AiDisabled(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
