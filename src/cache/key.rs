//! Cache key derivation.
//!
//! Coordinates are snapped to [`COORD_PRECISION`] decimal places (about 11 m),
//! free-text queries are trimmed, lower-cased and whitespace-collapsed.
//! The route kind is part of every key, so keys never collide across kinds.

use crate::upstream::{Location, Units};
use serde::Serialize;
use std::fmt;

pub const COORD_PRECISION: i32 = 4;

/// Which logical operation a cached value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteKind {
    Geocode,
    Weather,
    AiInsights,
    AiAlerts,
    AiAsk,
}

impl RouteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Geocode => "geocode",
            Self::Weather => "weather",
            Self::AiInsights => "ai-insights",
            Self::AiAlerts => "ai-alerts",
            Self::AiAsk => "ai-ask",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    kind: RouteKind,
    fingerprint: String,
}

impl CacheKey {
    pub fn geocode(query: &str) -> Self {
        Self {
            kind: RouteKind::Geocode,
            fingerprint: normalize_query(query),
        }
    }

    pub fn weather(location: &Location, units: Units) -> Self {
        Self {
            kind: RouteKind::Weather,
            fingerprint: format!("{}:{}", units, coords(location)),
        }
    }

    pub fn ai_insights(location: &Location) -> Self {
        Self {
            kind: RouteKind::AiInsights,
            fingerprint: coords(location),
        }
    }

    pub fn ai_alerts(location: &Location) -> Self {
        Self {
            kind: RouteKind::AiAlerts,
            fingerprint: coords(location),
        }
    }

    /// The question is folded in verbatim (trimmed only): two questions that
    /// differ in any character are never coalesced.
    pub fn ai_ask(location: &Location, question: &str) -> Self {
        Self {
            kind: RouteKind::AiAsk,
            fingerprint: format!("{}:{}", coords(location), question.trim()),
        }
    }

    pub fn kind(&self) -> RouteKind {
        self.kind
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.fingerprint)
    }
}

/// Snap a coordinate to key precision. Negative zero collapses to zero so
/// that -0.00001 and 0.00001 share a key.
pub fn round_coord(value: f64) -> f64 {
    let scale = 10f64.powi(COORD_PRECISION);
    (value * scale).round() / scale + 0.0
}

fn coords(location: &Location) -> String {
    format!(
        "{:.prec$}:{:.prec$}",
        round_coord(location.lat),
        round_coord(location.lon),
        prec = COORD_PRECISION as usize
    )
}

/// Trim, collapse inner whitespace and lower-case a free-text query.
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
