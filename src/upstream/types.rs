//! Core types shared by the upstream clients, the cache and the routes.

use crate::cache::key::round_coord;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A validated coordinate pair, optionally named.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Location {
    /// Build a location, rejecting non-finite or out-of-range coordinates.
    pub fn new(lat: f64, lon: f64) -> Result<Self> {
        if !lat.is_finite() || !lon.is_finite() {
            return Err(Error::validation("Coordinates must be finite numbers"));
        }
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(Error::validation(
                "Invalid coordinates. Lat: -90..90, Lon: -180..180",
            ));
        }
        Ok(Self {
            lat,
            lon,
            name: None,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The same place snapped to cache-key precision. Fetching with the
    /// snapped coordinates keeps the cached payload consistent with its key.
    pub fn normalized(&self) -> Self {
        Self {
            lat: round_coord(self.lat),
            lon: round_coord(self.lon),
            name: self.name.clone(),
        }
    }

    /// Fallback display label, e.g. "21.03, 105.83".
    pub fn coords_label(&self) -> String {
        format!("{:.2}, {:.2}", self.lat, self.lon)
    }
}

/// Unit system requested from the weather provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric,
    Imperial,
    Standard,
}

impl Units {
    /// Lenient parse: anything unrecognised falls back to metric.
    pub fn parse_or_default(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_lowercase()).as_deref() {
            Some("imperial") => Self::Imperial,
            Some("standard") => Self::Standard,
            _ => Self::Metric,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metric => "metric",
            Self::Imperial => "imperial",
            Self::Standard => "standard",
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Short condition description (first entry of the provider's list).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub main: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub dt: Option<i64>,
    pub sunrise: Option<i64>,
    pub sunset: Option<i64>,
    pub temp: Option<f64>,
    pub feels_like: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub uvi: Option<f64>,
    pub pressure: Option<f64>,
    pub visibility: Option<f64>,
    pub weather: Condition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyForecast {
    pub dt: i64,
    pub temp: Option<f64>,
    pub feels_like: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    /// Probability of precipitation, 0..1.
    pub pop: f64,
    pub weather: Condition,
}

/// Per-period daily temperatures. `min`/`max` are absent for feels-like.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyTemperature {
    #[serde(default)]
    pub day: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default)]
    pub night: Option<f64>,
    #[serde(default)]
    pub eve: Option<f64>,
    #[serde(default)]
    pub morn: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    pub dt: i64,
    pub temp: DailyTemperature,
    pub feels_like: DailyTemperature,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub pop: f64,
    pub weather: Condition,
}

/// Current conditions plus forecasts for one location.
///
/// `hourly` and `daily` are chronological and truncated to
/// [`HOURLY_LIMIT`] / [`DAILY_LIMIT`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub location: Location,
    pub current: CurrentConditions,
    pub hourly: Vec<HourlyForecast>,
    pub daily: Vec<DailyForecast>,
    pub provider: String,
    pub units: Units,
    /// IANA zone reported by the provider (e.g. "Asia/Bangkok").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

pub const HOURLY_LIMIT: usize = 12;
pub const DAILY_LIMIT: usize = 7;
