//! OpenWeather provider: direct geocoding and One Call weather.

use super::http;
use super::types::{
    Condition, CurrentConditions, DailyForecast, DailyTemperature, HourlyForecast, Location,
    Units, WeatherSnapshot, DAILY_LIMIT, HOURLY_LIMIT,
};
use super::{Geocoder, WeatherSource};
use crate::error::{Provider, UpstreamError};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";

/// One Call endpoints, newest first. 3.0 needs a separate subscription, so
/// keys without it are retried against 2.5.
const ONE_CALL_PATHS: &[&str] = &["/data/3.0/onecall", "/data/2.5/onecall"];

#[derive(Clone)]
pub struct OpenWeatherClient {
    agent: ureq::Agent,
    /// Per-attempt share of the weather budget, so a stalled 3.0 request
    /// leaves time for the 2.5 fallback.
    attempt_timeout: Duration,
    base_url: String,
    api_key: String,
}

impl OpenWeatherClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            agent: http::agent(timeout),
            attempt_timeout: timeout / ONE_CALL_PATHS.len() as u32,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }
}

// ─── Geocoding ───────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct GeocodeResult {
    lat: f64,
    lon: f64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

/// "Hanoi, VN" style label from the non-empty parts, or the query itself.
fn display_name(result: &GeocodeResult, query: &str) -> String {
    let parts: Vec<&str> = [&result.name, &result.state, &result.country]
        .into_iter()
        .filter_map(|p| p.as_deref())
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if parts.is_empty() {
        query.to_string()
    } else {
        parts.join(", ")
    }
}

impl Geocoder for OpenWeatherClient {
    fn resolve(&self, query: &str) -> Result<Location, UpstreamError> {
        let url = format!("{}/geo/1.0/direct", self.base_url);
        debug!(query, "calling OpenWeather geocoding");

        let response = self
            .agent
            .get(&url)
            .query("q", query)
            .query("limit", "1")
            .query("appid", &self.api_key)
            .call()
            .map_err(|e| match http::classify(Provider::Geocoding, e) {
                UpstreamError::NotFound(_) => UpstreamError::NotFound(query.to_string()),
                other => other,
            })?;

        let results: Vec<GeocodeResult> = http::decode(Provider::Geocoding, response)?;
        let top = results
            .first()
            .ok_or_else(|| UpstreamError::NotFound(query.to_string()))?;

        let name = display_name(top, query);
        let location = Location::new(top.lat, top.lon).map_err(|_| {
            UpstreamError::bad_response(
                Provider::Geocoding,
                format!("coordinates out of range: {}, {}", top.lat, top.lon),
            )
        })?;
        info!(query, name = %name, "geocoded");
        Ok(location.with_name(name))
    }
}

// ─── One Call weather ────────────────────────────────────────────

#[derive(Deserialize, Debug, Default)]
struct RawCondition {
    main: Option<String>,
    description: Option<String>,
    icon: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct RawCurrent {
    dt: Option<i64>,
    sunrise: Option<i64>,
    sunset: Option<i64>,
    temp: Option<f64>,
    feels_like: Option<f64>,
    humidity: Option<f64>,
    wind_speed: Option<f64>,
    uvi: Option<f64>,
    pressure: Option<f64>,
    visibility: Option<f64>,
    #[serde(default)]
    weather: Vec<RawCondition>,
}

#[derive(Deserialize, Debug)]
struct RawHourly {
    dt: i64,
    temp: Option<f64>,
    feels_like: Option<f64>,
    humidity: Option<f64>,
    wind_speed: Option<f64>,
    #[serde(default)]
    pop: f64,
    #[serde(default)]
    weather: Vec<RawCondition>,
}

#[derive(Deserialize, Debug)]
struct RawDaily {
    dt: i64,
    #[serde(default)]
    temp: DailyTemperature,
    #[serde(default)]
    feels_like: DailyTemperature,
    humidity: Option<f64>,
    wind_speed: Option<f64>,
    #[serde(default)]
    pop: f64,
    #[serde(default)]
    weather: Vec<RawCondition>,
}

#[derive(Deserialize, Debug)]
struct OneCallResponse {
    #[serde(default)]
    timezone: Option<String>,
    #[serde(default)]
    current: RawCurrent,
    #[serde(default)]
    hourly: Vec<RawHourly>,
    #[serde(default)]
    daily: Vec<RawDaily>,
}

fn first_condition(items: Vec<RawCondition>) -> Condition {
    items
        .into_iter()
        .next()
        .map(|c| Condition {
            main: c.main,
            description: c.description,
            icon: c.icon,
        })
        .unwrap_or_default()
}

fn normalize(raw: OneCallResponse, location: &Location, units: Units) -> WeatherSnapshot {
    let current = CurrentConditions {
        dt: raw.current.dt,
        sunrise: raw.current.sunrise,
        sunset: raw.current.sunset,
        temp: raw.current.temp,
        feels_like: raw.current.feels_like,
        humidity: raw.current.humidity,
        wind_speed: raw.current.wind_speed,
        uvi: raw.current.uvi,
        pressure: raw.current.pressure,
        visibility: raw.current.visibility,
        weather: first_condition(raw.current.weather),
    };

    let mut hourly = raw.hourly;
    hourly.sort_by_key(|h| h.dt);
    let hourly = hourly
        .into_iter()
        .take(HOURLY_LIMIT)
        .map(|h| HourlyForecast {
            dt: h.dt,
            temp: h.temp,
            feels_like: h.feels_like,
            humidity: h.humidity,
            wind_speed: h.wind_speed,
            pop: h.pop,
            weather: first_condition(h.weather),
        })
        .collect();

    let mut daily = raw.daily;
    daily.sort_by_key(|d| d.dt);
    let daily = daily
        .into_iter()
        .take(DAILY_LIMIT)
        .map(|d| DailyForecast {
            dt: d.dt,
            temp: d.temp,
            feels_like: d.feels_like,
            humidity: d.humidity,
            wind_speed: d.wind_speed,
            pop: d.pop,
            weather: first_condition(d.weather),
        })
        .collect();

    let name = location
        .name
        .clone()
        .unwrap_or_else(|| location.coords_label());

    WeatherSnapshot {
        location: Location {
            name: Some(name),
            ..location.clone()
        },
        current,
        hourly,
        daily,
        provider: "openweather".into(),
        units,
        timezone: raw.timezone,
        fetched_at: chrono::Utc::now(),
    }
}

impl OpenWeatherClient {
    fn one_call(&self, location: &Location, units: Units) -> Result<OneCallResponse, UpstreamError> {
        let mut last_error = None;

        for (i, path) in ONE_CALL_PATHS.iter().enumerate() {
            let is_last = i + 1 == ONE_CALL_PATHS.len();
            let url = format!("{}{}", self.base_url, path);
            debug!(path, lat = location.lat, lon = location.lon, "requesting weather");

            let result = self
                .agent
                .get(&url)
                .timeout(self.attempt_timeout)
                .query("lat", &location.lat.to_string())
                .query("lon", &location.lon.to_string())
                .query("units", units.as_str())
                .query("exclude", "minutely,alerts")
                .query("appid", &self.api_key)
                .call();

            match result {
                Ok(response) => return http::decode(Provider::Weather, response),
                Err(ureq::Error::Status(code @ (401 | 403 | 404), _)) if !is_last => {
                    info!(path, status = code, "weather endpoint refused, trying fallback");
                    last_error = Some(UpstreamError::bad_response(
                        Provider::Weather,
                        format!("status {} from {}", code, path),
                    ));
                }
                Err(ureq::Error::Transport(t)) if !is_last => {
                    warn!(path, error = %t, "weather request failed, trying fallback");
                    last_error = Some(UpstreamError::unavailable(Provider::Weather, t.to_string()));
                }
                Err(e) => {
                    return Err(match http::classify(Provider::Weather, e) {
                        UpstreamError::NotFound(_) => UpstreamError::bad_response(
                            Provider::Weather,
                            format!("endpoint {} not found", path),
                        ),
                        other => other,
                    })
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| UpstreamError::unavailable(Provider::Weather, "no endpoint answered")))
    }
}

impl WeatherSource for OpenWeatherClient {
    fn fetch(&self, location: &Location, units: Units) -> Result<WeatherSnapshot, UpstreamError> {
        let raw = self.one_call(location, units)?;
        Ok(normalize(raw, location, units))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> OpenWeatherClient {
        OpenWeatherClient::new("ow-key", server.uri(), Duration::from_secs(2))
    }

    async fn blocking<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
        tokio::task::spawn_blocking(f).await.unwrap()
    }

    fn hanoi() -> Location {
        Location::new(21.0278, 105.8342).unwrap()
    }

    #[tokio::test]
    async fn test_geocode_joins_name_parts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/geo/1.0/direct"))
            .and(query_param("q", "Hanoi"))
            .and(query_param("appid", "ow-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "Hanoi", "state": "", "country": "VN", "lat": 21.0285, "lon": 105.8542}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let c = client(&server);
        let loc = blocking(move || c.resolve("Hanoi")).await.unwrap();
        assert_eq!(loc.name.as_deref(), Some("Hanoi, VN"));
        approx::assert_abs_diff_eq!(loc.lat, 21.0285, epsilon = 1e-9);
    }

    #[tokio::test]
    async fn test_geocode_empty_result_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(path("/geo/1.0/direct"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let c = client(&server);
        let err = blocking(move || c.resolve("Atlantis")).await.unwrap_err();
        assert_eq!(err, UpstreamError::NotFound("Atlantis".into()));
    }

    #[tokio::test]
    async fn test_geocode_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(path("/geo/1.0/direct"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "12"))
            .mount(&server)
            .await;

        let c = client(&server);
        let err = blocking(move || c.resolve("Hue")).await.unwrap_err();
        assert_eq!(
            err,
            UpstreamError::RateLimited {
                provider: Provider::Geocoding,
                retry_after_secs: Some(12)
            }
        );
    }

    #[tokio::test]
    async fn test_geocode_malformed_payload() {
        let server = MockServer::start().await;
        Mock::given(path("/geo/1.0/direct"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let c = client(&server);
        let err = blocking(move || c.resolve("Hue")).await.unwrap_err();
        assert!(matches!(err, UpstreamError::BadResponse { provider: Provider::Geocoding, .. }));
    }

    fn one_call_body() -> serde_json::Value {
        let hourly: Vec<_> = (0..48)
            .rev()
            .map(|i| json!({"dt": 1_700_000_000 + i * 3600, "temp": 20.0 + i as f64, "pop": 0.1,
                            "weather": [{"main": "Clouds", "description": "overcast", "icon": "04d"}]}))
            .collect();
        let daily: Vec<_> = (0..8)
            .map(|i| json!({"dt": 1_700_000_000 + i * 86400,
                            "temp": {"day": 25.0, "min": 19.0, "max": 29.0, "night": 20.0},
                            "feels_like": {"day": 26.0}, "humidity": 70}))
            .collect();
        json!({
            "timezone": "Asia/Bangkok",
            "current": {"dt": 1_700_000_000, "temp": 24.5, "humidity": 80, "wind_speed": 2.1,
                        "weather": [{"main": "Rain", "description": "light rain", "icon": "10d"}]},
            "hourly": hourly,
            "daily": daily,
        })
    }

    #[tokio::test]
    async fn test_weather_normalizes_and_truncates() {
        let server = MockServer::start().await;
        Mock::given(path("/data/3.0/onecall"))
            .and(query_param("units", "metric"))
            .and(query_param("exclude", "minutely,alerts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(one_call_body()))
            .expect(1)
            .mount(&server)
            .await;

        let c = client(&server);
        let snap = blocking(move || c.fetch(&hanoi(), Units::Metric)).await.unwrap();

        assert_eq!(snap.hourly.len(), HOURLY_LIMIT);
        assert_eq!(snap.daily.len(), DAILY_LIMIT);
        assert!(snap.hourly.windows(2).all(|w| w[0].dt < w[1].dt));
        assert_eq!(snap.hourly[0].dt, 1_700_000_000);
        assert_eq!(snap.current.weather.main.as_deref(), Some("Rain"));
        assert_eq!(snap.location.name.as_deref(), Some("21.03, 105.83"));
        assert_eq!(snap.timezone.as_deref(), Some("Asia/Bangkok"));
        assert_eq!(snap.daily[0].temp.max, Some(29.0));
        assert_eq!(snap.daily[0].feels_like.min, None);
        assert_eq!(snap.provider, "openweather");
    }

    #[tokio::test]
    async fn test_weather_falls_back_to_legacy_endpoint() {
        let server = MockServer::start().await;
        Mock::given(path("/data/3.0/onecall"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/data/2.5/onecall"))
            .respond_with(ResponseTemplate::new(200).set_body_json(one_call_body()))
            .expect(1)
            .mount(&server)
            .await;

        let c = client(&server);
        let snap = blocking(move || c.fetch(&hanoi(), Units::Imperial)).await.unwrap();
        assert_eq!(snap.units, Units::Imperial);
    }

    #[tokio::test]
    async fn test_weather_server_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(path("/data/3.0/onecall"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let c = client(&server);
        let err = blocking(move || c.fetch(&hanoi(), Units::Metric)).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Unavailable { provider: Provider::Weather, .. }));
        assert!(err.to_string().contains("maintenance"));
    }

    #[tokio::test]
    async fn test_weather_slow_provider_times_out() {
        let server = MockServer::start().await;
        Mock::given(path("/data/3.0/onecall"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(one_call_body())
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;
        Mock::given(path("/data/2.5/onecall"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(one_call_body())
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let c = OpenWeatherClient::new("ow-key", server.uri(), Duration::from_millis(200));
        let err = blocking(move || c.fetch(&hanoi(), Units::Metric)).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_weather_stalled_primary_leaves_time_for_fallback() {
        let server = MockServer::start().await;
        Mock::given(path("/data/3.0/onecall"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(one_call_body())
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;
        Mock::given(path("/data/2.5/onecall"))
            .respond_with(ResponseTemplate::new(200).set_body_json(one_call_body()))
            .expect(1)
            .mount(&server)
            .await;

        let budget = Duration::from_millis(800);
        let c = OpenWeatherClient::new("ow-key", server.uri(), budget);
        let started = std::time::Instant::now();
        let snap = blocking(move || c.fetch(&hanoi(), Units::Metric)).await.unwrap();
        assert_eq!(snap.provider, "openweather");
        assert!(started.elapsed() < budget, "fallback finished in {:?}", started.elapsed());
    }

    #[test]
    fn test_display_name_falls_back_to_query() {
        let r = GeocodeResult {
            lat: 0.0,
            lon: 0.0,
            name: None,
            state: Some(" ".into()),
            country: None,
        };
        assert_eq!(display_name(&r, "somewhere"), "somewhere");
    }
}
