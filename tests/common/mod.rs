//! In-memory providers and request helpers shared by the route tests.

#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use weather_agent::ai::{AiEnricher, AiSettings};
use weather_agent::error::UpstreamError;
use weather_agent::orchestrator::{Orchestrator, Timeouts, Ttls};
use weather_agent::server::{build_router, AppState};
use weather_agent::upstream::{
    Completion, CompletionProvider, CompletionRequest, Condition, CurrentConditions, Geocoder,
    HourlyForecast, Location, Units, WeatherSnapshot, WeatherSource,
};

const BODY_LIMIT: usize = 1_048_576;

/// Counts every upstream call. The first weather call can be made slow.
#[derive(Default)]
pub struct FakeUpstream {
    pub geocode_calls: AtomicUsize,
    pub weather_calls: AtomicUsize,
    pub completion_calls: AtomicUsize,
    pub first_weather_delay: Option<Duration>,
    pub completion_text: Mutex<String>,
}

impl FakeUpstream {
    pub fn geocodes(&self) -> usize {
        self.geocode_calls.load(Ordering::SeqCst)
    }

    pub fn weathers(&self) -> usize {
        self.weather_calls.load(Ordering::SeqCst)
    }

    pub fn completions(&self) -> usize {
        self.completion_calls.load(Ordering::SeqCst)
    }
}

impl Geocoder for FakeUpstream {
    fn resolve(&self, query: &str) -> Result<Location, UpstreamError> {
        self.geocode_calls.fetch_add(1, Ordering::SeqCst);
        if query.eq_ignore_ascii_case("nowhere") {
            return Err(UpstreamError::NotFound(query.to_string()));
        }
        Ok(Location {
            lat: 21.0278,
            lon: 105.8342,
            name: Some("Hanoi, VN".into()),
        })
    }
}

impl WeatherSource for FakeUpstream {
    fn fetch(&self, location: &Location, units: Units) -> Result<WeatherSnapshot, UpstreamError> {
        let call = self.weather_calls.fetch_add(1, Ordering::SeqCst);
        if call == 0 {
            if let Some(delay) = self.first_weather_delay {
                std::thread::sleep(delay);
            }
        }
        Ok(WeatherSnapshot {
            location: location.clone(),
            current: CurrentConditions {
                temp: Some(31.0),
                humidity: Some(70.0),
                ..Default::default()
            },
            hourly: (0..3)
                .map(|i| HourlyForecast {
                    dt: 1_700_000_000 + i * 3600,
                    temp: Some(30.0 - i as f64),
                    feels_like: None,
                    humidity: None,
                    wind_speed: Some(3.0),
                    pop: 0.2,
                    weather: Condition::default(),
                })
                .collect(),
            daily: Vec::new(),
            provider: "fake".into(),
            units,
            timezone: Some("Asia/Bangkok".into()),
            fetched_at: Utc::now(),
        })
    }
}

impl CompletionProvider for FakeUpstream {
    fn complete(&self, request: &CompletionRequest) -> Result<Completion, UpstreamError> {
        self.completion_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Completion {
            content: self.completion_text.lock().clone(),
            model: request.model.clone(),
        })
    }
}

pub fn router(fake: Arc<FakeUpstream>, ai_enabled: bool, timeouts: Timeouts) -> Router {
    let provider = ai_enabled.then(|| fake.clone() as Arc<dyn CompletionProvider>);
    let orchestrator = Orchestrator::new(
        fake.clone(),
        fake,
        AiEnricher::new(provider, AiSettings::default()),
        Ttls::default(),
        timeouts,
    );
    build_router(Arc::new(AppState::new(orchestrator)))
}

pub async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("parse json")
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).expect("request");
    let response = app.clone().oneshot(request).await.expect("router call");
    let status = response.status();
    (status, json_body(response).await)
}

pub async fn post_json(app: &Router, uri: &str, body: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("router call");
    let status = response.status();
    (status, json_body(response).await)
}
