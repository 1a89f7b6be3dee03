use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::ai::{AiReply, AiStatus};
use crate::error::{Error, UpstreamError};
use crate::orchestrator::OrchestratorStats;
use crate::upstream::{Location, Units, WeatherSnapshot};

use super::state::AppState;

// ─── Error response ──────────────────────────────────────────────

#[derive(Serialize)]
struct ApiErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<&'static str>,
}

/// The single place a crate [`Error`] becomes an HTTP status and JSON body.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Upstream(UpstreamError::NotFound(_)) => StatusCode::NOT_FOUND,
            Error::Upstream(UpstreamError::RateLimited { .. }) => StatusCode::TOO_MANY_REQUESTS,
            Error::Upstream(_) => StatusCode::BAD_GATEWAY,
            Error::AiDisabled(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match &self.0 {
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Upstream(upstream) => upstream.code(),
            Error::AiDisabled(_) => "OPENAI_DISABLED",
            Error::Config(_) => "CONFIG_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let hint = match &self.0 {
            Error::AiDisabled(_) => {
                Some("Set OPENAI_API_KEY in the environment or .env and restart the server.")
            }
            _ => None,
        };
        let body = ApiErrorBody {
            error: self.code(),
            message: self.0.to_string(),
            hint,
        };

        let mut response = (status, Json(body)).into_response();
        if let Error::Upstream(UpstreamError::RateLimited {
            retry_after_secs: Some(secs),
            ..
        }) = &self.0
        {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ─── GET /healthz ────────────────────────────────────────────────

#[derive(Serialize)]
pub struct Health {
    status: &'static str,
    uptime_secs: u64,
    ai_enabled: bool,
}

pub async fn healthz(State(state): State<Arc<AppState>>) -> Json<Health> {
    Json(Health {
        status: "ok",
        uptime_secs: state.started_at.elapsed().as_secs(),
        ai_enabled: state.orchestrator.ai_status().enabled,
    })
}

// ─── GET /api/geocode ────────────────────────────────────────────

#[derive(Deserialize)]
pub struct GeocodeQuery {
    pub query: Option<String>,
}

pub async fn geocode(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GeocodeQuery>,
) -> ApiResult<Arc<Location>> {
    let query = params.query.unwrap_or_default();
    Ok(Json(state.orchestrator.geocode(&query).await?))
}

// ─── GET /api/weather ────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CoordsQuery {
    pub lat: Option<String>,
    pub lon: Option<String>,
    pub units: Option<String>,
}

pub async fn weather(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CoordsQuery>,
) -> ApiResult<Arc<WeatherSnapshot>> {
    let location = parse_location(params.lat.as_deref(), params.lon.as_deref())?;
    let units = Units::parse_or_default(params.units.as_deref());
    Ok(Json(state.orchestrator.weather(&location, units).await?))
}

// ─── GET /api/ai/* ───────────────────────────────────────────────

pub async fn ai_insights(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CoordsQuery>,
) -> ApiResult<Arc<AiReply>> {
    let location = parse_location(params.lat.as_deref(), params.lon.as_deref())?;
    Ok(Json(state.orchestrator.ai_insights(&location).await?))
}

pub async fn ai_alerts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CoordsQuery>,
) -> ApiResult<Arc<AiReply>> {
    let location = parse_location(params.lat.as_deref(), params.lon.as_deref())?;
    Ok(Json(state.orchestrator.ai_alerts(&location).await?))
}

pub async fn ai_status(State(state): State<Arc<AppState>>) -> Json<AiStatus> {
    Json(state.orchestrator.ai_status())
}

// ─── POST /api/ai/ask ────────────────────────────────────────────

/// `lat`/`lon` may arrive as JSON numbers or numeric strings.
#[derive(Deserialize)]
pub struct AskBody {
    pub question: Option<String>,
    pub lat: Option<Value>,
    pub lon: Option<Value>,
}

pub async fn ai_ask(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AskBody>, JsonRejection>,
) -> ApiResult<Arc<AiReply>> {
    let Json(body) =
        body.map_err(|e| Error::validation(format!("Invalid JSON body: {}", e.body_text())))?;

    let lat = body.lat.as_ref().map(coordinate_text);
    let lon = body.lon.as_ref().map(coordinate_text);
    let location = parse_location(lat.as_deref(), lon.as_deref())?;
    let question = body.question.unwrap_or_default();
    Ok(Json(state.orchestrator.ai_ask(&location, &question).await?))
}

// ─── GET /api/cache/stats ────────────────────────────────────────

pub async fn cache_stats(State(state): State<Arc<AppState>>) -> Json<OrchestratorStats> {
    Json(state.orchestrator.stats())
}

// ─── Helpers ─────────────────────────────────────────────────────

fn coordinate_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_location(lat: Option<&str>, lon: Option<&str>) -> Result<Location, Error> {
    let (Some(lat), Some(lon)) = (non_empty(lat), non_empty(lon)) else {
        return Err(Error::validation("Missing 'lat'/'lon' parameters"));
    };
    let lat: f64 = lat
        .parse()
        .map_err(|_| Error::validation(format!("Invalid latitude '{}'", lat)))?;
    let lon: f64 = lon
        .parse()
        .map_err(|_| Error::validation(format!("Invalid longitude '{}'", lon)))?;
    Location::new(lat, lon)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
