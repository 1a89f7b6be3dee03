//! AI enrichment of weather snapshots.
//!
//! The enricher owns the (optional) completion provider. Without a credential
//! every operation fails locally with [`Error::AiDisabled`] before any weather
//! or provider call is made. With one, an operation moves through three steps:
//! [`AiEnricher::prepare`] builds a deterministic request from the snapshot,
//! the provider completes it, and [`complete_and_parse`] turns the text into
//! an [`AiReply`].

pub mod alerts;
pub mod prompts;

pub use alerts::{parse_alerts, AlertAnalysis, Risk, RiskKind, Severity};

use crate::error::{Error, Provider, Result, UpstreamError};
use crate::upstream::{CompletionProvider, CompletionRequest, WeatherSnapshot};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

const TEMPERATURE: f32 = 0.3;

/// Maximum accepted question length, in characters.
pub const QUESTION_MAX_CHARS: usize = 500;

// ─── Settings ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiSettings {
    pub summary_model: String,
    pub alerts_model: String,
    pub chat_model: String,
    /// Natural language the model is asked to reply in.
    pub language: String,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            summary_model: "gpt-4o-mini".into(),
            alerts_model: "gpt-4o-mini".into(),
            chat_model: "gpt-4o-mini".into(),
            language: "Vietnamese".into(),
        }
    }
}

// ─── Results ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiOperation {
    Insights,
    Alerts,
    /// Free-form question about the snapshot.
    Ask(String),
}

impl AiOperation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Insights => "insights",
            Self::Alerts => "alerts",
            Self::Ask(_) => "ask",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AiResult {
    Insights { summary: String },
    Alerts { analysis: AlertAnalysis },
    Answer { answer: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AiMeta {
    pub model: String,
    pub took_ms: u64,
    pub trace_id: String,
}

/// Result body plus call metadata, flattened into one JSON object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AiReply {
    #[serde(flatten)]
    pub result: AiResult,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub meta: Option<AiMeta>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AiModels {
    pub summary: String,
    pub alerts: String,
    pub chat: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AiStatus {
    pub enabled: bool,
    pub models: AiModels,
    /// Masked credential, e.g. "****abcd".
    pub key: String,
}

// ─── Enricher ───────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AiEnricher {
    provider: Option<Arc<dyn CompletionProvider>>,
    settings: AiSettings,
    key_hint: String,
}

impl AiEnricher {
    pub fn new(provider: Option<Arc<dyn CompletionProvider>>, settings: AiSettings) -> Self {
        Self {
            provider,
            settings,
            key_hint: "(not set)".into(),
        }
    }

    /// Masked credential reported by [`AiEnricher::status`].
    pub fn with_key_hint(mut self, hint: impl Into<String>) -> Self {
        self.key_hint = hint.into();
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    /// The provider, or the disabled sentinel. Never touches the network.
    pub fn ensure_enabled(&self) -> Result<Arc<dyn CompletionProvider>> {
        self.provider
            .clone()
            .ok_or_else(|| Error::AiDisabled("OPENAI_API_KEY is not set".into()))
    }

    pub fn status(&self) -> AiStatus {
        AiStatus {
            enabled: self.is_enabled(),
            models: AiModels {
                summary: self.settings.summary_model.clone(),
                alerts: self.settings.alerts_model.clone(),
                chat: self.settings.chat_model.clone(),
            },
            key: self.key_hint.clone(),
        }
    }

    /// Build the completion request for `op`. Same snapshot and operation
    /// always yield the same request.
    pub fn prepare(&self, op: &AiOperation, snapshot: &WeatherSnapshot) -> CompletionRequest {
        let context = prompts::context_json(snapshot);
        let language = &self.settings.language;
        let (model, system, user) = match op {
            AiOperation::Insights => (
                &self.settings.summary_model,
                prompts::summary_system(language),
                prompts::summary_user(&context),
            ),
            AiOperation::Alerts => (
                &self.settings.alerts_model,
                prompts::alerts_system(language),
                prompts::alerts_user(&context),
            ),
            AiOperation::Ask(question) => (
                &self.settings.chat_model,
                prompts::question_system(language),
                prompts::question_user(&context, question),
            ),
        };
        CompletionRequest {
            model: model.clone(),
            system,
            user,
            temperature: TEMPERATURE,
            json_output: matches!(op, AiOperation::Alerts),
        }
    }
}

/// Validate a question for [`AiOperation::Ask`], returning it trimmed.
pub fn validate_question(raw: &str) -> Result<String> {
    let question = raw.trim();
    if question.is_empty() {
        return Err(Error::validation("Missing 'question'"));
    }
    if question.chars().count() > QUESTION_MAX_CHARS {
        return Err(Error::validation(format!(
            "Question too long (max {} characters)",
            QUESTION_MAX_CHARS
        )));
    }
    Ok(question.to_string())
}

/// Run the completion and interpret its text. Blocking.
///
/// An empty summary or answer is a bad response; a malformed alert reply is
/// not, it comes back as a degraded analysis.
pub fn complete_and_parse(
    provider: &dyn CompletionProvider,
    op: &AiOperation,
    request: &CompletionRequest,
) -> Result<AiReply, UpstreamError> {
    let started = Instant::now();
    let completion = provider.complete(request)?;
    let took_ms = started.elapsed().as_millis() as u64;

    let result = match op {
        AiOperation::Alerts => {
            let analysis = parse_alerts(&completion.content);
            if analysis.degraded {
                warn!(model = %completion.model, "alert analysis degraded");
            }
            AiResult::Alerts { analysis }
        }
        AiOperation::Insights | AiOperation::Ask(_) => {
            if completion.content.is_empty() {
                return Err(UpstreamError::bad_response(Provider::Ai, "empty completion"));
            }
            let text = completion.content;
            match op {
                AiOperation::Insights => AiResult::Insights { summary: text },
                _ => AiResult::Answer { answer: text },
            }
        }
    };

    let trace_id = uuid::Uuid::new_v4().to_string();
    debug!(op = op.name(), model = %completion.model, took_ms, %trace_id, "completion parsed");

    Ok(AiReply {
        result,
        meta: Some(AiMeta {
            model: completion.model,
            took_ms,
            trace_id,
        }),
    })
}
