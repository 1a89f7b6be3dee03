//! Structured alert analysis and its lenient parser.
//!
//! Model output is never trusted: anything that does not match the expected
//! shape is dropped and the result is flagged `degraded` instead of failing
//! the request.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const HEADLINE_MAX_CHARS: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    None,
    Low,
    Moderate,
    High,
    Extreme,
    /// The model output could not be interpreted.
    Unknown,
}

impl Severity {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "none" => Some(Self::None),
            "low" => Some(Self::Low),
            "moderate" => Some(Self::Moderate),
            "high" => Some(Self::High),
            "extreme" => Some(Self::Extreme),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskKind {
    Heat,
    Rain,
    Wind,
    Uv,
    Visibility,
    Storm,
}

impl RiskKind {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "heat" => Some(Self::Heat),
            "rain" => Some(Self::Rain),
            "wind" => Some(Self::Wind),
            "uv" => Some(Self::Uv),
            "visibility" => Some(Self::Visibility),
            "storm" => Some(Self::Storm),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Risk {
    #[serde(rename = "type")]
    pub kind: RiskKind,
    /// 1 (minor) to 5 (severe).
    pub level: u8,
    pub why: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertAnalysis {
    pub headline: String,
    pub severity: Severity,
    pub risks: Vec<Risk>,
    pub advice: Vec<String>,
    /// Set when part of the model output had to be discarded.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
}

/// Interpret raw model text as an alert analysis. Never fails.
pub fn parse_alerts(raw: &str) -> AlertAnalysis {
    match extract_object(raw) {
        Some(obj) => from_object(&obj),
        None => fallback(raw),
    }
}

/// Locate the JSON object in the reply, tolerating code fences or prose
/// around it, and unwrap an `{"analysis": {...}}` envelope.
fn extract_object(raw: &str) -> Option<serde_json::Map<String, Value>> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    let value: Value = serde_json::from_str(&raw[start..=end]).ok()?;
    let Value::Object(mut obj) = value else {
        return None;
    };
    if let Some(Value::Object(inner)) = obj.remove("analysis") {
        return Some(inner);
    }
    Some(obj)
}

fn from_object(obj: &serde_json::Map<String, Value>) -> AlertAnalysis {
    let mut degraded = false;

    let severity = match obj.get("severity").and_then(Value::as_str).and_then(Severity::parse) {
        Some(s) => s,
        None => {
            degraded = true;
            Severity::Unknown
        }
    };

    let headline = match obj.get("headline").and_then(Value::as_str).map(str::trim) {
        Some(h) if !h.is_empty() => {
            if h.chars().count() > HEADLINE_MAX_CHARS {
                degraded = true;
            }
            truncate_chars(h, HEADLINE_MAX_CHARS)
        }
        _ => {
            degraded = true;
            String::new()
        }
    };

    let mut risks = Vec::new();
    match obj.get("risks") {
        Some(Value::Array(items)) => {
            for item in items {
                match parse_risk(item) {
                    Some(risk) => risks.push(risk),
                    None => degraded = true,
                }
            }
        }
        None | Some(Value::Null) => {}
        Some(_) => degraded = true,
    }

    let mut advice = Vec::new();
    match obj.get("advice") {
        Some(Value::Array(items)) => {
            for item in items {
                match item.as_str().map(str::trim) {
                    Some(tip) if !tip.is_empty() => advice.push(tip.to_string()),
                    _ => degraded = true,
                }
            }
        }
        Some(Value::String(tip)) if !tip.trim().is_empty() => advice.push(tip.trim().to_string()),
        None | Some(Value::Null) => {}
        Some(_) => degraded = true,
    }

    AlertAnalysis {
        headline,
        severity,
        risks,
        advice,
        degraded,
    }
}

fn parse_risk(item: &Value) -> Option<Risk> {
    let kind = item.get("type").and_then(Value::as_str).and_then(RiskKind::parse)?;
    let level = item.get("level").and_then(Value::as_u64)?;
    if !(1..=5).contains(&level) {
        return None;
    }
    let why = item.get("why").and_then(Value::as_str).map(str::trim)?;
    if why.is_empty() {
        return None;
    }
    Some(Risk {
        kind,
        level: level as u8,
        why: why.to_string(),
    })
}

fn fallback(raw: &str) -> AlertAnalysis {
    let first_line = raw
        .lines()
        .map(|l| l.trim().trim_start_matches("```").trim())
        .find(|l| !l.is_empty())
        .unwrap_or("");
    AlertAnalysis {
        headline: truncate_chars(first_line, HEADLINE_MAX_CHARS),
        severity: Severity::Unknown,
        risks: Vec::new(),
        advice: Vec::new(),
        degraded: true,
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
