//! Blocking HTTP plumbing shared by the provider clients.

use crate::error::{Provider, UpstreamError};
use serde::de::DeserializeOwned;
use std::time::Duration;

pub const USER_AGENT: &str = concat!("WeatherAgent/", env!("CARGO_PKG_VERSION"));

/// One agent per provider; connect and total timeouts both bounded.
pub fn agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(timeout)
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
}

/// Map a ureq failure onto the upstream taxonomy.
pub fn classify(provider: Provider, err: ureq::Error) -> UpstreamError {
    match err {
        ureq::Error::Status(429, response) => UpstreamError::RateLimited {
            provider,
            retry_after_secs: response
                .header("Retry-After")
                .and_then(|v| v.trim().parse().ok()),
        },
        ureq::Error::Status(404, _) if provider != Provider::Ai => {
            UpstreamError::NotFound("requested resource".into())
        }
        ureq::Error::Status(code, response) if code >= 500 => {
            let body = response.into_string().unwrap_or_default();
            UpstreamError::unavailable(provider, format!("status {}: {}", code, snippet(&body)))
        }
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            UpstreamError::bad_response(provider, format!("status {}: {}", code, snippet(&body)))
        }
        ureq::Error::Transport(transport) => {
            UpstreamError::unavailable(provider, transport.to_string())
        }
    }
}

/// Decode a successful response body, treating malformed JSON as a bad response.
pub fn decode<T: DeserializeOwned>(provider: Provider, response: ureq::Response) -> Result<T, UpstreamError> {
    response
        .into_json()
        .map_err(|e| UpstreamError::bad_response(provider, format!("malformed payload: {}", e)))
}

/// Show only the last four characters of a credential.
pub fn mask_key(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "(not set)".into();
    }
    let chars: Vec<char> = trimmed.chars().collect();
    if chars.len() <= 4 {
        return "****".into();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}

fn snippet(body: &str) -> String {
    let flat = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > 160 {
        format!("{}...", flat.chars().take(160).collect::<String>())
    } else {
        flat
    }
}
