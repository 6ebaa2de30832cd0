//! REST error types

use thiserror::Error;

/// REST call error with classification
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
    /// HTTP status, when the backend answered
    pub status: Option<u16>,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Network, message)
    }

    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            ..Self::new(ApiErrorKind::Status, message)
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Decode, message)
    }

    /// Build from a non-success response body. FastAPI puts the reason in
    /// `detail`; other backends use `message`.
    pub fn from_response(status: u16, body: &str) -> Self {
        let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
        let reason = parsed.as_ref().and_then(|v| {
            ["detail", "message"]
                .iter()
                .find_map(|key| v.get(*key))
                .map(|value| match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
        });
        Self::status(
            status,
            reason.unwrap_or_else(|| format!("request failed ({status})")),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// Backend unreachable, timeout, or body read failure
    Network,
    /// Backend answered with a non-success status
    Status,
    /// Response body did not match the expected shape
    Decode,
}
