use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::transport::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("{0}")]
    JobFailed(String),

    #[error("stream failed: {0}")]
    StreamFailed(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("request was cancelled")]
    Cancelled,
}

impl ApiError {
    /// Cancellation is reported separately so callers can skip error UI.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Request(error) => error.status(),
            _ => None,
        }
    }

    /// Build a [`ApiError::Status`] from a non-success response.
    pub async fn from_response(response: ApiResponse, fallback: &str) -> Self {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Self::Status {
            status,
            message: parse_error_message(&body, fallback),
        }
    }
}

/// Extract a human-readable message from an error body.
///
/// JSON bodies carrying a `detail` or `message` string (top level, or nested
/// under `error`) yield that string; any other non-blank body is returned
/// verbatim; a blank body yields `fallback`.
pub fn parse_error_message(body: &str, fallback: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return fallback.to_owned();
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let nested = value.get("error");
        let message = [
            value.get("detail"),
            value.get("message"),
            nested.and_then(|error| error.get("message")),
            nested,
        ]
        .into_iter()
        .flatten()
        .find_map(|candidate| candidate.as_str())
        .map(str::trim)
        .filter(|message| !message.is_empty());

        if let Some(message) = message {
            return message.to_owned();
        }
    }

    trimmed.to_owned()
}
