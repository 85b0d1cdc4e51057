//! Error taxonomy.
//!
//! Only `PredictionError` is ever seen by callers of the prediction API.
//! `ModelError` and `ClientError` stay inside the inference fallback and the
//! enrichment task respectively.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("at least {required} glucose readings are required, got {found}")]
    InsufficientData { required: usize, found: usize },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model unavailable: {0}")]
    Unavailable(String),
    #[error("failed to read model artifact: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse model artifact: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("shape mismatch: {0}")]
    Shape(String),
    #[error("model produced a non-finite output")]
    NonFinite,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("recommendation service returned status {code}")]
    Status { code: u16, body: String },
    #[error("recommendation service timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl ClientError {
    /// Diagnostic text stored in a failed record's `error` field.
    pub fn record_message(&self) -> String {
        match self {
            ClientError::Status { code, .. } => format!("Service error: {code}"),
            ClientError::Timeout(_) | ClientError::Transport(_) => {
                format!("Request error: {self}")
            }
            ClientError::Decode(detail) => format!("Unexpected error: {detail}"),
        }
    }
}

/// Error body returned by the exposed API, carrying an HTTP-equivalent status.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ApiError {
    pub status: u16,
    pub error: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: 400,
            error: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: 404,
            error: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: 500,
            error: message.into(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.error, self.status)
    }
}

impl std::error::Error for ApiError {}

impl From<PredictionError> for ApiError {
    fn from(err: PredictionError) -> Self {
        match err {
            PredictionError::InsufficientData { .. } | PredictionError::InvalidInput(_) => {
                ApiError::bad_request(err.to_string())
            }
            PredictionError::Internal(inner) => ApiError::internal(format!("{inner:#}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prediction_errors_map_to_status_codes() {
        let short: ApiError = PredictionError::InsufficientData {
            required: 12,
            found: 5,
        }
        .into();
        assert_eq!(short.status, 400);
        assert!(short.error.contains("12"));

        let internal: ApiError = PredictionError::Internal(anyhow::anyhow!("boom")).into();
        assert_eq!(internal.status, 500);
    }

    #[test]
    fn client_errors_render_record_text() {
        let status = ClientError::Status {
            code: 503,
            body: String::new(),
        };
        assert_eq!(status.record_message(), "Service error: 503");

        let timeout = ClientError::Timeout(Duration::from_secs(10));
        assert!(timeout.record_message().starts_with("Request error: "));

        let decode = ClientError::Decode("missing field".into());
        assert_eq!(decode.record_message(), "Unexpected error: missing field");
    }
}
