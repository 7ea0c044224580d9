use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Top-level application error.
/// All variants carry a human-readable message for display/logging.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Provider errors ──────────────────────────────────────────────────────
    #[error("Completion provider unavailable at {host}")]
    ProviderUnavailable { host: String },

    #[error("Model '{model_name}' is not available from the provider")]
    ModelNotFound { model_name: String },

    #[error("Provider rejected the API key")]
    Unauthorized,

    #[error("Provider account has insufficient balance")]
    InsufficientBalance,

    #[error("Provider rate limit exceeded")]
    RateLimited,

    #[error("Provider returned {status}: {message}")]
    ProviderRejected { status: u16, message: String },

    #[error("Provider request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Provider aborted the stream: {message}")]
    StreamAborted { message: String },

    #[error("Malformed provider stream: {message}")]
    MalformedStream { message: String },

    #[error("Response exceeded the maximum duration of {seconds}s")]
    DeadlineExceeded { seconds: u64 },

    // ── Validation errors ────────────────────────────────────────────────────
    #[error("Field '{field_name}' cannot be empty")]
    EmptyField { field_name: String },

    #[error("Field '{field_name}' exceeds max length of {max_length} (actual: {actual_length})")]
    FieldTooLong { field_name: String, max_length: usize, actual_length: usize },

    #[error("Invalid request body: {message}")]
    InvalidBody { message: String },

    #[error("Request body is too large: {message}")]
    PayloadTooLarge { message: String },

    // ── Configuration errors ─────────────────────────────────────────────────
    #[error("Environment variable {name} must be set")]
    MissingConfig { name: String },

    #[error("Environment variable {name} has an invalid value '{value}'")]
    InvalidConfig { name: String, value: String },
}

impl AppError {
    pub fn malformed(message: impl Into<String>) -> Self {
        AppError::MalformedStream { message: message.into() }
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppError::EmptyField { .. } | AppError::FieldTooLong { .. } | AppError::InvalidBody { .. }
        )
    }

    pub fn is_provider_unavailable(&self) -> bool {
        matches!(self, AppError::ProviderUnavailable { .. } | AppError::Transport(_))
    }

    pub fn is_quota(&self) -> bool {
        matches!(self, AppError::InsufficientBalance | AppError::RateLimited)
    }

    fn status(&self) -> StatusCode {
        if matches!(self, AppError::PayloadTooLarge { .. }) {
            StatusCode::PAYLOAD_TOO_LARGE
        } else if self.is_validation() {
            StatusCode::BAD_REQUEST
        } else if self.is_provider_unavailable() {
            StatusCode::SERVICE_UNAVAILABLE
        } else if self.is_quota() {
            StatusCode::TOO_MANY_REQUESTS
        } else if matches!(self, AppError::DeadlineExceeded { .. }) {
            StatusCode::GATEWAY_TIMEOUT
        } else if matches!(self, AppError::MissingConfig { .. } | AppError::InvalidConfig { .. }) {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            StatusCode::BAD_GATEWAY
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            AppError::ProviderUnavailable { .. } | AppError::Transport(_) => "provider_unavailable",
            AppError::ModelNotFound { .. } => "model_not_found",
            AppError::Unauthorized => "unauthorized",
            AppError::InsufficientBalance | AppError::RateLimited => "quota",
            AppError::ProviderRejected { .. }
            | AppError::StreamAborted { .. }
            | AppError::MalformedStream { .. } => "provider_error",
            AppError::DeadlineExceeded { .. } => "timeout",
            AppError::EmptyField { .. } | AppError::FieldTooLong { .. } | AppError::InvalidBody { .. } => {
                "invalid_request"
            }
            AppError::PayloadTooLarge { .. } => "payload_too_large",
            AppError::MissingConfig { .. } | AppError::InvalidConfig { .. } => "configuration",
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        let message = rejection.body_text();
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge { message }
        } else {
            AppError::InvalidBody { message }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "type": self.kind(),
            }
        }));
        (self.status(), body).into_response()
    }
}
