//! Request-facing error type: maps internal failures onto the HTTP status
//! and `{error: {message, type}}` body the client sees.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    ToolInvocationBlocked(String),

    #[error("{0}")]
    Configuration(String),

    #[error("upstream or internal failure: {message}")]
    Upstream { message: String, status: Option<u16> },
}

impl From<archestra_store::StoreError> for ApiError {
    fn from(err: archestra_store::StoreError) -> Self {
        match err {
            archestra_store::StoreError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{entity} not found: {id}"))
            }
            other => ApiError::Upstream {
                message: other.to_string(),
                status: None,
            },
        }
    }
}

impl From<archestra_guard::GuardError> for ApiError {
    fn from(err: archestra_guard::GuardError) -> Self {
        ApiError::Upstream {
            message: err.to_string(),
            status: None,
        }
    }
}

impl From<archestra_llm::LlmError> for ApiError {
    fn from(err: archestra_llm::LlmError) -> Self {
        let status = match &err {
            archestra_llm::LlmError::ProviderError { status, .. } => Some(*status),
            _ => None,
        };
        ApiError::Upstream {
            message: err.to_string(),
            status,
        }
    }
}

impl From<archestra_quarantine::QuarantineError> for ApiError {
    fn from(err: archestra_quarantine::QuarantineError) -> Self {
        ApiError::Upstream {
            message: err.to_string(),
            status: None,
        }
    }
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request_error"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::ToolInvocationBlocked(_) => {
                (StatusCode::FORBIDDEN, "tool_invocation_blocked")
            }
            ApiError::Configuration(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error")
            }
            ApiError::Upstream { status, .. } => {
                let code = status
                    .and_then(|s| StatusCode::from_u16(s).ok())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                (code, "api_error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.parts();
        let body = json!({
            "error": {
                "message": self.to_string(),
                "type": error_type,
            }
        });
        (status, Json(body)).into_response()
    }
}
