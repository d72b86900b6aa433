//! LLM client error types.
//!
//! All client subsystems surface errors through [`LlmError`].  Each variant
//! carries enough context for callers to decide how to handle the failure.

/// Unified error type for the LLM client crate.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    // -- Request errors -------------------------------------------------------
    /// An HTTP request to the LLM provider failed.
    #[error("llm request failed: {reason}")]
    RequestFailed { reason: String },

    /// The LLM response could not be parsed into the expected format.
    #[error("llm response parse error: {reason}")]
    ParseFailed { reason: String },

    /// The streaming SSE connection was interrupted or produced invalid data.
    #[error("llm stream error: {reason}")]
    StreamError { reason: String },

    /// The API key is missing for a provider that requires one.
    #[error("missing api key for provider: {provider}")]
    MissingApiKey { provider: String },

    /// The upstream provider rejected the request.
    #[error("provider `{provider}` returned {status}: {body}")]
    ProviderError {
        provider: String,
        status: u16,
        body: String,
    },

    // -- Serialization ---------------------------------------------------------
    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    // -- Generic -----------------------------------------------------------------
    /// Catch-all for unexpected internal errors.  Prefer a typed variant
    /// whenever possible.
    #[error("internal llm client error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the client crate.
pub type Result<T> = std::result::Result<T, LlmError>;

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        Self::RequestFailed {
            reason: err.to_string(),
        }
    }
}
