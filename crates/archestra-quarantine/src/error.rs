//! Error types for the quarantine sub-agent.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, QuarantineError>;

#[derive(Debug, Error)]
pub enum QuarantineError {
    /// Calling the privileged or quarantined LLM failed outright (network,
    /// auth, or a 5xx from the provider). These propagate to the caller.
    #[error("llm call failed: {0}")]
    Llm(#[from] archestra_llm::LlmError),

    /// The inbound conversation did not contain a tool result matching the
    /// given anchor (tool_call_id / tool_use_id).
    #[error("no tool result found for anchor: {anchor}")]
    AnchorNotFound { anchor: String },

    /// The inbound conversation did not contain a user message to use as
    /// the original request.
    #[error("no original user request found in conversation")]
    NoOriginalRequest,
}
