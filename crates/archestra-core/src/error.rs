//! Core error types.
//!
//! Shared by the operator library and the JSON path extractor, which are the
//! two building blocks every policy evaluator is assembled from. Each
//! variant carries enough context for callers to decide how to handle the
//! failure without inspecting opaque strings.

/// Unified error type for the archestra core crate.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    // -- Operator errors ------------------------------------------------------
    /// A regex pattern supplied as an operator value is invalid.
    #[error("invalid regex pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    // -- JSON path errors -------------------------------------------------------
    /// A path expression could not be parsed.
    #[error("invalid json path `{path}`: {reason}")]
    InvalidPath { path: String, reason: String },

    // -- Generic -------------------------------------------------------------
    /// Catch-all for unexpected internal errors that don't fit a specific
    /// variant.  Prefer a typed variant whenever possible.
    #[error("internal core error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, CoreError>;
