//! Guard error types.
//!
//! Every public API in this crate surfaces errors through [`GuardError`].
//! Each variant carries enough context for callers to decide how to handle
//! the failure without inspecting opaque strings.

/// Unified error type for the policy evaluators.
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    // -- Store errors ---------------------------------------------------
    /// Reading policy rows from storage failed.
    #[error("policy store error: {0}")]
    Store(#[from] archestra_store::StoreError),

    // -- Evaluation errors ------------------------------------------------
    /// An operator's underlying comparison failed (currently only a bad
    /// regex pattern; per policy, callers should skip the offending policy
    /// and log a warning rather than fail the request).
    #[error("operator evaluation error: {0}")]
    Operator(#[from] archestra_core::CoreError),

    /// The tool's arguments could not be parsed as JSON.
    #[error("unparseable tool arguments: {reason}")]
    UnparseableArguments { reason: String },

    // -- Generic ----------------------------------------------------------
    /// Catch-all for unexpected internal errors that don't fit a specific
    /// variant. Prefer a typed variant whenever possible.
    #[error("internal guard error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the guard crate.
pub type Result<T> = std::result::Result<T, GuardError>;
