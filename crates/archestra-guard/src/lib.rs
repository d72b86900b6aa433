//! Policy evaluators for the Archestra security proxy.
//!
//! This crate decides whether a proposed tool call may proceed and whether
//! a tool's result can be trusted, without knowing anything about HTTP or
//! the wire protocol spoken to the upstream LLM.
//!
//! # Modules
//!
//! - [`invocation`] — gates outbound tool calls against tool-invocation policies.
//! - [`trusted_data`] — classifies inbound tool results as trusted or not.
//! - [`error`] — unified error types.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use archestra_guard::invocation::InvocationEvaluator;
//! use archestra_store::PolicyStore;
//! use std::collections::HashMap;
//!
//! # async fn example(policies: PolicyStore) -> archestra_guard::error::Result<()> {
//! let evaluator = InvocationEvaluator::new(&policies);
//! let decision = evaluator
//!     .evaluate("agent-1", "sendEmail", &HashMap::new())
//!     .await?;
//! if !decision.is_allowed {
//!     println!("denied: {:?}", decision.deny_reason);
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod invocation;
pub mod trusted_data;

pub use error::{GuardError, Result};
pub use invocation::{InvocationDecision, InvocationEvaluator};
pub use trusted_data::{TrustDecision, TrustedDataEvaluator};
