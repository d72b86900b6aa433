//! Core building blocks shared by every policy evaluator.
//!
//! - **[`operators`]** -- the closed operator set (`equal`, `contains`,
//!   `regex`, ...) every policy row is expressed in terms of.
//! - **[`jsonpath`]** -- resolves a dotted/bracketed path with `[*]`
//!   wildcards against a JSON value.
//! - **[`error`]** -- unified core error types via [`thiserror`].

pub mod error;
pub mod jsonpath;
pub mod operators;

pub use error::{CoreError, Result};
pub use operators::Operator;
