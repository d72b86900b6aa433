//! The operator library: pure predicates over `(argumentValue, policyValue)`.
//!
//! Every policy row names one of the closed set of [`Operator`]s. Evaluation
//! never fails a request: a non-string operand under a string operator is
//! simply `false`, and an invalid regex is reported to the caller so it can
//! skip the policy and log a warning rather than abort the turn.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, Result};

/// The closed set of comparison operators a policy row may specify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Equal,
    NotEqual,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    Regex,
}

/// Evaluate `op(left, right)` per the operator truth table.
///
/// `left` is the value drawn from the live argument or tool result; `right`
/// is the policy's stored string value. String operators treat a non-string
/// `left` as a non-match rather than an error. `Operator::Regex` may return
/// [`CoreError::InvalidPattern`] when `right` fails to compile; callers must
/// treat that as "policy skipped, not a request failure" per the evaluators'
/// recovery policy.
pub fn evaluate(op: Operator, left: &Value, right: &str) -> Result<bool> {
    match op {
        Operator::Equal => Ok(json_equal(left, right)),
        Operator::NotEqual => Ok(!json_equal(left, right)),
        Operator::Contains => Ok(as_str(left).is_some_and(|s| s.contains(right))),
        Operator::NotContains => Ok(!as_str(left).is_some_and(|s| s.contains(right))),
        Operator::StartsWith => Ok(as_str(left).is_some_and(|s| s.starts_with(right))),
        Operator::EndsWith => Ok(as_str(left).is_some_and(|s| s.ends_with(right))),
        Operator::Regex => {
            let Some(s) = as_str(left) else {
                return Ok(false);
            };
            let compiled = Regex::new(right).map_err(|e| CoreError::InvalidPattern {
                pattern: right.to_owned(),
                reason: e.to_string(),
            })?;
            Ok(compiled.is_match(s))
        }
    }
}

/// Structural JSON equality, matching `equal`'s "compare by JSON equality"
/// semantics.
///
/// Policy values are stored as plain strings (§3). When `left` is itself a
/// JSON string, `right` is compared literally (the common case: comparing
/// two strings without requiring the policy author to quote it). Otherwise
/// `right` is parsed as JSON so numeric/boolean/null policy values compare
/// structurally against non-string argument values.
fn json_equal(left: &Value, right: &str) -> bool {
    match left {
        Value::String(s) => s == right,
        other => serde_json::from_str::<Value>(right)
            .map(|parsed| *other == parsed)
            .unwrap_or(false),
    }
}

fn as_str(v: &Value) -> Option<&str> {
    v.as_str()
}
