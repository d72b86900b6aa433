//! JSON path extractor.
//!
//! Resolves a dotted/bracketed path against a JSON value, yielding zero or
//! more leaves. Supported syntax:
//!
//! - dotted field access: `a.b.c`
//! - array index: `a[0]`
//! - wildcard over arrays: `a[*]` (fan-out; every element contributes)
//! - arbitrary nesting of the above
//!
//! # Example
//!
//! ```rust
//! # use archestra_core::jsonpath::extract;
//! # use serde_json::json;
//! let doc = json!({"emails": [{"from": "a@x.com"}, {"from": "b@x.com"}]});
//! let leaves = extract("emails[*].from", &doc).unwrap();
//! assert_eq!(leaves.len(), 2);
//! ```

use serde_json::Value;

use crate::error::{CoreError, Result};

/// A single step in a parsed path.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Field(String),
    Index(usize),
    Wildcard,
}

/// Parse a path string into its segments.
///
/// `a[0].b[*]` parses to `[Field("a"), Index(0), Field("b"), Wildcard]`.
fn parse(path: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut chars = path.char_indices().peekable();
    let mut field_start = 0usize;

    let push_field = |segments: &mut Vec<Segment>, field: &str| {
        if !field.is_empty() {
            segments.push(Segment::Field(field.to_owned()));
        }
    };

    while let Some((i, c)) = chars.next() {
        match c {
            '.' => {
                push_field(&mut segments, &path[field_start..i]);
                field_start = i + 1;
            }
            '[' => {
                push_field(&mut segments, &path[field_start..i]);
                let close = path[i..].find(']').ok_or_else(|| CoreError::InvalidPath {
                    path: path.to_owned(),
                    reason: "unterminated `[`".into(),
                })?;
                let inner = &path[i + 1..i + close];
                if inner == "*" {
                    segments.push(Segment::Wildcard);
                } else {
                    let idx: usize = inner.parse().map_err(|_| CoreError::InvalidPath {
                        path: path.to_owned(),
                        reason: format!("invalid array index `{inner}`"),
                    })?;
                    segments.push(Segment::Index(idx));
                }
                // Skip consumed characters up to and including `]`.
                for _ in 0..close {
                    chars.next();
                }
                field_start = i + close + 1;
            }
            _ => {}
        }
    }
    push_field(&mut segments, &path[field_start..]);

    Ok(segments)
}

/// Resolve `path` against `value`, returning every leaf reached.
///
/// An absent field, an out-of-range index, or indexing into a non-array
/// with `[*]` simply contributes no leaves for that branch rather than
/// erroring — per §4.B, a path that yields zero leaves means "does not
/// match", not "malformed query".
pub fn extract<'a>(path: &str, value: &'a Value) -> Result<Vec<&'a Value>> {
    let segments = parse(path)?;
    let mut frontier = vec![value];

    for segment in &segments {
        let mut next = Vec::new();
        for v in frontier {
            match segment {
                Segment::Field(name) => {
                    if let Some(child) = v.get(name) {
                        next.push(child);
                    }
                }
                Segment::Index(idx) => {
                    if let Some(child) = v.as_array().and_then(|a| a.get(*idx)) {
                        next.push(child);
                    }
                }
                Segment::Wildcard => {
                    if let Some(arr) = v.as_array() {
                        next.extend(arr.iter());
                    }
                }
            }
        }
        frontier = next;
    }

    Ok(frontier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dotted_access() {
        let doc = json!({"a": {"b": {"c": 1}}});
        let leaves = extract("a.b.c", &doc).unwrap();
        assert_eq!(leaves, vec![&json!(1)]);
    }

    #[test]
    fn array_index() {
        let doc = json!({"items": [{"name": {"first": "x"}}, {"name": {"first": "y"}}]});
        let leaves = extract("items[1].name.first", &doc).unwrap();
        assert_eq!(leaves, vec![&json!("y")]);
    }

    #[test]
    fn wildcard_fans_out() {
        let doc = json!({"emails": [{"from": "a@x.com"}, {"from": "b@x.com"}]});
        let leaves = extract("emails[*].from", &doc).unwrap();
        assert_eq!(leaves, vec![&json!("a@x.com"), &json!("b@x.com")]);
    }

    #[test]
    fn missing_field_yields_no_leaves() {
        let doc = json!({"a": 1});
        let leaves = extract("a.b.c", &doc).unwrap();
        assert!(leaves.is_empty());
    }

    #[test]
    fn out_of_range_index_yields_no_leaves() {
        let doc = json!({"items": [1, 2]});
        let leaves = extract("items[5]", &doc).unwrap();
        assert!(leaves.is_empty());
    }

    #[test]
    fn plain_path_no_nesting() {
        let doc = json!({"path": "/home/foo"});
        let leaves = extract("path", &doc).unwrap();
        assert_eq!(leaves, vec![&json!("/home/foo")]);
    }

    #[test]
    fn unterminated_bracket_is_invalid_path() {
        let doc = json!({});
        let result = extract("a[0", &doc);
        assert!(matches!(result, Err(CoreError::InvalidPath { .. })));
    }

    // Oracle comparison: a naive recursive walker built independently of
    // `extract`'s segment-frontier implementation, used to fuzz-check
    // agreement on nested documents.
    fn oracle_extract<'a>(segments: &[&str], value: &'a Value) -> Vec<&'a Value> {
        if segments.is_empty() {
            return vec![value];
        }
        let (head, rest) = (segments[0], &segments[1..]);
        if head == "*" {
            value
                .as_array()
                .map(|arr| arr.iter().flat_map(|v| oracle_extract(rest, v)).collect())
                .unwrap_or_default()
        } else if let Ok(idx) = head.parse::<usize>() {
            value
                .as_array()
                .and_then(|a| a.get(idx))
                .map(|v| oracle_extract(rest, v))
                .unwrap_or_default()
        } else {
            value
                .get(head)
                .map(|v| oracle_extract(rest, v))
                .unwrap_or_default()
        }
    }

    #[test]
    fn agrees_with_oracle_on_nested_document() {
        let doc = json!({
            "a": [
                {"b": [{"c": 1}, {"c": 2}]},
                {"b": [{"c": 3}]}
            ]
        });
        let got = extract("a[*].b[*].c", &doc).unwrap();
        let want = oracle_extract(&["a", "*", "b", "*", "c"], &doc);
        assert_eq!(got, want);
    }
}
