//! Member-chain navigation over dynamic values
//!
//! Binding expressions end in a dot-separated member chain (`a.b.c`)
//! that is walked over whatever JSON-shaped object the datasource slot
//! holds at runtime.
//!
//! Supports:
//! - a.b.c (nested member access)
//! - items.0.name (numeric segment = sequence index)
//!
//! Does NOT support filters, wildcards, or slices — the binding
//! grammar is deliberately restricted.

use serde_json::Value;

/// A parsed chain segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Object member access: .field
    Member(String),
    /// Sequence index access: .0
    Index(usize),
}

/// Split a member chain into segments.
///
/// The empty chain is valid and addresses the whole object.
pub fn parse(chain: &str) -> Vec<Segment> {
    if chain.is_empty() {
        return Vec::new();
    }
    chain
        .split('.')
        .map(|part| match part.parse::<usize>() {
            Ok(idx) => Segment::Index(idx),
            Err(_) => Segment::Member(part.to_string()),
        })
        .collect()
}

/// Walk segments over a value; `None` when any hop is missing
pub fn apply(value: &Value, segments: &[Segment]) -> Option<Value> {
    let mut current = value;
    for segment in segments {
        current = match segment {
            Segment::Member(name) => current.get(name)?,
            Segment::Index(idx) => current.get(*idx)?,
        };
    }
    Some(current.clone())
}

/// Parse and walk in one step
pub fn resolve(value: &Value, chain: &str) -> Option<Value> {
    apply(value, &parse(chain))
}

/// First segment of a chain — the member a change subscription watches
pub fn head(chain: &str) -> &str {
    chain.split('.').next().unwrap_or("")
}
