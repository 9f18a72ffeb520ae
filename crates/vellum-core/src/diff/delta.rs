//! Delta representation.
//!
//! A delta describes how to transform one document tree into another.
//! Deltas are stored verbatim in version logs, so the serialized form
//! is part of the on-disk format: self-describing tagged JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A structural diff between two document trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Delta {
    /// Substitute the value wholesale. Also produced as the defensive
    /// full-replacement delta when the structural differ reports no
    /// change but the serialized forms disagree.
    Replace { value: Value },
    /// Insert a value where none existed. Only meaningful as an object
    /// entry delta.
    Insert { value: Value },
    /// Remove the value. Only meaningful as an object entry delta.
    Remove,
    /// Per-key deltas against an object node.
    Object { entries: BTreeMap<String, Delta> },
    /// Reconciliation script against an ordered child list.
    Array { ops: Vec<ArrayOp> },
}

/// One step of an array reconciliation.
///
/// Index spaces differ by operation: `Remove` and the `from` side of
/// `Move` address the pre-image array; `Insert`, the `to` side of
/// `Move`, and `Patch` address the post-image array. Application order
/// is removals and move-extractions by descending source index, then
/// insertions by ascending destination index, then in-place patches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArrayOp {
    /// Drop the element at `index` of the pre-image.
    Remove { index: usize },
    /// Relocate the element at pre-image `from` to post-image `to`.
    /// The element's value is not carried; a changed moved element
    /// additionally gets a `Patch` at its destination.
    Move { from: usize, to: usize },
    /// Insert `value` at `index` of the post-image.
    Insert { index: usize, value: Value },
    /// Apply `delta` to the element at `index` of the post-image.
    Patch { index: usize, delta: Delta },
}

impl Delta {
    /// Whether this delta is a whole-tree substitution.
    pub fn is_replace(&self) -> bool {
        matches!(self, Delta::Replace { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn delta_round_trips_through_json() {
        let delta = Delta::Object {
            entries: BTreeMap::from([
                ("title".to_string(), Delta::Replace { value: json!("B") }),
                ("stale".to_string(), Delta::Remove),
                (
                    "content".to_string(),
                    Delta::Array {
                        ops: vec![
                            ArrayOp::Move { from: 1, to: 0 },
                            ArrayOp::Insert { index: 2, value: json!({"type": "hr"}) },
                        ],
                    },
                ),
            ]),
        };
        let encoded = serde_json::to_string(&delta).unwrap();
        let decoded: Delta = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, delta);
    }

    #[test]
    fn serialized_form_is_tagged() {
        let encoded = serde_json::to_value(Delta::Remove).unwrap();
        assert_eq!(encoded, json!({"op": "remove"}));
    }
}
