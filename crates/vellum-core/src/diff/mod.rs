//! Structural diff/patch over document trees.
//!
//! The codec satisfies three laws relied on by the version log:
//!
//! - `patch(before, diff(before, after)) == after`
//! - `diff(x, x) == None`
//! - a `None` delta applied to a tree is the tree itself (the version
//!   log simply stores nothing for a no-op write)
//!
//! `patch` is pure: the input tree is never mutated.

mod array;
mod delta;

pub use delta::{ArrayOp, Delta};

use crate::node::canonical_json;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while applying a delta to a tree that does not match
/// the delta's pre-image shape.
#[derive(Error, Debug)]
pub enum DiffError {
    #[error("delta does not fit tree at {path}: {reason}")]
    Mismatch { path: String, reason: String },

    #[error("array index {index} out of bounds at {path} (len {len})")]
    IndexOutOfBounds {
        path: String,
        index: usize,
        len: usize,
    },
}

/// Identity of a node across two tree versions, independent of its
/// position. `None` means the node carries no identity token and is
/// matched by content instead.
pub type IdentityFn = Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>;

/// Computes and applies structural deltas between document trees.
///
/// Array reconciliation matches elements by a configurable identity
/// function so that reordered children are recognized as moves. The
/// default identity reads `attrs._uid`, then `attrs.id`.
#[derive(Clone)]
pub struct DiffCodec {
    identity: IdentityFn,
}

impl Default for DiffCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl DiffCodec {
    pub fn new() -> Self {
        Self {
            identity: Arc::new(default_identity),
        }
    }

    /// Use a custom identity function for array element matching.
    pub fn with_identity(
        identity: impl Fn(&Value) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            identity: Arc::new(identity),
        }
    }

    /// Structural comparison of two trees. `None` means the trees are
    /// structurally identical and nothing needs to be recorded.
    pub fn diff(&self, before: &Value, after: &Value) -> Option<Delta> {
        self.diff_values(before, after)
    }

    /// Apply `delta` to `tree`, producing the post-image tree. The
    /// input tree is left untouched.
    pub fn patch(&self, tree: &Value, delta: &Delta) -> Result<Value, DiffError> {
        self.apply(tree, delta, "$")
    }

    pub(crate) fn diff_values(&self, before: &Value, after: &Value) -> Option<Delta> {
        if before == after {
            return None;
        }
        match (before, after) {
            (Value::Object(b), Value::Object(a)) => {
                let mut entries = std::collections::BTreeMap::new();
                for (key, before_value) in b {
                    match a.get(key) {
                        None => {
                            entries.insert(key.clone(), Delta::Remove);
                        }
                        Some(after_value) => {
                            if let Some(delta) = self.diff_values(before_value, after_value) {
                                entries.insert(key.clone(), delta);
                            }
                        }
                    }
                }
                for (key, after_value) in a {
                    if !b.contains_key(key) {
                        entries.insert(
                            key.clone(),
                            Delta::Insert {
                                value: after_value.clone(),
                            },
                        );
                    }
                }
                if entries.is_empty() {
                    None
                } else {
                    Some(Delta::Object { entries })
                }
            }
            (Value::Array(b), Value::Array(a)) => array::diff_arrays(self, b, a),
            // Scalars and type changes substitute the value wholesale.
            _ => Some(Delta::Replace {
                value: after.clone(),
            }),
        }
    }

    pub(crate) fn apply(
        &self,
        tree: &Value,
        delta: &Delta,
        path: &str,
    ) -> Result<Value, DiffError> {
        match delta {
            Delta::Replace { value } | Delta::Insert { value } => Ok(value.clone()),
            Delta::Remove => Err(DiffError::Mismatch {
                path: path.to_string(),
                reason: "removal outside an object entry".to_string(),
            }),
            Delta::Object { entries } => {
                let Value::Object(map) = tree else {
                    return Err(DiffError::Mismatch {
                        path: path.to_string(),
                        reason: format!("object delta against {}", type_name(tree)),
                    });
                };
                let mut out = map.clone();
                for (key, entry) in entries {
                    let child_path = format!("{path}.{key}");
                    match entry {
                        Delta::Remove => {
                            if out.remove(key).is_none() {
                                return Err(DiffError::Mismatch {
                                    path: child_path,
                                    reason: "removed key absent".to_string(),
                                });
                            }
                        }
                        Delta::Insert { value } => {
                            out.insert(key.clone(), value.clone());
                        }
                        nested => {
                            let current =
                                out.get(key).ok_or_else(|| DiffError::Mismatch {
                                    path: child_path.clone(),
                                    reason: "patched key absent".to_string(),
                                })?;
                            let updated = self.apply(current, nested, &child_path)?;
                            out.insert(key.clone(), updated);
                        }
                    }
                }
                Ok(Value::Object(out))
            }
            Delta::Array { ops } => {
                let Value::Array(items) = tree else {
                    return Err(DiffError::Mismatch {
                        path: path.to_string(),
                        reason: format!("array delta against {}", type_name(tree)),
                    });
                };
                Ok(Value::Array(array::apply_array_ops(self, items, ops, path)?))
            }
        }
    }

    /// Key used to match an array element across versions.
    pub(crate) fn element_key(&self, value: &Value) -> String {
        match (self.identity)(value) {
            Some(token) => format!("#{token}"),
            None => format!("={}", canonical_json(value)),
        }
    }
}

/// Default identity: `attrs._uid`, then `attrs.id` (string or number).
fn default_identity(value: &Value) -> Option<String> {
    let attrs = value.get("attrs")?;
    for key in ["_uid", "id"] {
        match attrs.get(key) {
            Some(Value::String(s)) => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn round_trip(before: Value, after: Value) {
        let codec = DiffCodec::new();
        match codec.diff(&before, &after) {
            Some(delta) => {
                let patched = codec.patch(&before, &delta).unwrap();
                assert_eq!(patched, after, "patch(before, diff) must equal after");
            }
            None => assert_eq!(before, after, "None delta means identical trees"),
        }
    }

    fn paragraph(uid: &str, text: &str) -> Value {
        json!({
            "type": "paragraph",
            "attrs": {"_uid": uid},
            "content": [{"type": "text", "text": text}]
        })
    }

    #[test]
    fn diff_of_identical_trees_is_none() {
        let codec = DiffCodec::new();
        let doc = json!({"type": "doc", "content": [paragraph("a", "hello")]});
        assert!(codec.diff(&doc, &doc).is_none());
        assert!(codec.diff(&json!({}), &json!({})).is_none());
        assert!(codec.diff(&json!(null), &json!(null)).is_none());
    }

    #[test]
    fn scalar_change_round_trips() {
        round_trip(json!({"title": "A"}), json!({"title": "B"}));
    }

    #[test]
    fn key_addition_and_removal_round_trip() {
        round_trip(
            json!({"title": "A", "stale": true}),
            json!({"title": "A", "icon": "📄"}),
        );
    }

    #[test]
    fn type_change_round_trips() {
        round_trip(json!({"attrs": null}), json!({"attrs": {"level": 2}}));
        round_trip(json!([1, 2, 3]), json!({"wrapped": [1, 2, 3]}));
    }

    #[test]
    fn empty_to_document_round_trips() {
        round_trip(
            json!({}),
            json!({"type": "doc", "content": [paragraph("p1", "first")]}),
        );
    }

    #[test]
    fn nested_edit_round_trips() {
        round_trip(
            json!({"type": "doc", "content": [paragraph("p1", "old"), paragraph("p2", "keep")]}),
            json!({"type": "doc", "content": [paragraph("p1", "new"), paragraph("p2", "keep")]}),
        );
    }

    #[test]
    fn sibling_swap_produces_moves_not_rewrites() {
        let codec = DiffCodec::new();
        let before = json!([paragraph("a", "alpha"), paragraph("b", "beta")]);
        let after = json!([paragraph("b", "beta"), paragraph("a", "alpha")]);

        let Some(Delta::Array { ops }) = codec.diff(&before, &after) else {
            panic!("swap must produce an array delta");
        };
        assert!(
            ops.iter().all(|op| matches!(op, ArrayOp::Move { .. })),
            "pure reorder must be represented as moves, got {ops:?}"
        );
        assert_eq!(
            codec.patch(&before, &Delta::Array { ops }).unwrap(),
            after
        );
    }

    #[test]
    fn moved_and_edited_element_round_trips() {
        round_trip(
            json!([paragraph("a", "alpha"), paragraph("b", "beta"), paragraph("c", "gamma")]),
            json!([paragraph("c", "gamma revised"), paragraph("a", "alpha"), paragraph("b", "beta")]),
        );
    }

    #[test]
    fn insert_remove_and_move_combined_round_trip() {
        round_trip(
            json!([paragraph("a", "one"), paragraph("b", "two"), paragraph("c", "three")]),
            json!([paragraph("d", "zero"), paragraph("c", "three"), paragraph("a", "one")]),
        );
    }

    #[test]
    fn elements_without_identity_match_by_content() {
        round_trip(json!(["x", "y", "z"]), json!(["z", "x", "w"]));
        round_trip(json!([1, 2, 2, 3]), json!([3, 2, 1]));
    }

    #[test]
    fn custom_identity_function_is_honored() {
        let codec = DiffCodec::with_identity(|v| {
            v.get("key").and_then(Value::as_str).map(str::to_string)
        });
        let before = json!([{"key": "a", "n": 1}, {"key": "b", "n": 2}]);
        let after = json!([{"key": "b", "n": 2}, {"key": "a", "n": 1}]);

        let Some(Delta::Array { ops }) = codec.diff(&before, &after) else {
            panic!("expected array delta");
        };
        assert!(ops.iter().all(|op| matches!(op, ArrayOp::Move { .. })));
    }

    #[test]
    fn patch_does_not_mutate_its_input() {
        let codec = DiffCodec::new();
        let before = json!({"title": "A", "content": [paragraph("p", "body")]});
        let original = before.clone();
        let after = json!({"title": "B"});

        let delta = codec.diff(&before, &after).unwrap();
        let _ = codec.patch(&before, &delta).unwrap();
        assert_eq!(before, original);
    }

    #[test]
    fn mismatched_delta_fails_with_path() {
        let codec = DiffCodec::new();
        let delta = Delta::Object {
            entries: std::collections::BTreeMap::from([(
                "content".to_string(),
                Delta::Array {
                    ops: vec![ArrayOp::Remove { index: 7 }],
                },
            )]),
        };
        let err = codec
            .patch(&json!({"content": [1, 2]}), &delta)
            .unwrap_err();
        match err {
            DiffError::IndexOutOfBounds { path, index, .. } => {
                assert_eq!(path, "$.content");
                assert_eq!(index, 7);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn removing_an_absent_key_fails() {
        let codec = DiffCodec::new();
        let delta = Delta::Object {
            entries: std::collections::BTreeMap::from([("gone".to_string(), Delta::Remove)]),
        };
        assert!(matches!(
            codec.patch(&json!({"title": "A"}), &delta),
            Err(DiffError::Mismatch { .. })
        ));
    }

    #[test]
    fn deep_document_round_trips() {
        let before = json!({
            "type": "doc",
            "content": [
                {"type": "heading", "attrs": {"_uid": "h1", "level": 1},
                 "content": [{"type": "text", "text": "Title"}]},
                {"type": "bullet_list", "attrs": {"_uid": "l1"}, "content": [
                    {"type": "list_item", "attrs": {"_uid": "i1"},
                     "content": [paragraph("ip1", "first item")]},
                    {"type": "list_item", "attrs": {"_uid": "i2"},
                     "content": [paragraph("ip2", "second item")]}
                ]}
            ]
        });
        let after = json!({
            "type": "doc",
            "content": [
                {"type": "heading", "attrs": {"_uid": "h1", "level": 2},
                 "content": [{"type": "text", "text": "Title", "marks": [{"type": "em"}]}]},
                {"type": "bullet_list", "attrs": {"_uid": "l1"}, "content": [
                    {"type": "list_item", "attrs": {"_uid": "i2"},
                     "content": [paragraph("ip2", "second item, edited")]},
                    {"type": "list_item", "attrs": {"_uid": "i1"},
                     "content": [paragraph("ip1", "first item")]}
                ]}
            ]
        });
        round_trip(before, after);
    }
}
