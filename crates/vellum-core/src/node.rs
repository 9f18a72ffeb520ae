//! Rich-text document trees.
//!
//! Editor documents arrive as JSON: each node has a `type`, optional
//! `attrs` (which may carry a stable `_uid` or `id` identity token),
//! optional inline `marks`, and an ordered `content` list of child
//! nodes. The engine treats the whole document as an opaque tree; only
//! the diff codec looks inside.

use serde_json::{Map, Value};

/// A document tree. The empty object is the state of a document before
/// its first save.
pub type Tree = Value;

/// The empty document tree.
pub fn empty_tree() -> Tree {
    Value::Object(Map::new())
}

/// Whether `tree` is the pre-first-save empty state.
pub fn is_empty_tree(tree: &Tree) -> bool {
    matches!(tree, Value::Object(map) if map.is_empty())
}

/// Canonical serialization of a tree, used for byte-level equality
/// checks and as the fallback identity of nodes without an identity
/// token. Object keys serialize in sorted order, so two structurally
/// equal trees always produce the same string.
pub fn canonical_json(tree: &Tree) -> String {
    serde_json::to_string(tree).unwrap_or_default()
}
