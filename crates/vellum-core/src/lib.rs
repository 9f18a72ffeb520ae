//! vellum-core: document tree model and structural diff/patch codec.
//!
//! A document is a recursively nested tree of typed rich-text nodes,
//! carried as `serde_json::Value`. The [`diff::DiffCodec`] computes
//! structural deltas between two trees and replays them forward.

pub mod diff;
pub mod node;

pub use diff::{ArrayOp, Delta, DiffCodec, DiffError};
pub use node::{canonical_json, empty_tree, is_empty_tree, Tree};
