//! Identity-aware array reconciliation.
//!
//! Child lists are matched element-by-element using each element's
//! identity key (identity token if present, canonical serialization
//! otherwise). A longest common subsequence over the keys anchors the
//! elements that stayed in place; same-key elements outside the LCS
//! become moves; the rest become removals and insertions. Matching by
//! identity rather than position is what lets a paragraph reorder
//! produce two move operations instead of a delete+insert of both
//! subtrees.

use serde_json::Value;

use super::delta::{ArrayOp, Delta};
use super::{DiffCodec, DiffError};

/// Longest common subsequence of `a` and `b`, as ascending index pairs.
fn lcs_pairs(a: &[String], b: &[String]) -> Vec<(usize, usize)> {
    let mut table = vec![vec![0u32; b.len() + 1]; a.len() + 1];
    for i in (0..a.len()).rev() {
        for j in (0..b.len()).rev() {
            table[i][j] = if a[i] == b[j] {
                table[i + 1][j + 1] + 1
            } else {
                table[i + 1][j].max(table[i][j + 1])
            };
        }
    }

    let mut pairs = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i] == b[j] {
            pairs.push((i, j));
            i += 1;
            j += 1;
        } else if table[i + 1][j] >= table[i][j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    pairs
}

/// Compute the reconciliation script turning `before` into `after`.
/// Returns `None` when no operations are needed.
pub(super) fn diff_arrays(
    codec: &DiffCodec,
    before: &[Value],
    after: &[Value],
) -> Option<Delta> {
    let before_keys: Vec<String> = before.iter().map(|v| codec.element_key(v)).collect();
    let after_keys: Vec<String> = after.iter().map(|v| codec.element_key(v)).collect();

    let anchored = lcs_pairs(&before_keys, &after_keys);
    let mut before_taken = vec![false; before.len()];
    let mut after_taken = vec![false; after.len()];
    for &(i, j) in &anchored {
        before_taken[i] = true;
        after_taken[j] = true;
    }

    // Same-key elements the LCS left behind changed position: moves.
    let mut moves = Vec::new();
    for j in 0..after.len() {
        if after_taken[j] {
            continue;
        }
        let candidate = (0..before.len())
            .find(|&i| !before_taken[i] && before_keys[i] == after_keys[j]);
        if let Some(i) = candidate {
            before_taken[i] = true;
            after_taken[j] = true;
            moves.push((i, j));
        }
    }

    let mut ops = Vec::new();
    for i in (0..before.len()).rev() {
        if !before_taken[i] {
            ops.push(ArrayOp::Remove { index: i });
        }
    }
    for &(from, to) in &moves {
        ops.push(ArrayOp::Move { from, to });
    }
    for (j, value) in after.iter().enumerate() {
        if !after_taken[j] {
            ops.push(ArrayOp::Insert {
                index: j,
                value: value.clone(),
            });
        }
    }

    // Matched elements (anchored or moved) may have changed inside.
    let mut pairs: Vec<(usize, usize)> = anchored;
    pairs.extend(moves);
    pairs.sort_by_key(|&(_, j)| j);
    for (i, j) in pairs {
        if let Some(delta) = codec.diff_values(&before[i], &after[j]) {
            ops.push(ArrayOp::Patch { index: j, delta });
        }
    }

    if ops.is_empty() {
        None
    } else {
        Some(Delta::Array { ops })
    }
}

/// Apply a reconciliation script to `items`, producing the post-image
/// list. Fails on any index that does not fit the list it addresses.
pub(super) fn apply_array_ops(
    codec: &DiffCodec,
    items: &[Value],
    ops: &[ArrayOp],
    path: &str,
) -> Result<Vec<Value>, DiffError> {
    let mut out: Vec<Value> = items.to_vec();

    // Removals and move-extractions, descending so earlier source
    // indices stay valid.
    let mut extractions: Vec<(usize, Option<usize>)> = Vec::new();
    for op in ops {
        match op {
            ArrayOp::Remove { index } => extractions.push((*index, None)),
            ArrayOp::Move { from, to } => extractions.push((*from, Some(*to))),
            _ => {}
        }
    }
    extractions.sort_by(|a, b| b.0.cmp(&a.0));

    let mut pending: Vec<(usize, Value)> = Vec::new();
    for (src, dest) in extractions {
        if src >= out.len() {
            return Err(DiffError::IndexOutOfBounds {
                path: path.to_string(),
                index: src,
                len: out.len(),
            });
        }
        let value = out.remove(src);
        if let Some(dest) = dest {
            pending.push((dest, value));
        }
    }

    // Insertions (moved and new values) ascending by destination.
    for op in ops {
        if let ArrayOp::Insert { index, value } = op {
            pending.push((*index, value.clone()));
        }
    }
    pending.sort_by_key(|&(dest, _)| dest);
    for (dest, value) in pending {
        if dest > out.len() {
            return Err(DiffError::IndexOutOfBounds {
                path: path.to_string(),
                index: dest,
                len: out.len(),
            });
        }
        out.insert(dest, value);
    }

    // In-place patches address the settled post-image.
    for op in ops {
        if let ArrayOp::Patch { index, delta } = op {
            let child_path = format!("{path}[{index}]");
            let updated = {
                let current = out.get(*index).ok_or_else(|| DiffError::IndexOutOfBounds {
                    path: path.to_string(),
                    index: *index,
                    len: out.len(),
                })?;
                codec.apply(current, delta, &child_path)?
            };
            out[*index] = updated;
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn lcs_of_disjoint_sequences_is_empty() {
        assert!(lcs_pairs(&keys(&["a", "b"]), &keys(&["c", "d"])).is_empty());
    }

    #[test]
    fn lcs_anchors_common_run() {
        let pairs = lcs_pairs(&keys(&["a", "b", "c", "d"]), &keys(&["b", "c", "x"]));
        assert_eq!(pairs, vec![(1, 0), (2, 1)]);
    }
}
