//! Implicit binary-heap node indexing.
//!
//! Nodes live in dense arrays indexed by the standard heap scheme: the root
//! is node 0 and node `n` has children `2n + 1` and `2n + 2`. A consequence
//! used throughout the builder is that every tree level occupies a
//! contiguous index range, so per-level work (histogram accumulation, the
//! collective reduction, split selection) operates on a single slab.

/// Index of the left child of `node`.
#[inline]
pub fn left_child(node: usize) -> usize {
    2 * node + 1
}

/// Index of the right child of `node`.
#[inline]
pub fn right_child(node: usize) -> usize {
    2 * node + 2
}

/// Index of the parent of `node`.
///
/// The root has no parent; calling this with `node == 0` is a logic error.
#[inline]
pub fn parent(node: usize) -> usize {
    debug_assert!(node > 0, "the root node has no parent");
    (node - 1) / 2
}

/// First node index of level `depth`.
#[inline]
pub fn level_begin(depth: usize) -> usize {
    (1 << depth) - 1
}

/// Number of nodes in level `depth`.
#[inline]
pub fn nodes_in_level(depth: usize) -> usize {
    1 << depth
}

/// Total node capacity of a tree grown to `max_depth`.
///
/// Counts every node of the full binary tree with `max_depth + 1` levels,
/// i.e. `2^(max_depth + 1) - 1`.
#[inline]
pub fn max_nodes_for_depth(max_depth: usize) -> usize {
    (1 << (max_depth + 1)) - 1
}
