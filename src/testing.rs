//! Testing utilities for gridboost.
//!
//! Assertion helpers shared by unit and integration tests: approximate
//! float comparison macros and invariant checks over built trees.

use approx::AbsDiffEq;

use crate::tree::layout;
use crate::training::BuildTreeOutput;

/// Default tolerance for comparisons of reduced statistics, which are O(1)
/// per row and accumulate in f64.
pub const DEFAULT_TOLERANCE: f64 = 1e-9;

/// Assert that two f64 values are approximately equal.
///
/// # Panics
///
/// Panics if the absolute difference exceeds the tolerance.
#[macro_export]
macro_rules! assert_approx_eq_f64 {
    ($left:expr, $right:expr, $tolerance:expr) => {{
        let left_val: f64 = $left;
        let right_val: f64 = $right;
        let tol: f64 = $tolerance;
        let diff = (left_val - right_val).abs();
        if diff > tol {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`\n right: `{:?}`\n  diff: `{:?}` > tolerance `{:?}`",
                left_val, right_val, diff, tol
            );
        }
    }};
    ($left:expr, $right:expr, $tolerance:expr, $($arg:tt)+) => {{
        let left_val: f64 = $left;
        let right_val: f64 = $right;
        let tol: f64 = $tolerance;
        let diff = (left_val - right_val).abs();
        if diff > tol {
            panic!(
                "assertion failed: `(left ≈ right)` - {}\n  left: `{:?}`\n right: `{:?}`\n  diff: `{:?}` > tolerance `{:?}`",
                format_args!($($arg)+), left_val, right_val, diff, tol
            );
        }
    }};
}

/// Assert that two f64 slices are approximately equal element-wise.
pub fn assert_slices_approx_eq(left: &[f64], right: &[f64], tolerance: f64) {
    assert_eq!(
        left.len(),
        right.len(),
        "slice lengths differ: {} vs {}",
        left.len(),
        right.len()
    );
    for (i, (l, r)) in left.iter().zip(right.iter()).enumerate() {
        assert!(
            l.abs_diff_eq(r, tolerance),
            "slices differ at index {}: {} vs {} (tolerance {})",
            i,
            l,
            r,
            tolerance
        );
    }
}

/// Assert the observable invariants of a built tree.
///
/// Checks, for every internal node: the split feature is in range, both
/// children fit in the node capacity and carry positive hessian mass, the
/// recorded gain is positive, and the children's hessians sum to the
/// parent's for every output.
pub fn assert_valid_output(out: &BuildTreeOutput, num_features: usize) {
    for node in 0..out.max_nodes {
        if out.is_leaf(node) {
            continue;
        }

        let feature = out.feature[node];
        assert!(
            feature >= 0 && (feature as usize) < num_features,
            "node {} splits on out-of-range feature {}",
            node,
            feature
        );

        let left = layout::left_child(node);
        let right = layout::right_child(node);
        assert!(
            right < out.max_nodes,
            "children of internal node {} exceed capacity {}",
            node,
            out.max_nodes
        );
        assert!(
            out.hessian(left, 0) > 0.0 && out.hessian(right, 0) > 0.0,
            "internal node {} has a child without hessian mass",
            node
        );
        assert!(out.gain[node] > 0.0, "internal node {} has gain {}", node, out.gain[node]);

        for output in 0..out.num_outputs {
            assert_approx_eq_f64!(
                out.hessian(left, output) + out.hessian(right, output),
                out.hessian(node, output),
                DEFAULT_TOLERANCE,
                "hessian not conserved across split of node {}",
                node
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approx_macro_accepts_close_values() {
        assert_approx_eq_f64!(1.0, 1.0 + 1e-12, 1e-9);
    }

    #[test]
    #[should_panic(expected = "assertion failed")]
    fn approx_macro_rejects_distant_values() {
        assert_approx_eq_f64!(1.0, 1.1, 1e-9);
    }

    #[test]
    fn slice_comparison() {
        assert_slices_approx_eq(&[1.0, 2.0], &[1.0, 2.0 + 1e-12], 1e-9);
    }
}
