//! Per-level tree growth state machine.
//!
//! The builder owns two pieces of mutable state: `positions`, mapping each
//! local row to the node it currently occupies (-1 once it lands on a
//! leaf), and a `(max_nodes x histogram_size x num_outputs)` gradient-pair
//! buffer reused across levels.
//!
//! Histogram lifecycle per level: accumulate raw deltas for the directly
//! built nodes, all-reduce the level slab, prefix-scan each built node, and
//! derive every sibling as `scanned parent - scanned child`. Parent slabs
//! keep their scanned form from the previous level, which is exactly what
//! the subtraction needs; both children end the level in scanned form and
//! can serve as parents next level.

use crate::comm::Communicator;
use crate::data::{FeatureSlab, FeatureValue, StatsSlab};
use crate::tree::{layout, Tree};

use super::gpair::{self, GPair};
use super::proposals::SplitProposals;

/// Division guard and minimum accepted split gain.
pub(crate) const EPS: f64 = 1e-12;

/// Newton leaf weight with L2 regularization.
#[inline]
pub(crate) fn calculate_leaf_value(grad: f64, hess: f64, alpha: f64) -> f64 {
    -grad / (hess + alpha.max(EPS))
}

/// Which child of `parent` is accumulated from rows, and which is derived
/// by subtraction. The child with the smaller hessian mass (canonical
/// output 0) is the cheaper one to build directly.
fn select_histogram_node(parent: usize, tree: &Tree) -> (usize, usize) {
    let left = layout::left_child(parent);
    let right = layout::right_child(parent);
    if tree.hessian(left, 0) < tree.hessian(right, 0) {
        (left, right)
    } else {
        (right, left)
    }
}

/// Level-synchronous builder for one tree.
pub struct TreeBuilder<T> {
    /// Node index per local row; -1 marks an inactive row.
    positions: Vec<i32>,
    /// `(max_nodes x histogram_size x num_outputs)` gradient pairs.
    histogram: Vec<GPair>,
    num_rows: usize,
    num_features: usize,
    num_outputs: usize,
    proposals: SplitProposals<T>,
}

impl<T: FeatureValue> TreeBuilder<T> {
    /// Allocate builder state for `num_rows` local rows and a tree of
    /// `max_nodes` capacity. The histogram buffer is allocated once here
    /// and reused for every level.
    pub fn new(
        num_rows: usize,
        num_features: usize,
        num_outputs: usize,
        max_nodes: usize,
        proposals: SplitProposals<T>,
    ) -> Self {
        let histogram = vec![GPair::ZERO; max_nodes * proposals.histogram_size() * num_outputs];
        Self {
            positions: vec![0; num_rows],
            histogram,
            num_rows,
            num_features,
            num_outputs,
            proposals,
        }
    }

    /// Sum local gradients and hessians per output, reduce globally, and
    /// install the root statistics. The root stays a leaf until the first
    /// split decision.
    pub fn init_root(
        &mut self,
        comm: &dyn Communicator,
        tree: &mut Tree,
        g: &StatsSlab<'_>,
        h: &StatsSlab<'_>,
        alpha: f64,
    ) {
        let mut base_sums = vec![GPair::ZERO; self.num_outputs];
        for row in 0..self.num_rows {
            for (output, sum) in base_sums.iter_mut().enumerate() {
                *sum += GPair::new(g.value(row, output), h.value(row, output));
            }
        }
        comm.allreduce_sum_f64(gpair::as_f64_slice_mut(&mut base_sums));

        for (output, sum) in base_sums.iter().enumerate() {
            let leaf = calculate_leaf_value(sum.grad, sum.hess, alpha);
            tree.set_root_stats(output, sum.grad, sum.hess, leaf);
        }
    }

    /// Route every active row one level down.
    ///
    /// Rows sitting on a leaf are retired (-1); the rest move to the child
    /// chosen by the node's split. No-op at depth 0, where every row is
    /// already at the root.
    pub fn update_positions(&mut self, depth: usize, tree: &Tree, x: &FeatureSlab<'_, T>) {
        if depth == 0 {
            return;
        }
        for row in 0..self.num_rows {
            let position = self.positions[row];
            if position < 0 || tree.is_leaf(position as usize) {
                self.positions[row] = -1;
                continue;
            }
            let node = position as usize;
            let value = x.value(row, tree.feature(node) as usize).to_f64();
            self.positions[row] = if value <= tree.split_value(node) {
                layout::left_child(node) as i32
            } else {
                layout::right_child(node) as i32
            };
        }
    }

    /// Accumulate the level's histograms, reduce them globally, and scan.
    ///
    /// Only the directly built node of each sibling pair accumulates rows;
    /// the other is derived during [`scan`](Self::scan). After this call
    /// the level slab holds globally summed, scanned histograms.
    pub fn compute_histogram(
        &mut self,
        depth: usize,
        comm: &dyn Communicator,
        tree: &Tree,
        x: &FeatureSlab<'_, T>,
        g: &StatsSlab<'_>,
        h: &StatsSlab<'_>,
    ) {
        for row in 0..self.num_rows {
            let position = self.positions[row];
            if position < 0 {
                continue;
            }
            let node = position as usize;
            if !self.accumulates_directly(node, depth, tree) {
                continue;
            }
            for feature in 0..self.num_features {
                let value = x.value(row, feature);
                if let Some(bin) = self.proposals.find_bin(value, feature) {
                    for output in 0..self.num_outputs {
                        let slot = self.slot(node, bin, output);
                        self.histogram[slot] +=
                            GPair::new(g.value(row, output), h.value(row, output));
                    }
                }
            }
        }

        let begin = self.slot(layout::level_begin(depth), 0, 0);
        let len =
            layout::nodes_in_level(depth) * self.proposals.histogram_size() * self.num_outputs;
        comm.allreduce_sum_f64(gpair::as_f64_slice_mut(&mut self.histogram[begin..begin + len]));

        self.scan(depth, tree);
    }

    /// Choose and apply the best split for every node of the level.
    ///
    /// After scanning, bin `b` of node `n` holds the `(G_L, H_L)` of the
    /// split `x <= threshold[b]`; the right-hand sums follow from the
    /// node's own totals. Ties keep the first candidate in
    /// (feature, bin) order. A winning candidate is still rejected if
    /// either child would carry non-positive hessian mass.
    pub fn perform_best_split(&mut self, depth: usize, tree: &mut Tree, alpha: f64) {
        let reg = alpha.max(EPS);
        for node in layout::level_begin(depth)..layout::level_begin(depth + 1) {
            let mut best_gain = 0.0;
            let mut best: Option<(usize, usize)> = None;
            for feature in 0..self.num_features {
                for bin in self.proposals.feature_range(feature) {
                    let mut gain = 0.0;
                    for output in 0..self.num_outputs {
                        let GPair { grad: g_l, hess: h_l } =
                            self.histogram[self.slot(node, bin, output)];
                        let g = tree.gradient(node, output);
                        let h = tree.hessian(node, output);
                        let g_r = g - g_l;
                        let h_r = h - h_l;
                        gain += 0.5
                            * (g_l * g_l / (h_l + reg) + g_r * g_r / (h_r + reg)
                                - g * g / (h + reg));
                    }
                    if gain > best_gain {
                        best_gain = gain;
                        best = Some((feature, bin));
                    }
                }
            }

            let Some((best_feature, best_bin)) = best else {
                continue;
            };
            if best_gain <= EPS {
                continue;
            }

            let mut left_leaf = vec![0.0; self.num_outputs];
            let mut right_leaf = vec![0.0; self.num_outputs];
            let mut grad_left = vec![0.0; self.num_outputs];
            let mut grad_right = vec![0.0; self.num_outputs];
            let mut hess_left = vec![0.0; self.num_outputs];
            let mut hess_right = vec![0.0; self.num_outputs];
            for output in 0..self.num_outputs {
                let GPair { grad: g_l, hess: h_l } =
                    self.histogram[self.slot(node, best_bin, output)];
                let g = tree.gradient(node, output);
                let h = tree.hessian(node, output);
                let g_r = g - g_l;
                let h_r = h - h_l;
                left_leaf[output] = calculate_leaf_value(g_l, h_l, alpha);
                right_leaf[output] = calculate_leaf_value(g_r, h_r, alpha);
                grad_left[output] = g_l;
                grad_right[output] = g_r;
                hess_left[output] = h_l;
                hess_right[output] = h_r;
            }
            if hess_left[0] <= 0.0 || hess_right[0] <= 0.0 {
                continue;
            }

            tree.add_split(
                node,
                best_feature as i32,
                self.proposals.threshold(best_bin).to_f64(),
                &left_leaf,
                &right_leaf,
                best_gain,
                &grad_left,
                &grad_right,
                &hess_left,
                &hess_right,
            );
        }
    }

    /// Whether `node` accumulates rows itself rather than being derived
    /// from its parent and sibling.
    fn accumulates_directly(&self, node: usize, depth: usize, tree: &Tree) -> bool {
        if depth == 0 {
            return true;
        }
        let (built, _) = select_histogram_node(layout::parent(node), tree);
        node == built
    }

    /// Prefix-scan the level's built nodes and derive their siblings.
    ///
    /// Parents are read in their scanned form left over from the previous
    /// level; the derived child is `parent - scanned sibling` bin by bin,
    /// leaving both children scanned.
    fn scan(&mut self, depth: usize, tree: &Tree) {
        if depth == 0 {
            self.scan_node(0);
            return;
        }

        let begin = layout::level_begin(depth - 1);
        for parent in begin..begin + layout::nodes_in_level(depth - 1) {
            let (built, derived) = select_histogram_node(parent, tree);
            self.scan_node(built);
            self.subtract_node(derived, built, parent);
        }
    }

    /// In-place inclusive prefix sum over each feature's bin range, per
    /// output.
    fn scan_node(&mut self, node: usize) {
        for feature in 0..self.num_features {
            let range = self.proposals.feature_range(feature);
            for output in 0..self.num_outputs {
                let mut sum = GPair::ZERO;
                for bin in range.clone() {
                    let slot = self.slot(node, bin, output);
                    sum += self.histogram[slot];
                    self.histogram[slot] = sum;
                }
            }
        }
    }

    /// `target = parent - scanned` over every (bin, output).
    fn subtract_node(&mut self, target: usize, scanned: usize, parent: usize) {
        for feature in 0..self.num_features {
            let range = self.proposals.feature_range(feature);
            for output in 0..self.num_outputs {
                for bin in range.clone() {
                    let scanned_sum = self.histogram[self.slot(scanned, bin, output)];
                    let parent_sum = self.histogram[self.slot(parent, bin, output)];
                    let slot = self.slot(target, bin, output);
                    self.histogram[slot] = parent_sum - scanned_sum;
                }
            }
        }
    }

    #[inline]
    fn slot(&self, node: usize, bin: usize, output: usize) -> usize {
        (node * self.proposals.histogram_size() + bin) * self.num_outputs + output
    }

    #[cfg(test)]
    fn histogram_at(&self, node: usize, bin: usize, output: usize) -> GPair {
        self.histogram[self.slot(node, bin, output)]
    }

    #[cfg(test)]
    fn position(&self, row: usize) -> i32 {
        self.positions[row]
    }
}
