//! Tree-build task driver.
//!
//! One invocation per shard: validate the slab geometry and scalar
//! contract, select split candidates, run the level loop, and return the
//! finished tree. Every shard returns an identical artifact because all
//! decisions are made on globally reduced statistics.
//!
//! Hosts bind [`BUILD_TREE_TASK`] to [`build_tree`] in their own explicit
//! startup registration; the crate installs no global state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::comm::Communicator;
use crate::data::{
    check_output_aligned, check_row_aligned, FeatureSlab, FeatureType, FeatureValue, GeometryError,
    Slab, StatsSlab,
};
use crate::tree::{layout, Tree, LEAF};

use super::builder::TreeBuilder;
use super::sampler::select_split_samples;

/// Stable task name a host runtime dispatches on.
pub const BUILD_TREE_TASK: &str = "gridboost.build_tree";

/// Scalar arguments of one tree-build invocation.
///
/// `dataset_rows` is the global row count; shards cannot recover it from
/// their slab and every shard must receive the same value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildTreeParams {
    /// Number of split levels to grow. Zero produces the root-only tree.
    pub max_depth: i32,
    /// Node capacity; must equal `2^(max_depth + 1) - 1`.
    pub max_nodes: i32,
    /// L2 regularization added to every hessian denominator.
    pub alpha: f64,
    /// Number of rows sampled for split candidates.
    pub split_samples: i32,
    /// Seed for the shared candidate row draw.
    pub seed: i32,
    /// Global row count across all shards.
    pub dataset_rows: i64,
}

impl Default for BuildTreeParams {
    fn default() -> Self {
        Self {
            max_depth: 6,
            max_nodes: layout::max_nodes_for_depth(6) as i32,
            alpha: 1.0,
            split_samples: 256,
            seed: 0,
            dataset_rows: 0,
        }
    }
}

impl BuildTreeParams {
    /// Convenience constructor keeping `max_nodes` consistent with the
    /// depth.
    pub fn with_depth(max_depth: i32, dataset_rows: i64) -> Self {
        assert!(max_depth >= 0, "max_depth must be non-negative");
        Self {
            max_depth,
            max_nodes: layout::max_nodes_for_depth(max_depth as usize) as i32,
            dataset_rows,
            ..Self::default()
        }
    }

    /// Enforce the scalar contract.
    pub fn validate(&self) -> Result<(), BuildTreeError> {
        if self.max_depth < 0 {
            return Err(BuildTreeError::NegativeDepth(self.max_depth));
        }
        let expected = layout::max_nodes_for_depth(self.max_depth as usize) as i32;
        if self.max_nodes != expected {
            return Err(BuildTreeError::MaxNodesMismatch {
                max_depth: self.max_depth,
                max_nodes: self.max_nodes,
                expected,
            });
        }
        if self.split_samples <= 0 {
            return Err(BuildTreeError::NonPositiveSplitSamples(self.split_samples));
        }
        if self.dataset_rows <= 0 {
            return Err(BuildTreeError::NonPositiveDatasetRows(self.dataset_rows));
        }
        Ok(())
    }
}

/// Caller-contract violations that abort the task.
#[derive(Debug, Error)]
pub enum BuildTreeError {
    #[error("max_depth must be non-negative, got {0}")]
    NegativeDepth(i32),

    #[error("max_nodes must equal 2^(max_depth + 1) - 1 = {expected} for max_depth {max_depth}, got {max_nodes}")]
    MaxNodesMismatch {
        max_depth: i32,
        max_nodes: i32,
        expected: i32,
    },

    #[error("split_samples must be positive, got {0}")]
    NonPositiveSplitSamples(i32),

    #[error("dataset_rows must be positive, got {0}")]
    NonPositiveDatasetRows(i64),

    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Feature store slab with its runtime element type.
///
/// The builder is monomorphized over the element type; this enum is the
/// dispatch point between the untyped task boundary and the typed
/// instantiations.
#[derive(Debug, Clone, Copy)]
pub enum FeatureInput<'a> {
    F32(FeatureSlab<'a, f32>),
    F64(FeatureSlab<'a, f64>),
}

impl FeatureInput<'_> {
    /// Runtime element type of the store.
    pub fn feature_type(&self) -> FeatureType {
        match self {
            FeatureInput::F32(_) => FeatureType::F32,
            FeatureInput::F64(_) => FeatureType::F64,
        }
    }

    /// Number of features.
    pub fn num_features(&self) -> usize {
        match self {
            FeatureInput::F32(slab) => slab.num_features(),
            FeatureInput::F64(slab) => slab.num_features(),
        }
    }
}

impl Slab for FeatureInput<'_> {
    fn row_begin(&self) -> usize {
        match self {
            FeatureInput::F32(slab) => slab.row_begin(),
            FeatureInput::F64(slab) => slab.row_begin(),
        }
    }

    fn num_rows(&self) -> usize {
        match self {
            FeatureInput::F32(slab) => slab.num_rows(),
            FeatureInput::F64(slab) => slab.num_rows(),
        }
    }
}

/// The finished tree, broadcast-identical on every shard.
///
/// Arrays are node-indexed with `max_nodes` entries; two-dimensional
/// arrays are row-major `max_nodes x num_outputs`. Internal gradient sums
/// are not part of the artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildTreeOutput {
    /// Per-output leaf values.
    pub leaf_value: Vec<f64>,
    /// Split feature per node; -1 for leaves.
    pub feature: Vec<i32>,
    /// Split threshold per node.
    pub split_value: Vec<f64>,
    /// Split gain per node.
    pub gain: Vec<f64>,
    /// Per-output hessian sums.
    pub hessian: Vec<f64>,
    /// Node capacity.
    pub max_nodes: usize,
    /// Outputs per node.
    pub num_outputs: usize,
}

impl BuildTreeOutput {
    fn from_tree(tree: Tree) -> Self {
        Self {
            leaf_value: tree.leaf_value,
            feature: tree.feature,
            split_value: tree.split_value,
            gain: tree.gain,
            hessian: tree.hessian,
            max_nodes: tree.max_nodes,
            num_outputs: tree.num_outputs,
        }
    }

    /// Whether `node` is a leaf.
    #[inline]
    pub fn is_leaf(&self, node: usize) -> bool {
        self.feature[node] == LEAF
    }

    /// Leaf value of (`node`, `output`).
    #[inline]
    pub fn leaf_value(&self, node: usize, output: usize) -> f64 {
        self.leaf_value[node * self.num_outputs + output]
    }

    /// Hessian sum of (`node`, `output`).
    #[inline]
    pub fn hessian(&self, node: usize, output: usize) -> f64 {
        self.hessian[node * self.num_outputs + output]
    }
}

/// Build one tree from this shard's slabs.
///
/// `x`, `g`, and `h` must cover the same global row range, and `g` and `h`
/// the same outputs. The call participates in collective reductions, so
/// every shard of the communicator's world must invoke it with the same
/// parameters.
pub fn build_tree(
    comm: &dyn Communicator,
    x: &FeatureInput<'_>,
    g: &StatsSlab<'_>,
    h: &StatsSlab<'_>,
    params: &BuildTreeParams,
) -> Result<BuildTreeOutput, BuildTreeError> {
    params.validate()?;
    match x {
        FeatureInput::F32(slab) => build_tree_typed(comm, slab, g, h, params),
        FeatureInput::F64(slab) => build_tree_typed(comm, slab, g, h, params),
    }
}

fn build_tree_typed<T: FeatureValue>(
    comm: &dyn Communicator,
    x: &FeatureSlab<'_, T>,
    g: &StatsSlab<'_>,
    h: &StatsSlab<'_>,
    params: &BuildTreeParams,
) -> Result<BuildTreeOutput, BuildTreeError> {
    check_row_aligned(x, g)?;
    check_row_aligned(g, h)?;
    check_output_aligned(g, h)?;

    let num_rows = x.num_rows();
    let num_features = x.num_features();
    let num_outputs = g.num_outputs();
    let max_nodes = params.max_nodes as usize;

    log::debug!(
        "building tree: shard {}/{}, {} local rows, {} features, {} outputs, max_depth {}",
        comm.rank(),
        comm.world_size(),
        num_rows,
        num_features,
        num_outputs,
        params.max_depth,
    );

    let proposals = select_split_samples(
        comm,
        x,
        params.split_samples as usize,
        params.seed as u32 as u64,
        params.dataset_rows as u64,
    );

    let mut tree = Tree::new(max_nodes, num_outputs);
    let mut builder = TreeBuilder::new(num_rows, num_features, num_outputs, max_nodes, proposals);

    builder.init_root(comm, &mut tree, g, h, params.alpha);
    for depth in 0..params.max_depth as usize {
        builder.update_positions(depth, &tree, x);
        builder.compute_histogram(depth, comm, &tree, x, g, h);
        builder.perform_best_split(depth, &mut tree, params.alpha);
    }

    log::debug!(
        "tree built: {} internal nodes",
        (0..max_nodes).filter(|&n| !tree.is_leaf(n)).count()
    );

    Ok(BuildTreeOutput::from_tree(tree))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SingleShard;

    fn slab_f64<'a>(data: &'a [f64], rows: usize, cols: usize) -> FeatureSlab<'a, f64> {
        FeatureSlab::new(data, 0, rows, cols).unwrap()
    }

    #[test]
    fn params_validation() {
        let params = BuildTreeParams::with_depth(3, 100);
        assert!(params.validate().is_ok());

        let bad_nodes = BuildTreeParams {
            max_nodes: 7,
            ..BuildTreeParams::with_depth(3, 100)
        };
        assert!(matches!(
            bad_nodes.validate(),
            Err(BuildTreeError::MaxNodesMismatch { expected: 15, .. })
        ));

        let bad_rows = BuildTreeParams::with_depth(3, 0);
        assert!(matches!(
            bad_rows.validate(),
            Err(BuildTreeError::NonPositiveDatasetRows(0))
        ));
    }

    #[test]
    fn misaligned_stores_are_rejected() {
        let x_data = vec![0.0f64; 4];
        let g_data = vec![0.0f64; 3];
        let h_data = vec![1.0f64; 3];
        let x = FeatureInput::F64(slab_f64(&x_data, 4, 1));
        let g = StatsSlab::new(&g_data, 0, 3, 1).unwrap();
        let h = StatsSlab::new(&h_data, 0, 3, 1).unwrap();

        let err = build_tree(&SingleShard, &x, &g, &h, &BuildTreeParams::with_depth(1, 4));
        assert!(matches!(err, Err(BuildTreeError::Geometry(_))));
    }

    #[test]
    fn f32_features_produce_f64_thresholds() {
        let x_data: Vec<f32> = vec![0.0, 0.0, 1.0, 1.0];
        let g_data = vec![-1.0, -1.0, 1.0, 1.0];
        let h_data = vec![1.0; 4];
        let x = FeatureInput::F32(FeatureSlab::new(&x_data, 0, 4, 1).unwrap());
        let g = StatsSlab::new(&g_data, 0, 4, 1).unwrap();
        let h = StatsSlab::new(&h_data, 0, 4, 1).unwrap();

        // Sampling draws rows with replacement; 32 draws over 4 rows make
        // both feature values certain to appear among the thresholds.
        let params = BuildTreeParams {
            alpha: 0.0,
            split_samples: 32,
            ..BuildTreeParams::with_depth(1, 4)
        };
        let out = build_tree(&SingleShard, &x, &g, &h, &params).unwrap();

        assert!(!out.is_leaf(0));
        assert_eq!(out.split_value[0], 0.0);
        assert_eq!(out.feature[0], 0);
    }

    #[test]
    fn output_accessors_match_arrays() {
        let x_data = vec![0.0f64, 0.0, 1.0, 1.0];
        let g_data = vec![-1.0, -1.0, 1.0, 1.0];
        let h_data = vec![1.0; 4];
        let x = FeatureInput::F64(slab_f64(&x_data, 4, 1));
        let g = StatsSlab::new(&g_data, 0, 4, 1).unwrap();
        let h = StatsSlab::new(&h_data, 0, 4, 1).unwrap();

        let params = BuildTreeParams {
            alpha: 0.0,
            split_samples: 32,
            ..BuildTreeParams::with_depth(1, 4)
        };
        let out = build_tree(&SingleShard, &x, &g, &h, &params).unwrap();

        assert_eq!(out.hessian(0, 0), out.hessian[0]);
        assert_eq!(out.leaf_value(1, 0), out.leaf_value[out.num_outputs]);
        assert_eq!(out.max_nodes, 3);
    }
}
