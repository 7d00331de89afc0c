//! Distributed construction of a single regression tree.
//!
//! The pipeline per shard: sample candidate thresholds
//! ([`select_split_samples`]), then grow level by level under the driver in
//! [`build_tree`]: route rows, accumulate and reduce gradient histograms,
//! and pick the best split per node ([`TreeBuilder`]). Shards synchronize
//! only inside the collective reductions, so every shard ends with the
//! same tree.

mod builder;
mod gpair;
mod proposals;
mod sampler;
mod task;

pub use builder::TreeBuilder;
pub use gpair::{as_f64_slice_mut, GPair};
pub use proposals::SplitProposals;
pub use sampler::select_split_samples;
pub use task::{
    build_tree, BuildTreeError, BuildTreeOutput, BuildTreeParams, FeatureInput, BUILD_TREE_TASK,
};
