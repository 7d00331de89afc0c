//! gridboost: distributed gradient-boosted tree construction.
//!
//! This crate builds a single bounded-depth regression tree from a
//! horizontally partitioned feature matrix and per-row gradient/hessian
//! statistics. Each shard sees one contiguous row slab; split decisions are
//! made on gradient histograms that are summed across shards before every
//! decision, so all shards produce the same tree.
//!
//! The surrounding runtime (gradient computation, the boosting loop, and
//! store partitioning) is out of scope; its contract is captured by the
//! [`comm::Communicator`] trait and the slab views in [`data`]. The entry
//! point for one invocation is [`training::build_tree`].

pub mod comm;
pub mod data;
pub mod testing;
pub mod training;
pub mod tree;
