//! Store views and element types for task inputs.
//!
//! The runtime hands each shard a contiguous row slab of every input
//! store. [`FeatureSlab`] and [`StatsSlab`] are the typed views over those
//! slabs, and [`FeatureValue`] is the element-type seam the builder is
//! monomorphized over.

mod store;
mod types;

pub use store::{
    check_output_aligned, check_row_aligned, FeatureSlab, GeometryError, Slab, StatsSlab,
};
pub use types::{FeatureType, FeatureValue};
