//! Feature element types accepted by the tree builder.
//!
//! Feature stores arrive with a runtime element type of either `f32` or
//! `f64`. The builder is monomorphized over [`FeatureValue`]; the task
//! driver inspects the runtime type and dispatches to the matching
//! instantiation. Gradients, hessians, and every produced tree stay in
//! `f64` regardless of the feature type.

use std::cmp::Ordering;

use crate::comm::Communicator;

/// Runtime tag for the element type of a feature store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureType {
    F32,
    F64,
}

/// A feature matrix element type.
///
/// Implementations exist for `f32` and `f64` only. The trait carries the
/// pieces the builder needs from the element type: widening to `f64` for
/// threshold storage and comparisons, a total order for sorting candidate
/// thresholds, and the element-typed collective reduction used by the
/// split-sample exchange (float32 features reduce as float32, never as
/// reinterpreted doubles).
pub trait FeatureValue: Copy + PartialOrd + Default + Send + Sync + 'static {
    /// Runtime tag matching this type.
    const TYPE: FeatureType;

    /// Widen to `f64`.
    fn to_f64(self) -> f64;

    /// IEEE total ordering, usable as a sort comparator.
    fn total_cmp(&self, other: &Self) -> Ordering;

    /// Element-wise sum of `buf` across all shards, in place.
    fn allreduce_sum(comm: &dyn Communicator, buf: &mut [Self]);
}

impl FeatureValue for f32 {
    const TYPE: FeatureType = FeatureType::F32;

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline]
    fn total_cmp(&self, other: &Self) -> Ordering {
        f32::total_cmp(self, other)
    }

    fn allreduce_sum(comm: &dyn Communicator, buf: &mut [Self]) {
        comm.allreduce_sum_f32(buf);
    }
}

impl FeatureValue for f64 {
    const TYPE: FeatureType = FeatureType::F64;

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn total_cmp(&self, other: &Self) -> Ordering {
        f64::total_cmp(self, other)
    }

    fn allreduce_sum(comm: &dyn Communicator, buf: &mut [Self]) {
        comm.allreduce_sum_f64(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SingleShard;

    #[test]
    fn type_tags() {
        assert_eq!(<f32 as FeatureValue>::TYPE, FeatureType::F32);
        assert_eq!(<f64 as FeatureValue>::TYPE, FeatureType::F64);
    }

    #[test]
    fn total_order_handles_nan() {
        let mut values = vec![2.0f32, f32::NAN, -1.0, 0.0];
        values.sort_unstable_by(FeatureValue::total_cmp);
        assert_eq!(&values[..3], &[-1.0, 0.0, 2.0]);
        assert!(values[3].is_nan());
    }

    #[test]
    fn single_shard_reduce_is_identity() {
        let mut buf = vec![1.0f32, -2.5, 3.0];
        f32::allreduce_sum(&SingleShard, &mut buf);
        assert_eq!(buf, vec![1.0, -2.5, 3.0]);
    }
}
