//! Split-sample selection.
//!
//! Candidate thresholds are the feature values of a random row sample,
//! taken over the *global* dataset. Every shard draws the same sequence of
//! global row indices from the same seed, contributes the values of the
//! rows it owns, and receives everyone else's through a summing exchange.
//! Sorting and deduplicating the sampled values per feature yields the
//! compressed threshold set.

use rand::Rng;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::comm::Communicator;
use crate::data::{FeatureSlab, FeatureValue};

use super::proposals::SplitProposals;

/// Sample `split_samples` global rows and build the candidate thresholds.
///
/// The draft buffer is feature-major (`num_features x split_samples`) and
/// zero everywhere a shard does not own the sampled row. Each global row is
/// owned by at most one shard, so the collective sum is a disjoint
/// exchange: every cell has at most one nonzero contributor, and the
/// reduction runs in the feature element type.
///
/// Duplicate sampled values are dropped per feature; equal thresholds
/// cannot distinguish rows and would only widen the histogram.
pub fn select_split_samples<T: FeatureValue>(
    comm: &dyn Communicator,
    x: &FeatureSlab<'_, T>,
    split_samples: usize,
    seed: u64,
    dataset_rows: u64,
) -> SplitProposals<T> {
    assert!(split_samples > 0, "split_samples must be positive");
    assert!(dataset_rows > 0, "dataset_rows must be positive");

    // Identical on every shard: same generator, same seed, same draw count.
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let row_samples: Vec<u64> = (0..split_samples)
        .map(|_| rng.gen_range(0..dataset_rows))
        .collect();

    let num_features = x.num_features();
    let mut draft: Vec<T> = vec![T::default(); num_features * split_samples];
    for (sample, &row) in row_samples.iter().enumerate() {
        if let Some(local) = x.local_row(row as usize) {
            for feature in 0..num_features {
                draft[feature * split_samples + sample] = x.value(local, feature);
            }
        }
    }
    T::allreduce_sum(comm, &mut draft);

    let mut values = Vec::with_capacity(draft.len());
    let mut row_pointers = Vec::with_capacity(num_features + 1);
    row_pointers.push(0u32);
    for feature in 0..num_features {
        let column = &draft[feature * split_samples..(feature + 1) * split_samples];
        let mut unique: Vec<T> = column.to_vec();
        unique.sort_unstable_by(T::total_cmp);
        unique.dedup_by(|a, b| a.total_cmp(b).is_eq());
        values.extend_from_slice(&unique);
        row_pointers.push(values.len() as u32);
    }

    SplitProposals::new(values, row_pointers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SingleShard;
    use crate::data::FeatureSlab;

    #[test]
    fn thresholds_are_sorted_unique_per_feature() {
        // Feature 0 takes two distinct values, feature 1 is constant.
        let data: Vec<f64> = (0..8).flat_map(|i| [(i % 2) as f64, 3.0]).collect();
        let x = FeatureSlab::new(&data, 0, 8, 2).unwrap();

        let proposals = select_split_samples(&SingleShard, &x, 8, 7, 8);

        let f0: Vec<f64> = proposals.feature_range(0).map(|b| proposals.threshold(b)).collect();
        let f1: Vec<f64> = proposals.feature_range(1).map(|b| proposals.threshold(b)).collect();

        assert!(f0.windows(2).all(|w| w[0] < w[1]));
        assert!(f0.iter().all(|v| *v == 0.0 || *v == 1.0));
        assert_eq!(f1, vec![3.0]);
    }

    #[test]
    fn same_seed_draws_identical_proposals() {
        let data: Vec<f32> = (0..40).map(|i| (i * 7 % 13) as f32).collect();
        let x = FeatureSlab::new(&data, 0, 40, 1).unwrap();

        let a = select_split_samples(&SingleShard, &x, 16, 42, 40);
        let b = select_split_samples(&SingleShard, &x, 16, 42, 40);

        assert_eq!(a.histogram_size(), b.histogram_size());
        for bin in 0..a.histogram_size() {
            assert_eq!(a.threshold(bin), b.threshold(bin));
        }
    }

    #[test]
    fn different_seeds_draw_different_rows() {
        let data: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let x = FeatureSlab::new(&data, 0, 100, 1).unwrap();

        let a = select_split_samples(&SingleShard, &x, 8, 1, 100);
        let b = select_split_samples(&SingleShard, &x, 8, 2, 100);

        let a_vals: Vec<f64> = a.feature_range(0).map(|bin| a.threshold(bin)).collect();
        let b_vals: Vec<f64> = b.feature_range(0).map(|bin| b.threshold(bin)).collect();
        assert_ne!(a_vals, b_vals);
    }

    #[test]
    fn constant_feature_collapses_to_one_threshold() {
        let data = vec![5.0f64; 32];
        let x = FeatureSlab::new(&data, 0, 32, 1).unwrap();

        let proposals = select_split_samples(&SingleShard, &x, 16, 0, 32);

        assert_eq!(proposals.histogram_size(), 1);
        assert_eq!(proposals.threshold(0), 5.0);
    }
}
