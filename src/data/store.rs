//! Row-slab views over host-provided stores.
//!
//! The surrounding runtime partitions every store along axis 0 and hands
//! each shard a contiguous row slab together with the global index of its
//! first row. Slab constructors enforce the dense row-major layout
//! contract; the cross-store alignment preconditions are checked by the
//! task driver through [`check_row_aligned`] and [`check_output_aligned`].

use thiserror::Error;

use super::types::FeatureValue;

/// Store-geometry precondition violations.
///
/// These indicate caller bugs in how the runtime sliced or passed stores;
/// nothing is retried and no partial output is produced.
#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("dense row-major slab of {rows} rows x {cols} columns requires {expected} elements, got {got}")]
    LengthMismatch {
        rows: usize,
        cols: usize,
        expected: usize,
        got: usize,
    },

    #[error("stores are not aligned on the row axis: [{a_begin}, {a_end}) vs [{b_begin}, {b_end})")]
    RowMisaligned {
        a_begin: usize,
        a_end: usize,
        b_begin: usize,
        b_end: usize,
    },

    #[error("stores carry different output counts: {left} vs {right}")]
    OutputMismatch { left: usize, right: usize },
}

/// Common surface of a row slab: where it sits in the global row axis.
pub trait Slab {
    /// Global index of the first local row.
    fn row_begin(&self) -> usize;

    /// Number of local rows. May be zero; an empty shard still participates
    /// in every collective call.
    fn num_rows(&self) -> usize;

    /// One past the global index of the last local row.
    fn row_end(&self) -> usize {
        self.row_begin() + self.num_rows()
    }
}

/// Borrowed row-major feature slab: `num_rows x num_features` elements of a
/// float type, covering global rows `[row_begin, row_begin + num_rows)`.
#[derive(Debug, Clone, Copy)]
pub struct FeatureSlab<'a, T> {
    data: &'a [T],
    row_begin: usize,
    num_rows: usize,
    num_features: usize,
}

impl<'a, T: FeatureValue> FeatureSlab<'a, T> {
    /// Create a slab view over `data`.
    ///
    /// `data` must hold exactly `num_rows * num_features` elements in
    /// row-major order.
    pub fn new(
        data: &'a [T],
        row_begin: usize,
        num_rows: usize,
        num_features: usize,
    ) -> Result<Self, GeometryError> {
        let expected = num_rows * num_features;
        if data.len() != expected {
            return Err(GeometryError::LengthMismatch {
                rows: num_rows,
                cols: num_features,
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            row_begin,
            num_rows,
            num_features,
        })
    }

    /// Number of features (columns).
    #[inline]
    pub fn num_features(&self) -> usize {
        self.num_features
    }

    /// Element at (local row, feature).
    #[inline]
    pub fn value(&self, local_row: usize, feature: usize) -> T {
        debug_assert!(local_row < self.num_rows && feature < self.num_features);
        self.data[local_row * self.num_features + feature]
    }

    /// Local index of `global_row`, if this shard owns it.
    #[inline]
    pub fn local_row(&self, global_row: usize) -> Option<usize> {
        (self.row_begin..self.row_end())
            .contains(&global_row)
            .then(|| global_row - self.row_begin)
    }
}

impl<T> Slab for FeatureSlab<'_, T> {
    fn row_begin(&self) -> usize {
        self.row_begin
    }

    fn num_rows(&self) -> usize {
        self.num_rows
    }
}

/// Borrowed row-major statistics slab: `num_rows x num_outputs` doubles
/// (one gradient or hessian per row and output), row-aligned with the
/// feature slab of the same shard.
///
/// A slab always carries every output of its store; partial output slices
/// are not representable.
#[derive(Debug, Clone, Copy)]
pub struct StatsSlab<'a> {
    data: &'a [f64],
    row_begin: usize,
    num_rows: usize,
    num_outputs: usize,
}

impl<'a> StatsSlab<'a> {
    /// Create a slab view over `data`.
    ///
    /// `data` must hold exactly `num_rows * num_outputs` doubles in
    /// row-major order.
    pub fn new(
        data: &'a [f64],
        row_begin: usize,
        num_rows: usize,
        num_outputs: usize,
    ) -> Result<Self, GeometryError> {
        let expected = num_rows * num_outputs;
        if data.len() != expected {
            return Err(GeometryError::LengthMismatch {
                rows: num_rows,
                cols: num_outputs,
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            row_begin,
            num_rows,
            num_outputs,
        })
    }

    /// Number of outputs per row.
    #[inline]
    pub fn num_outputs(&self) -> usize {
        self.num_outputs
    }

    /// Element at (local row, output).
    #[inline]
    pub fn value(&self, local_row: usize, output: usize) -> f64 {
        debug_assert!(local_row < self.num_rows && output < self.num_outputs);
        self.data[local_row * self.num_outputs + output]
    }
}

impl Slab for StatsSlab<'_> {
    fn row_begin(&self) -> usize {
        self.row_begin
    }

    fn num_rows(&self) -> usize {
        self.num_rows
    }
}

/// Check that two slabs cover the same global row range.
pub fn check_row_aligned(a: &dyn Slab, b: &dyn Slab) -> Result<(), GeometryError> {
    if a.row_begin() != b.row_begin() || a.num_rows() != b.num_rows() {
        return Err(GeometryError::RowMisaligned {
            a_begin: a.row_begin(),
            a_end: a.row_end(),
            b_begin: b.row_begin(),
            b_end: b.row_end(),
        });
    }
    Ok(())
}

/// Check that two statistics slabs carry the same output count.
pub fn check_output_aligned(a: &StatsSlab<'_>, b: &StatsSlab<'_>) -> Result<(), GeometryError> {
    if a.num_outputs() != b.num_outputs() {
        return Err(GeometryError::OutputMismatch {
            left: a.num_outputs(),
            right: b.num_outputs(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_slab_indexing() {
        // 2 local rows x 3 features starting at global row 4.
        let data = vec![0.0f32, 1.0, 2.0, 10.0, 11.0, 12.0];
        let slab = FeatureSlab::new(&data, 4, 2, 3).unwrap();

        assert_eq!(slab.value(0, 2), 2.0);
        assert_eq!(slab.value(1, 0), 10.0);
        assert_eq!(slab.local_row(4), Some(0));
        assert_eq!(slab.local_row(5), Some(1));
        assert_eq!(slab.local_row(3), None);
        assert_eq!(slab.local_row(6), None);
    }

    #[test]
    fn empty_slab_is_valid() {
        let slab = FeatureSlab::<f64>::new(&[], 0, 0, 5).unwrap();
        assert_eq!(slab.num_rows(), 0);
        assert_eq!(slab.local_row(0), None);
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let data = vec![0.0f64; 5];
        let err = FeatureSlab::new(&data, 0, 2, 3).unwrap_err();
        assert!(matches!(err, GeometryError::LengthMismatch { expected: 6, got: 5, .. }));
    }

    #[test]
    fn alignment_checks() {
        let x_data = vec![0.0f64; 6];
        let g_data = vec![0.0f64; 2];
        let x = FeatureSlab::new(&x_data, 4, 2, 3).unwrap();
        let g = StatsSlab::new(&g_data, 4, 2, 1).unwrap();
        assert!(check_row_aligned(&x, &g).is_ok());

        let shifted = StatsSlab::new(&g_data, 3, 2, 1).unwrap();
        assert!(check_row_aligned(&x, &shifted).is_err());

        let h_data = vec![0.0f64; 4];
        let h = StatsSlab::new(&h_data, 4, 2, 2).unwrap();
        assert!(check_output_aligned(&g, &h).is_err());
    }
}
