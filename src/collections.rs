//! Owned dense matrices with explicit dimensions.
//!
//! Every two-dimensional array of the crate (transition matrices, emission
//! likelihoods, posteriors, category parameters) is a [`DenseMatrix`]: a
//! row-major `Vec<f64>` that knows its shape. Row slices are handed to the
//! numerical kernels; nothing is addressed through unchecked offsets.

use crate::errors::{try_zeroed_buffer, validate_length, HmmError, HmmResult};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// Row-major matrix of `f64`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DenseMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl DenseMatrix {
    /// Zero-filled matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Zero-filled matrix, reporting allocation failure instead of aborting.
    pub fn try_zeros(rows: usize, cols: usize) -> HmmResult<Self> {
        let len = rows.checked_mul(cols).ok_or(HmmError::AllocationFailed {
            operation: "DenseMatrix::try_zeros".to_string(),
            bytes: usize::MAX,
        })?;
        Ok(Self {
            rows,
            cols,
            data: try_zeroed_buffer(len, "DenseMatrix::try_zeros")?,
        })
    }

    /// Matrix filled with a constant.
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    /// Wrap a row-major buffer.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> HmmResult<Self> {
        validate_length(data.len(), rows * cols, "DenseMatrix::from_vec")?;
        Ok(Self { rows, cols, data })
    }

    /// Build from nested rows, which must all have the same length.
    pub fn from_rows(rows: &[Vec<f64>]) -> HmmResult<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            validate_length(row.len(), cols, "DenseMatrix::from_rows")?;
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    /// Square matrix with `diagonal` on the diagonal and the remaining row
    /// mass spread evenly off the diagonal.
    pub fn persistent_transitions(states: usize, diagonal: f64) -> Self {
        let mut matrix = Self::zeros(states, states);
        if states == 1 {
            matrix[(0, 0)] = 1.0;
            return matrix;
        }
        let off = (1.0 - diagonal) / (states - 1) as f64;
        for i in 0..states {
            for j in 0..states {
                matrix[(i, j)] = if i == j { diagonal } else { off };
            }
        }
        matrix
    }

    /// Number of rows.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `(rows, cols)`.
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Whether the matrix is square.
    #[inline]
    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    /// Borrow row `i`.
    #[inline]
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Mutably borrow row `i`.
    #[inline]
    pub fn row_mut(&mut self, i: usize) -> &mut [f64] {
        &mut self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Iterate over rows.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks(self.cols.max(1)).take(self.rows)
    }

    /// The underlying row-major buffer.
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// The underlying row-major buffer, mutably.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Set every entry to `value`.
    pub fn fill(&mut self, value: f64) {
        self.data.iter_mut().for_each(|x| *x = value);
    }

    /// Copy row `src` over row `dst` (`src` must differ from `dst`).
    pub fn copy_row(&mut self, src: usize, dst: usize) {
        let cols = self.cols;
        self.data
            .copy_within(src * cols..(src + 1) * cols, dst * cols);
    }

    /// Element-wise addition of another matrix of the same shape.
    pub fn add_assign(&mut self, other: &DenseMatrix) -> HmmResult<()> {
        validate_length(other.data.len(), self.data.len(), "DenseMatrix::add_assign")?;
        for (x, y) in self.data.iter_mut().zip(&other.data) {
            *x += y;
        }
        Ok(())
    }

    /// Element-wise natural logarithm.
    pub fn ln(&self) -> Self {
        Self {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|x| x.ln()).collect(),
        }
    }

    /// Sum of each row.
    pub fn row_sums(&self) -> Vec<f64> {
        self.iter_rows().map(|row| row.iter().sum()).collect()
    }

    /// Largest absolute element-wise difference with a matrix of the same shape.
    pub fn max_abs_diff(&self, other: &DenseMatrix) -> f64 {
        self.data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }
}

impl Index<(usize, usize)> for DenseMatrix {
    type Output = f64;

    #[inline]
    fn index(&self, (i, j): (usize, usize)) -> &f64 {
        debug_assert!(j < self.cols);
        &self.data[i * self.cols + j]
    }
}

impl IndexMut<(usize, usize)> for DenseMatrix {
    #[inline]
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut f64 {
        debug_assert!(j < self.cols);
        &mut self.data[i * self.cols + j]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_major_layout() {
        let m = DenseMatrix::from_rows(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        assert_eq!(m.shape(), (2, 3));
        assert_eq!(m[(1, 0)], 4.0);
        assert_eq!(m.row(0), &[1.0, 2.0, 3.0]);
        assert_eq!(m.as_slice(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(m.row_sums(), vec![6.0, 15.0]);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let result = DenseMatrix::from_rows(&[vec![1.0, 2.0], vec![3.0]]);
        assert!(matches!(result, Err(HmmError::DimensionMismatch { .. })));
        assert!(DenseMatrix::from_vec(2, 2, vec![1.0; 3]).is_err());
    }

    #[test]
    fn test_persistent_transitions_are_stochastic() {
        for states in 1..5 {
            let q = DenseMatrix::persistent_transitions(states, 0.7);
            assert!(q.is_square());
            for s in q.row_sums() {
                assert!((s - 1.0).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_copy_row_and_diff() {
        let mut m = DenseMatrix::zeros(3, 2);
        m.row_mut(0).copy_from_slice(&[0.25, 0.75]);
        m.copy_row(0, 2);
        assert_eq!(m.row(2), &[0.25, 0.75]);
        assert_eq!(m.row(1), &[0.0, 0.0]);

        let other = DenseMatrix::zeros(3, 2);
        assert_eq!(m.max_abs_diff(&other), 0.75);
    }
}
