//! Observation series and the emission cache index.
//!
//! A series is `n` rows of `r` integer counts split into independent
//! fragments. Loading and block detection belong to the caller; this module
//! only defines the seam ([`ObservationProvider`]), an in-memory
//! implementation ([`ChipSeries`]) and the index used to compute each
//! distinct observation row once ([`ObservationIndex`]).

use crate::errors::{validate_length, HmmError, HmmResult};
use std::collections::HashMap;

/// Sentinel for a missing count.
pub const MISSING_COUNT: i32 = i32::MIN;

/// Source of a count series already loaded in memory.
pub trait ObservationProvider {
    /// Number of count dimensions per position (`r`).
    fn dimension(&self) -> usize;

    /// Lengths of the independent fragments, summing to the series length.
    fn block_sizes(&self) -> &[usize];

    /// Row-major counts, `len() * dimension()` values.
    fn counts(&self) -> &[i32];

    /// Total number of positions.
    fn len(&self) -> usize {
        self.block_sizes().iter().sum()
    }

    /// Whether the series has no positions.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counts at position `k`.
    fn row(&self, k: usize) -> &[i32] {
        let r = self.dimension();
        &self.counts()[k * r..(k + 1) * r]
    }
}

/// Whether a row carries a missing or negative count.
#[inline]
pub fn is_invalid_row(row: &[i32]) -> bool {
    row.iter().any(|&y| y < 0)
}

/// Whether every count of a row is zero.
#[inline]
pub fn is_all_zero_row(row: &[i32]) -> bool {
    row.iter().all(|&y| y == 0)
}

/// Check that a provider's counts cover its fragments.
///
/// Row access on the trait slices `counts()` directly; call this before
/// indexing a provider built outside the crate.
pub fn validate_provider<P: ObservationProvider + ?Sized>(series: &P) -> HmmResult<()> {
    if series.dimension() == 0 {
        return Err(HmmError::InvalidParameter {
            parameter: "dimension".to_string(),
            value: 0.0,
            constraint: "must be >= 1".to_string(),
        });
    }
    validate_length(
        series.counts().len(),
        series.len() * series.dimension(),
        "observation counts",
    )
}

/// In-memory count series with fragment boundaries.
#[derive(Debug, Clone, PartialEq)]
pub struct ChipSeries {
    dimension: usize,
    block_sizes: Vec<usize>,
    counts: Vec<i32>,
}

impl ChipSeries {
    /// Build a series, checking that fragments are non-empty and cover the counts.
    pub fn new(dimension: usize, block_sizes: Vec<usize>, counts: Vec<i32>) -> HmmResult<Self> {
        if dimension == 0 {
            return Err(HmmError::InvalidParameter {
                parameter: "dimension".to_string(),
                value: 0.0,
                constraint: "must be >= 1".to_string(),
            });
        }
        if block_sizes.is_empty() {
            return Err(HmmError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }
        if let Some(i) = block_sizes.iter().position(|&s| s == 0) {
            return Err(HmmError::InvalidParameter {
                parameter: format!("block_sizes[{}]", i),
                value: 0.0,
                constraint: "fragments must be non-empty".to_string(),
            });
        }
        let n: usize = block_sizes.iter().sum();
        validate_length(counts.len(), n * dimension, "ChipSeries counts")?;

        Ok(Self {
            dimension,
            block_sizes,
            counts,
        })
    }

    /// Single-fragment series from nested rows.
    pub fn from_rows(rows: &[Vec<i32>]) -> HmmResult<Self> {
        let dimension = rows.first().map_or(0, Vec::len);
        let mut counts = Vec::with_capacity(rows.len() * dimension);
        for row in rows {
            validate_length(row.len(), dimension, "ChipSeries row")?;
            counts.extend_from_slice(row);
        }
        Self::new(dimension, vec![rows.len()], counts)
    }

    /// Same counts split into different fragments.
    pub fn with_blocks(self, block_sizes: Vec<usize>) -> HmmResult<Self> {
        Self::new(self.dimension, block_sizes, self.counts)
    }

    /// Counts of column `j`, one per position.
    pub fn column(&self, j: usize) -> Vec<i32> {
        self.counts
            .chunks(self.dimension)
            .map(|row| row[j])
            .collect()
    }
}

impl ObservationProvider for ChipSeries {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn block_sizes(&self) -> &[usize] {
        &self.block_sizes
    }

    fn counts(&self) -> &[i32] {
        &self.counts
    }
}

/// Maps each position to the earliest position with an identical row.
///
/// Built once per series and reused across EM iterations; it is only valid
/// for the counts it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservationIndex {
    first_occurrence: Vec<usize>,
    first_all_zero: Option<usize>,
    distinct: usize,
}

impl ObservationIndex {
    /// Index the rows of a series.
    pub fn build<P: ObservationProvider + ?Sized>(series: &P) -> Self {
        let n = series.len();
        let mut seen: HashMap<&[i32], usize> = HashMap::new();
        let mut first_occurrence = Vec::with_capacity(n);
        let mut first_all_zero = None;

        for k in 0..n {
            let row = series.row(k);
            let first = *seen.entry(row).or_insert(k);
            if first == k && first_all_zero.is_none() && is_all_zero_row(row) {
                first_all_zero = Some(k);
            }
            first_occurrence.push(first);
        }

        Self {
            first_occurrence,
            first_all_zero,
            distinct: seen.len(),
        }
    }

    /// Number of indexed positions.
    pub fn len(&self) -> usize {
        self.first_occurrence.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.first_occurrence.is_empty()
    }

    /// Earliest position whose row equals the row at `k`.
    #[inline]
    pub fn first_occurrence(&self, k: usize) -> usize {
        self.first_occurrence[k]
    }

    /// Whether row `k` repeats an earlier row.
    #[inline]
    pub fn is_cached(&self, k: usize) -> bool {
        self.first_occurrence[k] < k
    }

    /// First position whose counts are all zero, if any.
    pub fn first_all_zero(&self) -> Option<usize> {
        self.first_all_zero
    }

    /// Whether row `k` belongs to the all-zero equivalence class.
    #[inline]
    pub fn is_all_zero(&self, k: usize) -> bool {
        self.first_all_zero == Some(self.first_occurrence[k])
    }

    /// Number of distinct rows.
    pub fn distinct_rows(&self) -> usize {
        self.distinct
    }
}
