//! Starting values for the emission parameters.
//!
//! Baum-Welch only re-estimates the transition matrix and the category
//! probabilities; the shape `a` and the zero-inflation `pi` are fixed
//! beforehand from the control channel. [`ParameterSeeder`] is the seam for
//! that estimate. [`MomentSeeder`] is a method-of-moments implementation;
//! likelihood-based seeders plug in through the same trait.

use crate::errors::{HmmError, HmmResult};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Zero-inflated negative binomial fit of a single count channel.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SeedEstimate {
    /// Negative binomial shape `a`
    pub shape: f64,
    /// Scale, so that the mean of the non-inflated component is `shape * scale`
    pub scale: f64,
    /// Probability `pi` that a position is not structurally zero
    pub zero_inflation: f64,
}

/// Source of seed estimates for the fixed emission parameters.
pub trait ParameterSeeder {
    /// Fit `counts`. Negative values mark missing data and must be ignored.
    fn seed(&self, counts: &[i32]) -> HmmResult<SeedEstimate>;
}

/// Method-of-moments negative binomial fit.
///
/// With sample mean `μ` and variance `σ²` of the valid counts, the shape is
/// `μ² / (σ² - μ)` and the scale `μ / a`. The zero-inflation matches the
/// observed zero fraction `z`:
/// `pi = (1 - z) / (1 - (a / (a + μ))^a)`, clamped to `(0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MomentSeeder;

impl ParameterSeeder for MomentSeeder {
    fn seed(&self, counts: &[i32]) -> HmmResult<SeedEstimate> {
        let valid: Vec<f64> = counts.iter().filter(|&&y| y >= 0).map(|&y| y as f64).collect();
        if valid.len() < 2 {
            return Err(HmmError::SeedingFailed {
                reason: format!("need at least 2 valid counts, got {}", valid.len()),
            });
        }

        let n = valid.len() as f64;
        let mean = valid.iter().sum::<f64>() / n;
        let variance = valid.iter().map(|y| (y - mean).powi(2)).sum::<f64>() / (n - 1.0);
        if !(mean > 0.0) || !(variance > mean) {
            return Err(HmmError::SeedingFailed {
                reason: format!(
                    "counts are not overdispersed (mean {:.4}, variance {:.4})",
                    mean, variance
                ),
            });
        }

        let shape = mean * mean / (variance - mean);
        let zero_fraction = valid.iter().filter(|&&y| y == 0.0).count() as f64 / n;
        let nb_zero = (shape / (shape + mean)).powf(shape);
        let zero_inflation = ((1.0 - zero_fraction) / (1.0 - nb_zero)).clamp(f64::MIN_POSITIVE, 1.0);

        Ok(SeedEstimate {
            shape,
            scale: mean / shape,
            zero_inflation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_moment_estimates() {
        // mean 2, sample variance 5.2
        let counts = [0, 0, 1, 2, 3, 6];
        let estimate = MomentSeeder.seed(&counts).unwrap();
        let mean = 2.0;
        let variance = (4.0 + 4.0 + 1.0 + 0.0 + 1.0 + 16.0) / 5.0;
        let shape = mean * mean / (variance - mean);
        assert_approx_eq!(estimate.shape, shape, 1e-12);
        assert_approx_eq!(estimate.shape * estimate.scale, mean, 1e-12);
        assert!(estimate.zero_inflation > 0.0 && estimate.zero_inflation <= 1.0);
    }

    #[test]
    fn test_missing_counts_ignored() {
        let a = MomentSeeder.seed(&[0, 0, 1, 2, 3, 6]).unwrap();
        let b = MomentSeeder.seed(&[0, i32::MIN, 0, 1, -1, 2, 3, 6]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_seeding_failures() {
        assert!(matches!(
            MomentSeeder.seed(&[4]),
            Err(HmmError::SeedingFailed { .. })
        ));
        // Underdispersed
        assert!(MomentSeeder.seed(&[3, 3, 3, 4]).is_err());
        assert!(MomentSeeder.seed(&[0, 0, 0]).is_err());
    }
}
