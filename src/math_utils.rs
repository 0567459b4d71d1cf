//! Mathematical utility functions and constants for HMM inference.
//!
//! Log-space helpers shared by the emission models, the forward engine and
//! the Viterbi decoder.

/// Numerical constants used across the crate.
pub mod constants {
    /// Tolerance for probability vectors summing to one
    pub const PROBABILITY_TOLERANCE: f64 = 1e-8;

    /// Maximum allowed disagreement between per-state `p1/p0` ratios
    pub const RATIO_CONSISTENCY_TOLERANCE: f64 = 1e-3;

    /// Starting point of the bracket search for the first category parameter
    pub const BRACKET_START: f64 = 0.5;

    /// Cap on doubling/halving steps while bracketing (reaches the subnormal range)
    pub const MAX_BRACKET_STEPS: usize = 1100;
}

/// `x * ln_p` with the convention `0 * ln(0) = 0`.
///
/// Counts of zero against a category of probability zero carry no
/// information and must not poison the sum with NaN.
#[inline]
pub fn xlogy(x: f64, ln_p: f64) -> f64 {
    if x == 0.0 {
        0.0
    } else {
        x * ln_p
    }
}

/// Numerically stable `ln(exp(a) + exp(b))`.
#[inline]
pub fn log_sum_exp_pair(a: f64, b: f64) -> f64 {
    let (small, big) = if a < b { (a, b) } else { (b, a) };
    if big == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    big + (small - big).exp().ln_1p()
}

/// Index of the largest value, ties resolved to the lowest index.
///
/// NaN entries are never selected unless every entry is NaN, in which case
/// index 0 is returned.
pub fn argmax_first(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] || (values[best].is_nan() && !v.is_nan()) {
            best = i;
        }
    }
    best
}
