//! Emission models for count observations.
//!
//! Two per-state emission laws are provided:
//!
//! - the zero-inflated negative multinomial (ZINM): with probability
//!   `1 - pi` a position emits all zeros, otherwise its counts follow a
//!   negative multinomial with shape `a` and category probabilities `p`;
//! - a two-component negative multinomial mixture with weight `theta`.
//!
//! Both fill an `n × m` matrix of per-position, per-state likelihoods and
//! compute each distinct observation row only once.

use crate::collections::DenseMatrix;
use crate::config::{EmissionConfig, OutputMode};
use crate::errors::{validate_length, validate_parameter, validate_positive, HmmError, HmmResult};
use crate::math_utils::{log_sum_exp_pair, xlogy};
use crate::observations::{is_all_zero_row, is_invalid_row, ObservationIndex, ObservationProvider};
use log::warn;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use statrs::function::gamma::ln_gamma;

/// Parameters of the ZINM emission law.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ZinmParameters {
    /// Negative multinomial shape `a`, shared by all states
    pub shape: f64,
    /// Probability `pi` that a position is not structurally zero
    pub zero_inflation: f64,
    /// Category probabilities, one row of `r + 1` values per state
    pub p: DenseMatrix,
}

impl ZinmParameters {
    /// Build and validate a parameter set.
    pub fn new(shape: f64, zero_inflation: f64, p: DenseMatrix) -> HmmResult<Self> {
        let params = Self {
            shape,
            zero_inflation,
            p,
        };
        params.validate()?;
        Ok(params)
    }

    /// Number of states.
    pub fn states(&self) -> usize {
        self.p.rows()
    }

    /// Number of count dimensions `r`.
    pub fn dimension(&self) -> usize {
        self.p.cols().saturating_sub(1)
    }

    /// Check the scalar parameters and the shape of `p`.
    pub fn validate(&self) -> HmmResult<()> {
        validate_positive(self.shape, "shape")?;
        validate_parameter(self.zero_inflation, 0.0, 1.0, "zero_inflation")?;
        validate_category_matrix(&self.p, "p")
    }
}

/// Parameters of the two-component mixture emission law.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MixtureParameters {
    /// Weight of the first component
    pub theta: f64,
    /// Negative multinomial shape, shared by both components
    pub shape: f64,
    /// Category probabilities of the first component
    pub p: DenseMatrix,
    /// Category probabilities of the second component
    pub q: DenseMatrix,
}

impl MixtureParameters {
    /// Build and validate a parameter set.
    pub fn new(theta: f64, shape: f64, p: DenseMatrix, q: DenseMatrix) -> HmmResult<Self> {
        let params = Self { theta, shape, p, q };
        params.validate()?;
        Ok(params)
    }

    /// Check the scalar parameters and that `p` and `q` have the same shape.
    pub fn validate(&self) -> HmmResult<()> {
        validate_parameter(self.theta, 0.0, 1.0, "theta")?;
        validate_positive(self.shape, "shape")?;
        validate_category_matrix(&self.p, "p")?;
        validate_category_matrix(&self.q, "q")?;
        validate_length(self.q.rows(), self.p.rows(), "mixture states")?;
        validate_length(self.q.cols(), self.p.cols(), "mixture categories")
    }
}

fn validate_category_matrix(p: &DenseMatrix, name: &str) -> HmmResult<()> {
    if p.rows() == 0 {
        return Err(HmmError::InsufficientData {
            required: 1,
            actual: 0,
        });
    }
    if p.cols() < 2 {
        return Err(HmmError::DimensionMismatch {
            context: format!("columns of {}", name),
            expected: 2,
            actual: p.cols(),
        });
    }
    Ok(())
}

/// Natural logarithm of the row-normalized category probabilities.
///
/// Returns the log matrix and whether any row was off by more than machine
/// epsilon before normalization.
fn log_category_rows(p: &DenseMatrix, name: &str) -> HmmResult<(DenseMatrix, bool)> {
    let mut log_p = DenseMatrix::zeros(p.rows(), p.cols());
    let mut renormalized = false;
    for (i, row) in p.iter_rows().enumerate() {
        if let Some(&bad) = row.iter().find(|&&x| !(x >= 0.0 && x.is_finite())) {
            return Err(HmmError::InvalidParameter {
                parameter: format!("{}[{}]", name, i),
                value: bad,
                constraint: "finite and >= 0".to_string(),
            });
        }
        let total: f64 = row.iter().sum();
        if !(total > 0.0) {
            return Err(HmmError::InvalidParameter {
                parameter: format!("sum({}[{}])", name, i),
                value: total,
                constraint: "must be > 0".to_string(),
            });
        }
        renormalized |= (total - 1.0).abs() > f64::EPSILON;
        for (out, &x) in log_p.row_mut(i).iter_mut().zip(row) {
            *out = (x / total).ln();
        }
    }
    Ok((log_p, renormalized))
}

fn validate_inputs<P: ObservationProvider + ?Sized>(
    states: usize,
    categories: usize,
    series: &P,
    index: &ObservationIndex,
    pem: &DenseMatrix,
) -> HmmResult<()> {
    validate_length(categories, series.dimension() + 1, "category columns")?;
    validate_length(index.len(), series.len(), "observation index")?;
    validate_length(pem.rows(), series.len(), "emission rows")?;
    validate_length(pem.cols(), states, "emission columns")
}

/// `ln Γ(a + Σy) - ln Γ(a) - Σ ln Γ(y_j + 1)`, identical for every state.
fn log_normalizing_constant(shape: f64, counts: &[i32]) -> f64 {
    let mut total = shape;
    let mut term = -ln_gamma(shape);
    for &y in counts {
        total += y as f64;
        term -= ln_gamma(y as f64 + 1.0);
    }
    term + ln_gamma(total)
}

/// Exponentiate a row of log-likelihoods according to the output mode.
#[inline]
fn finish_row(row: &mut [f64], mode: OutputMode) {
    match mode {
        OutputMode::Log | OutputMode::Ratio => {}
        OutputMode::Linear => row.iter_mut().for_each(|x| *x = x.exp()),
        OutputMode::Adaptive => {
            let total: f64 = row.iter().map(|x| x.exp()).sum();
            if total > 0.0 {
                row.iter_mut().for_each(|x| *x = x.exp());
            }
        }
    }
}

/// Per-position, per-state ZINM emission likelihoods.
///
/// `pem` must have one row per position and one column per state. Rows of
/// `p` are renormalized when they do not sum to 1, with a single warning
/// per call unless `config.suppress_warnings` is set. Rows with a missing or
/// negative count become NaN. In [`OutputMode::Adaptive`], a row whose
/// likelihoods all underflow is kept in log space, which the forward
/// algorithm recognizes by its negative entries.
///
/// # Errors
/// [`HmmError::InvalidParameter`] for negative probabilities or
/// [`OutputMode::Ratio`], [`HmmError::DimensionMismatch`] when the buffers
/// disagree with the series.
pub fn zinm_emissions<P: ObservationProvider + ?Sized>(
    params: &ZinmParameters,
    series: &P,
    index: &ObservationIndex,
    config: &EmissionConfig,
    pem: &mut DenseMatrix,
) -> HmmResult<()> {
    if config.output_mode == OutputMode::Ratio {
        return Err(HmmError::InvalidParameter {
            parameter: "output_mode".to_string(),
            value: f64::NAN,
            constraint: "ratio output is only defined for the mixture model".to_string(),
        });
    }
    params.validate()?;
    let m = params.states();
    validate_inputs(m, params.p.cols(), series, index, pem)?;

    let (log_p, renormalized) = log_category_rows(&params.p, "p")?;
    if renormalized && !config.suppress_warnings {
        warn!("Renormalizing rows of 'p' that do not sum to 1");
    }

    let a = params.shape;
    let pi = params.zero_inflation;

    for k in 0..series.len() {
        let first = index.first_occurrence(k);
        if first < k {
            pem.copy_row(first, k);
            continue;
        }

        let counts = series.row(k);
        let out = pem.row_mut(k);
        if is_invalid_row(counts) {
            out.iter_mut().for_each(|x| *x = f64::NAN);
            continue;
        }

        if is_all_zero_row(counts) {
            for (x, lp) in out.iter_mut().zip(log_p.iter_rows()) {
                *x = (pi * (a * lp[0]).exp() + (1.0 - pi)).ln();
            }
        } else {
            for (x, lp) in out.iter_mut().zip(log_p.iter_rows()) {
                *x = counts
                    .iter()
                    .zip(&lp[1..])
                    .fold(a * lp[0], |acc, (&y, &l)| acc + xlogy(y as f64, l));
            }
        }

        if config.include_normalizing_constant {
            let c = log_normalizing_constant(a, counts);
            out.iter_mut().for_each(|x| *x += c);
        }

        finish_row(out, config.output_mode);
    }

    Ok(())
}

/// Per-position, per-state likelihoods of the two-component mixture.
///
/// For state `i` the likelihood is
/// `theta p0^a Π p_{j+1}^y_j + (1 - theta) q0^a Π q_{j+1}^y_j`, each term
/// computed in log space. The normalizing constant, when requested, is
/// shared by both components and cancels in [`OutputMode::Ratio`], which
/// writes the posterior responsibility of the first component instead.
pub fn mixture_emissions<P: ObservationProvider + ?Sized>(
    params: &MixtureParameters,
    series: &P,
    index: &ObservationIndex,
    config: &EmissionConfig,
    pem: &mut DenseMatrix,
) -> HmmResult<()> {
    params.validate()?;
    let m = params.p.rows();
    validate_inputs(m, params.p.cols(), series, index, pem)?;

    let (log_p, p_renormalized) = log_category_rows(&params.p, "p")?;
    let (log_q, q_renormalized) = log_category_rows(&params.q, "q")?;
    if (p_renormalized || q_renormalized) && !config.suppress_warnings {
        warn!("Renormalizing rows of 'p' and/or 'q' that do not sum to 1");
    }

    let a = params.shape;
    let log_theta = params.theta.ln();
    let log_one_minus_theta = (1.0 - params.theta).ln();

    for k in 0..series.len() {
        let first = index.first_occurrence(k);
        if first < k {
            pem.copy_row(first, k);
            continue;
        }

        let counts = series.row(k);
        let out = pem.row_mut(k);
        if is_invalid_row(counts) {
            out.iter_mut().for_each(|x| *x = f64::NAN);
            continue;
        }

        let constant = if config.include_normalizing_constant {
            log_normalizing_constant(a, counts)
        } else {
            0.0
        };

        for (i, x) in out.iter_mut().enumerate() {
            let (lp, lq) = (log_p.row(i), log_q.row(i));
            let mut p_term = log_theta + a * lp[0] + constant;
            let mut q_term = log_one_minus_theta + a * lq[0] + constant;
            for (j, &y) in counts.iter().enumerate() {
                p_term += xlogy(y as f64, lp[j + 1]);
                q_term += xlogy(y as f64, lq[j + 1]);
            }

            *x = match config.output_mode {
                OutputMode::Linear => p_term.exp() + q_term.exp(),
                OutputMode::Ratio => 1.0 / (1.0 + (q_term - p_term).exp()),
                OutputMode::Log | OutputMode::Adaptive => log_sum_exp_pair(p_term, q_term),
            };
        }

        if config.output_mode == OutputMode::Adaptive {
            finish_row(out, OutputMode::Adaptive);
        }
    }

    Ok(())
}
