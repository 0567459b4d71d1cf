//! Result structures for Baum-Welch fitting.

use crate::collections::DenseMatrix;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Lifecycle of a Baum-Welch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OptimizerState {
    /// Buffers and index being prepared
    Initializing,
    /// EM iterations in progress
    Iterating,
    /// Largest parameter change fell below the tolerance
    Converged,
    /// Iteration cap reached without convergence
    IterationLimit,
    /// Aborted by an error; the model was left untouched
    Failed,
}

impl OptimizerState {
    /// Whether the run ended with usable parameters.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Converged | Self::IterationLimit)
    }
}

/// Outcome of [`ZinmHmm::fit`](crate::hmm_core::ZinmHmm::fit).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BaumWelchFit {
    /// Terminal optimizer state
    pub state: OptimizerState,
    /// Log-likelihood of the last E-step
    pub log_likelihood: f64,
    /// Log-likelihood of every E-step, in order
    pub log_likelihood_trace: Vec<f64>,
    /// Number of EM iterations run
    pub iterations: usize,
    /// Final emission log-likelihoods, `n × m`
    pub emissions: DenseMatrix,
    /// Posterior state probabilities of the last E-step, `n × m`
    pub posteriors: DenseMatrix,
}

impl BaumWelchFit {
    /// Whether the optimizer stopped on the tolerance rather than the cap.
    pub fn converged(&self) -> bool {
        self.state == OptimizerState::Converged
    }

    /// Most probable state at each position according to the posteriors.
    pub fn posterior_states(&self) -> Vec<usize> {
        self.posteriors
            .iter_rows()
            .map(crate::math_utils::argmax_first)
            .collect()
    }
}

/// Model selection criteria for a fitted model.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ModelCriteria {
    /// Akaike Information Criterion
    pub aic: f64,
    /// Bayesian Information Criterion
    pub bic: f64,
    /// Hannan-Quinn Information Criterion
    pub hqic: f64,
    /// Number of free parameters
    pub num_parameters: usize,
}

impl ModelCriteria {
    /// Criteria of a fit with `states` states on `observations` positions of
    /// dimension `dimension`.
    pub fn from_fit(fit: &BaumWelchFit, states: usize, dimension: usize, observations: usize) -> Self {
        let k = count_free_parameters(states, dimension) as f64;
        let n = observations as f64;
        let ll = fit.log_likelihood;
        Self {
            aic: -2.0 * ll + 2.0 * k,
            bic: -2.0 * ll + k * n.ln(),
            hqic: -2.0 * ll + 2.0 * k * n.ln().ln(),
            num_parameters: k as usize,
        }
    }
}

/// Number of parameters estimated by Baum-Welch.
///
/// Each transition row has `m - 1` free entries. Each category row has
/// `r + 1` entries summing to one with `p1/p0` held fixed, leaving `r - 1`.
/// The shape and zero-inflation are not re-estimated.
pub fn count_free_parameters(states: usize, dimension: usize) -> usize {
    let transition_params = states * states.saturating_sub(1);
    let emission_params = states * dimension.saturating_sub(1);
    transition_params + emission_params
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn fit(ll: f64) -> BaumWelchFit {
        BaumWelchFit {
            state: OptimizerState::Converged,
            log_likelihood: ll,
            log_likelihood_trace: vec![ll - 1.0, ll],
            iterations: 2,
            emissions: DenseMatrix::zeros(3, 2),
            posteriors: DenseMatrix::from_rows(&[vec![0.9, 0.1], vec![0.5, 0.5], vec![0.2, 0.8]])
                .unwrap(),
        }
    }

    #[test]
    fn test_free_parameter_count() {
        assert_eq!(count_free_parameters(2, 2), 4);
        assert_eq!(count_free_parameters(3, 4), 15);
        assert_eq!(count_free_parameters(1, 1), 0);
    }

    #[test]
    fn test_criteria() {
        let criteria = ModelCriteria::from_fit(&fit(-100.0), 2, 3, 1000);
        assert_eq!(criteria.num_parameters, 6);
        assert_approx_eq!(criteria.aic, 212.0, 1e-12);
        assert_approx_eq!(criteria.bic, 200.0 + 6.0 * 1000f64.ln(), 1e-12);
        assert!(criteria.hqic > criteria.aic);
    }

    #[test]
    fn test_posterior_states_and_state() {
        let f = fit(-1.0);
        assert!(f.converged());
        assert!(f.state.is_success());
        assert!(!OptimizerState::Failed.is_success());
        assert_eq!(f.posterior_states(), vec![0, 0, 1]);
    }
}
