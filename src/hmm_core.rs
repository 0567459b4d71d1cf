//! Core ZINM hidden Markov model and its Baum-Welch optimizer.
//!
//! The model has `m` states, a row-stochastic transition matrix and ZINM
//! emissions. Baum-Welch re-estimates the transition matrix and the category
//! probabilities `p`; the shape `a`, the zero-inflation `pi` and the ratio
//! `R = p1/p0` stay fixed. The M-step for each state reduces to one scalar
//! equation in `p0`, solved with [`SafeguardedNewton`].

use crate::{
    blocks::{block_forward_backward, validate_blocks},
    collections::DenseMatrix,
    config::{BaumWelchConfig, EmissionConfig, ProbabilitySpace},
    emission_models::{zinm_emissions, ZinmParameters},
    errors::{validate_length, validate_positive, validate_probability_vector, HmmError, HmmResult},
    math_utils::constants::{BRACKET_START, RATIO_CONSISTENCY_TOLERANCE},
    observations::{is_invalid_row, validate_provider, ObservationIndex, ObservationProvider},
    results::{BaumWelchFit, OptimizerState},
    root_finding::{Objective, SafeguardedNewton},
    seeding::ParameterSeeder,
    viterbi::block_viterbi,
};
use log::{debug, info, warn};

/// Diagonal of the transition matrix of a freshly created model.
const DEFAULT_PERSISTENCE: f64 = 0.7;

/// Hidden Markov model with zero-inflated negative multinomial emissions.
#[derive(Debug, Clone)]
pub struct ZinmHmm {
    transitions: DenseMatrix,
    params: ZinmParameters,
    config: BaumWelchConfig,
    optimizer_state: OptimizerState,
}

impl ZinmHmm {
    /// Model with `states` states over `dimension` count channels.
    ///
    /// Starts with a persistence-biased transition matrix, `a = 1`, `pi = 1`
    /// and uniform category probabilities.
    pub fn new(states: usize, dimension: usize) -> HmmResult<Self> {
        if states == 0 || dimension == 0 {
            return Err(HmmError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }
        let categories = dimension + 1;
        let p = DenseMatrix::filled(states, categories, 1.0 / categories as f64);
        Self::with_parameters(
            DenseMatrix::persistent_transitions(states, DEFAULT_PERSISTENCE),
            1.0,
            1.0,
            p,
        )
    }

    /// Model with explicit parameters.
    pub fn with_parameters(q: DenseMatrix, shape: f64, zero_inflation: f64, p: DenseMatrix) -> HmmResult<Self> {
        let mut hmm = Self {
            transitions: DenseMatrix::zeros(0, 0),
            params: ZinmParameters {
                shape,
                zero_inflation,
                p: DenseMatrix::zeros(0, 0),
            },
            config: BaumWelchConfig::default(),
            optimizer_state: OptimizerState::Initializing,
        };
        hmm.set_parameters(q, shape, zero_inflation, p)?;
        Ok(hmm)
    }

    /// Seed a model from a series.
    ///
    /// `seeder` fits the control channel (column 0) to obtain `a`, `pi` and
    /// `R`. Each state then gets the channel means scaled by a weight
    /// growing from 0.5 for state 0 to 2 for the last state, so that states
    /// are ordered by signal enrichment.
    pub fn from_seed<P, S>(states: usize, series: &P, seeder: &S) -> HmmResult<Self>
    where
        P: ObservationProvider + ?Sized,
        S: ParameterSeeder + ?Sized,
    {
        validate_provider(series)?;
        let r = series.dimension();
        if states == 0 || r == 0 {
            return Err(HmmError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }

        let control: Vec<i32> = (0..series.len()).map(|k| series.row(k)[0]).collect();
        let seed = seeder.seed(&control)?;
        validate_positive(seed.shape, "seed shape")?;
        validate_positive(seed.scale, "seed scale")?;

        let mut means = vec![0.0; r];
        let mut valid = 0usize;
        for k in 0..series.len() {
            let row = series.row(k);
            if is_invalid_row(row) {
                continue;
            }
            valid += 1;
            for (mean, &y) in means.iter_mut().zip(row) {
                *mean += y as f64;
            }
        }
        if valid == 0 {
            return Err(HmmError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }
        means.iter_mut().for_each(|x| *x /= valid as f64);

        let a = seed.shape;
        let mut p = DenseMatrix::zeros(states, r + 1);
        for i in 0..states {
            let weight = if states > 1 {
                0.5 * 4f64.powf(i as f64 / (states - 1) as f64)
            } else {
                1.0
            };
            let signal: f64 = means[1..].iter().map(|mu| mu * weight / a).sum();
            let p0 = 1.0 / (1.0 + seed.scale + signal);
            let row = p.row_mut(i);
            row[0] = p0;
            row[1] = p0 * seed.scale;
            for (x, mu) in row[2..].iter_mut().zip(&means[1..]) {
                *x = p0 * mu * weight / a;
            }
        }

        Self::with_parameters(
            DenseMatrix::persistent_transitions(states, DEFAULT_PERSISTENCE),
            a,
            seed.zero_inflation,
            p,
        )
    }

    /// Replace the optimizer configuration.
    pub fn with_config(mut self, config: BaumWelchConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace all parameters after validation.
    ///
    /// `q` must be square and row-stochastic with one row per row of `p`;
    /// `p` must hold finite non-negative values with at least two columns.
    pub fn set_parameters(
        &mut self,
        q: DenseMatrix,
        shape: f64,
        zero_inflation: f64,
        p: DenseMatrix,
    ) -> HmmResult<()> {
        let params = ZinmParameters::new(shape, zero_inflation, p)?;
        if !q.is_square() {
            return Err(HmmError::DimensionMismatch {
                context: "transition matrix columns".to_string(),
                expected: q.rows(),
                actual: q.cols(),
            });
        }
        validate_length(q.rows(), params.states(), "transition matrix rows")?;
        for row in q.iter_rows() {
            validate_probability_vector(row, "transition row")?;
        }
        if let Some(&bad) = params.p.as_slice().iter().find(|&&x| !(x >= 0.0 && x.is_finite())) {
            return Err(HmmError::InvalidParameter {
                parameter: "p".to_string(),
                value: bad,
                constraint: "finite and >= 0".to_string(),
            });
        }

        self.transitions = q;
        self.params = params;
        Ok(())
    }

    /// Number of states.
    pub fn states(&self) -> usize {
        self.params.states()
    }

    /// Number of count channels.
    pub fn dimension(&self) -> usize {
        self.params.dimension()
    }

    /// Transition matrix, `Q[(from, to)]`.
    pub fn transitions(&self) -> &DenseMatrix {
        &self.transitions
    }

    /// Emission parameters.
    pub fn parameters(&self) -> &ZinmParameters {
        &self.params
    }

    /// Optimizer configuration.
    pub fn config(&self) -> &BaumWelchConfig {
        &self.config
    }

    /// State of the last call to [`fit`](Self::fit).
    pub fn optimizer_state(&self) -> OptimizerState {
        self.optimizer_state
    }

    /// Emission matrix of a series under the current parameters.
    pub fn emissions<P: ObservationProvider + ?Sized>(
        &self,
        series: &P,
        config: &EmissionConfig,
    ) -> HmmResult<DenseMatrix> {
        validate_provider(series)?;
        let index = ObservationIndex::build(series);
        let mut pem = DenseMatrix::try_zeros(series.len(), self.states())?;
        zinm_emissions(&self.params, series, &index, config, &mut pem)?;
        Ok(pem)
    }

    /// Fit the transition matrix and category probabilities by Baum-Welch.
    ///
    /// Parameters are only replaced when the run completes; on error the
    /// model keeps its previous values and [`optimizer_state`] reports
    /// [`OptimizerState::Failed`].
    ///
    /// [`optimizer_state`]: Self::optimizer_state
    pub fn fit<P: ObservationProvider + ?Sized>(&mut self, series: &P) -> HmmResult<BaumWelchFit> {
        self.optimizer_state = OptimizerState::Initializing;
        match self.run_baum_welch(series) {
            Ok((fit, q, p)) => {
                self.transitions = q;
                self.params.p = p;
                self.optimizer_state = fit.state;
                Ok(fit)
            }
            Err(e) => {
                debug!("Baum-Welch aborted: {}", e);
                self.optimizer_state = OptimizerState::Failed;
                Err(e)
            }
        }
    }

    fn run_baum_welch<P: ObservationProvider + ?Sized>(
        &self,
        series: &P,
    ) -> HmmResult<(BaumWelchFit, DenseMatrix, DenseMatrix)> {
        let m = self.states();
        let n = series.len();
        validate_provider(series)?;
        validate_length(series.dimension(), self.dimension(), "series dimension")?;
        validate_blocks(series.block_sizes(), n)?;
        if self.config.max_iterations == 0 {
            return Err(HmmError::InvalidParameter {
                parameter: "max_iterations".to_string(),
                value: 0.0,
                constraint: ">= 1".to_string(),
            });
        }

        let p00 = self.params.p[(0, 0)];
        if !(p00 > 0.0) {
            return Err(HmmError::InvalidParameter {
                parameter: "p[0][0]".to_string(),
                value: p00,
                constraint: "must be > 0".to_string(),
            });
        }
        let ratio = self.params.p[(0, 1)] / p00;
        for i in 1..m {
            let state_ratio = self.params.p[(i, 1)] / self.params.p[(i, 0)];
            if !((state_ratio - ratio).abs() <= RATIO_CONSISTENCY_TOLERANCE) {
                warn!(
                    "Inconsistent 'p': state {} has p1/p0 = {:.6}, state 0 has {:.6}",
                    i, state_ratio, ratio
                );
            }
        }

        let index = ObservationIndex::build(series);
        let init = vec![1.0 / m as f64; m];
        let mut q = self.transitions.clone();
        let mut params = self.params.clone();
        let mut pem = DenseMatrix::try_zeros(n, m)?;
        let mut phi = DenseMatrix::try_zeros(n, m)?;
        let mut counts = DenseMatrix::zeros(m, m);
        let emission_config = EmissionConfig::adaptive().quiet();
        let solver = SafeguardedNewton::new(self.config.root_max_iterations, self.config.root_tolerance);

        let mut state = OptimizerState::Iterating;
        let mut trace = Vec::new();
        let mut iterations = 0;

        while iterations < self.config.max_iterations {
            iterations += 1;

            zinm_emissions(&params, series, &index, &emission_config, &mut pem)?;
            let log_likelihood = self.run_blocks(&q, &init, &mut pem, &mut phi, series.block_sizes(), &mut counts)?;
            trace.push(log_likelihood);

            update_transitions(&mut q, &counts)?;

            let new_p = reestimate_categories(&params, series, &index, &phi, ratio, &solver)?;
            let max_change = new_p.max_abs_diff(&params.p);
            debug!(
                "Baum-Welch iteration {}: log-likelihood {:.6}, max parameter change {:.3e}",
                iterations, log_likelihood, max_change
            );

            if max_change < self.config.tolerance {
                state = OptimizerState::Converged;
                break;
            }
            params.p = new_p;
        }

        if state == OptimizerState::Converged {
            info!("Baum-Welch converged after {} iterations", iterations);
        } else {
            state = OptimizerState::IterationLimit;
            info!(
                "Baum-Welch stopped at the iteration limit ({}) without converging",
                iterations
            );
        }

        zinm_emissions(&params, series, &index, &EmissionConfig::log_space().quiet(), &mut pem)?;

        let fit = BaumWelchFit {
            state,
            log_likelihood: trace.last().copied().unwrap_or(f64::NEG_INFINITY),
            log_likelihood_trace: trace,
            iterations,
            emissions: pem,
            posteriors: phi,
        };
        Ok((fit, q, params.p))
    }

    fn run_blocks(
        &self,
        q: &DenseMatrix,
        init: &[f64],
        pem: &mut DenseMatrix,
        phi: &mut DenseMatrix,
        block_sizes: &[usize],
        counts: &mut DenseMatrix,
    ) -> HmmResult<f64> {
        #[cfg(feature = "parallel")]
        {
            if self.config.parallel_blocks {
                return crate::blocks::block_forward_backward_parallel(
                    q,
                    init,
                    pem.as_mut_slice(),
                    phi.as_mut_slice(),
                    block_sizes,
                    counts,
                );
            }
        }
        block_forward_backward(q, init, pem.as_mut_slice(), phi.as_mut_slice(), block_sizes, counts)
    }

    /// Most likely state sequence under the fitted model.
    ///
    /// Uses the log-space emissions of `fit`, the current transition matrix
    /// and a uniform initial distribution.
    pub fn decode<P: ObservationProvider + ?Sized>(
        &self,
        series: &P,
        fit: &BaumWelchFit,
    ) -> HmmResult<Vec<usize>> {
        let m = self.states();
        validate_length(fit.emissions.rows(), series.len(), "fitted emissions")?;
        validate_length(fit.emissions.cols(), m, "fitted emission columns")?;

        let log_init = vec![-(m as f64).ln(); m];
        let mut path = vec![0; series.len()];
        block_viterbi(
            &self.transitions.ln(),
            &log_init,
            fit.emissions.as_slice(),
            series.block_sizes(),
            ProbabilitySpace::Log,
            &mut path,
        )?;
        Ok(path)
    }
}

/// Row-normalize expected transition counts into `q`.
///
/// A state with no outgoing mass was never left during the E-step; its row
/// of `q` is kept as is.
pub fn update_transitions(q: &mut DenseMatrix, counts: &DenseMatrix) -> HmmResult<()> {
    validate_length(counts.rows(), q.rows(), "transition count rows")?;
    validate_length(counts.cols(), q.cols(), "transition count columns")?;
    for i in 0..q.rows() {
        let total: f64 = counts.row(i).iter().sum();
        if total > 0.0 {
            for (x, &c) in q.row_mut(i).iter_mut().zip(counts.row(i)) {
                *x = c / total;
            }
        }
    }
    Ok(())
}

/// Posterior-weighted sufficient statistics of one state.
#[derive(Debug, Clone, Copy, PartialEq)]
struct CategoryObjective {
    shape: f64,
    zero_inflation: f64,
    /// Mass on rows with at least one non-zero count
    a_mass: f64,
    /// Mass on all-zero rows
    b_mass: f64,
    /// `1 + R`
    c: f64,
    /// Weighted sum of the control counts
    d: f64,
    /// Weighted sum of the remaining counts
    e: f64,
}

impl CategoryObjective {
    fn t1(&self, p0: f64) -> f64 {
        (self.d + self.shape * self.a_mass) / p0
    }

    fn t2(&self, p0: f64) -> f64 {
        let (a, pi) = (self.shape, self.zero_inflation);
        self.b_mass * pi * a * p0.powf(a - 1.0) / (pi * p0.powf(a) + 1.0 - pi)
    }

    /// Normalizer `λ` of the signal categories at `p0`.
    fn lambda(&self, p0: f64) -> f64 {
        (self.t1(p0) + self.t2(p0)) / self.c
    }
}

impl Objective for CategoryObjective {
    fn value(&self, p0: f64) -> f64 {
        p0 + self.e / (self.t1(p0) + self.t2(p0)) - 1.0 / self.c
    }

    fn derivative(&self, p0: f64) -> f64 {
        let (a, pi) = (self.shape, self.zero_inflation);
        let t = self.t1(p0) + self.t2(p0);
        let denom = pi * p0.powf(a) + 1.0 - pi;
        let t3 = self.b_mass
            * ((1.0 - pi) * pi * a * (a - 1.0) * p0.powf(a - 2.0) - pi * pi * a * p0.powf(2.0 * a - 2.0))
            / (denom * denom);
        let t4 = (self.d + self.shape * self.a_mass) / (p0 * p0);
        1.0 - self.e / (t * t) * (t3 - t4)
    }
}

/// M-step for the category probabilities of every state.
fn reestimate_categories<P: ObservationProvider + ?Sized>(
    params: &ZinmParameters,
    series: &P,
    index: &ObservationIndex,
    phi: &DenseMatrix,
    ratio: f64,
    solver: &SafeguardedNewton,
) -> HmmResult<DenseMatrix> {
    let r = series.dimension();
    let mut new_p = params.p.clone();
    let mut ystar = vec![0.0; r];

    for i in 0..params.states() {
        let mut a_mass = 0.0;
        let mut b_mass = 0.0;
        let mut d = 0.0;
        ystar.iter_mut().for_each(|x| *x = 0.0);

        for k in 0..series.len() {
            let row = series.row(k);
            if is_invalid_row(row) {
                continue;
            }
            let w = phi[(k, i)];
            if index.is_all_zero(k) {
                b_mass += w;
            } else {
                a_mass += w;
                d += w * row[0] as f64;
                for (s, &y) in ystar.iter_mut().zip(row).skip(1) {
                    *s += w * y as f64;
                }
            }
        }

        if a_mass + b_mass == 0.0 {
            continue;
        }

        let objective = CategoryObjective {
            shape: params.shape,
            zero_inflation: params.zero_inflation,
            a_mass,
            b_mass,
            c: 1.0 + ratio,
            d,
            e: ystar[1..].iter().sum(),
        };
        let estimate = solver
            .find_root(&objective, BRACKET_START)
            .map_err(|e| match e {
                HmmError::NoRootBracket { lower, upper, .. } => HmmError::NoRootBracket {
                    state: i,
                    lower,
                    upper,
                },
                other => other,
            })?;

        let p0 = estimate.root;
        let lambda = objective.lambda(p0);
        let row = new_p.row_mut(i);
        row[0] = p0;
        row[1] = p0 * ratio;
        for (x, &s) in row[2..].iter_mut().zip(&ystar[1..]) {
            *x = s / lambda;
        }
    }

    Ok(new_p)
}
