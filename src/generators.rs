//! Synthetic ZINM-HMM series for testing and validation.
//!
//! Series are drawn from the generative model itself: a Markov chain over
//! hidden states, restarted uniformly at every fragment, and per-position
//! counts that are structurally zero with probability `1 - pi` and
//! otherwise negative multinomial, sampled as a Gamma-Poisson mixture.

use crate::collections::DenseMatrix;
use crate::emission_models::ZinmParameters;
use crate::errors::{validate_length, validate_probability_vector, HmmError, HmmResult};
use crate::observations::ChipSeries;
use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_distr::{Gamma, Poisson};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Layout and reproducibility of a simulated series.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GeneratorConfig {
    /// Lengths of the independent fragments
    pub block_sizes: Vec<usize>,
    /// Random seed for reproducible generation
    pub seed: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            block_sizes: vec![1000],
            seed: None,
        }
    }
}

impl GeneratorConfig {
    /// Single fragment of `length` positions with a fixed seed.
    pub fn seeded(length: usize, seed: u64) -> Self {
        Self {
            block_sizes: vec![length],
            seed: Some(seed),
        }
    }
}

/// Simulated counts together with the hidden states that produced them.
#[derive(Debug, Clone)]
pub struct SimulatedSeries {
    /// Simulated counts
    pub series: ChipSeries,
    /// Hidden state at each position
    pub states: Vec<usize>,
}

/// Draw a series from a ZINM hidden Markov model.
///
/// Each fragment starts from a uniformly drawn state. At every position the
/// row is all zero with probability `1 - pi`; otherwise
/// `λ ~ Gamma(a, 1)` and `y_j ~ Poisson(λ p_{j+1} / p0)`.
pub fn simulate_zinm_series(
    config: &GeneratorConfig,
    q: &DenseMatrix,
    params: &ZinmParameters,
) -> HmmResult<SimulatedSeries> {
    params.validate()?;
    let m = params.states();
    let r = params.dimension();
    validate_length(q.rows(), m, "transition matrix rows")?;
    validate_length(q.cols(), m, "transition matrix columns")?;
    for row in q.iter_rows() {
        validate_probability_vector(row, "transition row")?;
    }

    let rates: Vec<Vec<f64>> = params
        .p
        .iter_rows()
        .map(|row| row[1..].iter().map(|&x| x / row[0]).collect())
        .collect();
    if let Some(bad) = rates.iter().flatten().find(|x| !(x.is_finite() && **x >= 0.0)) {
        return Err(HmmError::InvalidParameter {
            parameter: "p".to_string(),
            value: *bad,
            constraint: "p0 > 0 and p >= 0 in every state".to_string(),
        });
    }

    let rows: Vec<WeightedIndex<f64>> = q
        .iter_rows()
        .map(WeightedIndex::new)
        .collect::<Result<_, _>>()
        .map_err(|e| HmmError::NumericalError {
            reason: format!("invalid transition row: {}", e),
            operation: Some("simulate_zinm_series".to_string()),
        })?;
    let gamma = Gamma::new(params.shape, 1.0).map_err(|_| HmmError::InvalidParameter {
        parameter: "shape".to_string(),
        value: params.shape,
        constraint: "finite and > 0".to_string(),
    })?;

    let mut rng = match config.seed {
        Some(seed) => ChaCha20Rng::seed_from_u64(seed),
        None => ChaCha20Rng::from_entropy(),
    };

    let n: usize = config.block_sizes.iter().sum();
    let mut counts = Vec::with_capacity(n * r);
    let mut states = Vec::with_capacity(n);

    for &size in &config.block_sizes {
        let mut state = rng.gen_range(0..m);
        for k in 0..size {
            if k > 0 {
                state = rows[state].sample(&mut rng);
            }
            states.push(state);

            if rng.gen::<f64>() >= params.zero_inflation {
                counts.extend(std::iter::repeat(0).take(r));
                continue;
            }
            let lambda: f64 = gamma.sample(&mut rng);
            for &rate in &rates[state] {
                counts.push(sample_poisson(&mut rng, lambda * rate));
            }
        }
    }

    let series = ChipSeries::new(r, config.block_sizes.clone(), counts)?;
    Ok(SimulatedSeries { series, states })
}

fn sample_poisson<R: Rng + ?Sized>(rng: &mut R, mean: f64) -> i32 {
    match Poisson::new(mean) {
        Ok(poisson) => {
            let y: f64 = poisson.sample(rng);
            y.min(i32::MAX as f64) as i32
        }
        Err(_) => 0,
    }
}
