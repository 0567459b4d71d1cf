//! # ZINM Hidden Markov Models
//!
//! Hidden Markov models with zero-inflated negative multinomial (ZINM)
//! emissions, for segmenting genomic count tracks into hidden states.
//!
//! A series is `n` positions of `r` integer counts (a control channel
//! followed by signal channels), split into independent fragments. The crate
//! provides:
//!
//! - **Forward-backward**: a forward pass robust to underflow and missing
//!   rows, and a Markovian backward smoother that yields posteriors and
//!   expected transition counts without storing backward variables
//! - **Viterbi**: log-space decoding with deterministic tie-breaking
//! - **Emission models**: ZINM and a two-component negative multinomial
//!   mixture, with per-distinct-row caching
//! - **Baum-Welch**: re-estimation of the transition matrix and category
//!   probabilities, with a bracketed Newton solver for the M-step
//! - **Seeding and simulation**: moment-based starting values and a seeded
//!   generator of synthetic series
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use zinm_hmm::{ChipSeries, GeneratorConfig, ZinmHmm, ZinmParameters, DenseMatrix};
//! use zinm_hmm::{simulate_zinm_series, MomentSeeder};
//!
//! # fn main() -> zinm_hmm::HmmResult<()> {
//! let q = DenseMatrix::persistent_transitions(2, 0.95);
//! let p = DenseMatrix::from_rows(&[vec![0.4, 0.2, 0.4], vec![0.1, 0.05, 0.85]])?;
//! let truth = ZinmParameters::new(2.0, 0.8, p)?;
//! let sim = simulate_zinm_series(&GeneratorConfig::seeded(1000, 42), &q, &truth)?;
//!
//! let mut hmm = ZinmHmm::from_seed(2, &sim.series, &MomentSeeder)?;
//! let fit = hmm.fit(&sim.series)?;
//! let path = hmm.decode(&sim.series, &fit)?;
//! println!("log-likelihood {:.3}, {} positions decoded", fit.log_likelihood, path.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Logging
//!
//! The crate logs through the `log` facade: warnings when category
//! probabilities are renormalized or inconsistent, per-iteration progress of
//! Baum-Welch at debug level. No logger is installed.
//!
//! ## Features
//!
//! - `parallel`: run fragments of the forward-backward pass on the rayon
//!   thread pool
//! - `serde`: `Serialize`/`Deserialize` for parameters, configurations and
//!   results

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod collections;
pub mod config;
pub mod errors;
pub mod math_utils;
pub mod observations;
pub mod results;

// Inference
pub mod blocks;
pub mod emission_models;
pub mod forward_backward;
pub mod hmm_core;
pub mod root_finding;
pub mod viterbi;

// Starting values and synthetic data
pub mod generators;
pub mod seeding;

pub use blocks::{block_forward_backward, fragment_ranges};
#[cfg(feature = "parallel")]
pub use blocks::block_forward_backward_parallel;
pub use collections::DenseMatrix;
pub use config::{BaumWelchConfig, EmissionConfig, OutputMode, ProbabilitySpace};
pub use emission_models::{mixture_emissions, zinm_emissions, MixtureParameters, ZinmParameters};
pub use errors::{HmmError, HmmResult};
pub use forward_backward::{backward, forward, forward_backward};
pub use generators::{simulate_zinm_series, GeneratorConfig, SimulatedSeries};
pub use hmm_core::{update_transitions, ZinmHmm};
pub use observations::{validate_provider, ChipSeries, ObservationIndex, ObservationProvider, MISSING_COUNT};
pub use results::{count_free_parameters, BaumWelchFit, ModelCriteria, OptimizerState};
pub use root_finding::{Bracket, FnObjective, Objective, RootEstimate, SafeguardedNewton};
pub use seeding::{MomentSeeder, ParameterSeeder, SeedEstimate};
pub use viterbi::{block_viterbi, viterbi, INVALID_STATE};
