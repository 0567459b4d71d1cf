//! # Model Configuration
//!
//! Configuration values controlling emission output, Viterbi input space and
//! the Baum-Welch optimizer. All options are explicit enumerations or
//! booleans; nothing is encoded in bit flags.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Maximum number of Baum-Welch iterations.
pub const DEFAULT_MAX_ITERATIONS: usize = 500;

/// Convergence threshold on the largest change of an emission parameter.
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Iteration cap of the nested root finder.
pub const DEFAULT_ROOT_MAX_ITERATIONS: usize = 25;

/// Absolute tolerance on the bracket width of the nested root finder.
pub const DEFAULT_ROOT_TOLERANCE: f64 = 1e-6;

/// How emission likelihoods are written to the output matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OutputMode {
    /// Always exponentiate, even if every state underflows to zero
    Linear,
    /// Always keep log-likelihoods
    Log,
    /// Linear space, except rows where every state underflows, which stay in log space
    #[default]
    Adaptive,
    /// Posterior responsibility of the first mixture component (mixture model only)
    Ratio,
}

/// Space in which Viterbi inputs are supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ProbabilitySpace {
    /// Plain probabilities
    Linear,
    /// Natural logarithms of probabilities
    Log,
}

/// Options of the emission models.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EmissionConfig {
    /// Output convention for the emission matrix
    pub output_mode: OutputMode,
    /// Silence the renormalization warning
    pub suppress_warnings: bool,
    /// Add the multinomial coefficient, which is identical across states
    pub include_normalizing_constant: bool,
}

impl Default for EmissionConfig {
    fn default() -> Self {
        Self::adaptive()
    }
}

impl EmissionConfig {
    /// Adaptive output with warnings enabled.
    pub fn adaptive() -> Self {
        Self {
            output_mode: OutputMode::Adaptive,
            suppress_warnings: false,
            include_normalizing_constant: false,
        }
    }

    /// Strict log-space output with warnings enabled.
    pub fn log_space() -> Self {
        Self {
            output_mode: OutputMode::Log,
            ..Self::adaptive()
        }
    }

    /// Same configuration with warnings suppressed.
    pub fn quiet(self) -> Self {
        Self {
            suppress_warnings: true,
            ..self
        }
    }

    /// Same configuration with the normalizing constant included.
    pub fn with_normalizing_constant(self) -> Self {
        Self {
            include_normalizing_constant: true,
            ..self
        }
    }
}

/// Configuration of the Baum-Welch optimizer.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BaumWelchConfig {
    /// Maximum number of EM iterations
    pub max_iterations: usize,
    /// Convergence threshold on the largest emission parameter change
    pub tolerance: f64,
    /// Iteration cap of the root finder
    pub root_max_iterations: usize,
    /// Bracket width tolerance of the root finder
    pub root_tolerance: f64,
    /// Run fragments concurrently (requires the `parallel` feature)
    pub parallel_blocks: bool,
}

impl Default for BaumWelchConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
            root_max_iterations: DEFAULT_ROOT_MAX_ITERATIONS,
            root_tolerance: DEFAULT_ROOT_TOLERANCE,
            parallel_blocks: false,
        }
    }
}
