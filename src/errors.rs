//! Error types and validation functions for HMM inference.
//!
//! Every fallible operation in the crate returns [`HmmResult`]. Missing or
//! invalid observations are never errors: they are absorbed by the
//! missing-data policies of the forward, Viterbi and emission routines.

use crate::math_utils::constants::PROBABILITY_TOLERANCE;
use thiserror::Error;

/// Error types for model fitting, decoding and emission computation.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum HmmError {
    /// Input buffers or parameters disagree on their dimensions.
    #[error("Dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// What was being checked
        context: String,
        /// Expected size
        expected: usize,
        /// Size actually provided
        actual: usize,
    },

    /// Not enough data to run the requested operation.
    #[error("Insufficient data: need at least {required} points, got {actual}")]
    InsufficientData {
        /// Minimum required data points
        required: usize,
        /// Actual number of data points provided
        actual: usize,
    },

    /// Invalid parameter value.
    #[error("Invalid parameter: {parameter} = {value}, expected {constraint}")]
    InvalidParameter {
        /// Parameter name
        parameter: String,
        /// Invalid value provided
        value: f64,
        /// Valid range or constraint description
        constraint: String,
    },

    /// Model parameter containing NaN after conversion to log space.
    #[error("Corrupted model parameter: {parameter} contains NaN")]
    CorruptedParameter {
        /// Name of the rejected parameter
        parameter: String,
    },

    /// A working buffer could not be allocated.
    #[error("Allocation of {bytes} bytes failed in {operation}")]
    AllocationFailed {
        /// Operation requesting the buffer
        operation: String,
        /// Requested size in bytes
        bytes: usize,
    },

    /// The Baum-Welch update equation has no admissible root.
    #[error("No root bracket in (0, 1) for state {state}: last bracket [{lower}, {upper}]")]
    NoRootBracket {
        /// State whose parameters could not be updated
        state: usize,
        /// Lower end of the last bracket tried
        lower: f64,
        /// Upper end of the last bracket tried
        upper: f64,
    },

    /// The parameter seeder could not produce an estimate.
    #[error("Parameter seeding failed: {reason}")]
    SeedingFailed {
        /// Reason reported by the seeder
        reason: String,
    },

    /// Numerical computation error.
    #[error("Numerical computation failed: {reason}")]
    NumericalError {
        /// Detailed reason for numerical failure
        reason: String,
        /// Operation that failed
        operation: Option<String>,
    },
}

/// Result type for HMM operations.
pub type HmmResult<T> = Result<T, HmmError>;

/// Validates that a buffer has exactly the expected length.
///
/// # Example
/// ```rust
/// use zinm_hmm::errors::validate_length;
///
/// assert!(validate_length(4, 4, "init").is_ok());
/// assert!(validate_length(3, 4, "init").is_err());
/// ```
pub fn validate_length(actual: usize, expected: usize, context: &str) -> HmmResult<()> {
    if actual != expected {
        return Err(HmmError::DimensionMismatch {
            context: context.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

/// Validates that a parameter is within `[min, max]`.
///
/// # Example
/// ```rust
/// use zinm_hmm::errors::validate_parameter;
///
/// assert!(validate_parameter(0.5, 0.0, 1.0, "pi").is_ok());
/// assert!(validate_parameter(1.5, 0.0, 1.0, "pi").is_err());
/// assert!(validate_parameter(f64::NAN, 0.0, 1.0, "pi").is_err());
/// ```
pub fn validate_parameter(value: f64, min: f64, max: f64, name: &str) -> HmmResult<()> {
    if value.is_nan() {
        return Err(HmmError::InvalidParameter {
            parameter: name.to_string(),
            value,
            constraint: "must not be NaN".to_string(),
        });
    }

    if value < min || value > max {
        return Err(HmmError::InvalidParameter {
            parameter: name.to_string(),
            value,
            constraint: format!("[{}, {}]", min, max),
        });
    }

    Ok(())
}

/// Validates that a value is finite and strictly positive.
pub fn validate_positive(value: f64, name: &str) -> HmmResult<()> {
    if !(value.is_finite() && value > 0.0) {
        return Err(HmmError::InvalidParameter {
            parameter: name.to_string(),
            value,
            constraint: "finite and > 0".to_string(),
        });
    }
    Ok(())
}

/// Validates that a slice is a probability vector (non-negative, sums to 1).
///
/// # Example
/// ```rust
/// use zinm_hmm::errors::validate_probability_vector;
///
/// assert!(validate_probability_vector(&[0.25, 0.75], "init").is_ok());
/// assert!(validate_probability_vector(&[0.5, 0.6], "init").is_err());
/// ```
pub fn validate_probability_vector(values: &[f64], name: &str) -> HmmResult<()> {
    if values.is_empty() {
        return Err(HmmError::InsufficientData {
            required: 1,
            actual: 0,
        });
    }

    if let Some(&bad) = values.iter().find(|&&v| !(v >= 0.0 && v.is_finite())) {
        return Err(HmmError::InvalidParameter {
            parameter: name.to_string(),
            value: bad,
            constraint: "finite and >= 0".to_string(),
        });
    }

    let sum: f64 = values.iter().sum();
    if (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
        return Err(HmmError::InvalidParameter {
            parameter: format!("sum({})", name),
            value: sum,
            constraint: "must equal 1".to_string(),
        });
    }

    Ok(())
}

/// Reserves a zero-filled buffer, reporting allocation failure as an error.
///
/// Working buffers sized from the input series go through this function so
/// that an impossible request surfaces as [`HmmError::AllocationFailed`]
/// rather than an abort.
pub fn try_zeroed_buffer<T: Clone + Default>(len: usize, operation: &str) -> HmmResult<Vec<T>> {
    let mut buffer: Vec<T> = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| HmmError::AllocationFailed {
            operation: operation.to_string(),
            bytes: len.saturating_mul(std::mem::size_of::<T>()),
        })?;
    buffer.resize(len, T::default());
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_length() {
        assert!(validate_length(5, 5, "emissions").is_ok());

        match validate_length(4, 6, "emissions") {
            Err(HmmError::DimensionMismatch {
                context,
                expected,
                actual,
            }) => {
                assert_eq!(context, "emissions");
                assert_eq!(expected, 6);
                assert_eq!(actual, 4);
            }
            other => panic!("Expected DimensionMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_parameter_bounds() {
        assert!(validate_parameter(0.0, 0.0, 1.0, "pi").is_ok());
        assert!(validate_parameter(1.0, 0.0, 1.0, "pi").is_ok());
        assert!(validate_parameter(-0.1, 0.0, 1.0, "pi").is_err());
        assert!(validate_parameter(f64::NAN, 0.0, 1.0, "pi").is_err());
    }

    #[test]
    fn test_validate_positive() {
        assert!(validate_positive(2.5, "shape").is_ok());
        assert!(validate_positive(0.0, "shape").is_err());
        assert!(validate_positive(f64::INFINITY, "shape").is_err());
        assert!(validate_positive(f64::NAN, "shape").is_err());
    }

    #[test]
    fn test_validate_probability_vector() {
        assert!(validate_probability_vector(&[1.0], "init").is_ok());
        assert!(validate_probability_vector(&[0.2, 0.3, 0.5], "init").is_ok());
        assert!(validate_probability_vector(&[], "init").is_err());
        assert!(validate_probability_vector(&[-0.5, 1.5], "init").is_err());
        assert!(validate_probability_vector(&[0.5, f64::NAN], "init").is_err());
    }

    #[test]
    fn test_try_zeroed_buffer() {
        let buffer: Vec<f64> = try_zeroed_buffer(16, "test").unwrap();
        assert_eq!(buffer.len(), 16);
        assert!(buffer.iter().all(|&x| x == 0.0));

        // Test Case: an impossible request is reported, not aborted
        let result: HmmResult<Vec<f64>> = try_zeroed_buffer(usize::MAX / 4, "huge");
        match result {
            Err(HmmError::AllocationFailed { operation, .. }) => assert_eq!(operation, "huge"),
            other => panic!("Expected AllocationFailed, got {:?}", other.map(|v| v.len())),
        }
    }

    #[test]
    fn test_error_display() {
        let err = HmmError::NoRootBracket {
            state: 1,
            lower: 0.0,
            upper: 0.0,
        };
        assert!(err.to_string().contains("state 1"));
    }
}
