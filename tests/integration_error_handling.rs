//! Integration tests for error handling and invalid input scenarios
//!
//! These tests validate that invalid parameters, inconsistent buffers and
//! degenerate optimization problems are reported as errors, and that a
//! failed fit leaves the model untouched.

use zinm_hmm::*;

fn model() -> ZinmHmm {
    ZinmHmm::with_parameters(
        DenseMatrix::persistent_transitions(2, 0.9),
        1.0,
        0.5,
        DenseMatrix::from_rows(&[vec![0.5, 0.25, 0.25], vec![0.2, 0.1, 0.7]]).unwrap(),
    )
    .unwrap()
}

/// Test scenario: series and model disagree on the number of channels.
#[test]
fn test_dimension_mismatch_leaves_model_untouched() {
    let mut hmm = model();
    let q_before = hmm.transitions().clone();
    let p_before = hmm.parameters().clone();

    let series = ChipSeries::from_rows(&[vec![1], vec![2], vec![0]]).unwrap();
    match hmm.fit(&series) {
        Err(HmmError::DimensionMismatch { expected, actual, .. }) => {
            assert_eq!(expected, 2);
            assert_eq!(actual, 1);
        }
        other => panic!("Expected DimensionMismatch, got {:?}", other.map(|f| f.state)),
    }
    assert_eq!(hmm.optimizer_state(), OptimizerState::Failed);
    assert_eq!(hmm.transitions(), &q_before);
    assert_eq!(hmm.parameters(), &p_before);
}

/// Test scenario: invalid model parameters are rejected at construction.
#[test]
fn test_invalid_parameters_rejected() {
    let p = DenseMatrix::filled(2, 3, 1.0 / 3.0);
    let q = DenseMatrix::persistent_transitions(2, 0.9);

    assert!(matches!(
        ZinmHmm::with_parameters(q.clone(), 0.0, 0.5, p.clone()),
        Err(HmmError::InvalidParameter { .. })
    ));
    assert!(matches!(
        ZinmHmm::with_parameters(q.clone(), 1.0, f64::NAN, p.clone()),
        Err(HmmError::InvalidParameter { .. })
    ));

    let not_stochastic = DenseMatrix::from_rows(&[vec![0.9, 0.2], vec![0.5, 0.5]]).unwrap();
    assert!(ZinmHmm::with_parameters(not_stochastic, 1.0, 0.5, p.clone()).is_err());

    let one_column = DenseMatrix::filled(2, 1, 1.0);
    assert!(ZinmHmm::with_parameters(q, 1.0, 0.5, one_column).is_err());
}

/// Test scenario: fragment sizes that do not cover the series.
#[test]
fn test_invalid_block_layouts() {
    assert!(ChipSeries::new(1, vec![2, 2], vec![0; 3]).is_err());
    assert!(ChipSeries::new(1, vec![3, 0], vec![0; 3]).is_err());

    let q = DenseMatrix::persistent_transitions(2, 0.9);
    let mut emissions = vec![0.5; 6];
    let mut phi = vec![0.0; 6];
    let mut counts = DenseMatrix::zeros(2, 2);
    assert!(block_forward_backward(&q, &[0.5, 0.5], &mut emissions, &mut phi, &[1, 1], &mut counts).is_err());

    let mut path = vec![0; 3];
    assert!(block_viterbi(&q, &[0.5, 0.5], &emissions, &[4], ProbabilitySpace::Linear, &mut path).is_err());
}

/// Test scenario: NaN in the decoding parameters.
#[test]
fn test_corrupted_viterbi_parameters() {
    let mut q = DenseMatrix::persistent_transitions(2, 0.9);
    q[(0, 1)] = f64::NAN;
    let mut path = vec![9; 2];
    let result = block_viterbi(&q, &[0.5, 0.5], &[0.5; 4], &[2], ProbabilitySpace::Linear, &mut path);
    match result {
        Err(HmmError::CorruptedParameter { parameter }) => assert!(parameter.contains("transition")),
        other => panic!("Expected CorruptedParameter, got {:?}", other),
    }
    assert_eq!(path, vec![9, 9]);
}

/// Test scenario: an update equation whose root lies outside (0, 1).
#[test]
fn test_no_root_bracket() {
    let solver = SafeguardedNewton::default();
    let outside = FnObjective::new(|x: f64| x - 5.0, |_| 1.0);
    assert!(matches!(
        solver.find_root(&outside, 0.5),
        Err(HmmError::NoRootBracket { .. })
    ));

    let undefined = FnObjective::new(|x: f64| (x - 1.0).ln(), |x: f64| 1.0 / (x - 1.0));
    assert!(matches!(
        solver.find_bracket(&undefined, 0.5),
        Err(HmmError::NoRootBracket { .. })
    ));
}

/// Test scenario: emission options that do not apply to the ZINM model.
#[test]
fn test_ratio_output_rejected_for_zinm() {
    let hmm = model();
    let series = ChipSeries::from_rows(&[vec![1, 2]]).unwrap();
    let config = EmissionConfig {
        output_mode: OutputMode::Ratio,
        ..EmissionConfig::default()
    };
    assert!(matches!(
        hmm.emissions(&series, &config),
        Err(HmmError::InvalidParameter { .. })
    ));
}

/// Test scenario: a control channel without overdispersion cannot seed a model.
#[test]
fn test_seeding_failure_propagates() {
    let series = ChipSeries::from_rows(&[vec![2, 1], vec![2, 3], vec![2, 0]]).unwrap();
    assert!(matches!(
        ZinmHmm::from_seed(2, &series, &MomentSeeder),
        Err(HmmError::SeedingFailed { .. })
    ));
}

/// Test scenario: missing data is never an error.
#[test]
fn test_fully_missing_series_is_not_an_error() {
    let mut hmm = model();
    let series = ChipSeries::from_rows(&[vec![MISSING_COUNT, 0], vec![-1, 4]]).unwrap();
    let fit = hmm.fit(&series).unwrap();
    assert!(fit.state.is_success());
    assert_eq!(fit.log_likelihood, 0.0);
    assert!(fit.emissions.as_slice().iter().all(|x| x.is_nan()));
}

/// Provider whose counts do not cover its fragments.
struct TruncatedProvider {
    block_sizes: Vec<usize>,
    counts: Vec<i32>,
}

impl ObservationProvider for TruncatedProvider {
    fn dimension(&self) -> usize {
        2
    }

    fn block_sizes(&self) -> &[usize] {
        &self.block_sizes
    }

    fn counts(&self) -> &[i32] {
        &self.counts
    }
}

/// Test scenario: an external provider with too few counts is an error, not a panic.
#[test]
fn test_inconsistent_provider_is_rejected() {
    let series = TruncatedProvider {
        block_sizes: vec![3],
        counts: vec![1, 2, 0, 0],
    };
    assert!(matches!(
        validate_provider(&series),
        Err(HmmError::DimensionMismatch { expected: 6, actual: 4, .. })
    ));

    let mut hmm = model();
    let q_before = hmm.transitions().clone();
    match hmm.fit(&series) {
        Err(HmmError::DimensionMismatch { expected, actual, .. }) => {
            assert_eq!(expected, 6);
            assert_eq!(actual, 4);
        }
        other => panic!("Expected DimensionMismatch, got {:?}", other.map(|f| f.state)),
    }
    assert_eq!(hmm.optimizer_state(), OptimizerState::Failed);
    assert_eq!(hmm.transitions(), &q_before);

    assert!(hmm.emissions(&series, &EmissionConfig::default()).is_err());
    assert!(ZinmHmm::from_seed(2, &series, &MomentSeeder).is_err());
}

/// Test scenario: the category update has no root inside the optimizer.
///
/// With `pi = 0` and only all-zero rows, every term of the update equation
/// vanishes and the objective is 0/0 at the starting point.
#[test]
fn test_no_root_bracket_during_fit() {
    let mut hmm = ZinmHmm::with_parameters(
        DenseMatrix::persistent_transitions(2, 0.9),
        1.0,
        0.0,
        DenseMatrix::from_rows(&[vec![0.5, 0.25, 0.25], vec![0.2, 0.1, 0.7]]).unwrap(),
    )
    .unwrap();
    let q_before = hmm.transitions().clone();
    let p_before = hmm.parameters().clone();
    let series = ChipSeries::from_rows(&[vec![0, 0], vec![0, 0], vec![0, 0]]).unwrap();

    match hmm.fit(&series) {
        Err(HmmError::NoRootBracket { state, .. }) => assert_eq!(state, 0),
        other => panic!("Expected NoRootBracket, got {:?}", other.map(|f| f.state)),
    }
    assert_eq!(hmm.optimizer_state(), OptimizerState::Failed);
    assert_eq!(hmm.transitions(), &q_before);
    assert_eq!(hmm.parameters(), &p_before);
}
