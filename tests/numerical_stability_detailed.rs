//! Detailed numerical stability tests for the inference kernels.
//!
//! Long series, vanishing likelihoods, extreme counts and missing data must
//! never turn into NaN log-likelihoods or unnormalized posteriors.

use assert_approx_eq::assert_approx_eq;
use zinm_hmm::*;

fn sticky(m: usize) -> DenseMatrix {
    DenseMatrix::persistent_transitions(m, 0.9)
}

#[cfg(test)]
mod forward_stability {
    use super::*;

    #[test]
    fn test_long_series_of_tiny_likelihoods() {
        // Test Case 1: 10,000 positions of 1e-300 would underflow any product.
        let n = 10_000;
        let mut emissions = vec![1e-300; 2 * n];
        let ll = forward(&sticky(2), &[0.5, 0.5], &mut emissions).unwrap();
        assert!(ll.is_finite());
        assert_approx_eq!(ll, n as f64 * 1e-300f64.ln(), 1e-6 * n as f64);
        for row in emissions.chunks(2) {
            assert_approx_eq!(row[0] + row[1], 1.0, 1e-12);
        }
    }

    #[test]
    fn test_log_space_rows_beyond_linear_range() {
        // Test Case 2: rows at -5000 in log space cannot be exponentiated directly.
        let mut emissions = vec![-5000.0, -5001.0, -4999.0, -5003.0, 0.3, 0.6];
        let mut phi = vec![0.0; 6];
        let mut counts = DenseMatrix::zeros(2, 2);
        let ll = forward_backward(&sticky(2), &[0.5, 0.5], &mut emissions, &mut phi, &mut counts).unwrap();
        assert!(ll < -9990.0 && ll > -10010.0, "ll = {}", ll);
        for row in phi.chunks(2) {
            assert_approx_eq!(row[0] + row[1], 1.0, 1e-12);
        }
        assert_approx_eq!(counts.as_slice().iter().sum::<f64>(), 2.0, 1e-12);
    }

    #[test]
    fn test_missing_rows_contribute_nothing() {
        // Test Case 3: a run of missing rows leaves the likelihood unchanged.
        let mut with_gap = vec![0.2, 0.7, f64::NAN, f64::NAN, f64::NAN, 0.1, 0.6, 0.3];
        let mut neutral = vec![0.2, 0.7, 1.0, 1.0, 1.0, 1.0, 0.6, 0.3];
        let ll_gap = forward(&sticky(2), &[0.5, 0.5], &mut with_gap).unwrap();
        let ll_neutral = forward(&sticky(2), &[0.5, 0.5], &mut neutral).unwrap();
        assert_approx_eq!(ll_gap, ll_neutral, 1e-12);
    }
}

#[cfg(test)]
mod emission_stability {
    use super::*;

    fn params() -> ZinmParameters {
        ZinmParameters::new(
            3.0,
            0.7,
            DenseMatrix::from_rows(&[vec![0.3, 0.1, 0.6], vec![0.05, 0.02, 0.93]]).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_extreme_counts_stay_finite_through_forward_backward() {
        let series = ChipSeries::from_rows(&[
            vec![0, 0],
            vec![2, 5],
            vec![50_000, 90_000],
            vec![MISSING_COUNT, 1],
            vec![1, 3],
        ])
        .unwrap();
        let index = ObservationIndex::build(&series);
        let mut pem = DenseMatrix::zeros(5, 2);
        zinm_emissions(&params(), &series, &index, &EmissionConfig::adaptive(), &mut pem).unwrap();

        // The extreme row underflows and is kept in log space.
        assert!(pem.row(2).iter().all(|&x| x < 0.0 && x.is_finite()));
        assert!(pem.row(3).iter().all(|x| x.is_nan()));

        let mut phi = DenseMatrix::zeros(5, 2);
        let mut counts = DenseMatrix::zeros(2, 2);
        let ll = block_forward_backward(
            &sticky(2),
            &[0.5, 0.5],
            pem.as_mut_slice(),
            phi.as_mut_slice(),
            &[5],
            &mut counts,
        )
        .unwrap();
        assert!(ll.is_finite());
        for row in phi.iter_rows() {
            assert_approx_eq!(row.iter().sum::<f64>(), 1.0, 1e-12);
        }
    }

    #[test]
    fn test_normalizing_constant_for_large_counts() {
        let series = ChipSeries::from_rows(&[vec![100_000, 200_000]]).unwrap();
        let index = ObservationIndex::build(&series);
        let mut pem = DenseMatrix::zeros(1, 2);
        let config = EmissionConfig::log_space().with_normalizing_constant();
        zinm_emissions(&params(), &series, &index, &config, &mut pem).unwrap();
        assert!(pem.as_slice().iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_viterbi_on_underflowing_emissions() {
        let emissions = vec![-8000.0, -8001.0, -7000.0, -6000.0, f64::NEG_INFINITY, f64::NEG_INFINITY];
        let mut path = vec![0; 3];
        block_viterbi(
            &sticky(2).ln(),
            &[0.5f64.ln(); 2],
            &emissions,
            &[3],
            ProbabilitySpace::Log,
            &mut path,
        )
        .unwrap();
        // The impossible last row is neutral, so the chain stays put.
        assert_eq!(path, vec![1, 1, 1]);
    }
}
