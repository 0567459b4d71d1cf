//! Block-wise forward-backward over independent fragments.
//!
//! Fragments never exchange transitions: each one restarts from the
//! initial distribution, and their expected transition counts and
//! log-likelihoods are summed.

use crate::collections::DenseMatrix;
use crate::errors::{validate_length, HmmError, HmmResult};
use crate::forward_backward::forward_backward;
use std::ops::Range;

/// Position ranges of consecutive fragments.
pub fn fragment_ranges(block_sizes: &[usize]) -> impl Iterator<Item = Range<usize>> + '_ {
    block_sizes.iter().scan(0usize, |start, &size| {
        let range = *start..*start + size;
        *start += size;
        Some(range)
    })
}

pub(crate) fn validate_blocks(block_sizes: &[usize], positions: usize) -> HmmResult<()> {
    if block_sizes.is_empty() {
        return Err(HmmError::InsufficientData {
            required: 1,
            actual: 0,
        });
    }
    if let Some(i) = block_sizes.iter().position(|&s| s == 0) {
        return Err(HmmError::InvalidParameter {
            parameter: format!("block_sizes[{}]", i),
            value: 0.0,
            constraint: "fragments must be non-empty".to_string(),
        });
    }
    validate_length(block_sizes.iter().sum(), positions, "sum of block sizes")
}

fn validate_buffers(
    q: &DenseMatrix,
    emissions: &[f64],
    phi: &[f64],
    block_sizes: &[usize],
    transitions: &DenseMatrix,
) -> HmmResult<usize> {
    let m = q.rows();
    if m == 0 {
        return Err(HmmError::InsufficientData {
            required: 1,
            actual: 0,
        });
    }
    validate_length(phi.len(), emissions.len(), "posterior buffer")?;
    validate_length(transitions.rows() * transitions.cols(), m * m, "transition counts")?;
    validate_blocks(block_sizes, emissions.len() / m)?;
    validate_length(emissions.len(), block_sizes.iter().sum::<usize>() * m, "emissions")?;
    Ok(m)
}

/// Run forward-backward on every fragment.
///
/// `emissions` and `phi` hold `n × m` position-major values and are split
/// along `block_sizes`. On return `emissions` holds the forward
/// probabilities, `phi` the posteriors and `transitions` the expected
/// transition counts summed over fragments.
///
/// # Returns
/// The summed log-likelihood of all fragments.
pub fn block_forward_backward(
    q: &DenseMatrix,
    init: &[f64],
    emissions: &mut [f64],
    phi: &mut [f64],
    block_sizes: &[usize],
    transitions: &mut DenseMatrix,
) -> HmmResult<f64> {
    let m = validate_buffers(q, emissions, phi, block_sizes, transitions)?;

    transitions.fill(0.0);
    let mut fragment_transitions = DenseMatrix::zeros(m, m);
    let mut log_likelihood = 0.0;

    for range in fragment_ranges(block_sizes) {
        let span = range.start * m..range.end * m;
        log_likelihood += forward_backward(
            q,
            init,
            &mut emissions[span.clone()],
            &mut phi[span],
            &mut fragment_transitions,
        )?;
        transitions.add_assign(&fragment_transitions)?;
    }

    Ok(log_likelihood)
}

/// Parallel version of [`block_forward_backward`].
///
/// Fragments run concurrently on disjoint slices. Their results are
/// reduced in fragment order, so the output is bit-identical to the
/// sequential runner.
#[cfg(feature = "parallel")]
pub fn block_forward_backward_parallel(
    q: &DenseMatrix,
    init: &[f64],
    emissions: &mut [f64],
    phi: &mut [f64],
    block_sizes: &[usize],
    transitions: &mut DenseMatrix,
) -> HmmResult<f64> {
    use rayon::prelude::*;

    let m = validate_buffers(q, emissions, phi, block_sizes, transitions)?;

    let mut fragments = Vec::with_capacity(block_sizes.len());
    let mut rest_emissions = emissions;
    let mut rest_phi = phi;
    for &size in block_sizes {
        let (e, e_tail) = std::mem::take(&mut rest_emissions).split_at_mut(size * m);
        let (p, p_tail) = std::mem::take(&mut rest_phi).split_at_mut(size * m);
        fragments.push((e, p));
        rest_emissions = e_tail;
        rest_phi = p_tail;
    }

    let results: Result<Vec<_>, _> = fragments
        .into_par_iter()
        .map(|(e, p)| {
            let mut counts = DenseMatrix::zeros(m, m);
            let ll = forward_backward(q, init, e, p, &mut counts)?;
            Ok::<_, HmmError>((ll, counts))
        })
        .collect();

    transitions.fill(0.0);
    let mut log_likelihood = 0.0;
    for (ll, counts) in results? {
        log_likelihood += ll;
        transitions.add_assign(&counts)?;
    }

    Ok(log_likelihood)
}
