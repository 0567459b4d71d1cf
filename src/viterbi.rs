//! Log-space Viterbi decoding.
//!
//! Single-segment decoder plus a block wrapper that prepares inputs
//! (log conversion, parameter checks, neutralization of uninformative
//! emission rows) and decodes each fragment independently.

use crate::blocks::{fragment_ranges, validate_blocks};
use crate::collections::DenseMatrix;
use crate::config::ProbabilitySpace;
use crate::errors::{try_zeroed_buffer, validate_length, HmmError, HmmResult};
use crate::math_utils::argmax_first;

/// Path entry for a position whose state could not be decoded.
pub const INVALID_STATE: usize = usize::MAX;

/// Most likely state sequence of one segment.
///
/// All inputs are natural logarithms. `log_emissions` holds `n` rows of `m`
/// values and `path` receives `n` state indices. Ties, both among
/// predecessors and for the final state, go to the lowest index.
///
/// # Errors
/// [`HmmError::AllocationFailed`] when the backtracking table cannot be
/// reserved; `path` is then filled with [`INVALID_STATE`].
pub fn viterbi(
    log_q: &DenseMatrix,
    log_init: &[f64],
    log_emissions: &[f64],
    path: &mut [usize],
) -> HmmResult<()> {
    let m = log_q.rows();
    if m == 0 || !log_q.is_square() {
        return Err(HmmError::DimensionMismatch {
            context: "viterbi transition matrix".to_string(),
            expected: m.max(1),
            actual: log_q.cols(),
        });
    }
    validate_length(log_init.len(), m, "viterbi initial distribution")?;
    let n = path.len();
    validate_length(log_emissions.len(), n * m, "viterbi emissions")?;
    if n == 0 {
        return Ok(());
    }

    let mut backtrack: Vec<usize> = match try_zeroed_buffer(n * m, "viterbi backtracking table") {
        Ok(buffer) => buffer,
        Err(e) => {
            path.iter_mut().for_each(|s| *s = INVALID_STATE);
            return Err(e);
        }
    };

    let mut delta: Vec<f64> = log_init
        .iter()
        .zip(&log_emissions[..m])
        .map(|(i, e)| i + e)
        .collect();
    let mut next = vec![0.0; m];

    for k in 1..n {
        let row = &log_emissions[k * m..(k + 1) * m];
        let pointers = &mut backtrack[k * m..(k + 1) * m];
        for to in 0..m {
            let mut best = 0;
            let mut best_score = delta[0] + log_q[(0, to)];
            for from in 1..m {
                let score = delta[from] + log_q[(from, to)];
                if score > best_score {
                    best = from;
                    best_score = score;
                }
            }
            pointers[to] = best;
            next[to] = best_score + row[to];
        }
        std::mem::swap(&mut delta, &mut next);
    }

    path[n - 1] = argmax_first(&delta);
    for k in (1..n).rev() {
        path[k - 1] = backtrack[k * m + path[k]];
    }

    Ok(())
}

fn to_log_space(values: &[f64], space: ProbabilitySpace) -> Vec<f64> {
    match space {
        ProbabilitySpace::Linear => values.iter().map(|x| x.ln()).collect(),
        ProbabilitySpace::Log => values.to_vec(),
    }
}

/// Viterbi decoding of every fragment of a series.
///
/// `q`, `init` and `emissions` are given in `space`. NaN in the log
/// transition matrix or log initial distribution is rejected with
/// [`HmmError::CorruptedParameter`] before `path` is touched. An emission
/// row containing NaN, or in which every state is impossible, is replaced
/// by a neutral row so that the position is decoded from the transitions
/// alone.
pub fn block_viterbi(
    q: &DenseMatrix,
    init: &[f64],
    emissions: &[f64],
    block_sizes: &[usize],
    space: ProbabilitySpace,
    path: &mut [usize],
) -> HmmResult<()> {
    let m = q.rows();
    if m == 0 || !q.is_square() {
        return Err(HmmError::DimensionMismatch {
            context: "viterbi transition matrix".to_string(),
            expected: m.max(1),
            actual: q.cols(),
        });
    }
    validate_length(init.len(), m, "viterbi initial distribution")?;
    validate_blocks(block_sizes, path.len())?;
    validate_length(emissions.len(), path.len() * m, "viterbi emissions")?;

    let log_q = DenseMatrix::from_vec(m, m, to_log_space(q.as_slice(), space))?;
    if log_q.as_slice().iter().any(|x| x.is_nan()) {
        return Err(HmmError::CorruptedParameter {
            parameter: "transition matrix".to_string(),
        });
    }
    let log_init = to_log_space(init, space);
    if log_init.iter().any(|x| x.is_nan()) {
        return Err(HmmError::CorruptedParameter {
            parameter: "initial distribution".to_string(),
        });
    }

    let mut log_emissions: Vec<f64> = try_zeroed_buffer(emissions.len(), "viterbi emissions")?;
    for (out, row) in log_emissions.chunks_mut(m).zip(emissions.chunks(m)) {
        for (o, &e) in out.iter_mut().zip(row) {
            *o = match space {
                ProbabilitySpace::Linear => e.ln(),
                ProbabilitySpace::Log => e,
            };
        }
        let uninformative = out.iter().any(|x| x.is_nan())
            || out.iter().all(|&x| x == f64::NEG_INFINITY);
        if uninformative {
            out.iter_mut().for_each(|x| *x = 0.0);
        }
    }

    for range in fragment_ranges(block_sizes) {
        viterbi(
            &log_q,
            &log_init,
            &log_emissions[range.start * m..range.end * m],
            &mut path[range],
        )?;
    }

    Ok(())
}
