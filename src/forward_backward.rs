//! Forward algorithm and Markovian backward smoothing for one segment.
//!
//! Buffers are position-major: position `k` occupies entries
//! `k*m..(k+1)*m` where `m` is the number of states. The forward pass
//! consumes emission likelihoods and overwrites them with the normalized
//! forward probabilities; the backward pass reads those and produces the
//! posteriors and the expected transition counts without storing any
//! backward (beta) values.

use crate::collections::DenseMatrix;
use crate::errors::{validate_length, HmmError, HmmResult};

fn validate_segment(q: &DenseMatrix, buffer: &[f64], context: &str) -> HmmResult<usize> {
    if !q.is_square() {
        return Err(HmmError::DimensionMismatch {
            context: "transition matrix columns".to_string(),
            expected: q.rows(),
            actual: q.cols(),
        });
    }
    let m = q.rows();
    if m == 0 {
        return Err(HmmError::InsufficientData {
            required: 1,
            actual: 0,
        });
    }
    if buffer.len() % m != 0 {
        return Err(HmmError::DimensionMismatch {
            context: context.to_string(),
            expected: (buffer.len() / m + 1) * m,
            actual: buffer.len(),
        });
    }
    Ok(m)
}

/// `next[j] = Σ_i current[i] * Q[i, j]`.
#[inline]
fn propagate(q: &DenseMatrix, current: &[f64], next: &mut [f64]) {
    next.iter_mut().for_each(|x| *x = 0.0);
    for (i, &a) in current.iter().enumerate() {
        if a == 0.0 {
            continue;
        }
        for (x, &t) in next.iter_mut().zip(q.row(i)) {
            *x += a * t;
        }
    }
}

/// Forward algorithm robust to missing values and underflow.
///
/// `emissions` holds one row of `m` emission likelihoods per position. A
/// row whose first entry is negative is taken to be in log space and is
/// rescaled by its maximum before exponentiation, the maximum being added
/// to the log-likelihood directly. A row containing NaN, or whose product
/// with the propagated vector does not have a positive sum, carries no
/// information: the propagated vector is used as is and the position adds
/// nothing to the log-likelihood.
///
/// # Returns
/// The total log-likelihood of the segment.
///
/// # Side effects
/// `emissions` is overwritten with the forward probabilities.
pub fn forward(q: &DenseMatrix, init: &[f64], emissions: &mut [f64]) -> HmmResult<f64> {
    let m = validate_segment(q, emissions, "forward emissions")?;
    validate_length(init.len(), m, "initial distribution")?;

    let mut alpha = vec![0.0; m];
    let mut propagated = vec![0.0; m];
    let mut log_likelihood = 0.0;

    for (k, row) in emissions.chunks_mut(m).enumerate() {
        if k == 0 {
            propagated.copy_from_slice(init);
        } else {
            propagate(q, &alpha, &mut propagated);
        }

        if row.iter().any(|x| x.is_nan()) {
            alpha.copy_from_slice(&propagated);
            row.copy_from_slice(&propagated);
            continue;
        }

        let mut offset = 0.0;
        let mut c = 0.0;
        if row[0] < 0.0 {
            let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            for ((a, &t), &e) in alpha.iter_mut().zip(&propagated).zip(row.iter()) {
                *a = t * (e - max).exp();
                c += *a;
            }
            offset = max;
        } else {
            for ((a, &t), &e) in alpha.iter_mut().zip(&propagated).zip(row.iter()) {
                *a = t * e;
                c += *a;
            }
        }

        if c > 0.0 {
            alpha.iter_mut().for_each(|a| *a /= c);
            row.copy_from_slice(&alpha);
            log_likelihood += c.ln() + offset;
        } else {
            // Every path into this position is blocked.
            alpha.copy_from_slice(&propagated);
            row.copy_from_slice(&propagated);
        }
    }

    Ok(log_likelihood)
}

/// Backward pass with Markovian backward smoothing.
///
/// For each position `k`, the reverse kernel
/// `R[from | to] = alpha_k[from] Q[from, to] / Σ_i alpha_k[i] Q[i, to]`
/// gives `phi_k[from] = Σ_to phi_{k+1}[to] R[from | to]`, and the same
/// products accumulate into `transitions[(from, to)]`.
///
/// # Side effects
/// `phi` is overwritten with the posterior state probabilities and
/// `transitions` with the expected transition counts of the segment.
pub fn backward(
    q: &DenseMatrix,
    alpha: &[f64],
    phi: &mut [f64],
    transitions: &mut DenseMatrix,
) -> HmmResult<()> {
    let m = validate_segment(q, alpha, "backward alphas")?;
    validate_length(phi.len(), alpha.len(), "posterior buffer")?;
    validate_length(transitions.rows() * transitions.cols(), m * m, "transition counts")?;

    transitions.fill(0.0);
    phi.iter_mut().for_each(|x| *x = 0.0);
    let n = alpha.len() / m;
    if n == 0 {
        return Ok(());
    }
    phi[(n - 1) * m..].copy_from_slice(&alpha[(n - 1) * m..]);

    // Column `to` of the reverse kernel, normalized over `from`.
    let mut kernel = vec![0.0; m];
    for k in (0..n - 1).rev() {
        let alpha_k = &alpha[k * m..(k + 1) * m];
        let (head, tail) = phi.split_at_mut((k + 1) * m);
        let phi_k = &mut head[k * m..];
        let phi_next = &tail[..m];

        for to in 0..m {
            let mut norm = 0.0;
            for (from, r) in kernel.iter_mut().enumerate() {
                *r = alpha_k[from] * q[(from, to)];
                norm += *r;
            }
            if !(norm > 0.0) {
                // `to` cannot be reached from this position.
                continue;
            }
            for (from, &r) in kernel.iter().enumerate() {
                let x = phi_next[to] * r / norm;
                phi_k[from] += x;
                transitions[(from, to)] += x;
            }
        }
    }

    Ok(())
}

/// Forward pass followed by backward smoothing on one segment.
///
/// # Returns
/// The log-likelihood of the segment. `emissions` ends up holding the
/// forward probabilities, `phi` the posteriors and `transitions` the
/// expected transition counts.
pub fn forward_backward(
    q: &DenseMatrix,
    init: &[f64],
    emissions: &mut [f64],
    phi: &mut [f64],
    transitions: &mut DenseMatrix,
) -> HmmResult<f64> {
    let log_likelihood = forward(q, init, emissions)?;
    backward(q, emissions, phi, transitions)?;
    Ok(log_likelihood)
}
