//! One-dimensional root finding for increasing objectives.
//!
//! The Baum-Welch update of the first category probability reduces to a
//! scalar equation `f(x) = 0` with `f` increasing on the positive axis.
//! [`SafeguardedNewton`] brackets the root by doubling or halving from a
//! positive start, then refines it with Newton steps, falling back to
//! bisection whenever a step leaves the bracket.

use crate::config::{DEFAULT_ROOT_MAX_ITERATIONS, DEFAULT_ROOT_TOLERANCE};
use crate::errors::{HmmError, HmmResult};
use crate::math_utils::constants::MAX_BRACKET_STEPS;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Scalar function with its derivative.
pub trait Objective {
    /// `f(x)`.
    fn value(&self, x: f64) -> f64;

    /// `f'(x)`.
    fn derivative(&self, x: f64) -> f64;
}

/// [`Objective`] built from two closures.
pub struct FnObjective<F, D> {
    f: F,
    df: D,
}

impl<F, D> FnObjective<F, D>
where
    F: Fn(f64) -> f64,
    D: Fn(f64) -> f64,
{
    /// Wrap a function and its derivative.
    pub fn new(f: F, df: D) -> Self {
        Self { f, df }
    }
}

impl<F, D> Objective for FnObjective<F, D>
where
    F: Fn(f64) -> f64,
    D: Fn(f64) -> f64,
{
    fn value(&self, x: f64) -> f64 {
        (self.f)(x)
    }

    fn derivative(&self, x: f64) -> f64 {
        (self.df)(x)
    }
}

/// Interval `[lower, upper]` with `f(lower) <= 0 <= f(upper)`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Bracket {
    /// Lower end, where the objective is non-positive
    pub lower: f64,
    /// Upper end, where the objective is non-negative
    pub upper: f64,
}

impl Bracket {
    /// Interval `[lower, upper]`.
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    /// `upper - lower`.
    #[inline]
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    /// Center of the interval.
    #[inline]
    pub fn midpoint(&self) -> f64 {
        0.5 * (self.lower + self.upper)
    }

    /// Whether `x` lies in the closed interval.
    #[inline]
    pub fn contains(&self, x: f64) -> bool {
        x >= self.lower && x <= self.upper
    }

    /// Whether the two intervals overlap.
    pub fn intersects(&self, other: &Bracket) -> bool {
        self.lower <= other.upper && self.upper >= other.lower
    }
}

/// Result of [`SafeguardedNewton::solve`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RootEstimate {
    /// Last evaluated point
    pub root: f64,
    /// Number of objective evaluations
    pub iterations: usize,
    /// Whether the bracket shrank below the tolerance
    pub converged: bool,
    /// Final bracket
    pub bracket: Bracket,
}

/// Bracketed Newton iteration with bisection fallback.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SafeguardedNewton {
    /// Cap on Newton/bisection steps
    pub max_iterations: usize,
    /// Absolute tolerance on the bracket width
    pub tolerance: f64,
    /// Cap on doubling/halving steps during bracketing
    pub max_bracket_steps: usize,
    /// Interval the root must lie in
    pub admissible: Bracket,
}

impl Default for SafeguardedNewton {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_ROOT_MAX_ITERATIONS,
            tolerance: DEFAULT_ROOT_TOLERANCE,
            max_bracket_steps: MAX_BRACKET_STEPS,
            admissible: Bracket::new(0.0, 1.0),
        }
    }
}

fn no_bracket(lower: f64, upper: f64) -> HmmError {
    HmmError::NoRootBracket {
        state: 0,
        lower,
        upper,
    }
}

impl SafeguardedNewton {
    /// Solver with custom iteration cap and tolerance.
    pub fn new(max_iterations: usize, tolerance: f64) -> Self {
        Self {
            max_iterations,
            tolerance,
            ..Self::default()
        }
    }

    /// Bracket the root of an increasing objective starting from `start > 0`.
    ///
    /// If `f(start) < 0` the point is doubled until `f >= 0`, otherwise it
    /// is halved until `f <= 0`; the last two points form the bracket.
    ///
    /// # Errors
    /// [`HmmError::NoRootBracket`] if the objective is not finite along the
    /// way, the step cap is reached, or the bracket misses the admissible
    /// interval. The error's `state` field is 0; callers fill it in.
    pub fn find_bracket<O: Objective + ?Sized>(&self, objective: &O, start: f64) -> HmmResult<Bracket> {
        let mut x = start;
        let fx = objective.value(x);
        if !fx.is_finite() {
            return Err(no_bracket(x, x));
        }

        let bracket = if fx < 0.0 {
            let mut steps = 0;
            loop {
                x *= 2.0;
                let fx = objective.value(x);
                if !fx.is_finite() {
                    return Err(no_bracket(x / 2.0, x));
                }
                if fx >= 0.0 {
                    break;
                }
                steps += 1;
                if steps >= self.max_bracket_steps {
                    return Err(no_bracket(x, f64::INFINITY));
                }
            }
            Bracket::new(x / 2.0, x)
        } else {
            let mut steps = 0;
            loop {
                x /= 2.0;
                let fx = objective.value(x);
                if !fx.is_finite() {
                    return Err(no_bracket(x, 2.0 * x));
                }
                if fx <= 0.0 {
                    break;
                }
                steps += 1;
                if steps >= self.max_bracket_steps {
                    return Err(no_bracket(0.0, x));
                }
            }
            Bracket::new(x, 2.0 * x)
        };

        if !bracket.intersects(&self.admissible) {
            return Err(no_bracket(bracket.lower, bracket.upper));
        }
        Ok(bracket)
    }

    /// Refine a root inside `bracket`.
    ///
    /// Starts from the midpoint. Each step evaluates `f` at the current
    /// point, shrinks the bracket (`f > 0` moves the upper end) and stops
    /// once the width is below the tolerance. A Newton step that lands
    /// outside the bracket, or is not a number, is replaced by the midpoint.
    /// Hitting the iteration cap is not an error; the estimate is returned
    /// with `converged == false`.
    pub fn solve<O: Objective + ?Sized>(&self, objective: &O, bracket: Bracket) -> HmmResult<RootEstimate> {
        let mut current = bracket;
        let mut candidate = current.midpoint();
        let mut x = candidate;
        let mut iterations = 0;
        let mut converged = false;

        for _ in 0..self.max_iterations {
            x = if current.contains(candidate) {
                candidate
            } else {
                current.midpoint()
            };
            let fx = objective.value(x);
            iterations += 1;
            if !fx.is_finite() {
                return Err(HmmError::NumericalError {
                    reason: format!("objective is not finite at {}", x),
                    operation: Some("SafeguardedNewton::solve".to_string()),
                });
            }

            if fx > 0.0 {
                current.upper = x;
            } else {
                current.lower = x;
            }
            if current.width() < self.tolerance {
                converged = true;
                break;
            }
            candidate = x - fx / objective.derivative(x);
        }

        Ok(RootEstimate {
            root: x,
            iterations,
            converged,
            bracket: current,
        })
    }

    /// Bracket from `start`, then solve.
    pub fn find_root<O: Objective + ?Sized>(&self, objective: &O, start: f64) -> HmmResult<RootEstimate> {
        let bracket = self.find_bracket(objective, start)?;
        self.solve(objective, bracket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn unbounded() -> SafeguardedNewton {
        SafeguardedNewton {
            admissible: Bracket::new(0.0, f64::INFINITY),
            ..SafeguardedNewton::default()
        }
    }

    #[test]
    fn test_bracket_by_doubling_and_halving() {
        let f = FnObjective::new(|x: f64| x * x - 2.0, |x: f64| 2.0 * x);
        let bracket = unbounded().find_bracket(&f, 0.5).unwrap();
        assert_eq!(bracket, Bracket::new(1.0, 2.0));

        let g = FnObjective::new(|x: f64| x - 0.1, |_| 1.0);
        let bracket = unbounded().find_bracket(&g, 0.5).unwrap();
        assert_eq!(bracket, Bracket::new(0.0625, 0.125));
    }

    #[test]
    fn test_newton_converges_to_sqrt2() {
        let f = FnObjective::new(|x: f64| x * x - 2.0, |x: f64| 2.0 * x);
        let estimate = unbounded().find_root(&f, 0.5).unwrap();
        assert_approx_eq!(estimate.root, 2f64.sqrt(), 1e-9);
        assert!(estimate.bracket.contains(estimate.root));
    }

    #[test]
    fn test_bad_derivative_falls_back_to_bisection() {
        let f = FnObjective::new(|x: f64| x - 0.3, |_| 0.0);
        let estimate = SafeguardedNewton::default().find_root(&f, 0.5).unwrap();
        assert!(estimate.converged);
        assert_approx_eq!(estimate.root, 0.3, 1e-6);
    }

    #[test]
    fn test_iteration_cap_is_not_an_error() {
        let f = FnObjective::new(|x: f64| x - 0.3, |_| 0.0);
        let solver = SafeguardedNewton::new(3, 1e-12);
        let estimate = solver.find_root(&f, 0.5).unwrap();
        assert!(!estimate.converged);
        assert_eq!(estimate.iterations, 3);
        assert!(estimate.bracket.contains(0.3));
    }

    #[test]
    fn test_root_outside_unit_interval() {
        let f = FnObjective::new(|x: f64| x - 3.0, |_| 1.0);
        match SafeguardedNewton::default().find_bracket(&f, 0.5) {
            Err(HmmError::NoRootBracket { lower, upper, .. }) => {
                assert_eq!(lower, 2.0);
                assert_eq!(upper, 4.0);
            }
            other => panic!("Expected NoRootBracket, got {:?}", other),
        }
    }

    #[test]
    fn test_non_finite_objective() {
        let f = FnObjective::new(|_| f64::NAN, |_| 1.0);
        assert!(matches!(
            SafeguardedNewton::default().find_bracket(&f, 0.5),
            Err(HmmError::NoRootBracket { .. })
        ));

        // Never crosses zero: doubling runs into infinity.
        let g = FnObjective::new(|x: f64| -1.0 / x - 1.0, |x: f64| 1.0 / (x * x));
        assert!(unbounded().find_bracket(&g, 0.5).is_err());
    }
}
