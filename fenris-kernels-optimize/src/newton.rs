use crate::calculus::DifferentiableScalarFunction;
use crate::Real;
use log::debug;
use std::error::Error;
use std::fmt;
use std::fmt::Display;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NewtonResult<T> {
    pub solution: T,
    pub iterations: usize,
    /// Absolute value of the function at `solution`.
    pub residual: T,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NewtonSettings<T> {
    pub max_iterations: usize,
    pub tolerance: T,
    /// Iterates are never allowed to cross this bound. A step that would cross it is replaced
    /// by bisection between the current iterate and the bound.
    pub lower_bound: Option<T>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NewtonError<T> {
    /// The maximum number of iterations was reached. Holds the last iterate.
    MaximumIterationsReached(NewtonResult<T>),
    /// The derivative vanished or was not finite, so no Newton step could be taken.
    DegenerateDerivative { iteration: usize, x: T },
}

impl<T: Display> Display for NewtonError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            NewtonError::MaximumIterationsReached(result) => write!(
                f,
                "Failed to converge within maximum number of iterations ({}). Last residual: {}",
                result.iterations, result.residual
            ),
            NewtonError::DegenerateDerivative { iteration, x } => {
                write!(f, "Degenerate derivative at iteration {} (x = {}).", iteration, x)
            }
        }
    }
}

impl<T: fmt::Debug + Display> Error for NewtonError<T> {}

impl<T> NewtonError<T> {
    /// The last iterate, if the iteration got far enough to produce one.
    pub fn last_result(&self) -> Option<&NewtonResult<T>> {
        match self {
            NewtonError::MaximumIterationsReached(result) => Some(result),
            NewtonError::DegenerateDerivative { .. } => None,
        }
    }
}

/// Attempts to solve the scalar equation `f(x) = 0` starting from `x0`.
///
/// The solution is said to have converged if `|f(x)| <= tolerance`. The initial guess counts
/// as converged without taking any steps. Iterates are logged at debug level.
pub fn newton<T, F>(mut function: F, x0: T, settings: &NewtonSettings<T>) -> Result<NewtonResult<T>, NewtonError<T>>
where
    T: Real,
    F: DifferentiableScalarFunction<T>,
{
    let mut x = x0;
    let mut f = function.eval(x);
    let mut iter = 0;

    // NaN residuals never count as converged
    while !(f.abs() <= settings.tolerance) {
        if iter == settings.max_iterations {
            return Err(NewtonError::MaximumIterationsReached(NewtonResult {
                solution: x,
                iterations: iter,
                residual: f.abs(),
            }));
        }

        let df = function.derivative(x);
        if df == T::zero() || !df.is_finite() {
            return Err(NewtonError::DegenerateDerivative { iteration: iter, x });
        }

        let mut x_next = x - f / df;
        if let Some(bound) = settings.lower_bound {
            if x_next <= bound {
                x_next = (x + bound) / (T::one() + T::one());
            }
        }

        x = x_next;
        f = function.eval(x);
        iter += 1;
        debug!("Newton iteration {}: x = {}, |f| = {}", iter, x, f.abs());
    }

    Ok(NewtonResult {
        solution: x,
        iterations: iter,
        residual: f.abs(),
    })
}
