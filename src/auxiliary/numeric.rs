//! Scalar numerical routines.

use anyhow::{self, bail};

#[cfg(test)]
#[path = "numeric_tests.rs"]
mod numeric_tests;

/// Finds a root of a scalar function by Newton's method with a numerically
/// estimated derivative (secant iteration).
///
/// The second iterate is seeded from a small relative displacement of `x0`, so
/// no analytic derivative is required.
///
/// # Arguments
///
/// * `f` - The function whose root is sought. Each evaluation may itself fail.
/// * `x0` - The starting point of the iteration.
/// * `tol` - The convergence tolerance on the change in the iterate.
/// * `max_iter` - The maximum number of secant steps.
///
/// # Returns
///
/// The converged root, or an error if the iteration stalls on a flat secant or
/// fails to converge within `max_iter` steps.
pub fn newton<F>(mut f: F, x0: f64, tol: f64, max_iter: usize) -> Result<f64, anyhow::Error>
where
    F: FnMut(f64) -> Result<f64, anyhow::Error>,
{
    let eps = 1e-4;
    let mut p0 = x0;
    let mut p1 = if x0 >= 0.0 {
        x0 * (1.0 + eps) + eps
    } else {
        x0 * (1.0 + eps) - eps
    };
    let mut q0 = f(p0)?;
    let mut q1 = f(p1)?;
    if q0.abs() < q1.abs() {
        std::mem::swap(&mut p0, &mut p1);
        std::mem::swap(&mut q0, &mut q1);
    }
    for _ in 0..max_iter {
        if q1 == q0 {
            if p1 != p0 {
                bail!(
                    "Derivative vanished in the secant iteration at x = {}.",
                    (p1 + p0) / 2.0
                );
            }
            return Ok((p1 + p0) / 2.0);
        }
        // Secant step
        let p = if q1.abs() > q0.abs() {
            (-q0 / q1 * p1 + p0) / (1.0 - q0 / q1)
        } else {
            (-q1 / q0 * p0 + p1) / (1.0 - q1 / q0)
        };
        if (p - p1).abs() < tol {
            return Ok(p);
        }
        p0 = p1;
        q0 = q1;
        p1 = p;
        q1 = f(p1)?;
    }
    bail!(
        "Failed to converge the secant iteration to a tolerance of {tol:.3e} within {max_iter} steps; last iterate: {p1}."
    )
}
