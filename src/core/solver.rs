//! Box-constrained nonlinear least squares for small, fixed-size problems.
//!
//! Damped Gauss-Newton (Levenberg-Marquardt with Marquardt diagonal scaling)
//! where steps are clipped to the feasible box and parameters pinned at a bound
//! by the gradient are frozen for the step. The Jacobian is a 2-point forward
//! difference, flipped to a backward difference at the upper bound. Only
//! residual evaluations at trial points count towards the evaluation cap.
use crate::types::FitStatus;

/// Stopping criteria for [`solve_bounded`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveOptions {
    pub max_evaluations: usize,
    /// Relative reduction of the cost
    pub ftol: f64,
    /// Relative step length
    pub xtol: f64,
    /// Infinity norm of the projected gradient
    pub gtol: f64,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_evaluations: 15,
            ftol: 1e-8,
            xtol: 1e-8,
            gtol: 1e-8,
        }
    }
}

/// Final iterate of a solve; returned even when the cap was hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Solution<const N: usize> {
    pub x: [f64; N],
    /// Half the sum of squared residuals at `x`
    pub cost: f64,
    pub evaluations: usize,
    pub status: FitStatus,
}

const LAMBDA_INIT: f64 = 1e-3;
const LAMBDA_MAX: f64 = 1e16;

/// Minimise `0.5 * |r(x)|²` subject to `lower <= x <= upper`.
///
/// `residual` writes the residual vector for `x` into the provided buffer.
pub fn solve_bounded<F, const N: usize>(
    mut residual: F,
    x0: [f64; N],
    lower: [f64; N],
    upper: [f64; N],
    options: &SolveOptions,
) -> Solution<N>
where
    F: FnMut(&[f64; N], &mut Vec<f64>),
{
    let mut x = clamp(x0, &lower, &upper);
    let mut r = Vec::new();
    residual(&x, &mut r);
    let mut evaluations = 1;
    let mut cost = half_sum_sq(&r);

    let done = |x, cost, evaluations, status| Solution {
        x,
        cost,
        evaluations,
        status,
    };

    if r.is_empty() || cost == 0.0 {
        return done(x, cost, evaluations, FitStatus::Converged);
    }

    let mut lambda = LAMBDA_INIT;
    let mut jac = vec![[0.0; N]; r.len()];
    let mut r_step = Vec::with_capacity(r.len());
    let mut r_trial = Vec::with_capacity(r.len());

    loop {
        // forward-difference Jacobian, not counted against the cap
        for j in 0..N {
            let mut h = f64::EPSILON.sqrt() * x[j].abs().max(1.0);
            if x[j] + h > upper[j] {
                h = -h;
            }
            let mut xp = x;
            xp[j] += h;
            residual(&xp, &mut r_step);
            for (row, (rp, r0)) in jac.iter_mut().zip(r_step.iter().zip(&r)) {
                row[j] = (rp - r0) / h;
            }
        }

        let mut jtj = [[0.0; N]; N];
        let mut grad = [0.0; N];
        for (row, ri) in jac.iter().zip(&r) {
            for a in 0..N {
                grad[a] += row[a] * ri;
                for b in 0..N {
                    jtj[a][b] += row[a] * row[b];
                }
            }
        }

        let active = active_bounds(&x, &grad, &lower, &upper);
        let projected_gradient = grad
            .iter()
            .zip(&active)
            .map(|(g, &pinned)| if pinned { 0.0 } else { g.abs() })
            .fold(0.0, f64::max);
        if projected_gradient < options.gtol {
            return done(x, cost, evaluations, FitStatus::Converged);
        }

        let diag_floor = jtj
            .iter()
            .enumerate()
            .map(|(i, row)| row[i])
            .fold(0.0, f64::max)
            * 1e-12;

        // inner loop: shrink the step until the cost goes down
        loop {
            if evaluations >= options.max_evaluations {
                return done(x, cost, evaluations, FitStatus::MaxEvaluations);
            }
            if lambda > LAMBDA_MAX {
                // no descent left at working precision
                return done(x, cost, evaluations, FitStatus::Converged);
            }

            let mut system = jtj;
            let mut rhs = [0.0; N];
            for i in 0..N {
                if active[i] {
                    for k in 0..N {
                        system[i][k] = 0.0;
                        system[k][i] = 0.0;
                    }
                    system[i][i] = 1.0;
                } else {
                    system[i][i] += lambda * jtj[i][i].max(diag_floor).max(f64::MIN_POSITIVE);
                    rhs[i] = -grad[i];
                }
            }

            let Some(delta) = solve_linear(system, rhs) else {
                lambda *= 10.0;
                continue;
            };

            let mut x_new = x;
            for i in 0..N {
                x_new[i] += delta[i];
            }
            let x_new = clamp(x_new, &lower, &upper);
            let step_norm = norm(&sub(&x_new, &x));
            if step_norm <= options.xtol * (options.xtol + norm(&x)) {
                return done(x, cost, evaluations, FitStatus::Converged);
            }

            residual(&x_new, &mut r_trial);
            evaluations += 1;
            let cost_new = half_sum_sq(&r_trial);

            if cost_new.is_finite() && cost_new < cost {
                let reduction = cost - cost_new;
                x = x_new;
                std::mem::swap(&mut r, &mut r_trial);
                cost = cost_new;
                lambda = (lambda / 10.0).max(1e-12);
                if cost == 0.0 || reduction < options.ftol * (cost + reduction) {
                    return done(x, cost, evaluations, FitStatus::Converged);
                }
                break;
            }
            lambda *= 10.0;
        }
    }
}

fn clamp<const N: usize>(mut x: [f64; N], lower: &[f64; N], upper: &[f64; N]) -> [f64; N] {
    for i in 0..N {
        x[i] = x[i].max(lower[i]).min(upper[i]);
    }
    x
}

fn active_bounds<const N: usize>(
    x: &[f64; N],
    grad: &[f64; N],
    lower: &[f64; N],
    upper: &[f64; N],
) -> [bool; N] {
    let mut active = [false; N];
    for i in 0..N {
        active[i] = (x[i] <= lower[i] && grad[i] > 0.0) || (x[i] >= upper[i] && grad[i] < 0.0);
    }
    active
}

fn half_sum_sq(r: &[f64]) -> f64 {
    0.5 * r.iter().map(|v| v * v).sum::<f64>()
}

fn norm<const N: usize>(v: &[f64; N]) -> f64 {
    v.iter().map(|a| a * a).sum::<f64>().sqrt()
}

fn sub<const N: usize>(a: &[f64; N], b: &[f64; N]) -> [f64; N] {
    let mut out = [0.0; N];
    for i in 0..N {
        out[i] = a[i] - b[i];
    }
    out
}

/// Gaussian elimination with partial pivoting; `None` when singular
fn solve_linear<const N: usize>(mut a: [[f64; N]; N], mut b: [f64; N]) -> Option<[f64; N]> {
    for col in 0..N {
        let pivot = (col..N).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-300 || !a[pivot][col].is_finite() {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in (col + 1)..N {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..N {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = [0.0; N];
    for row in (0..N).rev() {
        let mut acc = b[row];
        for k in (row + 1)..N {
            acc -= a[row][k] * x[k];
        }
        x[row] = acc / a[row][row];
    }
    if x.iter().all(|v| v.is_finite()) {
        Some(x)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_solve_linear_3x3() {
        let a = [[2.0, 1.0, -1.0], [-3.0, -1.0, 2.0], [-2.0, 1.0, 2.0]];
        let b = [8.0, -11.0, -3.0];
        let x = solve_linear(a, b).unwrap();
        assert_abs_diff_eq!(x[0], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(x[1], 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(x[2], -1.0, epsilon = 1e-12);
        assert!(solve_linear([[1.0, 2.0], [2.0, 4.0]], [1.0, 2.0]).is_none());
    }

    #[test]
    fn test_linear_problem_converges() {
        // y = 2 + 3t, exact data
        let t: Vec<f64> = (0..10).map(|i| i as f64 * 0.1).collect();
        let y: Vec<f64> = t.iter().map(|t| 2.0 + 3.0 * t).collect();
        let sol = solve_bounded(
            |x: &[f64; 2], out: &mut Vec<f64>| {
                out.clear();
                out.extend(t.iter().zip(&y).map(|(t, y)| x[0] + x[1] * t - y));
            },
            [0.0, 0.0],
            [-10.0, -10.0],
            [10.0, 10.0],
            &SolveOptions::default(),
        );
        assert_eq!(sol.status, FitStatus::Converged);
        assert_abs_diff_eq!(sol.x[0], 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(sol.x[1], 3.0, epsilon = 1e-6);
        assert!(sol.evaluations <= 15);
    }

    #[test]
    fn test_bound_is_respected() {
        // unconstrained optimum at x = 5, upper bound 1
        let sol = solve_bounded(
            |x: &[f64; 1], out: &mut Vec<f64>| {
                out.clear();
                out.push(x[0] - 5.0);
            },
            [0.0],
            [0.0],
            [1.0],
            &SolveOptions::default(),
        );
        assert!(sol.x[0] <= 1.0);
        assert_abs_diff_eq!(sol.x[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_evaluation_cap_returns_last_iterate() {
        let opts = SolveOptions {
            max_evaluations: 2,
            ..SolveOptions::default()
        };
        // Rosenbrock needs many iterations
        let sol = solve_bounded(
            |x: &[f64; 2], out: &mut Vec<f64>| {
                out.clear();
                out.push(10.0 * (x[1] - x[0] * x[0]));
                out.push(1.0 - x[0]);
            },
            [-1.2, 1.0],
            [-5.0, -5.0],
            [5.0, 5.0],
            &opts,
        );
        assert_eq!(sol.status, FitStatus::MaxEvaluations);
        assert_eq!(sol.evaluations, 2);
        assert!(sol.x.iter().all(|v| v.is_finite()));
    }
}
