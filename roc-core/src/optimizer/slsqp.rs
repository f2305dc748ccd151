//! Sequential least-squares quadratic programming minimizer.
//!
//! A dense SQP implementation for small, smooth, box-bounded problems with
//! inequality constraints `g(x) ≥ 0`:
//!
//! - damped BFGS approximation of the Lagrangian Hessian,
//! - forward-difference gradients,
//! - an elastic (slack-relaxed) QP subproblem so search directions exist from
//!   infeasible iterates,
//! - an l1 exact-penalty merit function with Armijo backtracking.
//!
//! Exit statuses mirror the classic SLSQP numbering so downstream consumers
//! can keep their status-code handling.
//!
//! The caller distinguishes *search* evaluations (`objective`) from
//! finite-difference *probe* evaluations (`probe`); both count toward `nfev`,
//! but only search evaluations are expected to be captured by the caller's
//! iteration log, which is why `nfev >= log length` whenever gradients are
//! approximated numerically.

use super::qp;

/// Forward-difference step; ~√ε of f64 is about right for forward
/// differences on O(1) quantities.
const FD_STEP: f64 = 1e-7;
/// Armijo sufficient-decrease coefficient.
const ARMIJO_C: f64 = 0.1;
/// Backtracking halvings before the line search gives up.
const MAX_BACKTRACKS: usize = 6;
/// Quadratic weight on the elastic slacks; keeps the QP Hessian definite.
const SLACK_CURVATURE: f64 = 1.0;
/// Linear elastic weight factor relative to the gradient scale.
const ELASTIC_FACTOR: f64 = 100.0;

/// Cooperative interruption raised from inside an evaluation callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

/// The black-box problem surface the minimizer drives.
pub trait SlsqpProblem {
    /// Objective at a search point (initial point and line-search trials).
    fn objective(&mut self, x: &[f64]) -> Result<f64, Interrupted>;

    /// Objective at a finite-difference probe point. Defaults to
    /// [`objective`](Self::objective); override to keep probes out of an
    /// iteration log.
    fn probe(&mut self, x: &[f64]) -> Result<f64, Interrupted> {
        self.objective(x)
    }

    /// Inequality constraints in the form `out[i] = g_i(x) ≥ 0`.
    fn constraints(&mut self, x: &[f64], out: &mut [f64]) -> Result<(), Interrupted>;

    /// Number of inequality constraints.
    fn constraint_count(&self) -> usize;
}

#[derive(Debug, Clone, Copy)]
pub struct SlsqpOptions {
    /// Major-iteration budget.
    pub max_iterations: u64,
    /// Convergence tolerance on the relative objective change (`ftol`).
    pub tolerance: f64,
}

/// Exit condition of a minimize run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlsqpStatus {
    Converged,
    IncompatibleConstraints,
    LineSearchFailure,
    IterationLimit,
    NonFiniteEvaluation,
}

impl SlsqpStatus {
    /// SLSQP-compatible status code.
    pub fn code(self) -> i32 {
        match self {
            SlsqpStatus::Converged => 0,
            SlsqpStatus::IncompatibleConstraints => 4,
            SlsqpStatus::LineSearchFailure => 8,
            SlsqpStatus::IterationLimit => 9,
            SlsqpStatus::NonFiniteEvaluation => 10,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            SlsqpStatus::Converged => "Optimization terminated successfully",
            SlsqpStatus::IncompatibleConstraints => "Inequality constraints incompatible",
            SlsqpStatus::LineSearchFailure => "Positive directional derivative for linesearch",
            SlsqpStatus::IterationLimit => "Iteration limit reached",
            SlsqpStatus::NonFiniteEvaluation => "Non-finite value encountered during evaluation",
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, SlsqpStatus::Converged)
    }
}

#[derive(Debug, Clone)]
pub struct SlsqpSolution {
    /// Final iterate (always within bounds).
    pub x: Vec<f64>,
    /// Objective at the final iterate, sign convention untouched.
    pub objective: f64,
    pub status: SlsqpStatus,
    /// Major iterations (`nit`).
    pub major_iterations: u64,
    /// Objective evaluations including finite-difference probes (`nfev`).
    pub objective_evaluations: u64,
    /// Gradient evaluations (`njev`).
    pub gradient_evaluations: u64,
}

struct PendingUpdate {
    step: Vec<f64>,
    grad_lagrangian: Vec<f64>,
    lambda: Vec<f64>,
}

/// Minimizes `problem` over the box `[lower, upper]` starting at `x0`.
///
/// Never panics on numeric degeneracy: non-finite evaluations and failed
/// subproblems surface through [`SlsqpStatus`]. `Err(Interrupted)` propagates
/// a cooperative cancellation raised by the callbacks.
pub fn minimize(
    problem: &mut dyn SlsqpProblem,
    lower: &[f64],
    upper: &[f64],
    x0: &[f64],
    options: &SlsqpOptions,
) -> Result<SlsqpSolution, Interrupted> {
    let n = x0.len();
    let m = problem.constraint_count();
    debug_assert_eq!(lower.len(), n);
    debug_assert_eq!(upper.len(), n);

    let feas_tol = options.tolerance.max(1e-8);

    let mut x: Vec<f64> = x0
        .iter()
        .zip(lower.iter().zip(upper))
        .map(|(&v, (&lo, &hi))| v.clamp(lo, hi))
        .collect();

    let mut nfev = 0u64;
    let mut njev = 0u64;
    let mut nit = 0u64;

    nfev += 1;
    let mut f = problem.objective(&x)?;
    let mut c = vec![0.0; m];
    problem.constraints(&x, &mut c)?;

    if !f.is_finite() || !all_finite(&c) {
        return Ok(SlsqpSolution {
            x,
            objective: f,
            status: SlsqpStatus::NonFiniteEvaluation,
            major_iterations: 0,
            objective_evaluations: nfev,
            gradient_evaluations: 0,
        });
    }

    let mut hessian = identity(n);
    let mut rho = 1.0f64;
    let mut pending: Option<PendingUpdate> = None;
    let mut status = SlsqpStatus::IterationLimit;

    while nit < options.max_iterations {
        nit += 1;

        let grad = fd_gradient(problem, &x, f, &mut nfev)?;
        njev += 1;
        let jac = fd_jacobian(problem, &x, &c)?;
        if !all_finite(&grad) || jac.iter().any(|row| !all_finite(row)) {
            status = SlsqpStatus::NonFiniteEvaluation;
            break;
        }

        // Deferred BFGS update: needs the gradient at the new iterate, so it
        // runs at the top of the following major iteration.
        if let Some(pend) = pending.take() {
            let mut gl_new = grad.clone();
            for (i, row) in jac.iter().enumerate() {
                for j in 0..n {
                    gl_new[j] -= pend.lambda[i] * row[j];
                }
            }
            let y: Vec<f64> = gl_new
                .iter()
                .zip(&pend.grad_lagrangian)
                .map(|(a, b)| a - b)
                .collect();
            bfgs_update(&mut hessian, &pend.step, &y);
        }

        let (direction, lambda) = match solve_subproblem(&hessian, &grad, &jac, &c, &x, lower, upper)
        {
            Some(pair) => pair,
            None => {
                status = SlsqpStatus::LineSearchFailure;
                break;
            }
        };

        if norm_inf(&direction) < 1e-12 {
            status = if max_violation(&c) <= feas_tol {
                SlsqpStatus::Converged
            } else {
                SlsqpStatus::IncompatibleConstraints
            };
            break;
        }

        // Optimality test on the predicted decrease. Near a feasible optimum
        // the directional derivative shrinks below anything a line search
        // could verify against finite-difference noise, so accept
        // convergence here rather than fail the search.
        let predicted_decrease = -qp::dot(&grad, &direction);
        if predicted_decrease <= options.tolerance * (1.0 + f.abs())
            && max_violation(&c) <= feas_tol
        {
            status = SlsqpStatus::Converged;
            break;
        }

        // l1 merit line search. The penalty must dominate the multipliers for
        // the direction to be a descent direction of the merit function.
        let lambda_max = lambda.iter().fold(0.0f64, |acc, &l| acc.max(l));
        rho = rho.max(2.0 * lambda_max + 1.0);
        let viol0 = l1_violation(&c);
        let phi0 = f + rho * viol0;
        let descent = qp::dot(&grad, &direction) - rho * viol0;

        let mut accepted = None;
        let mut alpha = 1.0f64;
        for _ in 0..MAX_BACKTRACKS {
            let trial: Vec<f64> = x
                .iter()
                .zip(&direction)
                .zip(lower.iter().zip(upper))
                .map(|((&xi, &di), (&lo, &hi))| (xi + alpha * di).clamp(lo, hi))
                .collect();
            nfev += 1;
            let f_trial = problem.objective(&trial)?;
            let mut c_trial = vec![0.0; m];
            problem.constraints(&trial, &mut c_trial)?;

            if f_trial.is_finite() && all_finite(&c_trial) {
                let phi_trial = f_trial + rho * l1_violation(&c_trial);
                if phi_trial <= phi0 + ARMIJO_C * alpha * descent.min(0.0) {
                    accepted = Some((trial, f_trial, c_trial));
                    break;
                }
            }
            alpha *= 0.5;
        }

        let Some((x_new, f_new, c_new)) = accepted else {
            status = if max_violation(&c) <= feas_tol {
                SlsqpStatus::LineSearchFailure
            } else {
                SlsqpStatus::IncompatibleConstraints
            };
            break;
        };

        let step: Vec<f64> = x_new.iter().zip(&x).map(|(a, b)| a - b).collect();
        let mut grad_lagrangian = grad.clone();
        for (i, row) in jac.iter().enumerate() {
            for j in 0..n {
                grad_lagrangian[j] -= lambda[i] * row[j];
            }
        }
        pending = Some(PendingUpdate {
            step,
            grad_lagrangian,
            lambda,
        });

        let objective_change = (f - f_new).abs();
        x = x_new;
        f = f_new;
        c = c_new;

        if objective_change <= options.tolerance * (1.0 + f.abs())
            && max_violation(&c) <= feas_tol
        {
            status = SlsqpStatus::Converged;
            break;
        }
    }

    Ok(SlsqpSolution {
        x,
        objective: f,
        status,
        major_iterations: nit,
        objective_evaluations: nfev,
        gradient_evaluations: njev,
    })
}

/// Builds and solves the elastic QP subproblem. Returns the direction over
/// the design variables and one multiplier per nonlinear constraint, or
/// `None` when the direction is unusable.
fn solve_subproblem(
    hessian: &[Vec<f64>],
    grad: &[f64],
    jac: &[Vec<f64>],
    c: &[f64],
    x: &[f64],
    lower: &[f64],
    upper: &[f64],
) -> Option<(Vec<f64>, Vec<f64>)> {
    let n = x.len();
    let m = c.len();
    let nz = n + m;

    let mut h = vec![vec![0.0; nz]; nz];
    for i in 0..n {
        h[i][..n].copy_from_slice(&hessian[i][..n]);
    }
    for i in 0..m {
        h[n + i][n + i] = SLACK_CURVATURE;
    }

    let elastic_weight = ELASTIC_FACTOR * (1.0 + norm_inf(grad));
    let mut q = vec![0.0; nz];
    q[..n].copy_from_slice(grad);
    for i in 0..m {
        q[n + i] = elastic_weight;
    }

    // Rows: linearized constraints with elastic slack, slack positivity, and
    // the box bounds on the step.
    let mut rows = Vec::with_capacity(2 * m + 2 * n);
    let mut rhs = Vec::with_capacity(2 * m + 2 * n);
    for i in 0..m {
        let mut row = vec![0.0; nz];
        row[..n].copy_from_slice(&jac[i][..n]);
        row[n + i] = 1.0;
        rows.push(row);
        rhs.push(-c[i]);
    }
    for i in 0..m {
        let mut row = vec![0.0; nz];
        row[n + i] = 1.0;
        rows.push(row);
        rhs.push(0.0);
    }
    for j in 0..n {
        let mut row = vec![0.0; nz];
        row[j] = 1.0;
        rows.push(row);
        rhs.push(lower[j] - x[j]);

        let mut row = vec![0.0; nz];
        row[j] = -1.0;
        rows.push(row);
        rhs.push(x[j] - upper[j]);
    }

    let mut z0 = vec![0.0; nz];
    for i in 0..m {
        z0[n + i] = (-c[i]).max(0.0);
    }

    let qp_solution = qp::solve(&h, &q, &rows, &rhs, z0, 25 * (rows.len() + 1));
    if !qp_solution.converged {
        log::debug!("QP subproblem hit its iteration cap; continuing with its best iterate");
    }

    let direction = qp_solution.z[..n].to_vec();
    if !all_finite(&direction) {
        return None;
    }
    let lambda = qp_solution.multipliers[..m].to_vec();
    Some((direction, lambda))
}

fn fd_gradient(
    problem: &mut dyn SlsqpProblem,
    x: &[f64],
    f0: f64,
    nfev: &mut u64,
) -> Result<Vec<f64>, Interrupted> {
    let mut grad = vec![0.0; x.len()];
    let mut probe = x.to_vec();
    for i in 0..x.len() {
        probe[i] = x[i] + FD_STEP;
        *nfev += 1;
        let f_probe = problem.probe(&probe)?;
        grad[i] = (f_probe - f0) / FD_STEP;
        probe[i] = x[i];
    }
    Ok(grad)
}

fn fd_jacobian(
    problem: &mut dyn SlsqpProblem,
    x: &[f64],
    c0: &[f64],
) -> Result<Vec<Vec<f64>>, Interrupted> {
    let m = c0.len();
    let mut jac = vec![vec![0.0; x.len()]; m];
    let mut probe = x.to_vec();
    let mut c_probe = vec![0.0; m];
    for j in 0..x.len() {
        probe[j] = x[j] + FD_STEP;
        problem.constraints(&probe, &mut c_probe)?;
        for i in 0..m {
            jac[i][j] = (c_probe[i] - c0[i]) / FD_STEP;
        }
        probe[j] = x[j];
    }
    Ok(jac)
}

/// Damped BFGS update (Powell's modification) keeping the approximation
/// positive definite.
fn bfgs_update(b: &mut [Vec<f64>], s: &[f64], y: &[f64]) {
    let n = s.len();
    let bs: Vec<f64> = (0..n).map(|i| qp::dot(&b[i], s)).collect();
    let sbs = qp::dot(s, &bs);
    let sy = qp::dot(s, y);
    if sbs <= 1e-12 || !sbs.is_finite() || !sy.is_finite() {
        return;
    }
    let theta = if sy < 0.2 * sbs {
        0.8 * sbs / (sbs - sy)
    } else {
        1.0
    };
    let r: Vec<f64> = (0..n).map(|i| theta * y[i] + (1.0 - theta) * bs[i]).collect();
    let sr = qp::dot(s, &r);
    if sr <= 1e-12 {
        return;
    }
    for i in 0..n {
        for j in 0..n {
            b[i][j] += r[i] * r[j] / sr - bs[i] * bs[j] / sbs;
        }
    }
}

fn identity(n: usize) -> Vec<Vec<f64>> {
    let mut m = vec![vec![0.0; n]; n];
    for (i, row) in m.iter_mut().enumerate() {
        row[i] = 1.0;
    }
    m
}

fn all_finite(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}

fn norm_inf(values: &[f64]) -> f64 {
    values.iter().fold(0.0f64, |acc, v| acc.max(v.abs()))
}

/// Worst single-constraint violation, `max_i max(0, -g_i)`.
fn max_violation(c: &[f64]) -> f64 {
    c.iter().fold(0.0f64, |acc, &v| acc.max(-v))
}

/// Total violation used by the l1 merit function.
fn l1_violation(c: &[f64]) -> f64 {
    c.iter().map(|&v| (-v).max(0.0)).sum()
}
