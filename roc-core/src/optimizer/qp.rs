//! Dense primal active-set solver for the SQP quadratic subproblem.
//!
//! Solves `min ½ zᵀHz + qᵀz  s.t.  rows[i]·z ≥ rhs[i]` for a symmetric
//! positive-definite `H`, starting from a feasible point. Problem sizes here
//! are tiny (at most six design variables plus three elastic slacks), so the
//! working-set KKT systems are solved with plain partial-pivot elimination.

pub(crate) struct QpSolution {
    /// Final iterate.
    pub z: Vec<f64>,
    /// One multiplier per constraint row; zero for rows inactive at the
    /// solution. Non-negative when `converged` is true.
    pub multipliers: Vec<f64>,
    /// False when the iteration cap was hit or a working-set system went
    /// singular; `z` is still the best iterate found.
    pub converged: bool,
}

/// Primal active-set iteration (Nocedal & Wright, Algorithm 16.3).
///
/// `z0` must satisfy every row; the caller arranges this via elastic slacks.
pub(crate) fn solve(
    h: &[Vec<f64>],
    q: &[f64],
    rows: &[Vec<f64>],
    rhs: &[f64],
    z0: Vec<f64>,
    max_iterations: usize,
) -> QpSolution {
    let n = q.len();
    let mut z = z0;
    let mut active: Vec<usize> = Vec::new();
    let mut multipliers = vec![0.0; rows.len()];

    for _ in 0..max_iterations {
        let mw = active.len();

        let mut grad = q.to_vec();
        for i in 0..n {
            grad[i] += dot(&h[i], &z);
        }

        // KKT system for the current working set, treated as equalities:
        //   [ H  -Aᵀ ] [p]   [-grad]
        //   [ A    0 ] [λ] = [  0  ]
        let dim = n + mw;
        let mut kkt = vec![vec![0.0; dim]; dim];
        let mut kkt_rhs = vec![0.0; dim];
        for i in 0..n {
            kkt[i][..n].copy_from_slice(&h[i][..n]);
            kkt_rhs[i] = -grad[i];
        }
        for (k, &ci) in active.iter().enumerate() {
            for j in 0..n {
                kkt[j][n + k] = -rows[ci][j];
                kkt[n + k][j] = rows[ci][j];
            }
        }

        let Some(solution) = solve_dense(kkt, kkt_rhs) else {
            // Dependent working set; drop the most recent row and retry.
            if active.pop().is_some() {
                continue;
            }
            return QpSolution {
                z,
                multipliers,
                converged: false,
            };
        };
        let (p, lambda) = solution.split_at(n);

        if p.iter().all(|v| v.abs() < 1e-11) {
            // Stationary on the working set; optimal iff no multiplier wants
            // its constraint released.
            let mut worst: Option<(usize, f64)> = None;
            for (k, &l) in lambda.iter().enumerate() {
                if l < -1e-9 && worst.map_or(true, |(_, w)| l < w) {
                    worst = Some((k, l));
                }
            }
            match worst {
                None => {
                    for (k, &ci) in active.iter().enumerate() {
                        multipliers[ci] = lambda[k].max(0.0);
                    }
                    return QpSolution {
                        z,
                        multipliers,
                        converged: true,
                    };
                }
                Some((k, _)) => {
                    active.remove(k);
                }
            }
            continue;
        }

        // Step toward the working-set minimizer, stopping at the nearest
        // blocking constraint.
        let mut alpha = 1.0f64;
        let mut blocking = None;
        for (i, row) in rows.iter().enumerate() {
            if active.contains(&i) {
                continue;
            }
            let along = dot(row, p);
            if along < -1e-12 {
                let residual = (dot(row, &z) - rhs[i]).max(0.0);
                let step = residual / -along;
                if step < alpha {
                    alpha = step;
                    blocking = Some(i);
                }
            }
        }
        for i in 0..n {
            z[i] += alpha * p[i];
        }
        if let Some(b) = blocking {
            active.push(b);
        }
    }

    QpSolution {
        z,
        multipliers,
        converged: false,
    }
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Gaussian elimination with partial pivoting. Returns `None` on a pivot
/// below threshold (singular or near-singular system).
fn solve_dense(mut m: Vec<Vec<f64>>, mut r: Vec<f64>) -> Option<Vec<f64>> {
    let n = r.len();
    for col in 0..n {
        let mut pivot = col;
        let mut best = m[col][col].abs();
        for row in col + 1..n {
            let v = m[row][col].abs();
            if v > best {
                best = v;
                pivot = row;
            }
        }
        if best < 1e-12 {
            return None;
        }
        m.swap(col, pivot);
        r.swap(col, pivot);

        let pivot_row = m[col].clone();
        let diag = pivot_row[col];
        for row in col + 1..n {
            let factor = m[row][col] / diag;
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                m[row][k] -= factor * pivot_row[k];
            }
            r[row] -= factor * r[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut acc = r[row];
        for k in row + 1..n {
            acc -= m[row][k] * x[k];
        }
        x[row] = acc / m[row][row];
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(n: usize) -> Vec<Vec<f64>> {
        let mut h = vec![vec![0.0; n]; n];
        for (i, row) in h.iter_mut().enumerate() {
            row[i] = 1.0;
        }
        h
    }

    #[test]
    fn unconstrained_minimum() {
        let h = identity(2);
        let q = [-2.0, -4.0];
        let sol = solve(&h, &q, &[], &[], vec![0.0, 0.0], 50);
        assert!(sol.converged);
        assert!((sol.z[0] - 2.0).abs() < 1e-9);
        assert!((sol.z[1] - 4.0).abs() < 1e-9);
    }

    #[test]
    fn active_upper_bound_with_unit_multiplier() {
        // min ½z² - 3z s.t. z <= 2, encoded as -z >= -2. Optimum sits on the
        // bound with multiplier 1.
        let h = identity(1);
        let q = [-3.0];
        let rows = vec![vec![-1.0]];
        let rhs = [-2.0];
        let sol = solve(&h, &q, &rows, &rhs, vec![0.0], 50);
        assert!(sol.converged);
        assert!((sol.z[0] - 2.0).abs() < 1e-9);
        assert!((sol.multipliers[0] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn blocking_constraint_is_respected() {
        // min ½|z|² - 2z₁ - 4z₂ s.t. z₁ + z₂ <= 3 → (0.5, 2.5), λ = 1.5.
        let h = identity(2);
        let q = [-2.0, -4.0];
        let rows = vec![vec![-1.0, -1.0]];
        let rhs = [-3.0];
        let sol = solve(&h, &q, &rows, &rhs, vec![0.0, 0.0], 50);
        assert!(sol.converged);
        assert!((sol.z[0] - 0.5).abs() < 1e-9);
        assert!((sol.z[1] - 2.5).abs() < 1e-9);
        assert!((sol.multipliers[0] - 1.5).abs() < 1e-9);
    }

    #[test]
    fn inactive_constraints_keep_zero_multiplier() {
        let h = identity(2);
        let q = [-1.0, -1.0];
        let rows = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let rhs = [-10.0, -10.0];
        let sol = solve(&h, &q, &rows, &rhs, vec![0.0, 0.0], 50);
        assert!(sol.converged);
        assert!((sol.z[0] - 1.0).abs() < 1e-9);
        assert_eq!(sol.multipliers, vec![0.0, 0.0]);
    }
}
