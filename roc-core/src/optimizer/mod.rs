//! Optimization driver: wires the physics model into the SLSQP core.
//!
//! The driver owns everything SLSQP must not know about: the design-variable
//! coordinate order, the objective sign convention, constraint limits,
//! iteration capture, progress reporting, and cooperative cancellation. The
//! solver sees only callbacks.

pub(crate) mod qp;
pub mod slsqp;

use crate::error::SolveError;
use crate::job::CancelToken;
use crate::models::{
    ConstraintLimits, ConvergenceInfo, IterationRecord, Objective, OptimizationRequest,
    OptimizationResult, PerformanceMetrics, ProgressCallback, ProgressUpdate,
};
use crate::physics::{DesignValues, PhysicsModel};
use crate::validation::ResolvedProblem;
use chrono::Utc;
use indexmap::IndexMap;
use log::{debug, info};
use slsqp::{Interrupted, SlsqpOptions, SlsqpProblem, SlsqpStatus};
use std::time::Instant;

/// Per-run optimization driver. Construct one per job; it carries the
/// iteration buffer and the running-best counter and is not re-entrant.
pub struct Optimizer<'a> {
    physics: PhysicsModel,
    problem: ResolvedProblem,
    objective: Objective,
    limits: ConstraintLimits,
    max_iterations: u64,
    tolerance: f64,
    progress: Option<&'a ProgressCallback>,
    cancel: CancelToken,
}

/// Outcome of one driver run: the result artifact plus every captured
/// iteration, in evaluation order.
pub struct OptimizerRun {
    pub result: OptimizationResult,
    pub iterations: Vec<IterationRecord>,
}

impl<'a> Optimizer<'a> {
    pub fn new(
        physics: PhysicsModel,
        problem: ResolvedProblem,
        request: &OptimizationRequest,
        progress: Option<&'a ProgressCallback>,
        cancel: CancelToken,
    ) -> Self {
        Optimizer {
            physics,
            problem,
            objective: request.objective,
            limits: request.constraints,
            max_iterations: request.max_iterations,
            tolerance: request.tolerance,
            progress,
            cancel,
        }
    }

    /// Runs SLSQP to completion and compiles the result artifact.
    ///
    /// # Errors
    ///
    /// [`SolveError::Cancelled`] when the cancellation token is observed
    /// inside the objective; [`SolveError::Optimization`] when the solver
    /// leaves the search at a non-finite point. An infeasible-but-completed
    /// run is returned as `Ok` with `success = false`.
    pub fn run(self) -> Result<OptimizerRun, SolveError> {
        info!(
            "starting SLSQP optimization: {} variable(s), objective {:?}",
            self.problem.variable_order.len(),
            self.objective
        );

        let options = SlsqpOptions {
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
        };

        let mut context = EvalContext {
            physics: &self.physics,
            order: &self.problem.variable_order,
            objective: self.objective,
            limits: &self.limits,
            max_iterations: self.max_iterations,
            progress: self.progress,
            cancel: &self.cancel,
            started: Instant::now(),
            records: Vec::new(),
            best_objective: f64::INFINITY,
        };

        let outcome = slsqp::minimize(
            &mut context,
            &self.problem.lower,
            &self.problem.upper,
            &self.problem.initial,
            &options,
        );
        let records = context.records;

        let solution = match outcome {
            Ok(solution) => solution,
            Err(Interrupted) => return Err(SolveError::Cancelled),
        };
        if !solution.x.iter().all(|v| v.is_finite()) {
            return Err(SolveError::Optimization {
                stage: "solver",
                message: "search produced a non-finite design point".to_string(),
            });
        }

        // The solver may return a point whose metrics are not in the last
        // captured iteration; re-evaluate at exactly the returned vector.
        let final_values = resolve_values(&self.problem.variable_order, &solution.x);
        let final_metrics = self.physics.evaluate(&final_values);

        let violations = constraint_violations(&final_metrics, &self.limits);
        let constraints_satisfied = violations.is_empty();
        let success = solution.status.is_success() && constraints_satisfied;

        let message = if solution.status.is_success() {
            solution.status.message().to_string()
        } else {
            format!("Optimization failed: {}", solution.status.message())
        };

        let (baseline_metrics, improvement_percentages) = match self.problem.baseline {
            Some(baseline_values) => {
                let baseline = self.physics.evaluate(&baseline_values);
                (Some(baseline), improvements(&baseline, &final_metrics))
            }
            None => (None, IndexMap::new()),
        };

        info!(
            "optimization completed: success={}, status={}, iterations={}, final_obj={:.6e}",
            success,
            solution.status.code(),
            records.len(),
            solution.objective
        );

        let result = OptimizationResult {
            success,
            message,
            iterations: records.len() as u64,
            final_objective_value: solution.objective,
            optimized_design_vars: final_values.to_map(),
            final_metrics,
            convergence_info: ConvergenceInfo {
                converged: solution.status.is_success(),
                status: solution.status.code(),
                nfev: solution.objective_evaluations,
                njev: solution.gradient_evaluations,
                nit: solution.major_iterations,
            },
            constraints_satisfied,
            constraint_violations: violations,
            baseline_metrics,
            improvement_percentages,
        };

        Ok(OptimizerRun {
            result,
            iterations: records,
        })
    }
}

/// Objective value under the solver's minimization sign convention.
fn signed_objective(objective: Objective, metrics: &PerformanceMetrics) -> f64 {
    match objective {
        // All three reduce to maximizing recovered heat.
        Objective::MaximizeEfficiency
        | Objective::MinimizeFuelConsumption
        | Objective::MinimizeCo2Emissions => -metrics.thermal_efficiency,
        Objective::MinimizePressureDrop => metrics.pressure_drop_pa,
    }
}

/// Dense design values for a parameter vector in the frozen coordinate order.
fn resolve_values(order: &[String], x: &[f64]) -> DesignValues {
    let mut values = DesignValues::default();
    for (name, &value) in order.iter().zip(x) {
        values.set(name, value);
    }
    values
}

/// Violated limit name → violation magnitude, recomputed independently of the
/// solver's own bookkeeping.
fn constraint_violations(
    metrics: &PerformanceMetrics,
    limits: &ConstraintLimits,
) -> IndexMap<String, f64> {
    let mut violations = IndexMap::new();
    if metrics.pressure_drop_pa > limits.max_pressure_drop_pa {
        violations.insert(
            "pressure_drop".to_string(),
            metrics.pressure_drop_pa - limits.max_pressure_drop_pa,
        );
    }
    if metrics.thermal_efficiency < limits.min_thermal_efficiency {
        violations.insert(
            "thermal_efficiency".to_string(),
            limits.min_thermal_efficiency - metrics.thermal_efficiency,
        );
    }
    if metrics.heat_transfer_coefficient_w_m2k < limits.min_heat_transfer_coefficient {
        violations.insert(
            "heat_transfer_coefficient".to_string(),
            limits.min_heat_transfer_coefficient - metrics.heat_transfer_coefficient_w_m2k,
        );
    }
    violations
}

fn improvements(
    baseline: &PerformanceMetrics,
    final_metrics: &PerformanceMetrics,
) -> IndexMap<String, f64> {
    let mut improvement = IndexMap::new();
    if baseline.thermal_efficiency > 0.0 {
        improvement.insert(
            "thermal_efficiency".to_string(),
            (final_metrics.thermal_efficiency - baseline.thermal_efficiency)
                / baseline.thermal_efficiency
                * 100.0,
        );
    }
    if baseline.pressure_drop_pa > 0.0 {
        improvement.insert(
            "pressure_drop".to_string(),
            (baseline.pressure_drop_pa - final_metrics.pressure_drop_pa)
                / baseline.pressure_drop_pa
                * 100.0,
        );
    }
    improvement
}

/// Callback adapter between the physics model and the SLSQP core.
struct EvalContext<'a> {
    physics: &'a PhysicsModel,
    order: &'a [String],
    objective: Objective,
    limits: &'a ConstraintLimits,
    max_iterations: u64,
    progress: Option<&'a ProgressCallback>,
    cancel: &'a CancelToken,
    started: Instant,
    records: Vec<IterationRecord>,
    best_objective: f64,
}

impl EvalContext<'_> {
    fn evaluate(&self, x: &[f64]) -> (DesignValues, PerformanceMetrics) {
        let values = resolve_values(self.order, x);
        let metrics = self.physics.evaluate(&values);
        (values, metrics)
    }

    fn feasible(&self, metrics: &PerformanceMetrics) -> bool {
        constraint_violations(metrics, self.limits).is_empty()
    }
}

impl SlsqpProblem for EvalContext<'_> {
    fn objective(&mut self, x: &[f64]) -> Result<f64, Interrupted> {
        if self.cancel.is_cancelled() {
            return Err(Interrupted);
        }
        let (values, metrics) = self.evaluate(x);
        let objective_value = signed_objective(self.objective, &metrics);

        let index = self.records.len() as u64 + 1;
        let is_improvement = objective_value < self.best_objective;
        if is_improvement {
            self.best_objective = objective_value;
        }
        let record = IterationRecord {
            index,
            design_vars: values.to_map(),
            objective_value,
            metrics,
            feasible: self.feasible(&metrics),
            is_improvement,
        };
        debug!(
            "iteration {index}: obj={objective_value:.6e}, eta={:.4}, feasible={}",
            metrics.thermal_efficiency, record.feasible
        );
        self.records.push(record.clone());

        if let Some(callback) = self.progress {
            let elapsed = self.started.elapsed().as_secs_f64();
            let remaining =
                elapsed * self.max_iterations.saturating_sub(index) as f64 / index as f64;
            let estimated_completion_at = chrono::Duration::try_milliseconds(
                (remaining * 1000.0) as i64,
            )
            .map(|d| Utc::now() + d);
            let update = ProgressUpdate {
                max_iterations: self.max_iterations,
                progress_percentage: (100.0 * index as f64 / self.max_iterations as f64)
                    .min(100.0),
                elapsed_seconds: elapsed,
                estimated_completion_at,
                record,
            };
            // The callback runs on the solver stack: it must stay cheap, and
            // its only control channel back is the cancellation request.
            if !callback(&update) {
                self.cancel.cancel();
            }
        }

        Ok(objective_value)
    }

    fn probe(&mut self, x: &[f64]) -> Result<f64, Interrupted> {
        if self.cancel.is_cancelled() {
            return Err(Interrupted);
        }
        let (_, metrics) = self.evaluate(x);
        Ok(signed_objective(self.objective, &metrics))
    }

    fn constraints(&mut self, x: &[f64], out: &mut [f64]) -> Result<(), Interrupted> {
        let (_, metrics) = self.evaluate(x);
        out[0] = self.limits.max_pressure_drop_pa - metrics.pressure_drop_pa;
        out[1] = metrics.thermal_efficiency - self.limits.min_thermal_efficiency;
        out[2] = metrics.heat_transfer_coefficient_w_m2k - self.limits.min_heat_transfer_coefficient;
        Ok(())
    }

    fn constraint_count(&self) -> usize {
        3
    }
}

/// Quick solvency probe for health reporting: minimizes a trivial parabola
/// and checks the solver lands on the analytic optimum.
pub fn self_check() -> bool {
    struct Parabola;
    impl SlsqpProblem for Parabola {
        fn objective(&mut self, x: &[f64]) -> Result<f64, Interrupted> {
            Ok((x[0] - 3.0) * (x[0] - 3.0))
        }
        fn constraints(&mut self, _x: &[f64], _out: &mut [f64]) -> Result<(), Interrupted> {
            Ok(())
        }
        fn constraint_count(&self) -> usize {
            0
        }
    }

    let options = SlsqpOptions {
        max_iterations: 50,
        tolerance: 1e-10,
    };
    match slsqp::minimize(&mut Parabola, &[0.0], &[10.0], &[8.0], &options) {
        Ok(solution) => {
            solution.status == SlsqpStatus::Converged && (solution.x[0] - 3.0).abs() < 1e-3
        }
        Err(Interrupted) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_convention_is_exhaustive_over_objectives() {
        let physics = PhysicsModel::new(Default::default());
        let metrics = physics.evaluate(&DesignValues::default());
        for objective in [
            Objective::MaximizeEfficiency,
            Objective::MinimizeFuelConsumption,
            Objective::MinimizeCo2Emissions,
        ] {
            assert_eq!(
                signed_objective(objective, &metrics),
                -metrics.thermal_efficiency
            );
        }
        assert_eq!(
            signed_objective(Objective::MinimizePressureDrop, &metrics),
            metrics.pressure_drop_pa
        );
    }

    #[test]
    fn violations_use_the_source_metric_names() {
        let physics = PhysicsModel::new(Default::default());
        let metrics = physics.evaluate(&DesignValues::default());
        let strict = ConstraintLimits {
            max_pressure_drop_pa: 0.0,
            min_thermal_efficiency: 1.0,
            min_heat_transfer_coefficient: 1e6,
        };
        let violations = constraint_violations(&metrics, &strict);
        let keys: Vec<&str> = violations.keys().map(|k| k.as_str()).collect();
        assert_eq!(
            keys,
            ["pressure_drop", "thermal_efficiency", "heat_transfer_coefficient"]
        );
        assert!(violations.values().all(|&v| v > 0.0));

        let slack = ConstraintLimits {
            max_pressure_drop_pa: f64::INFINITY,
            min_thermal_efficiency: 0.0,
            min_heat_transfer_coefficient: 0.0,
        };
        assert!(constraint_violations(&metrics, &slack).is_empty());
    }

    #[test]
    fn self_check_passes() {
        assert!(self_check());
    }
}
