//! End-to-end scenarios over the full request → job → result path.

mod common;

use common::{attainable_limits, request_for, GEOMETRY_VARS};
use roc_core::job::{
    CancelToken, JobRunner, MemoryProgressSink, MemoryResultSink, ProgressSink,
};
use roc_core::models::{
    ConstraintLimits, JobStatus, Objective, ProgressUpdate, VariableBounds,
};
use roc_core::physics::{DesignValues, PhysicsModel};
use roc_core::{run_optimization, SolveError};
use std::sync::Arc;
use uuid::Uuid;

fn runner_with_sinks() -> (JobRunner, Arc<MemoryProgressSink>, Arc<MemoryResultSink>) {
    let progress = Arc::new(MemoryProgressSink::new());
    let results = Arc::new(MemoryResultSink::new());
    let runner = JobRunner::new(progress.clone(), results.clone());
    (runner, progress, results)
}

#[test]
fn baseline_run_maximizes_efficiency_within_limits() {
    let request = request_for(
        &GEOMETRY_VARS,
        attainable_limits(),
        Objective::MaximizeEfficiency,
    );
    let (runner, progress, results) = runner_with_sinks();

    let job = runner.run(&request, CancelToken::new()).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.started_at.is_some());
    assert!(job.runtime_s.is_some());

    let result = job.result.as_ref().unwrap();
    assert!(result.success, "message: {}", result.message);
    assert!(result.convergence_info.converged);
    assert_eq!(result.convergence_info.status, 0);
    assert!(result.final_metrics.thermal_efficiency > 0.5);
    assert!(result.final_metrics.pressure_drop_pa < 2000.0);
    assert!(result.final_metrics.heat_transfer_coefficient_w_m2k > 10.0);
    assert!(result.constraints_satisfied);
    assert!(result.constraint_violations.is_empty());

    // Iteration accounting: the log holds only search-path evaluations, so
    // nfev (which includes finite-difference probes) dominates it.
    assert!(result.iterations >= 3, "iterations: {}", result.iterations);
    assert_eq!(result.iterations, job.iteration_log.len() as u64);
    assert!(result.convergence_info.nfev >= result.iterations);
    assert!(result.convergence_info.njev >= 1);

    // Gapless 1-based indices, first evaluation always an improvement.
    for (i, record) in job.iteration_log.iter().enumerate() {
        assert_eq!(record.index, i as u64 + 1);
    }
    assert!(job.iteration_log[0].is_improvement);

    // The progress channel saw every iteration, in order, and the result
    // sink committed exactly once.
    let snapshots = progress.snapshots();
    assert_eq!(snapshots.len(), job.iteration_log.len());
    for (i, snapshot) in snapshots.iter().enumerate() {
        assert_eq!(snapshot.record.index, i as u64 + 1);
        assert!(snapshot.progress_percentage <= 100.0);
    }
    let commits = results.commits();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].id, job.id);
}

#[test]
fn improvement_flags_track_the_running_best() {
    let request = request_for(
        &GEOMETRY_VARS,
        attainable_limits(),
        Objective::MaximizeEfficiency,
    );
    let (runner, _, _) = runner_with_sinks();
    let job = runner.run(&request, CancelToken::new()).unwrap();

    let mut best = f64::INFINITY;
    for record in &job.iteration_log {
        assert_eq!(record.is_improvement, record.objective_value < best);
        if record.objective_value < best {
            best = record.objective_value;
        }
    }
}

#[test]
fn default_htc_limit_is_reported_as_violation() {
    // The default minimum heat-transfer coefficient (50 W/(m²·K)) is not
    // attainable anywhere in the design box for the reference configuration;
    // the run must complete and report the violation instead of hiding it.
    let request = request_for(
        &GEOMETRY_VARS,
        ConstraintLimits::default(),
        Objective::MaximizeEfficiency,
    );
    let (runner, _, results) = runner_with_sinks();

    let job = runner.run(&request, CancelToken::new()).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(!job.iteration_log.is_empty());

    let result = job.result.as_ref().unwrap();
    assert!(!result.success);
    assert!(!result.constraints_satisfied);
    let violation = result
        .constraint_violations
        .get("heat_transfer_coefficient")
        .copied()
        .unwrap();
    assert!(violation > 0.0);

    // Infeasible-but-completed is still a committed result.
    assert_eq!(results.commits().len(), 1);
}

#[test]
fn unreachable_efficiency_limit_is_flagged_infeasible() {
    let mut request = request_for(
        &GEOMETRY_VARS,
        ConstraintLimits {
            min_thermal_efficiency: 0.99,
            ..attainable_limits()
        },
        Objective::MaximizeEfficiency,
    );
    request.max_iterations = 100;

    let result = run_optimization(&request).unwrap();
    assert!(!result.success);
    assert!(!result.constraints_satisfied);
    let violation = result
        .constraint_violations
        .get("thermal_efficiency")
        .copied()
        .unwrap();
    assert!(violation > 0.0);
    assert!(result.iterations >= 1);
}

#[test]
fn pressure_drop_objective_reduces_pressure_and_keeps_raw_sign() {
    let request = request_for(
        &GEOMETRY_VARS,
        attainable_limits(),
        Objective::MinimizePressureDrop,
    );

    // Pressure drop at the midpoint starting design.
    let physics = PhysicsModel::new(request.configuration.clone());
    let midpoint = DesignValues {
        checker_height: 1.15,
        checker_spacing: 0.175,
        wall_thickness: 0.5,
        ..DesignValues::default()
    };
    let initial_drop = physics.evaluate(&midpoint).pressure_drop_pa;

    let result = run_optimization(&request).unwrap();
    assert!(result.success, "message: {}", result.message);
    assert!(
        result.final_metrics.pressure_drop_pa < initial_drop,
        "final {} should beat initial {}",
        result.final_metrics.pressure_drop_pa,
        initial_drop
    );
    // Raw objective value carries no sign flip for pressure minimization.
    assert!(
        (result.final_objective_value - result.final_metrics.pressure_drop_pa).abs() < 1e-9
    );
}

#[test]
fn efficiency_objective_preserves_the_negated_sign() {
    let request = request_for(
        &GEOMETRY_VARS,
        attainable_limits(),
        Objective::MaximizeEfficiency,
    );
    let result = run_optimization(&request).unwrap();
    assert!(
        (result.final_objective_value + result.final_metrics.thermal_efficiency).abs() < 1e-9
    );
}

#[test]
fn subset_optimization_holds_other_variables_at_model_defaults() {
    let request = request_for(
        &["checker_spacing"],
        attainable_limits(),
        Objective::MaximizeEfficiency,
    );
    let result = run_optimization(&request).unwrap();

    let vars = &result.optimized_design_vars;
    assert_eq!(vars.len(), 6);
    assert_eq!(vars["checker_height"], 0.5);
    assert_eq!(vars["wall_thickness"], 0.3);
    assert_eq!(vars["thermal_conductivity"], 2.5);
    assert_eq!(vars["specific_heat"], 900.0);
    assert_eq!(vars["density"], 2300.0);

    let spacing = vars["checker_spacing"];
    assert!((0.05..=0.3).contains(&spacing));
    // Efficiency improves with tighter spacing, so the solver moves off the
    // midpoint start toward the lower bound.
    assert!(spacing < 0.175, "spacing: {spacing}");
}

/// Progress sink that raises the cancellation token once a given iteration
/// has been recorded.
struct CancelAfter {
    token: CancelToken,
    at: u64,
}

impl ProgressSink for CancelAfter {
    fn record(&self, _job_id: Uuid, update: &ProgressUpdate) {
        if update.record.index >= self.at {
            self.token.cancel();
        }
    }
}

#[test]
fn cooperative_cancellation_preserves_partial_log() {
    let request = request_for(
        &GEOMETRY_VARS,
        attainable_limits(),
        Objective::MaximizeEfficiency,
    );
    let token = CancelToken::new();
    let results = Arc::new(MemoryResultSink::new());
    let runner = JobRunner::new(
        Arc::new(CancelAfter {
            token: token.clone(),
            at: 3,
        }),
        results.clone(),
    );

    let job = runner.run(&request, token).unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.iteration_log.len(), 3);
    assert!(job.result.is_none());
    // No commit for cancelled jobs.
    assert!(results.commits().is_empty());
}

#[test]
fn cancellation_before_any_evaluation_leaves_empty_log() {
    let request = request_for(
        &GEOMETRY_VARS,
        attainable_limits(),
        Objective::MaximizeEfficiency,
    );
    let token = CancelToken::new();
    token.cancel();
    let (runner, _, results) = runner_with_sinks();

    let job = runner.run(&request, token).unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.iteration_log.is_empty());
    assert!(results.commits().is_empty());
}

#[test]
fn degenerate_bounds_fail_validation_naming_the_variable() {
    let mut request = request_for(
        &GEOMETRY_VARS,
        attainable_limits(),
        Objective::MaximizeEfficiency,
    );
    request.design_variables["checker_height"].bounds =
        Some(VariableBounds { min: 1.0, max: 1.0 });

    let (runner, progress, results) = runner_with_sinks();
    let err = runner.run(&request, CancelToken::new()).unwrap_err();
    match err {
        SolveError::Validation(message) => assert!(message.contains("checker_height")),
        other => panic!("expected validation error, got {other:?}"),
    }
    // The job never ran: no progress, no commit.
    assert!(progress.snapshots().is_empty());
    assert!(results.commits().is_empty());
}

#[test]
fn reruns_with_equal_inputs_produce_identical_iteration_logs() {
    let request = request_for(
        &GEOMETRY_VARS,
        attainable_limits(),
        Objective::MaximizeEfficiency,
    );
    let (runner_a, _, _) = runner_with_sinks();
    let (runner_b, _, _) = runner_with_sinks();

    let first = runner_a.run(&request, CancelToken::new()).unwrap();
    let second = runner_b.run(&request, CancelToken::new()).unwrap();
    assert_eq!(first.iteration_log, second.iteration_log);
    assert_eq!(
        first.result.as_ref().unwrap().optimized_design_vars,
        second.result.as_ref().unwrap().optimized_design_vars
    );
}

#[test]
fn baseline_values_produce_improvement_report() {
    let mut request = request_for(
        &GEOMETRY_VARS,
        attainable_limits(),
        Objective::MaximizeEfficiency,
    );
    request.design_variables["checker_height"].baseline = Some(0.7);

    let result = run_optimization(&request).unwrap();
    let baseline = result.baseline_metrics.unwrap();
    assert!(baseline.thermal_efficiency > 0.0);
    assert!(result.improvement_percentages.contains_key("thermal_efficiency"));
    assert!(result.improvement_percentages.contains_key("pressure_drop"));
}

#[test]
fn result_serializes_to_plain_json_numbers() {
    let request = request_for(
        &["checker_spacing"],
        attainable_limits(),
        Objective::MaximizeEfficiency,
    );
    let result = run_optimization(&request).unwrap();
    let value = serde_json::to_value(&result).unwrap();
    assert!(value["final_objective_value"].is_f64());
    assert!(value["iterations"].is_u64());
    assert!(value["final_metrics"]["thermal_efficiency"].is_f64());
    assert!(value["success"].is_boolean());
}
