//! # roc-core: Regenerator Optimization Core
//!
//! A steady-state thermal model of an industrial glass-furnace regenerator
//! coupled to an SLSQP constrained optimizer and a single-run job lifecycle.
//! Given a regenerator configuration and a set of design variables with box
//! bounds, the core searches for the design that maximizes heat-recovery
//! efficiency (or minimizes pressure drop) subject to engineering limits on
//! pressure drop, efficiency, and the heat-transfer coefficient.
//!
//! The crate is transport-agnostic: requests come in as plain data, results
//! and progress leave through return values and sink traits. The CLI and
//! HTTP hosts in this workspace are thin shells over [`run_optimization`] and
//! [`job::JobRunner`].
//!
//! ## Quick example
//!
//! ```no_run
//! use roc_core::models::*;
//! use roc_core::run_optimization;
//! use indexmap::IndexMap;
//!
//! let mut design_variables = IndexMap::new();
//! for name in ["checker_height", "checker_spacing", "wall_thickness"] {
//!     design_variables.insert(name.to_string(), DesignVariableSpec::default());
//! }
//!
//! let request = OptimizationRequest {
//!     configuration: RegeneratorConfiguration::default(),
//!     design_variables,
//!     constraints: ConstraintLimits::default(),
//!     objective: Objective::MaximizeEfficiency,
//!     algorithm: "SLSQP".to_string(),
//!     max_iterations: 100,
//!     tolerance: 1e-6,
//! };
//!
//! let result = run_optimization(&request)?;
//! println!(
//!     "success={} efficiency={:.3} over {} iterations",
//!     result.success, result.final_metrics.thermal_efficiency, result.iterations
//! );
//! # Ok::<(), roc_core::SolveError>(())
//! ```
//!
//! ## Structure
//!
//! - [`models`] — wire-level value records (request, metrics, result, job)
//! - [`physics`] — the pure correlation-based regenerator model
//! - [`optimizer`] — the SLSQP driver and its dense numerics
//! - [`job`] — state machine, runner, sinks, cancellation
//! - [`validation`] — request checking and bounds/initial-point resolution

mod error;
pub mod job;
pub mod models;
pub mod optimizer;
pub mod physics;
pub mod validation;

pub use error::SolveError;

use job::CancelToken;
use models::{OptimizationRequest, OptimizationResult, ProgressCallback};
use optimizer::Optimizer;
use physics::PhysicsModel;

/// Runs one optimization without progress reporting or cancellation.
///
/// This is the main library entry point for hosts that only need the final
/// artifact. Job-tracking hosts should use [`job::JobRunner`] instead.
///
/// # Errors
///
/// [`SolveError::Validation`] for malformed requests and
/// [`SolveError::Optimization`] for solver-level failures. An infeasible but
/// mathematically completed run is `Ok` with `success = false`.
pub fn run_optimization(request: &OptimizationRequest) -> Result<OptimizationResult, SolveError> {
    run_optimization_with_progress(request, None, CancelToken::new())
}

/// Runs one optimization with an optional progress callback and a
/// cancellation token.
///
/// The callback is invoked synchronously after every logged objective
/// evaluation; returning `false` from it requests cancellation, as does
/// cancelling the token from another thread. A cancelled run returns
/// [`SolveError::Cancelled`].
pub fn run_optimization_with_progress(
    request: &OptimizationRequest,
    progress: Option<&ProgressCallback>,
    cancel: CancelToken,
) -> Result<OptimizationResult, SolveError> {
    let resolved = validation::validate_request(request)?;
    let physics = PhysicsModel::new(request.configuration.clone());
    let optimizer = Optimizer::new(physics, resolved, request, progress, cancel);
    optimizer.run().map(|run| run.result)
}
