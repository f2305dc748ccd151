//! Data models and types for the optimization core API.
//!
//! This module contains the public data structures used to describe a
//! regenerator, configure an optimization run, and receive results. Every type
//! is serializable (JSON) so the core can sit behind a CLI, an HTTP service,
//! or a task queue without translation layers. All numeric fields are native
//! Rust scalars; nothing foreign ever crosses a boundary.
//!
//! The design-variable mapping is an [`IndexMap`] on purpose: its insertion
//! order defines the coordinate order of the parameter vector handed to the
//! solver, and that order must survive serialization round-trips.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Static physical description of one regenerator.
///
/// Units are SI with temperatures in degrees Celsius. The configuration is
/// frozen for the duration of a run; only design variables move.
///
/// # Example
///
/// ```no_run
/// use roc_core::models::RegeneratorConfiguration;
///
/// let config = RegeneratorConfiguration {
///     length_m: 10.0,
///     width_m: 8.0,
///     gas_temp_inlet_c: 1600.0,
///     gas_temp_outlet_c: 600.0,
///     mass_flow_rate_kg_s: 50.0,
///     cycle_time_s: 1200.0,
/// };
/// assert!(config.gas_temp_inlet_c > config.gas_temp_outlet_c);
/// ```
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RegeneratorConfiguration {
    /// Regenerator length in meters
    #[serde(default = "default_length_m")]
    pub length_m: f64,
    /// Regenerator width in meters
    #[serde(default = "default_width_m")]
    pub width_m: f64,
    /// Inlet gas temperature in °C (must exceed the outlet temperature)
    #[serde(default = "default_gas_temp_inlet_c")]
    pub gas_temp_inlet_c: f64,
    /// Outlet gas temperature in °C
    #[serde(default = "default_gas_temp_outlet_c")]
    pub gas_temp_outlet_c: f64,
    /// Gas mass flow rate in kg/s
    #[serde(default = "default_mass_flow_rate_kg_s")]
    pub mass_flow_rate_kg_s: f64,
    /// Reversal cycle time in seconds. Accepted for completeness; the
    /// steady-state model does not integrate over the cycle.
    #[serde(default = "default_cycle_time_s")]
    pub cycle_time_s: f64,
}

fn default_length_m() -> f64 {
    10.0
}
fn default_width_m() -> f64 {
    8.0
}
fn default_gas_temp_inlet_c() -> f64 {
    1600.0
}
fn default_gas_temp_outlet_c() -> f64 {
    600.0
}
fn default_mass_flow_rate_kg_s() -> f64 {
    50.0
}
fn default_cycle_time_s() -> f64 {
    1200.0
}

impl Default for RegeneratorConfiguration {
    fn default() -> Self {
        RegeneratorConfiguration {
            length_m: default_length_m(),
            width_m: default_width_m(),
            gas_temp_inlet_c: default_gas_temp_inlet_c(),
            gas_temp_outlet_c: default_gas_temp_outlet_c(),
            mass_flow_rate_kg_s: default_mass_flow_rate_kg_s(),
            cycle_time_s: default_cycle_time_s(),
        }
    }
}

/// Box bounds for a single design variable.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct VariableBounds {
    /// Lower bound (must be strictly less than `max`)
    pub min: f64,
    /// Upper bound
    pub max: f64,
}

/// One optimizer input dimension.
///
/// The variable name is the key of the [`OptimizationRequest::design_variables`]
/// map, so this record only carries the per-variable tuning knobs. Everything
/// is optional: bounds fall back to the built-in table for recognized
/// variables, the initial value falls back to the bounds midpoint, and
/// `baseline` is used only for before/after reporting.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct DesignVariableSpec {
    /// Explicit bounds; `None` selects the default range for the variable
    #[serde(default)]
    pub bounds: Option<VariableBounds>,
    /// Starting value; `None` selects the bounds midpoint. Out-of-range
    /// values are clamped to the nearest bound with a warning.
    #[serde(default)]
    pub initial: Option<f64>,
    /// Reference value for improvement reporting; never seen by the solver
    #[serde(default)]
    pub baseline: Option<f64>,
}

/// Inequality limits applied during optimization.
///
/// All three are enforced as `g(x) >= 0` constraints in the solver and
/// re-checked independently at the returned point.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConstraintLimits {
    /// Maximum allowed pressure drop in Pa
    #[serde(default = "default_max_pressure_drop_pa")]
    pub max_pressure_drop_pa: f64,
    /// Minimum required thermal efficiency, unitless in [0, 1]
    #[serde(default = "default_min_thermal_efficiency")]
    pub min_thermal_efficiency: f64,
    /// Minimum required heat-transfer coefficient in W/(m²·K)
    #[serde(default = "default_min_heat_transfer_coefficient")]
    pub min_heat_transfer_coefficient: f64,
}

fn default_max_pressure_drop_pa() -> f64 {
    2000.0
}
fn default_min_thermal_efficiency() -> f64 {
    0.2
}
fn default_min_heat_transfer_coefficient() -> f64 {
    50.0
}

impl Default for ConstraintLimits {
    fn default() -> Self {
        ConstraintLimits {
            max_pressure_drop_pa: default_max_pressure_drop_pa(),
            min_thermal_efficiency: default_min_thermal_efficiency(),
            min_heat_transfer_coefficient: default_min_heat_transfer_coefficient(),
        }
    }
}

/// What the solver optimizes for.
///
/// A closed enumeration, matched exhaustively at the sign-convention step.
/// The first three all reduce to maximizing thermal efficiency inside this
/// core (fuel burn and CO₂ both scale with unrecovered heat); the fourth
/// minimizes pressure drop directly.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    /// Maximize heat-recovery efficiency (the default)
    #[default]
    MaximizeEfficiency,
    /// Minimize fuel consumption (equivalent to maximizing efficiency)
    MinimizeFuelConsumption,
    /// Minimize CO₂ emissions (equivalent to maximizing efficiency)
    MinimizeCo2Emissions,
    /// Minimize pressure drop across the checker pack
    MinimizePressureDrop,
}

/// Complete input for one optimization run.
///
/// # Example
///
/// ```no_run
/// use roc_core::models::*;
/// use indexmap::IndexMap;
///
/// let mut design_variables = IndexMap::new();
/// design_variables.insert(
///     "checker_height".to_string(),
///     DesignVariableSpec {
///         bounds: Some(VariableBounds { min: 0.3, max: 2.0 }),
///         ..Default::default()
///     },
/// );
/// design_variables.insert("checker_spacing".to_string(), DesignVariableSpec::default());
///
/// let request = OptimizationRequest {
///     configuration: RegeneratorConfiguration::default(),
///     design_variables,
///     constraints: ConstraintLimits::default(),
///     objective: Objective::MaximizeEfficiency,
///     algorithm: "SLSQP".to_string(),
///     max_iterations: 100,
///     tolerance: 1e-6,
/// };
///
/// let result = roc_core::run_optimization(&request)?;
/// println!("optimized: {:?}", result.optimized_design_vars);
/// # Ok::<(), roc_core::SolveError>(())
/// ```
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct OptimizationRequest {
    /// The regenerator being optimized
    #[serde(default)]
    pub configuration: RegeneratorConfiguration,
    /// Ordered map of design variables. Insertion order defines the solver's
    /// coordinate order and is preserved end-to-end.
    pub design_variables: IndexMap<String, DesignVariableSpec>,
    /// Inequality limits (defaults apply when omitted)
    #[serde(default)]
    pub constraints: ConstraintLimits,
    /// Optimization objective
    #[serde(default)]
    pub objective: Objective,
    /// Algorithm selector; the only accepted value is `"SLSQP"`
    /// (case-insensitive)
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    /// Maximum number of solver major iterations
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u64,
    /// Convergence tolerance handed to the solver as `ftol`
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

fn default_algorithm() -> String {
    "SLSQP".to_string()
}
fn default_max_iterations() -> u64 {
    100
}
fn default_tolerance() -> f64 {
    1e-6
}

/// Deterministic output of one physics evaluation.
///
/// `thermal_efficiency` is already clamped to [0, 1]; `effectiveness` is in
/// [0, 1) by construction. Everything else is non-negative for valid inputs.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, PartialEq)]
pub struct PerformanceMetrics {
    /// Net heat-recovery efficiency, clamped to [0, 1]
    pub thermal_efficiency: f64,
    /// Actual heat transferred to the checker pack in W
    pub heat_transfer_rate_w: f64,
    /// Pressure drop across the pack in Pa
    pub pressure_drop_pa: f64,
    /// Number of transfer units (dimensionless exchanger size)
    pub ntu: f64,
    /// Exchanger effectiveness, `ntu / (1 + ntu)`
    pub effectiveness: f64,
    /// Gas-side heat-transfer coefficient in W/(m²·K)
    pub heat_transfer_coefficient_w_m2k: f64,
    /// Total heat-transfer surface in m²
    pub surface_area_m2: f64,
    /// Conductive loss through the refractory walls in W
    pub wall_heat_loss_w: f64,
    /// Channel Reynolds number
    pub reynolds: f64,
    /// Nusselt number from the packed-bed correlation
    pub nusselt: f64,
}

/// One functional evaluation observed by the optimization driver.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq)]
pub struct IterationRecord {
    /// 1-based, strictly monotonic, gapless evaluation index
    pub index: u64,
    /// Dense design-variable snapshot (every model variable, resolved)
    pub design_vars: IndexMap<String, f64>,
    /// Raw objective value as seen by the solver (sign convention preserved)
    pub objective_value: f64,
    /// Full physics snapshot at this point
    pub metrics: PerformanceMetrics,
    /// Whether all constraint limits are satisfied at this point
    pub feasible: bool,
    /// Whether this objective value strictly improves on the running best
    pub is_improvement: bool,
}

/// Solver convergence bookkeeping, using the classic SLSQP exit-mode
/// numbering.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvergenceInfo {
    /// True iff the solver reached its own convergence criterion
    pub converged: bool,
    /// Exit status code (0 converged, 4 incompatible constraints, 8 line
    /// search failure, 9 iteration limit, 10 non-finite evaluation)
    pub status: i32,
    /// Objective evaluations, including finite-difference probes
    pub nfev: u64,
    /// Gradient evaluations
    pub njev: u64,
    /// Major iterations
    pub nit: u64,
}

/// Final artifact of one optimization run.
///
/// `success` is true only when the solver converged **and** every constraint
/// holds at the returned point; a mathematically completed but infeasible run
/// is reported with `success = false` and populated `constraint_violations`
/// rather than as an error.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone)]
pub struct OptimizationResult {
    /// Solver converged and all constraints are satisfied
    pub success: bool,
    /// Human-readable outcome description
    pub message: String,
    /// Number of logged objective evaluations (`iteration_log` length)
    pub iterations: u64,
    /// Raw solver objective at the returned point. For efficiency objectives
    /// this is `-thermal_efficiency`; the sign is part of the contract.
    pub final_objective_value: f64,
    /// Returned design point, dense over every model variable
    pub optimized_design_vars: IndexMap<String, f64>,
    /// Physics re-evaluated at the returned point
    pub final_metrics: PerformanceMetrics,
    /// Solver exit bookkeeping
    pub convergence_info: ConvergenceInfo,
    /// True iff `constraint_violations` is empty
    pub constraints_satisfied: bool,
    /// Violated limit name → violation magnitude; empty when feasible
    #[serde(default)]
    pub constraint_violations: IndexMap<String, f64>,
    /// Physics at the baseline point, when any variable carries a baseline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_metrics: Option<PerformanceMetrics>,
    /// Relative improvement vs. baseline in percent, keyed like the metrics
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub improvement_percentages: IndexMap<String, f64>,
}

/// Progress snapshot emitted after each logged objective evaluation.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone)]
pub struct ProgressUpdate {
    /// Iteration budget for this run
    pub max_iterations: u64,
    /// `min(100, 100 * iteration / max_iterations)`
    pub progress_percentage: f64,
    /// Seconds since the solver started
    pub elapsed_seconds: f64,
    /// Extrapolated completion time, available once iteration >= 1
    pub estimated_completion_at: Option<DateTime<Utc>>,
    /// The full iteration record behind this update
    pub record: IterationRecord,
}

/// Callback invoked from the solver stack after each logged evaluation.
///
/// The callback must be fast and must not panic. Returning `false` requests
/// cooperative cancellation, observed at the next objective evaluation; it is
/// equivalent to raising the run's [`CancelToken`](crate::job::CancelToken).
pub type ProgressCallback = Box<dyn Fn(&ProgressUpdate) -> bool + Send + Sync>;

/// Lifecycle state of a [`Job`].
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Initializing,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// The allowed transition set of the job state machine.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Initializing)
                | (Pending, Cancelled)
                | (Initializing, Running)
                | (Initializing, Failed)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Initializing => "initializing",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Lifecycle record around one optimization run.
///
/// Owned by a [`JobRunner`](crate::job::JobRunner) for the duration of the
/// run. `result` is present iff the job completed; the iteration log is
/// preserved on cancellation and failure.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock runtime in seconds, set on entering a terminal state
    pub runtime_s: Option<f64>,
    pub current_iteration: u64,
    /// Progress in [0, 100]
    pub progress_percentage: f64,
    pub estimated_completion_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub iteration_log: Vec<IterationRecord>,
    pub result: Option<OptimizationResult>,
    /// Best-effort resident memory at completion; omitted when the host
    /// environment does not expose it
    pub memory_usage_mb: Option<f64>,
    /// Best-effort CPU usage; omitted when unavailable
    pub cpu_usage_percentage: Option<f64>,
}
