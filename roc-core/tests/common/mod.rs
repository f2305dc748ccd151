//! Shared helpers for roc-core integration tests.

use indexmap::IndexMap;
use roc_core::models::{
    ConstraintLimits, DesignVariableSpec, Objective, OptimizationRequest,
    RegeneratorConfiguration,
};

/// The three geometry variables of the reference scenarios.
pub const GEOMETRY_VARS: [&str; 3] = ["checker_height", "checker_spacing", "wall_thickness"];

/// Constraint limits that are attainable for the reference configuration.
///
/// The model's heat-transfer coefficient tops out near 28 W/(m²·K) over the
/// default design box, so feasible-path scenarios use an explicit limit of 10
/// instead of the (unreachable) default of 50.
#[allow(dead_code)]
pub fn attainable_limits() -> ConstraintLimits {
    ConstraintLimits {
        max_pressure_drop_pa: 2000.0,
        min_thermal_efficiency: 0.2,
        min_heat_transfer_coefficient: 10.0,
    }
}

/// A request over the given variables with default bounds and midpoint
/// starts, against the reference configuration.
#[allow(dead_code)]
pub fn request_for(
    vars: &[&str],
    limits: ConstraintLimits,
    objective: Objective,
) -> OptimizationRequest {
    let mut design_variables = IndexMap::new();
    for name in vars {
        design_variables.insert(name.to_string(), DesignVariableSpec::default());
    }
    OptimizationRequest {
        configuration: RegeneratorConfiguration::default(),
        design_variables,
        constraints: limits,
        objective,
        algorithm: "SLSQP".to_string(),
        max_iterations: 100,
        tolerance: 1e-6,
    }
}
