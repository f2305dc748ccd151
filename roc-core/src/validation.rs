//! Request validation and problem resolution.
//!
//! Turns an [`OptimizationRequest`] into the frozen coordinate layout the
//! solver consumes: variable order, box bounds, and the initial point. All
//! rejection happens here, before a job leaves `Pending`.

use crate::error::SolveError;
use crate::models::OptimizationRequest;
use crate::physics::DesignValues;
use log::{info, warn};

/// Default bounds for the recognized design variables.
pub const DEFAULT_BOUNDS: [(&str, f64, f64); 6] = [
    ("checker_height", 0.3, 2.0),
    ("checker_spacing", 0.05, 0.3),
    ("wall_thickness", 0.2, 0.8),
    ("thermal_conductivity", 1.0, 5.0),
    ("specific_heat", 700.0, 1200.0),
    ("density", 1800.0, 2800.0),
];

/// Looks up the default bounds for a recognized variable name.
pub fn default_bounds_for(name: &str) -> Option<(f64, f64)> {
    DEFAULT_BOUNDS
        .iter()
        .find(|(n, _, _)| *n == name)
        .map(|&(_, lo, hi)| (lo, hi))
}

/// The frozen coordinate layout of one optimization problem.
///
/// `variable_order` is the request map's insertion order and is used for both
/// packing the parameter vector and unpacking the solver's result.
#[derive(Debug, Clone)]
pub struct ResolvedProblem {
    pub variable_order: Vec<String>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    pub initial: Vec<f64>,
    /// Baseline design point for improvement reporting, when any variable
    /// carries a baseline value. Unspecified variables sit at the model
    /// defaults.
    pub baseline: Option<DesignValues>,
}

/// Validates a request and resolves bounds and the initial point.
///
/// # Errors
///
/// Returns [`SolveError::Validation`] naming the offending field for any of:
/// an algorithm other than SLSQP, a non-physical configuration, an empty or
/// unrecognized design-variable map, degenerate bounds, a non-finite initial
/// value, or non-positive iteration/tolerance settings.
pub fn validate_request(request: &OptimizationRequest) -> Result<ResolvedProblem, SolveError> {
    if !request.algorithm.eq_ignore_ascii_case("SLSQP") {
        return Err(SolveError::Validation(format!(
            "unsupported algorithm: {}; only SLSQP is supported",
            request.algorithm
        )));
    }

    validate_configuration(request)?;

    if request.design_variables.is_empty() {
        return Err(SolveError::Validation(
            "design_variables must not be empty".to_string(),
        ));
    }
    if request.max_iterations == 0 {
        return Err(SolveError::Validation(
            "max_iterations must be positive".to_string(),
        ));
    }
    if !(request.tolerance.is_finite() && request.tolerance > 0.0) {
        return Err(SolveError::Validation(
            "tolerance must be a positive finite number".to_string(),
        ));
    }

    let mut variable_order = Vec::with_capacity(request.design_variables.len());
    let mut lower = Vec::with_capacity(request.design_variables.len());
    let mut upper = Vec::with_capacity(request.design_variables.len());
    let mut initial = Vec::with_capacity(request.design_variables.len());
    let mut baseline: Option<DesignValues> = None;

    for (name, spec) in &request.design_variables {
        let defaults = default_bounds_for(name).ok_or_else(|| {
            SolveError::Validation(format!("design variable {name} is not recognized"))
        })?;
        let (lo, hi) = match spec.bounds {
            Some(bounds) => (bounds.min, bounds.max),
            None => defaults,
        };
        if !(lo.is_finite() && hi.is_finite()) {
            return Err(SolveError::Validation(format!(
                "bounds for {name} must be finite"
            )));
        }
        if lo >= hi {
            return Err(SolveError::Validation(format!(
                "bounds for {name} are degenerate: min {lo} must be strictly below max {hi}"
            )));
        }

        // Initial point: request value wins over the midpoint; out-of-range
        // values are clamped rather than rejected.
        let start = match spec.initial {
            Some(value) => {
                if !value.is_finite() {
                    return Err(SolveError::Validation(format!(
                        "initial value for {name} must be finite"
                    )));
                }
                let clamped = value.clamp(lo, hi);
                if clamped != value {
                    warn!(
                        "initial value {value} for {name} lies outside [{lo}, {hi}]; \
                         clamped to {clamped}"
                    );
                }
                clamped
            }
            None => 0.5 * (lo + hi),
        };

        if let Some(base) = spec.baseline {
            if !base.is_finite() {
                return Err(SolveError::Validation(format!(
                    "baseline value for {name} must be finite"
                )));
            }
            baseline
                .get_or_insert_with(DesignValues::default)
                .set(name, base);
        }

        variable_order.push(name.clone());
        lower.push(lo);
        upper.push(hi);
        initial.push(start);
    }

    info!(
        "resolved optimization problem: {} variable(s), order {:?}",
        variable_order.len(),
        variable_order
    );

    Ok(ResolvedProblem {
        variable_order,
        lower,
        upper,
        initial,
        baseline,
    })
}

fn validate_configuration(request: &OptimizationRequest) -> Result<(), SolveError> {
    let config = &request.configuration;
    let fields = [
        ("length_m", config.length_m),
        ("width_m", config.width_m),
        ("gas_temp_inlet_c", config.gas_temp_inlet_c),
        ("gas_temp_outlet_c", config.gas_temp_outlet_c),
        ("mass_flow_rate_kg_s", config.mass_flow_rate_kg_s),
        ("cycle_time_s", config.cycle_time_s),
    ];
    for (name, value) in fields {
        if !value.is_finite() {
            return Err(SolveError::Validation(format!(
                "configuration field {name} must be finite"
            )));
        }
    }
    if config.gas_temp_inlet_c <= config.gas_temp_outlet_c {
        return Err(SolveError::Validation(format!(
            "gas_temp_inlet_c ({}) must exceed gas_temp_outlet_c ({})",
            config.gas_temp_inlet_c, config.gas_temp_outlet_c
        )));
    }
    for (name, value) in [
        ("length_m", config.length_m),
        ("width_m", config.width_m),
        ("mass_flow_rate_kg_s", config.mass_flow_rate_kg_s),
        ("cycle_time_s", config.cycle_time_s),
    ] {
        if value <= 0.0 {
            return Err(SolveError::Validation(format!(
                "configuration field {name} must be positive"
            )));
        }
    }
    Ok(())
}
