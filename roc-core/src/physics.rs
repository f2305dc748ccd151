//! Steady-state thermal/hydraulic model of a checker-packed regenerator.
//!
//! The model is algebraic and dimensionless-group based: a packed-bed
//! Nusselt correlation feeds an NTU-effectiveness balance, an Ergun-style
//! friction factor gives the pressure drop, and a one-dimensional conduction
//! term accounts for refractory wall losses. Evaluation is a pure function of
//! the configuration and design variables: no I/O, no clocks, no randomness,
//! bitwise-reproducible on the same platform.
//!
//! Degenerate inputs do not raise. Non-finite inputs produce non-finite
//! outputs, which the optimization driver detects and reports honestly.

use crate::models::{PerformanceMetrics, RegeneratorConfiguration};
use indexmap::IndexMap;

/// Hot combustion gas density at operating temperature, kg/m³.
pub const GAS_DENSITY_KG_M3: f64 = 0.4;
/// Gas dynamic viscosity at operating temperature, Pa·s.
pub const GAS_VISCOSITY_PA_S: f64 = 5e-5;
/// Gas thermal conductivity at operating temperature, W/(m·K).
pub const GAS_CONDUCTIVITY_W_MK: f64 = 0.08;
/// Specific heat of combustion gases, J/(kg·K).
pub const GAS_SPECIFIC_HEAT_J_KGK: f64 = 1100.0;
/// Prandtl number for combustion gases.
pub const PRANDTL: f64 = 0.7;
/// Void fraction of the checker pattern.
pub const CHECKER_POROSITY: f64 = 0.7;
/// Specific-surface correlation coefficient, m²/m³ per meter of spacing.
pub const SPECIFIC_SURFACE_COEFF: f64 = 400.0;
/// Assumed gas channel cross-section, m². Fixed by the correlation; it does
/// not scale with the regenerator footprint.
pub const FLOW_CROSS_SECTION_M2: f64 = 60.0;
/// Refractory wall thermal conductivity, W/(m·K).
pub const WALL_CONDUCTIVITY_W_MK: f64 = 1.2;
/// Effective wall area exposed to ambient, m².
pub const WALL_AREA_M2: f64 = 200.0;
/// Combined ambient and shell reference temperature, °C.
pub const AMBIENT_SHELL_TEMP_C: f64 = 50.0;

/// Canonical design-variable names, in the order used for dense snapshots.
pub const DESIGN_VARIABLE_NAMES: [&str; 6] = [
    "checker_height",
    "checker_spacing",
    "wall_thickness",
    "thermal_conductivity",
    "specific_heat",
    "density",
];

/// Dense design-variable vector with the model's built-in defaults.
///
/// The physics model is total: when the caller optimizes only a subset of
/// variables, the remaining ones hold these defaults. The checker material
/// properties (`thermal_conductivity`, `specific_heat`, `density`) are
/// carried for completeness; the steady-state correlations are driven by the
/// gas-side properties, matching the source model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DesignValues {
    /// Checker pack height, m
    pub checker_height: f64,
    /// Channel spacing between bricks, m
    pub checker_spacing: f64,
    /// Refractory wall thickness, m
    pub wall_thickness: f64,
    /// Checker brick conductivity, W/(m·K)
    pub thermal_conductivity: f64,
    /// Checker brick specific heat, J/(kg·K)
    pub specific_heat: f64,
    /// Checker brick density, kg/m³
    pub density: f64,
}

impl Default for DesignValues {
    fn default() -> Self {
        DesignValues {
            checker_height: 0.5,
            checker_spacing: 0.1,
            wall_thickness: 0.3,
            thermal_conductivity: 2.5,
            specific_heat: 900.0,
            density: 2300.0,
        }
    }
}

impl DesignValues {
    /// Builds a dense vector from a sparse name → value map; variables not
    /// present keep their defaults, unknown names are ignored.
    pub fn from_map(map: &IndexMap<String, f64>) -> Self {
        let mut values = DesignValues::default();
        for (name, value) in map {
            values.set(name, *value);
        }
        values
    }

    /// Sets one variable by name. Returns `false` for unrecognized names.
    pub fn set(&mut self, name: &str, value: f64) -> bool {
        match name {
            "checker_height" => self.checker_height = value,
            "checker_spacing" => self.checker_spacing = value,
            "wall_thickness" => self.wall_thickness = value,
            "thermal_conductivity" => self.thermal_conductivity = value,
            "specific_heat" => self.specific_heat = value,
            "density" => self.density = value,
            _ => return false,
        }
        true
    }

    /// Reads one variable by name.
    pub fn get(&self, name: &str) -> Option<f64> {
        match name {
            "checker_height" => Some(self.checker_height),
            "checker_spacing" => Some(self.checker_spacing),
            "wall_thickness" => Some(self.wall_thickness),
            "thermal_conductivity" => Some(self.thermal_conductivity),
            "specific_heat" => Some(self.specific_heat),
            "density" => Some(self.density),
            _ => None,
        }
    }

    /// Dense snapshot in canonical variable order.
    pub fn to_map(self) -> IndexMap<String, f64> {
        let mut map = IndexMap::with_capacity(DESIGN_VARIABLE_NAMES.len());
        for name in DESIGN_VARIABLE_NAMES {
            map.insert(name.to_string(), self.get(name).unwrap_or_default());
        }
        map
    }
}

/// Closed-form regenerator model bound to one configuration.
///
/// Stateless and freely shareable; two models with equal configurations are
/// interchangeable.
#[derive(Debug, Clone)]
pub struct PhysicsModel {
    config: RegeneratorConfiguration,
}

impl PhysicsModel {
    pub fn new(config: RegeneratorConfiguration) -> Self {
        PhysicsModel { config }
    }

    pub fn configuration(&self) -> &RegeneratorConfiguration {
        &self.config
    }

    /// Evaluates the full performance record at one design point.
    pub fn evaluate(&self, vars: &DesignValues) -> PerformanceMetrics {
        let height = vars.checker_height;
        let spacing = vars.checker_spacing;
        let wall = vars.wall_thickness;

        let volume = self.checker_volume(height);
        let surface_area = surface_area(volume, spacing);

        let reynolds = self.reynolds(spacing);
        let nusselt = nusselt(reynolds);
        let htc = heat_transfer_coefficient(nusselt, spacing);

        let capacity_rate = self.config.mass_flow_rate_kg_s * GAS_SPECIFIC_HEAT_J_KGK;
        let ntu = htc * surface_area / capacity_rate;
        let effectiveness = effectiveness(ntu);

        let heat_available = capacity_rate
            * (self.config.gas_temp_inlet_c - self.config.gas_temp_outlet_c);
        let heat_transfer_rate = effectiveness * heat_available;

        let gross_efficiency = if heat_available > 0.0 {
            heat_transfer_rate / heat_available
        } else {
            0.0
        };

        let pressure_drop = self.pressure_drop(spacing, height);
        let wall_heat_loss = self.wall_losses(wall);

        let net_efficiency =
            (gross_efficiency - wall_heat_loss / heat_available.max(1.0)).clamp(0.0, 1.0);

        PerformanceMetrics {
            thermal_efficiency: net_efficiency,
            heat_transfer_rate_w: heat_transfer_rate,
            pressure_drop_pa: pressure_drop,
            ntu,
            effectiveness,
            heat_transfer_coefficient_w_m2k: htc,
            surface_area_m2: surface_area,
            wall_heat_loss_w: wall_heat_loss,
            reynolds,
            nusselt,
        }
    }

    /// Solid brick volume of the checker pack, m³.
    fn checker_volume(&self, height: f64) -> f64 {
        self.config.length_m * self.config.width_m * height * (1.0 - CHECKER_POROSITY)
    }

    /// Superficial gas velocity through the pack, m/s.
    fn gas_velocity(&self) -> f64 {
        self.config.mass_flow_rate_kg_s / (GAS_DENSITY_KG_M3 * FLOW_CROSS_SECTION_M2)
    }

    /// Channel Reynolds number with spacing as the characteristic length.
    fn reynolds(&self, spacing: f64) -> f64 {
        GAS_DENSITY_KG_M3 * self.gas_velocity() * spacing / GAS_VISCOSITY_PA_S
    }

    /// Ergun-style pressure drop across the pack height, Pa.
    fn pressure_drop(&self, spacing: f64, height: f64) -> f64 {
        let velocity = self.gas_velocity();
        let friction_factor = 150.0 / self.reynolds(spacing) + 1.75;
        friction_factor * (height / spacing) * 0.5 * GAS_DENSITY_KG_M3 * velocity * velocity
    }

    /// Conductive loss through the refractory walls, W.
    fn wall_losses(&self, wall_thickness: f64) -> f64 {
        let temp_diff = self.config.gas_temp_inlet_c - AMBIENT_SHELL_TEMP_C;
        WALL_CONDUCTIVITY_W_MK * WALL_AREA_M2 * temp_diff / wall_thickness
    }
}

/// Heat-transfer surface from the empirical specific-surface correlation, m².
fn surface_area(volume: f64, spacing: f64) -> f64 {
    volume * (SPECIFIC_SURFACE_COEFF / spacing)
}

/// Packed-bed Nusselt correlation with a creeping-flow branch below Re = 10.
fn nusselt(reynolds: f64) -> f64 {
    if reynolds < 10.0 {
        2.0 + 1.1 * (reynolds * PRANDTL).powf(0.6)
    } else {
        2.0 + 0.6 * reynolds.powf(0.5) * PRANDTL.powf(0.33)
    }
}

/// Gas-side heat-transfer coefficient, W/(m²·K). The gas conductivity is the
/// controlling one; the brick conductivity does not enter the film
/// coefficient.
fn heat_transfer_coefficient(nusselt: f64, spacing: f64) -> f64 {
    nusselt * GAS_CONDUCTIVITY_W_MK / spacing
}

/// Balanced counter-flow effectiveness approximation.
fn effectiveness(ntu: f64) -> f64 {
    ntu / (1.0 + ntu)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> PhysicsModel {
        PhysicsModel::new(RegeneratorConfiguration::default())
    }

    #[test]
    fn evaluation_is_bitwise_deterministic() {
        let model = model();
        let vars = DesignValues::default();
        let a = model.evaluate(&vars);
        let b = model.evaluate(&vars);
        assert_eq!(a, b);
    }

    #[test]
    fn nusselt_uses_creeping_flow_branch_below_re_10() {
        let low = nusselt(5.0);
        assert!((low - (2.0 + 1.1 * (5.0 * PRANDTL).powf(0.6))).abs() < 1e-12);

        let high = nusselt(1000.0);
        assert!((high - (2.0 + 0.6 * 1000.0_f64.powf(0.5) * PRANDTL.powf(0.33))).abs() < 1e-12);
        assert!(high > low);
    }

    #[test]
    fn htc_scales_inversely_with_spacing() {
        let small = heat_transfer_coefficient(10.0, 0.05);
        let large = heat_transfer_coefficient(10.0, 0.15);
        assert!(small > large);
        assert!((large / small - 0.05 / 0.15).abs() < 1e-9);
    }

    #[test]
    fn effectiveness_matches_ntu_balance() {
        assert!((effectiveness(0.5) - 1.0 / 3.0).abs() < 1e-12);
        for ntu in [0.0, 0.1, 1.0, 10.0, 500.0] {
            let eps = effectiveness(ntu);
            assert!((0.0..1.0).contains(&eps));
            assert!((eps - ntu / (1.0 + ntu)).abs() <= 1e-12 * (1.0 + eps));
        }
    }

    #[test]
    fn pressure_drop_scales_linearly_with_height() {
        let model = model();
        let short = model.pressure_drop(0.1, 0.5);
        let tall = model.pressure_drop(0.1, 2.0);
        assert!((tall / short - 4.0).abs() < 1e-9);
    }

    #[test]
    fn pressure_drop_increases_with_mass_flow() {
        let base = model();
        let heavy = PhysicsModel::new(RegeneratorConfiguration {
            mass_flow_rate_kg_s: 80.0,
            ..RegeneratorConfiguration::default()
        });
        let vars = DesignValues::default();
        assert!(
            heavy.evaluate(&vars).pressure_drop_pa > base.evaluate(&vars).pressure_drop_pa
        );
    }

    #[test]
    fn wall_loss_decreases_with_wall_thickness() {
        let model = model();
        let thin = DesignValues {
            wall_thickness: 0.2,
            ..DesignValues::default()
        };
        let thick = DesignValues {
            wall_thickness: 0.8,
            ..DesignValues::default()
        };
        assert!(model.evaluate(&thin).wall_heat_loss_w > model.evaluate(&thick).wall_heat_loss_w);
    }

    #[test]
    fn efficiency_is_clamped_for_degenerate_temperatures() {
        // Inverted temperatures give non-positive available heat; the net
        // efficiency must still land in [0, 1].
        let inverted = PhysicsModel::new(RegeneratorConfiguration {
            gas_temp_inlet_c: 500.0,
            gas_temp_outlet_c: 900.0,
            ..RegeneratorConfiguration::default()
        });
        let metrics = inverted.evaluate(&DesignValues::default());
        assert!((0.0..=1.0).contains(&metrics.thermal_efficiency));
    }

    #[test]
    fn subset_map_falls_back_to_defaults() {
        let mut map = IndexMap::new();
        map.insert("checker_spacing".to_string(), 0.2);
        let values = DesignValues::from_map(&map);
        assert_eq!(values.checker_spacing, 0.2);
        assert_eq!(values.checker_height, 0.5);
        assert_eq!(values.wall_thickness, 0.3);
        assert_eq!(values.thermal_conductivity, 2.5);
        assert_eq!(values.specific_heat, 900.0);
        assert_eq!(values.density, 2300.0);
    }

    #[test]
    fn dense_snapshot_uses_canonical_order() {
        let map = DesignValues::default().to_map();
        let order: Vec<&str> = map.keys().map(|k| k.as_str()).collect();
        assert_eq!(order, DESIGN_VARIABLE_NAMES);
    }
}
