//! Performance benchmarks for the optimization core.
//!
//! Run with: cargo bench -p roc-core --bench physics_perf

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use indexmap::IndexMap;
use roc_core::models::{
    ConstraintLimits, DesignVariableSpec, Objective, OptimizationRequest,
    RegeneratorConfiguration,
};
use roc_core::physics::{DesignValues, PhysicsModel};
use roc_core::run_optimization;

fn bench_physics_evaluate(c: &mut Criterion) {
    let model = PhysicsModel::new(RegeneratorConfiguration::default());
    let vars = DesignValues::default();
    c.bench_function("physics_evaluate", |b| {
        b.iter(|| black_box(model.evaluate(black_box(&vars))))
    });
}

fn bench_full_optimization(c: &mut Criterion) {
    let mut design_variables = IndexMap::new();
    for name in ["checker_height", "checker_spacing", "wall_thickness"] {
        design_variables.insert(name.to_string(), DesignVariableSpec::default());
    }
    let request = OptimizationRequest {
        configuration: RegeneratorConfiguration::default(),
        design_variables,
        constraints: ConstraintLimits {
            min_heat_transfer_coefficient: 10.0,
            ..ConstraintLimits::default()
        },
        objective: Objective::MaximizeEfficiency,
        algorithm: "SLSQP".to_string(),
        max_iterations: 100,
        tolerance: 1e-6,
    };
    c.bench_function("optimize_geometry", |b| {
        b.iter(|| black_box(run_optimization(black_box(&request)).unwrap()))
    });
}

criterion_group!(benches, bench_physics_evaluate, bench_full_optimization);
criterion_main!(benches);
