//! Benchmarks for broad phases, the collision pass and gravity solvers.
//!
//! Run with: cargo bench -p orbital-core

#![allow(missing_docs, clippy::cast_precision_loss)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use nalgebra::{Point2, Vector2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use orbital_core::broad_phase::{self, BroadPhase};
use orbital_core::gravity::{AllPairsGravity, BarnesHutGravity, GravitySolver};
use orbital_core::{Body, BroadPhaseConfig, Matter, World};

/// A disc of `count` bodies drifting with small random velocities, already
/// stepped once by the world.
fn random_world(count: usize, seed: u64) -> World {
    let mut rng = StdRng::seed_from_u64(seed);
    let extent = (count as f64).sqrt() * 10.0;
    let mut world = World::default();

    for _ in 0..count {
        let position = Point2::new(rng.gen_range(-extent..extent), rng.gen_range(-extent..extent));
        let velocity = Vector2::new(rng.gen_range(-5.0..5.0), rng.gen_range(-5.0..5.0));
        let mass = rng.gen_range(1.0..50.0);
        world.add_body(Body::new(position, Matter::hydrogen(mass)).with_velocity(velocity));
    }

    world.step();
    world
}

fn broad_phase_configs() -> [(&'static str, BroadPhaseConfig); 4] {
    [
        ("spatial_hashing", BroadPhaseConfig::spatial_hashing(10.0)),
        ("sweep_and_prune", BroadPhaseConfig::sweep_and_prune()),
        ("quad_tree", BroadPhaseConfig::quad_tree(5.0)),
        ("predictive", BroadPhaseConfig::predictive(10.0)),
    ]
}

/// Rebuild plus candidate query, as done once per step.
fn bench_broad_phase(c: &mut Criterion) {
    let mut group = c.benchmark_group("broad_phase");

    for count in [100, 1_000, 5_000] {
        let world = random_world(count, 7);
        group.throughput(Throughput::Elements(count as u64));

        for (name, config) in broad_phase_configs() {
            let Ok(mut broad_phase) = broad_phase::from_config(&config) else {
                continue;
            };
            group.bench_with_input(BenchmarkId::new(name, count), world.bodies(), |b, bodies| {
                b.iter(|| {
                    broad_phase.update_bodies(bodies);
                    black_box(broad_phase.collisions().map(|pairs| pairs.len()))
                });
            });
        }
    }

    group.finish();
}

/// Full world step plus narrow phase.
fn bench_collision_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("collision_pass");
    group.sample_size(50);

    for count in [1_000, 5_000] {
        let template = random_world(count, 11);
        group.throughput(Throughput::Elements(count as u64));

        group.bench_function(BenchmarkId::new("step_and_find", count), |b| {
            let mut world = template.clone();
            b.iter(|| {
                world.step();
                black_box(world.find_collisions().map(|hits| hits.len()))
            });
        });
    }

    group.finish();
}

fn bench_gravity(c: &mut Criterion) {
    let mut group = c.benchmark_group("gravity");

    for count in [100, 1_000, 4_000] {
        let world = random_world(count, 3);
        group.throughput(Throughput::Elements(count as u64));

        let solvers: [(&str, Box<dyn GravitySolver>); 3] = [
            ("all_pairs", Box::new(AllPairsGravity::new())),
            ("barnes_hut_0.5", Box::new(BarnesHutGravity::new().with_theta(0.5))),
            ("barnes_hut_0.7", Box::new(BarnesHutGravity::new())),
        ];

        for (name, solver) in &solvers {
            if *name == "all_pairs" && count > 1_000 {
                continue;
            }
            group.bench_with_input(BenchmarkId::new(*name, count), world.bodies(), |b, bodies| {
                b.iter(|| black_box(solver.compute_accelerations(bodies)));
            });
        }
    }

    group.finish();
}

/// Pull of a few heavy bodies on many light ones.
fn bench_selective_gravity(c: &mut Criterion) {
    let mut group = c.benchmark_group("selective_gravity");
    let ships = random_world(2_000, 5);
    let planets = random_world(20, 9);

    let solvers: [(&str, Box<dyn GravitySolver>); 2] = [
        ("all_pairs", Box::new(AllPairsGravity::new())),
        ("barnes_hut", Box::new(BarnesHutGravity::new())),
    ];
    for (name, solver) in &solvers {
        group.bench_function(*name, |b| {
            b.iter(|| black_box(solver.compute_accelerations_selective(ships.bodies(), planets.bodies())));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_broad_phase,
    bench_collision_pass,
    bench_gravity,
    bench_selective_gravity,
);
criterion_main!(benches);
