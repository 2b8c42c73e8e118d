//! End-to-end scenarios driving a world the way a game loop does.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp, clippy::cast_precision_loss)]

use std::f64::consts::PI;

use approx::assert_relative_eq;
use nalgebra::{Point2, Vector2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use orbital_core::broad_phase::{self, SweepAndPrune};
use orbital_core::gravity::{self, GravitySolver};
use orbital_core::{
    Body, BodyId, BroadPhaseConfig, Collision, GravityConfig, Matter, Stepper, StepperConfig,
    World, WorldConfig,
};

fn world_with(broad_phase: BroadPhaseConfig, timestep: f64) -> World {
    World::from_config(&WorldConfig::with_timestep(timestep).broad_phase(broad_phase)).unwrap()
}

fn every_broad_phase() -> [BroadPhaseConfig; 4] {
    [
        BroadPhaseConfig::spatial_hashing(10.0),
        BroadPhaseConfig::sweep_and_prune(),
        BroadPhaseConfig::quad_tree(2.0),
        BroadPhaseConfig::predictive(10.0),
    ]
}

// ============================================================================
// Closing bodies
// ============================================================================

/// Two mass-10 bodies closing head-on are detected within the expected number
/// of steps, and the reported fraction puts them exactly in contact.
#[test]
fn head_on_pair_detected_in_time() {
    let timestep = 0.1;
    let speed = 8.0;
    let distance = 10.0;

    for config in every_broad_phase() {
        let mut world = world_with(config, timestep);
        let a = world.add_body(
            Body::new(Point2::new(0.0, 0.0), Matter::hydrogen(10.0))
                .with_velocity(Vector2::new(speed / 2.0, 0.0)),
        );
        let b = world.add_body(
            Body::new(Point2::new(distance, 0.0), Matter::hydrogen(10.0))
                .with_velocity(Vector2::new(-speed / 2.0, 0.0)),
        );
        let r = world.body(a).unwrap().radius();
        let budget = ((distance - 2.0 * r) / (speed * timestep)).ceil() as usize;

        let mut steps = 0;
        let hit = loop {
            world.step();
            steps += 1;
            if let Some(hit) = world.find_collisions().unwrap().first().copied() {
                break hit;
            }
            assert!(
                steps <= budget,
                "{}: no collision after {steps} steps",
                world.broad_phase().name()
            );
        };

        assert!(steps <= budget);
        assert_eq!((hit.a, hit.b), (a, b));

        world.interpolate_linear(hit.t);
        let gap = world.body(b).unwrap().interpolated_position
            - world.body(a).unwrap().interpolated_position;
        assert_relative_eq!(gap.norm(), 2.0 * r, epsilon = 1e-4);
    }
}

/// A small fast body crossing a large one inside a single step is still
/// caught: the swept test does not sample end positions only.
#[test]
fn fast_body_does_not_tunnel() {
    for config in every_broad_phase() {
        let mut world = world_with(config, 1.0);
        let wall = world.add_body(Body::new(Point2::new(0.0, 0.0), Matter::hydrogen(40.0)));
        let bullet = world.add_body(
            Body::new(Point2::new(-300.0, 0.3), Matter::hydrogen(0.01))
                .with_velocity(Vector2::new(200.0, 0.0)),
        );

        // after add_body: x = -100; after this step: x = 100
        world.step();
        let bullet_body = world.body(bullet).unwrap();
        assert!(bullet_body.previous_position.x < -50.0 && bullet_body.position.x > 50.0);

        let hits = world.find_collisions().unwrap();
        assert_eq!(hits.len(), 1, "{}", world.broad_phase().name());
        assert_eq!((hits[0].a, hits[0].b), (wall, bullet));
        assert!(hits[0].t > 0.0 && hits[0].t < 0.5);
    }
}

// ============================================================================
// Broad-phase agreement
// ============================================================================

fn seeded_bodies(count: usize, seed: u64) -> Vec<Body> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let position = Point2::new(rng.gen_range(-80.0..80.0), rng.gen_range(-80.0..80.0));
            let velocity = Vector2::new(rng.gen_range(-15.0..15.0), rng.gen_range(-15.0..15.0));
            Body::new(position, Matter::hydrogen(rng.gen_range(1.0..60.0))).with_velocity(velocity)
        })
        .collect()
}

fn collision_pass(config: BroadPhaseConfig, bodies: &[Body], steps: usize) -> Vec<Vec<Collision>> {
    let mut world = world_with(config, 0.25);
    for body in bodies {
        world.add_body(body.clone());
    }
    (0..steps)
        .map(|_| {
            world.step();
            world.find_collisions().unwrap()
        })
        .collect()
}

/// Exact broad phases produce identical collision feeds; the predictive one
/// agrees on its first, synchronous pass.
#[test]
fn broad_phases_agree_on_seeded_scene() {
    let bodies = seeded_bodies(300, 42);

    let reference = collision_pass(BroadPhaseConfig::spatial_hashing(10.0), &bodies, 8);
    assert!(reference.iter().any(|hits| !hits.is_empty()));

    for config in [
        BroadPhaseConfig::spatial_hashing(3.0),
        BroadPhaseConfig::sweep_and_prune(),
        BroadPhaseConfig::quad_tree(1.0),
        BroadPhaseConfig::quad_tree(20.0),
    ] {
        let name = config.algorithm;
        assert_eq!(collision_pass(config, &bodies, 8), reference, "{name}");
    }

    let predictive = collision_pass(BroadPhaseConfig::predictive(10.0), &bodies, 1);
    assert_eq!(predictive[0], reference[0]);
}

/// Over many steps the predictive broad phase only ever reports genuine
/// contacts, and misses at most what a one-step-stale prediction can miss.
#[test]
fn predictive_feed_is_a_subset_of_exact_feed() {
    let bodies = seeded_bodies(200, 7);
    let exact = collision_pass(BroadPhaseConfig::sweep_and_prune(), &bodies, 12);
    let predicted = collision_pass(BroadPhaseConfig::predictive(10.0), &bodies, 12);

    for (step, (e, p)) in exact.iter().zip(&predicted).enumerate() {
        for hit in p {
            assert!(e.contains(hit), "step {step}: {hit:?} not in exact feed");
        }
    }
}

/// Several steps between collision passes: the predictive broad phase must
/// not hand back a look-ahead computed for an earlier step.
#[test]
fn predictive_keeps_up_when_steps_are_skipped() {
    let bodies = [
        Body::new(Point2::origin(), Matter::hydrogen(10.0 * PI)),
        Body::new(Point2::new(225.0, 0.0), Matter::hydrogen(10.0 * PI))
            .with_velocity(Vector2::new(-50.0, 0.0)),
    ];
    let mut exact = world_with(BroadPhaseConfig::spatial_hashing(10.0), 1.0);
    let mut predictive = world_with(BroadPhaseConfig::predictive(10.0), 1.0);
    for body in &bodies {
        exact.add_body(body.clone());
        predictive.add_body(body.clone());
    }

    let mut exact_counts = Vec::new();
    let mut predicted_counts = Vec::new();
    for steps in [1, 1, 2, 1] {
        for _ in 0..steps {
            exact.step();
            predictive.step();
        }
        let expected = exact.find_collisions().unwrap();
        let predicted = predictive.find_collisions().unwrap();
        exact_counts.push(expected.len());
        predicted_counts.push(predicted.len());
        assert_eq!(predicted, expected);
    }

    assert_eq!(exact_counts, vec![0, 0, 1, 0]);
    assert_eq!(predicted_counts, exact_counts);
}

/// A body swept across a billion units in one step does not blow up any
/// broad phase, and every one of them still offers the crossed pair.
#[test]
fn extreme_sweep_is_handled_by_every_broad_phase() {
    let mut reference: Option<Vec<Collision>> = None;

    for config in every_broad_phase() {
        let mut world = world_with(config.clone(), 1.0);
        let wall = world.add_body(Body::new(Point2::origin(), Matter::hydrogen(10.0 * PI)));
        // after add_body: x = 5e8; after the step: x = -5e8
        let bullet = world.add_body(
            Body::new(Point2::new(1.5e9, 0.5), Matter::hydrogen(1.0))
                .with_velocity(Vector2::new(-1e9, 0.0)),
        );
        world.step();

        let mut broad_phase = broad_phase::from_config(&config).unwrap();
        broad_phase.update_bodies(world.bodies());
        let candidates = broad_phase.collisions().unwrap();
        assert!(
            candidates
                .iter()
                .any(|&pair| pair == (wall, bullet) || pair == (bullet, wall)),
            "{}: crossed pair not offered",
            broad_phase.name()
        );

        let hits = world.find_collisions().unwrap();
        match &reference {
            Some(expected) => assert_eq!(&hits, expected, "{}", broad_phase.name()),
            None => reference = Some(hits),
        }
    }
}

// ============================================================================
// Gravity and the frame loop
// ============================================================================

/// A light body in a circular orbit keeps its radius under both solvers.
#[test]
fn circular_orbit_with_each_solver() {
    for config in [GravityConfig::all_pairs(), GravityConfig::barnes_hut(0.7)] {
        let solver: Box<dyn GravitySolver> = gravity::from_config(&config).unwrap();
        let mut world = World::new(0.01, Box::new(SweepAndPrune::new())).unwrap();
        let sun_mass = 900.0;
        world.add_body(Body::new(Point2::origin(), Matter::hydrogen(sun_mass)));
        let planet = world.add_body(
            Body::new(Point2::new(50.0, 0.0), Matter::hydrogen(0.01))
                .with_velocity(Vector2::new(0.0, sun_mass.sqrt())),
        );

        let mut max_r: f64 = 0.0;
        let mut min_r = f64::INFINITY;
        for _ in 0..1500 {
            world.apply_gravity(solver.as_ref());
            world.step();
            let r = world.body(planet).unwrap().position.coords.norm();
            max_r = max_r.max(r);
            min_r = min_r.min(r);
        }

        assert!(min_r > 45.0 && max_r < 55.0, "{}: r in [{min_r}, {max_r}]", solver.name());
    }
}

/// Pull on ships from planets only: ships never attract each other.
#[test]
fn selective_gravity_ignores_ship_mass() {
    let mut world = World::default();
    let planet = world.add_body(Body::new(Point2::new(0.0, 0.0), Matter::hydrogen(500.0)));
    let ships: Vec<BodyId> = (0..5)
        .map(|i| {
            world.add_body(Body::new(
                Point2::new(100.0 + f64::from(i) * 0.5, 0.0),
                Matter::hydrogen(1000.0),
            ))
        })
        .collect();

    let planets: Vec<Body> = vec![world.body(planet).unwrap().clone()];
    let fleet: Vec<Body> = ships.iter().map(|&id| world.body(id).unwrap().clone()).collect();

    for config in [GravityConfig::all_pairs(), GravityConfig::barnes_hut(0.5)] {
        let solver: Box<dyn GravitySolver> = gravity::from_config(&config).unwrap();
        let accelerations = solver.compute_accelerations_selective(&fleet, &planets);
        for (ship, a) in fleet.iter().zip(&accelerations) {
            let d = ship.position.x;
            assert_relative_eq!(a.x, -500.0 / d, max_relative = 1e-9);
            assert_eq!(a.y, 0.0);
        }
    }
}

/// Speculative copies ("what if I fire now?") leave the live world alone.
#[test]
fn speculative_clone_does_not_disturb_live_world() {
    let mut world = world_with(BroadPhaseConfig::predictive(10.0), 0.1);
    let gun = world.add_body(Body::new(Point2::new(0.0, 0.0), Matter::hydrogen(100.0)));
    let target = world.add_body(Body::new(Point2::new(30.0, 0.0), Matter::hydrogen(100.0)));
    world.step();
    world.find_collisions().unwrap();
    let snapshot: Vec<Body> = world.bodies().to_vec();

    let sweep = broad_phase::from_config(&BroadPhaseConfig::sweep_and_prune()).unwrap();
    let mut what_if = world.clone_with(sweep);
    what_if.body_mut(gun).unwrap().apply_impulse(Vector2::new(20_000.0, 0.0));

    let mut hit = None;
    for _ in 0..100 {
        what_if.step();
        if let Some(first) = what_if.find_collisions().unwrap().first() {
            hit = Some(*first);
            break;
        }
    }

    let hit = hit.unwrap();
    assert_eq!((hit.a, hit.b), (gun, target));
    assert_eq!(world.bodies(), snapshot.as_slice());
    assert_eq!(world.step_count(), 1);
}

/// Drive a small system through the stepper at an uneven frame rate; every
/// found collision is eventually passed, in time order.
#[test]
fn stepper_passes_every_found_collision() {
    let mut world = world_with(BroadPhaseConfig::quad_tree(2.0), 0.2);
    for body in seeded_bodies(60, 99) {
        world.add_body(body);
    }

    let gravity = GravityConfig::barnes_hut(0.7).gravitational_constant(0.5);
    let mut stepper = Stepper::with_config(&StepperConfig::default().with_gravity(gravity)).unwrap();

    let mut rng = StdRng::seed_from_u64(1);
    let mut found = 0;
    let mut passed = 0;
    for _ in 0..300 {
        let report = stepper.update(&mut world, rng.gen_range(0.005..0.05)).unwrap();
        assert!(report.accumulator_t >= 0.0 && report.accumulator_t < 1.0);
        assert!(report.found.windows(2).all(|w| w[0].t <= w[1].t) || report.steps > 1);
        found += report.found.len();
        passed += report.passed.len();
    }

    assert_eq!(found, passed + stepper.pending_collisions().len());
    assert!(world.step_count() > 0);
    assert!(world.validate().is_ok());
}
