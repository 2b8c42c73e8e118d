//! Property-based tests for collision and gravity invariants.
//!
//! Run with: cargo test -p orbital-core --test proptest_physics

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::collections::BTreeSet;

use approx::assert_relative_eq;
use nalgebra::{Point2, Vector2};
use orbital_core::broad_phase;
use orbital_core::gravity::{AllPairsGravity, BarnesHutGravity, GravitySolver};
use orbital_core::{Body, BroadPhaseConfig, Matter, World, WorldConfig};
use proptest::prelude::*;

// =============================================================================
// Strategies
// =============================================================================

fn arb_point(extent: f64) -> impl Strategy<Value = Point2<f64>> {
    (-extent..extent, -extent..extent).prop_map(|(x, y)| Point2::new(x, y))
}

fn arb_velocity(speed: f64) -> impl Strategy<Value = Vector2<f64>> {
    (-speed..speed, -speed..speed).prop_map(|(x, y)| Vector2::new(x, y))
}

/// A body stepped once over a unit timestep.
fn arb_moving_body() -> impl Strategy<Value = Body> {
    (arb_point(30.0), arb_velocity(40.0), 1.0..200.0f64).prop_map(|(position, velocity, mass)| {
        let mut body = Body::new(position, Matter::hydrogen(mass)).with_velocity(velocity);
        body.step(1.0);
        body
    })
}

/// Unstepped bodies for a world to adopt.
fn arb_scene(max: usize) -> impl Strategy<Value = Vec<Body>> {
    prop::collection::vec(
        (arb_point(50.0), arb_velocity(30.0), 1.0..200.0f64).prop_map(
            |(position, velocity, mass)| {
                Body::new(position, Matter::hydrogen(mass)).with_velocity(velocity)
            },
        ),
        2..max,
    )
}

fn distance_at(a: &Body, b: &Body, t: f64) -> f64 {
    let pa = a.previous_position + (a.position - a.previous_position) * t;
    let pb = b.previous_position + (b.position - b.previous_position) * t;
    (pb - pa).norm()
}

// =============================================================================
// Time of impact
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn collision_t_touches_at_total_radius(a in arb_moving_body(), b in arb_moving_body()) {
        let total_radius = a.radius() + b.radius();

        match a.collision_t(&b) {
            Some(t) => {
                prop_assert!((0.0..=1.0).contains(&t));
                if t > 0.0 {
                    let gap = distance_at(&a, &b, t);
                    prop_assert!(
                        (gap - total_radius).abs() <= 1e-6 * total_radius.max(1.0),
                        "gap {} vs radius {}", gap, total_radius
                    );
                } else {
                    prop_assert!(distance_at(&a, &b, 0.0) <= total_radius);
                }
            }
            None => {
                for i in 0..=100 {
                    let t = f64::from(i) / 100.0;
                    prop_assert!(distance_at(&a, &b, t) >= total_radius * (1.0 - 1e-6));
                }
            }
        }
    }

    #[test]
    fn collision_t_is_symmetric(a in arb_moving_body(), b in arb_moving_body()) {
        match (a.collision_t(&b), b.collision_t(&a)) {
            (Some(x), Some(y)) => prop_assert!((x - y).abs() <= 1e-9),
            (None, None) => {}
            (x, y) => prop_assert!(false, "asymmetric result {:?} / {:?}", x, y),
        }
    }

    #[test]
    fn overlapping_start_reports_zero(
        origin in arb_point(20.0),
        offset in 0.0..1.0f64,
        va in arb_velocity(50.0),
        vb in arb_velocity(50.0),
    ) {
        // Unit-radius discs whose start positions are closer than 2.
        let mass = 10.0 * std::f64::consts::PI;
        let mut a = Body::new(origin, Matter::hydrogen(mass)).with_velocity(va);
        let mut b = Body::new(origin + Vector2::new(offset * 1.9, 0.0), Matter::hydrogen(mass))
            .with_velocity(vb);
        a.step(1.0);
        b.step(1.0);

        prop_assert_eq!(a.collision_t(&b), Some(0.0));
    }

    #[test]
    fn step_clears_accumulators(
        body in arb_moving_body(),
        force in arb_velocity(100.0),
        impulse in arb_velocity(100.0),
        dt in 0.01..1.0f64,
    ) {
        let mut body = body;
        body.apply_force(force);
        body.apply_impulse(impulse);
        let before = body.clone();

        body.step(dt);

        prop_assert_eq!(body.force, Vector2::zeros());
        prop_assert_eq!(body.impulse, Vector2::zeros());
        prop_assert_eq!(body.previous_position, before.position);
        prop_assert_eq!(body.previous_momentum, before.momentum);
        prop_assert_eq!(body.previous_force, before.force);
    }
}

// =============================================================================
// Broad phases
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn broad_phases_are_sound(scene in arb_scene(40)) {
        let mut world = World::from_config(&WorldConfig::with_timestep(0.5)).unwrap();
        for body in scene {
            world.add_body(body);
        }
        world.step();
        let bodies = world.bodies();

        let touching: BTreeSet<_> = bodies
            .iter()
            .enumerate()
            .flat_map(|(i, a)| bodies[i + 1..].iter().map(move |b| (a, b)))
            .filter(|(a, b)| a.collision_t(b).is_some())
            .map(|(a, b)| (a.id(), b.id()))
            .collect();

        for config in [
            BroadPhaseConfig::spatial_hashing(6.0),
            BroadPhaseConfig::sweep_and_prune(),
            BroadPhaseConfig::quad_tree(2.0),
            BroadPhaseConfig::predictive(6.0),
        ] {
            let mut broad_phase = broad_phase::from_config(&config).unwrap();
            broad_phase.update_bodies(bodies);
            let reported: BTreeSet<_> = broad_phase
                .collisions()
                .unwrap()
                .into_iter()
                .map(|(a, b)| (a.min(b), a.max(b)))
                .collect();

            for pair in &touching {
                prop_assert!(reported.contains(pair), "{} missed {:?}", broad_phase.name(), pair);
            }
            for &(a, b) in &reported {
                prop_assert_ne!(a, b);
                let (a, b) = (world.body(a).unwrap(), world.body(b).unwrap());
                prop_assert!(a.aabb().overlaps(&b.aabb()), "{} reported disjoint boxes", broad_phase.name());
            }
        }
    }

    #[test]
    fn predictive_survives_irregular_passes(
        scene in arb_scene(30),
        gaps in prop::collection::vec(1..4usize, 1..6),
    ) {
        let world_for = |config| {
            let mut world =
                World::from_config(&WorldConfig::with_timestep(0.5).broad_phase(config)).unwrap();
            for body in &scene {
                world.add_body(body.clone());
            }
            world
        };
        let mut exact = world_for(BroadPhaseConfig::sweep_and_prune());
        let mut predictive = world_for(BroadPhaseConfig::predictive(6.0));

        for (pass, &gap) in gaps.iter().enumerate() {
            for _ in 0..gap {
                exact.step();
                predictive.step();
            }
            let expected = exact.find_collisions().unwrap();
            let predicted = predictive.find_collisions().unwrap();

            prop_assert!(predicted.iter().all(|hit| expected.contains(hit)));
            if pass == 0 || gap > 1 {
                prop_assert_eq!(predicted, expected);
            }
        }
    }

    #[test]
    fn hash_grid_handles_extreme_sweeps(
        scene in arb_scene(20),
        speed in 1e6..1e10f64,
        direction in 0.0..std::f64::consts::TAU,
    ) {
        let mut world = World::from_config(
            &WorldConfig::with_timestep(1.0).broad_phase(BroadPhaseConfig::spatial_hashing(4.0)),
        )
        .unwrap();
        for body in scene {
            world.add_body(body);
        }
        let velocity = Vector2::new(direction.cos(), direction.sin()) * speed;
        let start = Point2::origin() - velocity;
        world.add_body(Body::new(start, Matter::hydrogen(5.0)).with_velocity(velocity));
        world.step();

        let hits = world.find_collisions().unwrap();
        prop_assert!(hits.iter().all(|hit| (0.0..=1.0).contains(&hit.t)));
    }

    #[test]
    fn find_collisions_reports_each_pair_once(scene in arb_scene(30)) {
        let mut world = World::from_config(
            &WorldConfig::with_timestep(0.5).broad_phase(BroadPhaseConfig::spatial_hashing(4.0)),
        )
        .unwrap();
        for body in scene {
            world.add_body(body);
        }
        world.step();

        let hits = world.find_collisions().unwrap();
        let unique: BTreeSet<_> = hits.iter().map(|hit| (hit.a, hit.b)).collect();
        prop_assert_eq!(unique.len(), hits.len());
        prop_assert!(hits.windows(2).all(|w| w[0].t <= w[1].t));
        prop_assert!(hits.iter().all(|hit| hit.a < hit.b));
    }
}

// =============================================================================
// Matter and gravity
// =============================================================================

proptest! {
    #[test]
    fn matter_addition_commutes(a in 0.0..1000.0f64, b in 0.0..1000.0f64, c in 0.0..1000.0f64) {
        let (ma, mb, mc) = (Matter::hydrogen(a), Matter::hydrogen(b), Matter::hydrogen(c));

        prop_assert_eq!((&ma + &mb).mass(), (&mb + &ma).mass());
        assert_relative_eq!(
            (&(&ma + &mb) + &mc).mass(),
            (&ma + &(&mb + &mc)).mass(),
            max_relative = 1e-12
        );
    }

    #[test]
    fn more_matter_means_larger_radius(mass in 0.1..1000.0f64, extra in 0.001..100.0f64) {
        let small = Body::new(Point2::origin(), Matter::hydrogen(mass));
        let large = Body::new(Point2::origin(), Matter::hydrogen(mass) + Matter::hydrogen(extra));
        prop_assert!(large.radius() > small.radius());
    }

    #[test]
    fn barnes_hut_without_approximation_matches_all_pairs(
        bodies in prop::collection::vec(
            (arb_point(100.0), 0.5..20.0f64)
                .prop_map(|(p, m)| Body::new(p, Matter::hydrogen(m))),
            1..50,
        )
    ) {
        let exact = AllPairsGravity::new().compute_accelerations(&bodies);
        let tree = BarnesHutGravity::new().with_theta(0.0).compute_accelerations(&bodies);

        for (i, (e, t)) in exact.iter().zip(&tree).enumerate() {
            // Scale the tolerance by the magnitude of the individual pulls.
            let scale: f64 = bodies
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(_, other)| {
                    let d = (other.position - bodies[i].position).norm();
                    if d > 1e-6 { other.mass() / d } else { 0.0 }
                })
                .sum();
            prop_assert!((e - t).norm() <= 1e-9 * scale.max(1.0), "body {}: {:?} vs {:?}", i, e, t);
        }
    }

    #[test]
    fn interpolation_stays_on_segment(
        start in arb_point(50.0),
        velocity in arb_velocity(20.0),
        t in -2.0..3.0f64,
    ) {
        let mut world = World::from_config(&WorldConfig::with_timestep(1.0)).unwrap();
        let id = world.add_body(Body::new(start, Matter::hydrogen(5.0)).with_velocity(velocity));
        world.interpolate_linear(t);

        let body = world.body(id).unwrap();
        let clamped = t.clamp(0.0, 1.0);
        let expected = body.previous_position + (body.position - body.previous_position) * clamped;
        prop_assert!((body.interpolated_position - expected).norm() <= 1e-9);
    }
}
