//! Core orbital physics simulation.
//!
//! This crate provides the world, the bodies it owns, continuous collision
//! detection and N-body gravity for a planar sandbox of circular masses. It
//! builds on [`orbital_types`] for the data structures.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Stepper                               │
//! │  Clock → gravity → World::step → find_collisions → schedule │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         World                                │
//! │  Contains: bodies, timestep, broad phase                    │
//! │  Provides: body management, collision feed, interpolation   │
//! └──────────────┬──────────────────────────────┬───────────────┘
//!                │                              │
//!                ▼                              ▼
//! ┌──────────────────────────────┐ ┌────────────────────────────┐
//! │         BroadPhase           │ │       GravitySolver        │
//! │  hash grid, sweep and prune, │ │  all pairs, Barnes-Hut     │
//! │  quad tree, predictive hash  │ │                            │
//! └──────────────────────────────┘ └────────────────────────────┘
//! ```
//!
//! # Layer 0 Crate
//!
//! No rendering, no engine, no I/O. Collisions are reported with their time
//! of impact; responding to them is left to the caller.
//!
//! # Quick Start
//!
//! ```
//! use orbital_core::{Body, World};
//! use orbital_types::{Matter, WorldConfig};
//! use nalgebra::{Point2, Vector2};
//!
//! let mut world = World::from_config(&WorldConfig::with_timestep(0.1)).unwrap();
//! let a = world.add_body(
//!     Body::new(Point2::new(-5.0, 0.0), Matter::hydrogen(10.0))
//!         .with_velocity(Vector2::new(20.0, 0.0)),
//! );
//! let b = world.add_body(Body::new(Point2::new(5.0, 0.0), Matter::hydrogen(10.0)));
//!
//! let mut hits = Vec::new();
//! while hits.is_empty() {
//!     world.step();
//!     hits = world.find_collisions().unwrap();
//! }
//!
//! assert_eq!((hits[0].a, hits[0].b), (a, b));
//! assert!((0.0..=1.0).contains(&hits[0].t));
//! ```
//!
//! # Gravity
//!
//! Solvers compute accelerations; the world turns them into forces:
//!
//! ```
//! use orbital_core::gravity::{self, GravitySolver};
//! use orbital_core::{Body, World};
//! use orbital_types::{GravityConfig, Matter};
//! use nalgebra::Point2;
//!
//! let mut world = World::default();
//! world.add_body(Body::new(Point2::new(0.0, 0.0), Matter::hydrogen(100.0)));
//! world.add_body(Body::new(Point2::new(50.0, 0.0), Matter::hydrogen(1.0)));
//!
//! let solver = gravity::from_config(&GravityConfig::barnes_hut(0.5)).unwrap();
//! world.apply_gravity(solver.as_ref());
//! world.step();
//!
//! assert!(world.bodies()[1].velocity().x < 0.0);
//! ```
//!
//! # Parallelism
//!
//! With the default `parallel` feature, the narrow phase, both gravity
//! solvers and the predictive broad phase's look-ahead run on the rayon
//! thread pool. Without it every region runs inline with identical results.

#![doc(html_root_url = "https://docs.rs/orbital-core/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
    clippy::missing_errors_doc,        // Error docs added where non-obvious
)]

mod body;
pub mod broad_phase;
pub mod gravity;
mod stepper;
mod world;

pub use body::{swept_collision_t, Body};
pub use broad_phase::{Aabb, BodyProxy, BroadPhase};
pub use gravity::GravitySolver;
pub use stepper::{Clock, FrameReport, Stepper, StepperConfig};
pub use world::{Collision, World};

// Re-export key types from orbital-types for convenience
pub use orbital_types::{
    BodyId, BroadPhaseAlgorithm, BroadPhaseConfig, Element, GravityAlgorithm, GravityConfig,
    Matter, PhysicsError, Result, WorldConfig,
};

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::cast_precision_loss
)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Point2, Vector2};

    #[test]
    fn test_momentum_conservation_without_gravity() {
        let mut world = World::default();
        world.add_body(
            Body::new(Point2::new(-5.0, 0.0), Matter::hydrogen(3.0))
                .with_velocity(Vector2::new(1.0, 0.0)),
        );
        world.add_body(
            Body::new(Point2::new(5.0, 0.0), Matter::hydrogen(1.0))
                .with_velocity(Vector2::new(-1.0, 0.5)),
        );
        let initial = world.total_momentum();

        let mut stepper = Stepper::with_config(&StepperConfig::zero_gravity()).unwrap();
        for _ in 0..50 {
            stepper.update(&mut world, 0.1).unwrap();
        }

        assert_relative_eq!(world.total_momentum(), initial, epsilon = 1e-12);
    }

    #[test]
    fn test_two_body_orbit_stays_bound() {
        // Circular orbit under a 1/r force: v² = G·M.
        let mut world = World::from_config(&WorldConfig::with_timestep(0.01)).unwrap();
        let sun_mass = 400.0;
        world.add_body(Body::new(Point2::origin(), Matter::hydrogen(sun_mass)));
        let planet = world.add_body(
            Body::new(Point2::new(30.0, 0.0), Matter::hydrogen(0.01))
                .with_velocity(Vector2::new(0.0, sun_mass.sqrt())),
        );

        let solver = gravity::from_config(&GravityConfig::all_pairs()).unwrap();
        for _ in 0..2000 {
            world.apply_gravity(solver.as_ref());
            world.step();
        }

        let r = world.body(planet).unwrap().position.coords.norm();
        assert!((25.0..35.0).contains(&r), "orbit radius drifted to {r}");
    }

    #[test]
    fn test_every_world_config_steps() {
        for broad_phase in [
            BroadPhaseConfig::spatial_hashing(8.0),
            BroadPhaseConfig::sweep_and_prune(),
            BroadPhaseConfig::quad_tree(2.0),
            BroadPhaseConfig::predictive(8.0),
        ] {
            let mut world =
                World::from_config(&WorldConfig::with_timestep(0.1).broad_phase(broad_phase))
                    .unwrap();
            for i in 0..20 {
                let angle = i as f64 * 0.3;
                world.add_body(
                    Body::new(
                        Point2::new(angle.cos() * 20.0, angle.sin() * 20.0),
                        Matter::hydrogen(5.0),
                    )
                    .with_velocity(Vector2::new(-angle.cos(), -angle.sin()) * 10.0),
                );
            }

            for _ in 0..30 {
                world.step();
                for hit in world.find_collisions().unwrap() {
                    assert!((0.0..=1.0).contains(&hit.t));
                    assert!(hit.a < hit.b);
                }
            }
            assert!(world.validate().is_ok());
        }
    }
}
