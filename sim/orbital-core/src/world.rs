//! Body store, stepping and the collision feed.
//!
//! The [`World`] exclusively owns every [`Body`]. Other components refer to
//! bodies through the [`BodyId`] handed out by [`World::add_body`]; only the
//! caller driving the frame loop mutates bodies (forces, impulses, steps).
//!
//! Collisions are *reported*, never resolved: [`World::find_collisions`]
//! returns each touching pair once with its time of impact inside the last
//! step, and what happens next is up to the caller.

use hashbrown::HashMap;
use nalgebra::{Point2, Vector2};
use orbital_types::{validate_timestep, BodyId, PhysicsError, Result, WorldConfig};
use tracing::{debug, trace};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::body::Body;
use crate::broad_phase::{self, BroadPhase, SpatialHashing};
use crate::gravity::GravitySolver;

/// A pair of bodies touching during the last step.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Collision {
    /// Time of impact as a fraction of the step, in `[0, 1]`.
    pub t: f64,
    /// The body added to the world first.
    pub a: BodyId,
    /// The body added to the world second.
    pub b: BodyId,
}

/// The simulation world.
#[derive(Debug)]
pub struct World {
    /// Fixed timestep used by [`World::step`].
    timestep: f64,
    /// Number of completed steps.
    step_count: u64,
    /// Bodies in insertion order.
    bodies: Vec<Body>,
    /// Body id to position in `bodies`.
    index: HashMap<BodyId, usize>,
    /// Next available body ID.
    next_body_id: u64,
    /// Candidate-pair generator.
    broad_phase: Box<dyn BroadPhase>,
}

impl Default for World {
    fn default() -> Self {
        Self::with_parts(
            WorldConfig::default().timestep,
            Box::new(SpatialHashing::default()),
        )
    }
}

impl Clone for World {
    /// Deep copy with a fresh broad phase of the same kind.
    fn clone(&self) -> Self {
        self.clone_with(self.broad_phase.fresh())
    }
}

impl World {
    /// Create an empty world.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError::InvalidTimestep`] unless `timestep` is positive
    /// and finite.
    pub fn new(timestep: f64, broad_phase: Box<dyn BroadPhase>) -> Result<Self> {
        validate_timestep(timestep)?;
        Ok(Self::with_parts(timestep, broad_phase))
    }

    /// Create an empty world from a configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn from_config(config: &WorldConfig) -> Result<Self> {
        config.validate()?;
        let broad_phase = broad_phase::from_config(&config.broad_phase)?;
        Ok(Self::with_parts(config.timestep, broad_phase))
    }

    fn with_parts(timestep: f64, mut broad_phase: Box<dyn BroadPhase>) -> Self {
        broad_phase.update_bodies(&[]);
        debug!(timestep, broad_phase = broad_phase.name(), "world created");

        Self {
            timestep,
            step_count: 0,
            bodies: Vec::new(),
            index: HashMap::new(),
            next_body_id: 1,
            broad_phase,
        }
    }

    /// Deep copy of this world driven by `broad_phase`.
    ///
    /// Bodies keep their ids and full kinematic state, so the copy can be
    /// stepped speculatively without touching this world.
    #[must_use]
    pub fn clone_with(&self, mut broad_phase: Box<dyn BroadPhase>) -> Self {
        broad_phase.update_bodies(&self.bodies);
        debug!(
            bodies = self.bodies.len(),
            broad_phase = broad_phase.name(),
            "world cloned"
        );

        Self {
            timestep: self.timestep,
            step_count: self.step_count,
            bodies: self.bodies.clone(),
            index: self.index.clone(),
            next_body_id: self.next_body_id,
            broad_phase,
        }
    }

    /// Get the fixed timestep.
    #[must_use]
    pub fn timestep(&self) -> f64 {
        self.timestep
    }

    /// Change the fixed timestep.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError::InvalidTimestep`] and leaves the timestep
    /// unchanged unless `timestep` is positive and finite.
    pub fn set_timestep(&mut self, timestep: f64) -> Result<()> {
        validate_timestep(timestep)?;
        self.timestep = timestep;
        Ok(())
    }

    /// Get the step count.
    #[must_use]
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Get the number of bodies.
    #[must_use]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Whether the world holds no bodies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// The active broad phase.
    #[must_use]
    pub fn broad_phase(&self) -> &dyn BroadPhase {
        self.broad_phase.as_ref()
    }

    /// Swap the broad phase. The new one is primed with the current bodies.
    pub fn set_broad_phase(&mut self, mut broad_phase: Box<dyn BroadPhase>) {
        broad_phase.update_bodies(&self.bodies);
        debug!(
            from = self.broad_phase.name(),
            to = broad_phase.name(),
            "broad phase replaced"
        );
        self.broad_phase = broad_phase;
    }

    // =========================================================================
    // Body Management
    // =========================================================================

    /// Add a body to the world and return its ID.
    ///
    /// The body is stepped once with the world timestep so that its previous
    /// and current positions are consistent with bodies already present.
    pub fn add_body(&mut self, mut body: Body) -> BodyId {
        let id = BodyId::new(self.next_body_id);
        self.next_body_id += 1;

        body.set_id(id);
        body.step(self.timestep);

        self.index.insert(id, self.bodies.len());
        self.bodies.push(body);
        id
    }

    /// Remove a body from the world.
    ///
    /// The remaining bodies keep their relative insertion order.
    pub fn remove_body(&mut self, id: BodyId) -> Option<Body> {
        let position = self.index.remove(&id)?;
        let body = self.bodies.remove(position);
        for (i, moved) in self.bodies.iter().enumerate().skip(position) {
            self.index.insert(moved.id(), i);
        }
        Some(body)
    }

    /// Remove every body. Ids are not reused.
    pub fn clear(&mut self) {
        self.bodies.clear();
        self.index.clear();
    }

    /// Get a body by ID.
    #[must_use]
    pub fn body(&self, id: BodyId) -> Option<&Body> {
        self.index.get(&id).map(|&i| &self.bodies[i])
    }

    /// Get a mutable reference to a body by ID.
    #[must_use]
    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut Body> {
        let i = *self.index.get(&id)?;
        self.bodies.get_mut(i)
    }

    /// All bodies in insertion order.
    #[must_use]
    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    /// Iterate over all bodies mutably.
    pub fn bodies_mut(&mut self) -> impl Iterator<Item = &mut Body> {
        self.bodies.iter_mut()
    }

    /// Iterate over all body IDs in insertion order.
    pub fn body_ids(&self) -> impl Iterator<Item = BodyId> + '_ {
        self.bodies.iter().map(Body::id)
    }

    // =========================================================================
    // Force Application
    // =========================================================================

    /// Apply `acceleration · mass` from `solver` as a force on every body.
    pub fn apply_gravity(&mut self, solver: &dyn GravitySolver) {
        let accelerations = solver.compute_accelerations(&self.bodies);
        for (body, acceleration) in self.bodies.iter_mut().zip(accelerations) {
            let mass = body.mass();
            body.apply_force(acceleration * mass);
        }
    }

    // =========================================================================
    // Simulation Control
    // =========================================================================

    /// Advance every body by one timestep and rebuild the broad phase.
    pub fn step(&mut self) {
        let dt = self.timestep;
        for body in &mut self.bodies {
            body.step(dt);
        }
        self.broad_phase.update_bodies(&self.bodies);
        self.step_count += 1;

        trace!(step = self.step_count, bodies = self.bodies.len(), "world stepped");
    }

    /// Pairs that touched during the last step, sorted by time of impact.
    ///
    /// Every qualifying pair is reported once. Ties in `t` are broken by the
    /// insertion order of the first body, then of the second. Pairs involving
    /// bodies added or removed since the last [`World::step`] are ignored.
    ///
    /// # Errors
    ///
    /// Propagates broad-phase errors.
    pub fn find_collisions(&mut self) -> Result<Vec<Collision>> {
        let candidates = self.broad_phase.collisions()?;
        let candidate_count = candidates.len();

        let mut pairs: Vec<(usize, usize)> = candidates
            .into_iter()
            .filter_map(|(a, b)| {
                let (i, j) = (*self.index.get(&a)?, *self.index.get(&b)?);
                (i != j).then(|| (i.min(j), i.max(j)))
            })
            .collect();
        pairs.sort_unstable();
        pairs.dedup();

        let bodies = &self.bodies;
        let narrow = |&(i, j): &(usize, usize)| {
            bodies[i].collision_t(&bodies[j]).map(|t| (t, i, j))
        };

        #[cfg(feature = "parallel")]
        let mut hits: Vec<(f64, usize, usize)> = pairs.par_iter().filter_map(narrow).collect();
        #[cfg(not(feature = "parallel"))]
        let mut hits: Vec<(f64, usize, usize)> = pairs.iter().filter_map(narrow).collect();

        hits.sort_by(|x, y| x.0.total_cmp(&y.0).then(x.1.cmp(&y.1)).then(x.2.cmp(&y.2)));

        trace!(
            candidates = candidate_count,
            pairs = pairs.len(),
            collisions = hits.len(),
            "collision pass"
        );

        Ok(hits
            .into_iter()
            .map(|(t, i, j)| Collision {
                t,
                a: bodies[i].id(),
                b: bodies[j].id(),
            })
            .collect())
    }

    /// Blend every body's render position between its previous and current
    /// position. `t` is clamped to `[0, 1]`; simulation state is untouched.
    pub fn interpolate_linear(&mut self, t: f64) {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        for body in &mut self.bodies {
            body.interpolated_position =
                Point2::from(body.previous_position.coords * (1.0 - t) + body.position.coords * t);
        }
    }

    /// Bodies the broad phase places within `radius` of body `id`.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError::InvalidBodyId`] for an unknown body and
    /// propagates broad-phase errors.
    pub fn nearest(&self, id: BodyId, radius: f64) -> Result<Vec<BodyId>> {
        let body = self.body(id).ok_or(PhysicsError::InvalidBodyId(id.raw()))?;
        self.broad_phase.nearest(body, radius)
    }

    /// Validate the world state.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The timestep is invalid
    /// - Any body has a non-finite position or momentum
    pub fn validate(&self) -> Result<()> {
        validate_timestep(self.timestep)?;

        for body in &self.bodies {
            let finite = body.position.coords.iter().all(|v| v.is_finite())
                && body.momentum.iter().all(|v| v.is_finite());
            if !finite {
                return Err(PhysicsError::diverged(format!(
                    "{} has non-finite state",
                    body.id()
                )));
            }
        }

        Ok(())
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Total mass of all bodies.
    #[must_use]
    pub fn total_mass(&self) -> f64 {
        self.bodies.iter().map(Body::mass).sum()
    }

    /// Total linear momentum of the system.
    #[must_use]
    pub fn total_momentum(&self) -> Vector2<f64> {
        self.bodies
            .iter()
            .fold(Vector2::zeros(), |acc, b| acc + b.momentum)
    }

    /// Total kinetic energy of the system.
    #[must_use]
    pub fn total_kinetic_energy(&self) -> f64 {
        self.bodies.iter().map(Body::kinetic_energy).sum()
    }

    /// Mass-weighted center of all bodies, if any carry mass.
    #[must_use]
    pub fn center_of_mass(&self) -> Option<Point2<f64>> {
        let mut total_mass = 0.0;
        let mut weighted_pos = Vector2::zeros();

        for body in &self.bodies {
            let mass = body.mass();
            total_mass += mass;
            weighted_pos += body.position.coords * mass;
        }

        (total_mass > 0.0).then(|| Point2::from(weighted_pos / total_mass))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use crate::broad_phase::{PredictiveSpatialHashing, QuadTreeBroadPhase, SweepAndPrune};
    use crate::gravity::AllPairsGravity;
    use approx::assert_relative_eq;
    use orbital_types::{BroadPhaseConfig, Matter};
    use std::f64::consts::PI;

    /// Unit-radius body.
    fn disc(x: f64, y: f64) -> Body {
        Body::new(Point2::new(x, y), Matter::hydrogen(10.0 * PI))
    }

    fn world(timestep: f64) -> World {
        World::new(timestep, Box::new(SpatialHashing::new(4.0).unwrap())).unwrap()
    }

    #[test]
    fn test_new_rejects_bad_timestep() {
        for timestep in [0.0, -0.1, f64::NAN, f64::INFINITY] {
            let err = World::new(timestep, Box::new(SweepAndPrune::new())).unwrap_err();
            assert!(err.is_config_error());
        }

        let err = World::from_config(&WorldConfig::with_timestep(-1.0)).unwrap_err();
        assert!(matches!(err, PhysicsError::InvalidTimestep(_)));
    }

    #[test]
    fn test_set_timestep() {
        let mut world = World::default();
        assert_eq!(world.timestep(), 0.2);

        world.set_timestep(0.05).unwrap();
        assert_eq!(world.timestep(), 0.05);

        assert!(world.set_timestep(0.0).is_err());
        assert_eq!(world.timestep(), 0.05);
    }

    #[test]
    fn test_add_body_assigns_ids_and_steps_once() {
        let mut world = world(0.5);
        let a = world.add_body(disc(0.0, 0.0).with_velocity(Vector2::new(2.0, 0.0)));
        let b = world.add_body(disc(10.0, 0.0));

        assert_eq!(a, BodyId::new(1));
        assert_eq!(b, BodyId::new(2));
        assert_eq!(world.body_count(), 2);

        let body = world.body(a).unwrap();
        assert_eq!(body.id(), a);
        assert_eq!(body.previous_position, Point2::new(0.0, 0.0));
        assert_relative_eq!(body.position, Point2::new(1.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(body.projected_next_position, Point2::new(2.0, 0.0), epsilon = 1e-12);
        assert_eq!(world.step_count(), 0);
    }

    #[test]
    fn test_remove_body_keeps_order() {
        let mut world = world(0.1);
        let ids: Vec<_> = (0..4).map(|i| world.add_body(disc(f64::from(i) * 10.0, 0.0))).collect();

        let removed = world.remove_body(ids[1]).unwrap();
        assert_eq!(removed.id(), ids[1]);
        assert!(world.remove_body(ids[1]).is_none());

        assert_eq!(world.body_ids().collect::<Vec<_>>(), vec![ids[0], ids[2], ids[3]]);
        assert_eq!(world.body(ids[3]).unwrap().position.x, 30.0);

        // ids are never reused
        assert_eq!(world.add_body(disc(0.0, 50.0)), BodyId::new(5));
    }

    #[test]
    fn test_clear() {
        let mut world = world(0.1);
        world.add_body(disc(0.0, 0.0));
        world.add_body(disc(5.0, 0.0));
        world.clear();

        assert!(world.is_empty());
        assert_eq!(world.total_mass(), 0.0);
        assert!(world.center_of_mass().is_none());
    }

    #[test]
    fn test_step_integrates_and_clears_accumulators() {
        let mut world = world(0.1);
        let id = world.add_body(disc(0.0, 0.0));
        let mass = world.body(id).unwrap().mass();

        world.body_mut(id).unwrap().apply_force(Vector2::new(mass, 0.0));
        world.step();

        let body = world.body(id).unwrap();
        assert_relative_eq!(body.velocity(), Vector2::new(0.1, 0.0), epsilon = 1e-12);
        assert_eq!(body.force, Vector2::zeros());
        assert_eq!(body.previous_force, Vector2::new(mass, 0.0));
        assert_eq!(world.step_count(), 1);
    }

    #[test]
    fn test_find_collisions_on_empty_world() {
        let mut world = World::default();
        assert!(world.find_collisions().unwrap().is_empty());
    }

    #[test]
    fn test_head_on_collision_with_every_broad_phase() {
        let phases: Vec<Box<dyn BroadPhase>> = vec![
            Box::new(SpatialHashing::new(4.0).unwrap()),
            Box::new(SweepAndPrune::new()),
            Box::new(QuadTreeBroadPhase::new(1.0).unwrap()),
            Box::new(PredictiveSpatialHashing::new(4.0).unwrap()),
        ];

        for broad_phase in phases {
            let name = broad_phase.name();
            let mut world = World::new(1.0, broad_phase).unwrap();
            // Each body moves 3 per step; the first step is taken by add_body.
            let a = world.add_body(disc(-3.0, 0.0).with_velocity(Vector2::new(3.0, 0.0)));
            let b = world.add_body(disc(7.0, 0.0).with_velocity(Vector2::new(-3.0, 0.0)));

            // Gap 2 closing at 6: contact a third into the next step.
            world.step();
            let collisions = world.find_collisions().unwrap();
            assert_eq!(collisions.len(), 1, "{name}");

            let hit = collisions[0];
            assert_eq!((hit.a, hit.b), (a, b), "{name}");
            assert_relative_eq!(hit.t, 1.0 / 3.0, epsilon = 1e-9);

            world.interpolate_linear(hit.t);
            let gap = world.body(b).unwrap().interpolated_position
                - world.body(a).unwrap().interpolated_position;
            assert_relative_eq!(gap.norm(), 2.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_collisions_sorted_with_insertion_tie_break() {
        let mut world = world(1.0);
        let ids: Vec<_> = [(0.0, 0.0), (1.0, 0.0), (0.5, 0.5)]
            .into_iter()
            .map(|(x, y)| world.add_body(disc(x, y)))
            .collect();
        // Sweeps from x = -10 to x = 20 during the next step, through all three.
        let fast = world.add_body(disc(-40.0, 0.0).with_velocity(Vector2::new(30.0, 0.0)));

        world.step();
        let collisions = world.find_collisions().unwrap();
        let order: Vec<_> = collisions.iter().map(|c| (c.a, c.b)).collect();

        assert_eq!(
            order[..3],
            [(ids[0], ids[1]), (ids[0], ids[2]), (ids[1], ids[2])]
        );
        assert!(collisions[..3].iter().all(|c| c.t == 0.0));
        assert_eq!(order.len(), 6);
        assert!(order[3..].iter().all(|&(_, b)| b == fast));
        assert!(collisions[3..].iter().all(|c| c.t > 0.0));
        assert!(collisions.windows(2).all(|w| w[0].t <= w[1].t));
    }

    #[test]
    fn test_removed_bodies_are_not_reported() {
        let mut world = world(0.1);
        let a = world.add_body(disc(0.0, 0.0));
        world.add_body(disc(0.5, 0.0));
        world.step();

        world.remove_body(a);
        assert!(world.find_collisions().unwrap().is_empty());
    }

    #[test]
    fn test_interpolate_linear_bounds() {
        let mut world = world(1.0);
        let id = world.add_body(disc(0.0, 0.0).with_velocity(Vector2::new(4.0, 2.0)));
        let (previous, current) = {
            let body = world.body(id).unwrap();
            (body.previous_position, body.position)
        };

        world.interpolate_linear(0.0);
        assert_eq!(world.body(id).unwrap().interpolated_position, previous);

        world.interpolate_linear(1.0);
        assert_eq!(world.body(id).unwrap().interpolated_position, current);

        world.interpolate_linear(-3.0);
        assert_eq!(world.body(id).unwrap().interpolated_position, previous);

        world.interpolate_linear(7.0);
        assert_eq!(world.body(id).unwrap().interpolated_position, current);

        world.interpolate_linear(0.5);
        assert_relative_eq!(
            world.body(id).unwrap().interpolated_position,
            Point2::new(2.0, 1.0),
            epsilon = 1e-12
        );
        // rendering state only
        assert_eq!(world.body(id).unwrap().position, current);
    }

    #[test]
    fn test_clone_is_independent() {
        let mut world = World::from_config(&WorldConfig::with_timestep(0.1)).unwrap();
        let id = world.add_body(disc(0.0, 0.0).with_velocity(Vector2::new(1.0, 0.0)));
        world.step();

        let mut speculative = world.clone();
        assert_eq!(speculative.broad_phase().name(), world.broad_phase().name());
        assert_eq!(speculative.body(id), world.body(id));

        speculative.body_mut(id).unwrap().apply_impulse(Vector2::new(100.0, 0.0));
        for _ in 0..10 {
            speculative.step();
        }

        assert_eq!(world.step_count(), 1);
        assert_relative_eq!(world.body(id).unwrap().position.x, 0.2, epsilon = 1e-12);
        assert!(speculative.body(id).unwrap().position.x > 1.0);
    }

    #[test]
    fn test_clone_with_other_broad_phase() {
        let mut world = world(0.1);
        world.add_body(disc(0.0, 0.0));
        world.add_body(disc(0.5, 0.0));
        world.step();

        let mut copy = world.clone_with(Box::new(SweepAndPrune::new()));
        assert_eq!(copy.broad_phase().name(), "sweep and prune");
        assert_eq!(copy.find_collisions().unwrap().len(), 1);
    }

    #[test]
    fn test_set_broad_phase_is_primed() {
        let mut world = world(0.1);
        world.add_body(disc(0.0, 0.0));
        world.add_body(disc(0.5, 0.0));

        world.set_broad_phase(broad_phase::from_config(&BroadPhaseConfig::quad_tree(0.5)).unwrap());
        assert_eq!(world.find_collisions().unwrap().len(), 1);
    }

    #[test]
    fn test_apply_gravity() {
        let mut world = world(0.1);
        let a = world.add_body(disc(0.0, 0.0));
        let b = world.add_body(disc(10.0, 0.0));

        world.apply_gravity(&AllPairsGravity::new());

        let (fa, fb) = (world.body(a).unwrap().force, world.body(b).unwrap().force);
        // m² / r along the axis with m = 10π, r = 10
        let expected = 10.0 * PI * 10.0 * PI / 10.0;
        assert_relative_eq!(fa, Vector2::new(expected, 0.0), epsilon = 1e-9);
        assert_relative_eq!(fa + fb, Vector2::zeros(), epsilon = 1e-9);
    }

    #[test]
    fn test_nearest() {
        let mut world = world(0.1);
        let a = world.add_body(disc(0.0, 0.0));
        let b = world.add_body(disc(3.0, 0.0));
        world.add_body(disc(40.0, 0.0));
        world.step();

        assert_eq!(world.nearest(a, 5.0).unwrap(), vec![b]);
        assert!(matches!(
            world.nearest(BodyId::new(99), 5.0),
            Err(PhysicsError::InvalidBodyId(99))
        ));
    }

    #[test]
    fn test_validate_detects_divergence() {
        let mut world = world(0.1);
        let id = world.add_body(disc(0.0, 0.0));
        assert!(world.validate().is_ok());

        world.body_mut(id).unwrap().momentum.x = f64::NAN;
        assert!(world.validate().unwrap_err().is_diverged());
    }

    #[test]
    fn test_diagnostics() {
        let mut world = world(0.1);
        world.add_body(disc(0.0, 0.0).with_velocity(Vector2::new(1.0, 0.0)));
        world.add_body(disc(4.0, 0.0).with_velocity(Vector2::new(-1.0, 0.0)));

        let mass = 10.0 * PI;
        assert_relative_eq!(world.total_mass(), 2.0 * mass, epsilon = 1e-9);
        assert_relative_eq!(world.total_momentum(), Vector2::zeros(), epsilon = 1e-9);
        assert_relative_eq!(world.total_kinetic_energy(), mass, epsilon = 1e-9);
        assert_relative_eq!(world.center_of_mass().unwrap(), Point2::new(2.0, 0.0), epsilon = 1e-9);
    }
}
