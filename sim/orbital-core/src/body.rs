//! Circular point-mass bodies.
//!
//! A [`Body`] carries its own semi-implicit Euler step and the analytic
//! swept-circle time-of-impact test used as the narrow phase. Radius is never
//! stored: it is derived from the body's [`Matter`] on every call, so bodies
//! grow and shrink as matter is added or removed.
//!
//! # Example
//!
//! ```
//! use orbital_core::Body;
//! use orbital_types::Matter;
//! use nalgebra::{Point2, Vector2};
//!
//! let mut a = Body::new(Point2::new(0.0, 0.0), Matter::hydrogen(10.0))
//!     .with_velocity(Vector2::new(10.0, 0.0));
//! let mut b = Body::new(Point2::new(5.0, 0.0), Matter::hydrogen(10.0));
//!
//! a.step(1.0);
//! b.step(1.0);
//!
//! let t = a.collision_t(&b).unwrap();
//! assert!((0.0..=1.0).contains(&t));
//! ```

use std::f64::consts::PI;

use nalgebra::{Point2, Vector2};
use orbital_types::{BodyId, Matter};

use crate::broad_phase::{Aabb, BodyProxy};

/// Relative motion below this squared length is treated as no motion.
const MIN_RELATIVE_MOTION_SQ: f64 = 1e-18;

/// A circular point mass in the simulation world.
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    id: BodyId,
    /// Position at the end of the last step.
    pub position: Point2<f64>,
    /// Position at the start of the last step.
    pub previous_position: Point2<f64>,
    /// Render-time blend between `previous_position` and `position`.
    pub interpolated_position: Point2<f64>,
    /// Where the body will be after one more step at its current velocity.
    pub projected_next_position: Point2<f64>,
    /// Linear momentum.
    pub momentum: Vector2<f64>,
    /// Momentum at the start of the last step.
    pub previous_momentum: Vector2<f64>,
    /// Accumulated force (cleared each step).
    pub force: Vector2<f64>,
    /// Force that was applied during the last step.
    pub previous_force: Vector2<f64>,
    /// Accumulated one-shot impulse (cleared each step).
    pub impulse: Vector2<f64>,
    /// Composition; determines mass, density and radius.
    pub matter: Matter,
}

impl Body {
    /// Create a body at rest at `position`.
    #[must_use]
    pub fn new(position: Point2<f64>, matter: Matter) -> Self {
        Self {
            id: BodyId::default(),
            position,
            previous_position: position,
            interpolated_position: position,
            projected_next_position: position,
            momentum: Vector2::zeros(),
            previous_momentum: Vector2::zeros(),
            force: Vector2::zeros(),
            previous_force: Vector2::zeros(),
            impulse: Vector2::zeros(),
            matter,
        }
    }

    /// Set the initial velocity (momentum is derived from the current mass).
    #[must_use]
    pub fn with_velocity(mut self, velocity: Vector2<f64>) -> Self {
        self.momentum = velocity * self.mass();
        self
    }

    /// Set the initial momentum.
    #[must_use]
    pub fn with_momentum(mut self, momentum: Vector2<f64>) -> Self {
        self.momentum = momentum;
        self
    }

    /// Identifier assigned by the owning world.
    ///
    /// Bodies that have not been added to a world report `BodyId(0)`.
    #[must_use]
    pub fn id(&self) -> BodyId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: BodyId) {
        self.id = id;
    }

    /// Total mass of the body's matter.
    #[must_use]
    pub fn mass(&self) -> f64 {
        self.matter.mass()
    }

    /// Density of the body's matter.
    #[must_use]
    pub fn density(&self) -> f64 {
        self.matter.density()
    }

    /// Radius of a disc of this mass and density.
    #[must_use]
    pub fn radius(&self) -> f64 {
        let mass = self.mass();
        let density = self.density();
        if mass <= 0.0 || density <= 0.0 {
            return 0.0;
        }
        (mass / (PI * density)).sqrt()
    }

    /// Circumference of the body.
    #[must_use]
    pub fn circumference(&self) -> f64 {
        2.0 * PI * self.radius()
    }

    /// Velocity (`momentum / mass`); zero for massless bodies.
    #[must_use]
    pub fn velocity(&self) -> Vector2<f64> {
        let mass = self.mass();
        if mass <= 0.0 {
            Vector2::zeros()
        } else {
            self.momentum / mass
        }
    }

    /// Kinetic energy `|p|² / 2m`.
    #[must_use]
    pub fn kinetic_energy(&self) -> f64 {
        let mass = self.mass();
        if mass <= 0.0 {
            0.0
        } else {
            self.momentum.norm_squared() / (2.0 * mass)
        }
    }

    /// Accumulate a force for the next step.
    pub fn apply_force(&mut self, force: Vector2<f64>) {
        self.force += force;
    }

    /// Accumulate an impulse for the next step.
    pub fn apply_impulse(&mut self, impulse: Vector2<f64>) {
        self.impulse += impulse;
    }

    /// Rigidly offset every position field (used for world recentering).
    pub fn translate(&mut self, offset: Vector2<f64>) {
        self.position += offset;
        self.previous_position += offset;
        self.interpolated_position += offset;
        self.projected_next_position += offset;
    }

    /// Advance the body by `dt` using semi-implicit Euler.
    ///
    /// ```text
    /// p += F·dt + J
    /// x += (p / m)·dt
    /// ```
    ///
    /// The pre-step position, momentum and force are kept in the `previous_*`
    /// fields, and force and impulse are cleared.
    pub fn step(&mut self, dt: f64) {
        self.previous_force = self.force;
        self.previous_momentum = self.momentum;
        self.previous_position = self.position;

        self.momentum += self.force * dt + self.impulse;

        let velocity = self.velocity();
        self.position += velocity * dt;
        self.projected_next_position = self.position + velocity * dt;

        self.force = Vector2::zeros();
        self.impulse = Vector2::zeros();
    }

    /// Swept bounding box of the last step.
    #[must_use]
    pub fn aabb(&self) -> Aabb {
        Aabb::swept(self.previous_position, self.position, self.radius())
    }

    /// Swept bounding box of the upcoming step.
    #[must_use]
    pub fn projected_aabb(&self) -> Aabb {
        Aabb::swept(self.position, self.projected_next_position, self.radius())
    }

    /// Static circle-circle overlap at the current positions.
    #[must_use]
    pub fn is_overlapping(&self, other: &Self) -> bool {
        let total = self.radius() + other.radius();
        (other.position - self.position).norm_squared() < total * total
    }

    /// Time of impact with `other` over the last step, as a fraction in `[0, 1]`.
    ///
    /// Both bodies are assumed to move linearly from `previous_position` to
    /// `position`. Returns `Some(0.0)` if they already overlapped at the start
    /// of the step and `None` if they never touch within it.
    #[must_use]
    pub fn collision_t(&self, other: &Self) -> Option<f64> {
        swept_collision_t(
            self.previous_position,
            self.position,
            self.radius(),
            other.previous_position,
            other.position,
            other.radius(),
        )
    }

    /// Snapshot of the data broad phases need.
    #[must_use]
    pub fn proxy(&self) -> BodyProxy {
        BodyProxy {
            id: self.id,
            previous_position: self.previous_position,
            position: self.position,
            projected_next_position: self.projected_next_position,
            radius: self.radius(),
        }
    }
}

/// First contact time of two circles moving linearly over one step.
///
/// Solves `|d + v·t|² = (ra + rb)²` where `d` is the start separation and `v`
/// the relative displacement, and returns the smaller root if it lies in
/// `[0, 1]`. Circles already overlapping at `t = 0` return `Some(0.0)`.
#[must_use]
pub fn swept_collision_t(
    a_start: Point2<f64>,
    a_end: Point2<f64>,
    a_radius: f64,
    b_start: Point2<f64>,
    b_end: Point2<f64>,
    b_radius: f64,
) -> Option<f64> {
    let start_distance = b_start - a_start;
    let relative_motion = (b_end - b_start) - (a_end - a_start);
    let total_radius = a_radius + b_radius;

    let c = start_distance.norm_squared() - total_radius * total_radius;
    if c < 0.0 {
        return Some(0.0);
    }

    let a = relative_motion.norm_squared();
    if a < MIN_RELATIVE_MOTION_SQ {
        return None;
    }

    let b = 2.0 * relative_motion.dot(&start_distance);
    let discriminant = b * b - 4.0 * a * c;
    if discriminant < 0.0 {
        return None;
    }

    let t = (-b - discriminant.sqrt()) / (2.0 * a);
    (0.0..=1.0).contains(&t).then_some(t)
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
    use approx::assert_relative_eq;

    fn body_at(x: f64, y: f64, mass: f64) -> Body {
        Body::new(Point2::new(x, y), Matter::hydrogen(mass))
    }

    /// Put a body on a fixed segment for one step.
    fn swept(start: Point2<f64>, end: Point2<f64>, mass: f64) -> Body {
        let mut body = Body::new(end, Matter::hydrogen(mass));
        body.previous_position = start;
        body
    }

    #[test]
    fn test_radius_from_mass_and_density() {
        let body = body_at(0.0, 0.0, 10.0 * PI);
        // density 10, mass 10π -> r = 1
        assert_relative_eq!(body.radius(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(body.circumference(), 2.0 * PI, epsilon = 1e-12);
    }

    #[test]
    fn test_massless_body() {
        let body = Body::new(Point2::origin(), Matter::new()).with_momentum(Vector2::new(1.0, 0.0));
        assert_eq!(body.radius(), 0.0);
        assert_eq!(body.velocity(), Vector2::zeros());
        assert_eq!(body.kinetic_energy(), 0.0);
    }

    #[test]
    fn test_radius_grows_with_matter() {
        let mut body = body_at(0.0, 0.0, 10.0);
        let before = body.radius();
        body.matter += Matter::hydrogen(1.0);
        assert!(body.radius() > before);
    }

    #[test]
    fn test_step_semi_implicit_euler() {
        let mut body = body_at(1.0, 2.0, 2.0).with_velocity(Vector2::new(1.0, 0.0));
        body.apply_force(Vector2::new(0.0, 4.0));
        body.apply_impulse(Vector2::new(2.0, 0.0));

        body.step(0.5);

        // p = (2, 0) + (0, 4)·0.5 + (2, 0) = (4, 2); v = (2, 1)
        assert_relative_eq!(body.momentum, Vector2::new(4.0, 2.0), epsilon = 1e-12);
        assert_relative_eq!(body.position, Point2::new(2.0, 2.5), epsilon = 1e-12);
        assert_relative_eq!(
            body.projected_next_position,
            Point2::new(3.0, 3.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_step_clears_accumulators_and_snapshots() {
        let mut body = body_at(3.0, -1.0, 5.0).with_velocity(Vector2::new(0.5, 0.5));
        body.apply_force(Vector2::new(1.0, 2.0));
        body.apply_impulse(Vector2::new(-1.0, 0.0));

        let position = body.position;
        let momentum = body.momentum;
        let force = body.force;

        body.step(0.1);

        assert_eq!(body.force, Vector2::zeros());
        assert_eq!(body.impulse, Vector2::zeros());
        assert_eq!(body.previous_position, position);
        assert_eq!(body.previous_momentum, momentum);
        assert_eq!(body.previous_force, force);
    }

    #[test]
    fn test_translate_moves_every_position() {
        let mut body = body_at(0.0, 0.0, 1.0).with_velocity(Vector2::new(1.0, 0.0));
        body.step(1.0);
        body.translate(Vector2::new(10.0, -10.0));

        assert_eq!(body.position, Point2::new(11.0, -10.0));
        assert_eq!(body.previous_position, Point2::new(10.0, -10.0));
        assert_eq!(body.interpolated_position, Point2::new(10.0, -10.0));
        assert_eq!(body.projected_next_position, Point2::new(12.0, -10.0));
    }

    #[test]
    fn test_head_on_collision_t() {
        // r = 1 each, closing from 10 apart at 20 units per step.
        let mass = 10.0 * PI;
        let a = swept(Point2::new(0.0, 0.0), Point2::new(10.0, 0.0), mass);
        let b = swept(Point2::new(10.0, 0.0), Point2::new(0.0, 0.0), mass);

        let t = a.collision_t(&b).unwrap();
        // gap 8 closed at 20 per step
        assert_relative_eq!(t, 0.4, epsilon = 1e-12);
        assert_relative_eq!(b.collision_t(&a).unwrap(), t, epsilon = 1e-12);
    }

    #[test]
    fn test_collision_t_contact_distance() {
        let mass = 10.0 * PI;
        let a = swept(Point2::new(0.0, 0.0), Point2::new(4.0, 3.0), mass);
        let b = swept(Point2::new(6.0, 0.0), Point2::new(2.0, 2.0), mass);

        let t = a.collision_t(&b).unwrap();
        let pa = a.previous_position + (a.position - a.previous_position) * t;
        let pb = b.previous_position + (b.position - b.previous_position) * t;
        assert_relative_eq!((pb - pa).norm(), a.radius() + b.radius(), epsilon = 1e-9);
    }

    #[test]
    fn test_already_overlapping_returns_zero() {
        let mass = 10.0 * PI;
        let a = swept(Point2::new(0.0, 0.0), Point2::new(-50.0, 0.0), mass);
        let b = swept(Point2::new(1.5, 0.0), Point2::new(50.0, 0.0), mass);
        assert_eq!(a.collision_t(&b), Some(0.0));
    }

    #[test]
    fn test_divergent_paths_never_collide() {
        let mass = 10.0 * PI;
        let a = swept(Point2::new(0.0, 0.0), Point2::new(-5.0, 0.0), mass);
        let b = swept(Point2::new(3.0, 0.0), Point2::new(8.0, 0.0), mass);
        assert_eq!(a.collision_t(&b), None);
    }

    #[test]
    fn test_miss_and_out_of_range() {
        let mass = 10.0 * PI;
        // Parallel paths 5 apart.
        let a = swept(Point2::new(0.0, 0.0), Point2::new(10.0, 0.0), mass);
        let b = swept(Point2::new(0.0, 5.0), Point2::new(10.0, 5.0), mass);
        assert_eq!(a.collision_t(&b), None);

        // Approaching but would only touch after the step ends.
        let a = swept(Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), mass);
        let b = swept(Point2::new(10.0, 0.0), Point2::new(9.0, 0.0), mass);
        assert_eq!(a.collision_t(&b), None);
    }

    #[test]
    fn test_relatively_stationary_bodies() {
        let mass = 10.0 * PI;
        let a = swept(Point2::new(0.0, 0.0), Point2::new(5.0, 0.0), mass);
        let b = swept(Point2::new(3.0, 0.0), Point2::new(8.0, 0.0), mass);
        assert_eq!(a.collision_t(&b), None);
    }

    #[test]
    fn test_is_overlapping() {
        let mass = 10.0 * PI;
        let a = body_at(0.0, 0.0, mass);
        assert!(a.is_overlapping(&body_at(1.9, 0.0, mass)));
        assert!(!a.is_overlapping(&body_at(2.1, 0.0, mass)));
    }

    #[test]
    fn test_aabbs() {
        let mass = 10.0 * PI;
        let mut body = body_at(0.0, 0.0, mass).with_velocity(Vector2::new(2.0, -1.0));
        body.step(1.0);

        let aabb = body.aabb();
        assert_relative_eq!(aabb.min, Point2::new(-1.0, -2.0), epsilon = 1e-12);
        assert_relative_eq!(aabb.max, Point2::new(3.0, 1.0), epsilon = 1e-12);

        let projected = body.projected_aabb();
        assert_relative_eq!(projected.min, Point2::new(1.0, -3.0), epsilon = 1e-12);
        assert_relative_eq!(projected.max, Point2::new(5.0, 0.0), epsilon = 1e-12);
    }
}
