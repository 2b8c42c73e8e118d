//! Broad-phase collision detection.
//!
//! A broad phase turns the body list into a stream of candidate pairs whose
//! swept bounding boxes overlap. Candidates may include pairs that never
//! touch; [`Body::collision_t`](crate::Body::collision_t) is the authority.
//!
//! # Algorithms
//!
//! | Strategy | Structure | Rebuild |
//! |----------|-----------|---------|
//! | [`SpatialHashing`] | uniform hash grid | every update |
//! | [`SweepAndPrune`] | sorted endpoints on X and Y | incremental re-sort, full rebuild on body-set change |
//! | [`QuadTreeBroadPhase`] | AABB quad tree with a minimum cell size | every update |
//! | [`PredictiveSpatialHashing`] | hash grid plus a background one-step look-ahead | every update |
//!
//! Every implementation caches a [`BodyProxy`] snapshot per body in
//! [`BroadPhase::update_bodies`], so queries never borrow the world.
//!
//! # Example
//!
//! ```
//! use orbital_core::broad_phase::{BroadPhase, SpatialHashing};
//! use orbital_core::Body;
//! use orbital_types::Matter;
//! use nalgebra::Point2;
//!
//! let mut a = Body::new(Point2::new(0.0, 0.0), Matter::hydrogen(10.0));
//! let mut b = Body::new(Point2::new(0.5, 0.0), Matter::hydrogen(10.0));
//! a.step(0.1);
//! b.step(0.1);
//!
//! let mut grid = SpatialHashing::new(4.0).unwrap();
//! grid.update_bodies(&[a, b]);
//!
//! assert_eq!(grid.collisions().unwrap().len(), 1);
//! ```

mod hash_grid;
mod predictive;
mod quad_tree;
mod spatial_hashing;
mod sweep_and_prune;

pub use hash_grid::HashGrid;
pub use predictive::PredictiveSpatialHashing;
pub use quad_tree::QuadTreeBroadPhase;
pub use spatial_hashing::SpatialHashing;
pub use sweep_and_prune::SweepAndPrune;

use nalgebra::{Point2, Vector2};
use orbital_types::{BodyId, BroadPhaseAlgorithm, BroadPhaseConfig, Result};

use crate::body::Body;

/// An axis-aligned bounding box in the plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner of the bounding box.
    pub min: Point2<f64>,
    /// Maximum corner of the bounding box.
    pub max: Point2<f64>,
}

impl Aabb {
    /// Create a new AABB from minimum and maximum corners.
    #[must_use]
    pub const fn new(min: Point2<f64>, max: Point2<f64>) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at a point with the given half-extents.
    #[must_use]
    pub fn from_center(center: Point2<f64>, half_extents: Vector2<f64>) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Box covering a circle of `radius` moving from `start` to `end`.
    #[must_use]
    pub fn swept(start: Point2<f64>, end: Point2<f64>, radius: f64) -> Self {
        Self {
            min: Point2::new(start.x.min(end.x) - radius, start.y.min(end.y) - radius),
            max: Point2::new(start.x.max(end.x) + radius, start.y.max(end.y) + radius),
        }
    }

    /// Check if this AABB overlaps with another AABB (touching counts).
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    /// Check if a point lies inside or on the boundary.
    #[must_use]
    pub fn contains_point(&self, point: &Point2<f64>) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
    }

    /// Whether both corners are finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.min.coords.iter().chain(self.max.coords.iter()).all(|v| v.is_finite())
    }

    /// Expand this AABB by a margin on all sides.
    #[must_use]
    pub fn expanded(&self, margin: f64) -> Self {
        Self {
            min: Point2::new(self.min.x - margin, self.min.y - margin),
            max: Point2::new(self.max.x + margin, self.max.y + margin),
        }
    }

    /// Smallest box containing both.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: Point2::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            max: Point2::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        }
    }

    /// Width along X.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    /// Height along Y.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    /// Center point.
    #[must_use]
    pub fn center(&self) -> Point2<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    /// The four equal quadrants, ordered bottom-left, bottom-right, top-left,
    /// top-right.
    #[must_use]
    pub fn quadrants(&self) -> [Self; 4] {
        let c = self.center();
        [
            Self::new(self.min, c),
            Self::new(Point2::new(c.x, self.min.y), Point2::new(self.max.x, c.y)),
            Self::new(Point2::new(self.min.x, c.y), Point2::new(c.x, self.max.y)),
            Self::new(c, self.max),
        ]
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::new(Point2::origin(), Point2::origin())
    }
}

/// The slice of body state a broad phase keeps between updates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyProxy {
    /// Body the proxy stands for.
    pub id: BodyId,
    /// Start of the last step.
    pub previous_position: Point2<f64>,
    /// End of the last step.
    pub position: Point2<f64>,
    /// End of the upcoming step at constant velocity.
    pub projected_next_position: Point2<f64>,
    /// Radius at update time.
    pub radius: f64,
}

impl BodyProxy {
    /// Swept box of the last step.
    #[must_use]
    pub fn aabb(&self) -> Aabb {
        Aabb::swept(self.previous_position, self.position, self.radius)
    }

    /// Swept box of the upcoming step.
    #[must_use]
    pub fn projected_aabb(&self) -> Aabb {
        Aabb::swept(self.position, self.projected_next_position, self.radius)
    }
}

/// Trait for broad-phase collision detection algorithms.
///
/// Implementations are strategies owned by a [`World`](crate::World); the
/// world calls [`update_bodies`](Self::update_bodies) after every step and
/// [`collisions`](Self::collisions) when it looks for impacts.
pub trait BroadPhase: Send + std::fmt::Debug {
    /// Human-readable algorithm name, used in logs and errors.
    fn name(&self) -> &'static str;

    /// Rebuild internal structures from the bodies' swept boxes.
    fn update_bodies(&mut self, bodies: &[Body]);

    /// Candidate pairs whose swept boxes overlap.
    ///
    /// The same unordered pair may appear more than once and in either order.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError::NotInitialized`](orbital_types::PhysicsError::NotInitialized)
    /// if called before [`update_bodies`](Self::update_bodies).
    fn collisions(&mut self) -> Result<Vec<(BodyId, BodyId)>>;

    /// Bodies whose cached position lies within `radius` of `body`, excluding
    /// `body` itself.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError::NotInitialized`](orbital_types::PhysicsError::NotInitialized)
    /// if called before [`update_bodies`](Self::update_bodies).
    fn nearest(&self, body: &Body, radius: f64) -> Result<Vec<BodyId>>;

    /// A new, empty instance with the same configuration.
    fn fresh(&self) -> Box<dyn BroadPhase>;
}

/// Build the broad phase described by `config`.
///
/// # Errors
///
/// Returns an error if the configuration is invalid.
pub fn from_config(config: &BroadPhaseConfig) -> Result<Box<dyn BroadPhase>> {
    config.validate()?;

    Ok(match config.algorithm {
        BroadPhaseAlgorithm::SpatialHashing => Box::new(SpatialHashing::new(config.cell_size)?),
        BroadPhaseAlgorithm::SweepAndPrune => Box::new(SweepAndPrune::new()),
        BroadPhaseAlgorithm::QuadTree => Box::new(QuadTreeBroadPhase::new(config.cell_size)?),
        BroadPhaseAlgorithm::PredictiveSpatialHashing => {
            Box::new(PredictiveSpatialHashing::new(config.cell_size)?)
        }
    })
}

fn snapshot(bodies: &[Body]) -> Vec<BodyProxy> {
    bodies.iter().map(Body::proxy).collect()
}

/// Keep the candidates that really lie within `radius` of `body`.
fn within_radius(
    proxies: &[BodyProxy],
    candidates: impl IntoIterator<Item = usize>,
    body: &Body,
    radius: f64,
) -> Vec<BodyId> {
    let radius_sq = radius * radius;
    candidates
        .into_iter()
        .map(|i| &proxies[i])
        .filter(|proxy| proxy.id != body.id())
        .filter(|proxy| (proxy.position - body.position).norm_squared() <= radius_sq)
        .map(|proxy| proxy.id)
        .collect()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::similar_names,
    clippy::cast_precision_loss
)]
pub(crate) mod tests {
    use super::*;
    use nalgebra::Vector2;
    use orbital_types::Matter;
    use std::f64::consts::PI;

    /// A unit-radius body with the given id, stepped once at `velocity`.
    pub(crate) fn moving_body(id: u64, x: f64, y: f64, velocity: Vector2<f64>) -> Body {
        let mut body = Body::new(Point2::new(x, y), Matter::hydrogen(10.0 * PI))
            .with_velocity(velocity);
        body.set_id(BodyId::new(id));
        body.step(1.0);
        body
    }

    pub(crate) fn resting_body(id: u64, x: f64, y: f64) -> Body {
        moving_body(id, x, y, Vector2::zeros())
    }

    pub(crate) fn normalized(pairs: &[(BodyId, BodyId)]) -> std::collections::BTreeSet<(u64, u64)> {
        pairs
            .iter()
            .map(|&(a, b)| (a.raw().min(b.raw()), a.raw().max(b.raw())))
            .collect()
    }

    /// Scene shared by every strategy's tests: 1-2 overlap, 3 is isolated,
    /// 4 sweeps through 5 within one step.
    pub(crate) fn scene() -> Vec<Body> {
        vec![
            resting_body(1, 0.0, 0.0),
            resting_body(2, 1.5, 0.0),
            resting_body(3, 100.0, 100.0),
            moving_body(4, -50.0, 40.0, Vector2::new(100.0, 0.0)),
            resting_body(5, 0.0, 40.0),
        ]
    }

    pub(crate) fn check_scene(broad_phase: &mut dyn BroadPhase) {
        let err = broad_phase.collisions().unwrap_err();
        assert!(err.is_not_initialized(), "{} must fail fast", broad_phase.name());

        let bodies = scene();
        broad_phase.update_bodies(&bodies);
        let pairs = normalized(&broad_phase.collisions().unwrap());

        assert!(pairs.contains(&(1, 2)), "{}: overlap missed", broad_phase.name());
        assert!(pairs.contains(&(4, 5)), "{}: sweep missed", broad_phase.name());
        assert!(
            pairs.iter().all(|&(a, b)| a != 3 && b != 3),
            "{}: isolated body reported",
            broad_phase.name()
        );
        for &(a, b) in &pairs {
            assert_ne!(a, b, "{}: self pair", broad_phase.name());
        }
    }

    #[test]
    fn test_aabb_overlaps() {
        let a = Aabb::from_center(Point2::origin(), Vector2::new(1.0, 1.0));
        let b = Aabb::from_center(Point2::new(1.5, 0.0), Vector2::new(1.0, 1.0));
        let c = Aabb::from_center(Point2::new(5.0, 0.0), Vector2::new(1.0, 1.0));

        assert!(a.overlaps(&b), "a and b should overlap");
        assert!(b.overlaps(&a), "overlap should be symmetric");
        assert!(!a.overlaps(&c), "a and c should not overlap");

        let touching = Aabb::from_center(Point2::new(2.0, 0.0), Vector2::new(1.0, 1.0));
        assert!(a.overlaps(&touching));
    }

    #[test]
    fn test_aabb_swept_and_expanded() {
        let aabb = Aabb::swept(Point2::new(2.0, 0.0), Point2::new(-2.0, 1.0), 0.5);
        assert_eq!(aabb.min, Point2::new(-2.5, -0.5));
        assert_eq!(aabb.max, Point2::new(2.5, 1.5));

        let expanded = aabb.expanded(0.5);
        assert_eq!(expanded.min.x, -3.0);
        assert_eq!(expanded.max.y, 2.0);
    }

    #[test]
    fn test_aabb_quadrants() {
        let aabb = Aabb::new(Point2::new(0.0, 0.0), Point2::new(4.0, 2.0));
        let [bl, br, tl, tr] = aabb.quadrants();

        assert_eq!(bl, Aabb::new(Point2::new(0.0, 0.0), Point2::new(2.0, 1.0)));
        assert_eq!(br, Aabb::new(Point2::new(2.0, 0.0), Point2::new(4.0, 1.0)));
        assert_eq!(tl, Aabb::new(Point2::new(0.0, 1.0), Point2::new(2.0, 2.0)));
        assert_eq!(tr, Aabb::new(Point2::new(2.0, 1.0), Point2::new(4.0, 2.0)));
        assert!(aabb.contains_point(&Point2::new(4.0, 2.0)));
        assert!(!aabb.contains_point(&Point2::new(4.1, 2.0)));
    }

    #[test]
    fn test_from_config_builds_every_strategy() {
        for config in [
            BroadPhaseConfig::spatial_hashing(10.0),
            BroadPhaseConfig::sweep_and_prune(),
            BroadPhaseConfig::quad_tree(5.0),
            BroadPhaseConfig::predictive(10.0),
        ] {
            let mut broad_phase = from_config(&config).unwrap();
            check_scene(broad_phase.as_mut());

            let mut fresh = broad_phase.fresh();
            assert_eq!(fresh.name(), broad_phase.name());
            assert!(fresh.collisions().unwrap_err().is_not_initialized());
        }
    }

    #[test]
    fn test_from_config_rejects_bad_cell_size() {
        let err = from_config(&BroadPhaseConfig::spatial_hashing(0.0)).unwrap_err();
        assert!(err.is_config_error());
    }
}
