//! Gravitational acceleration solvers.
//!
//! Gravity here is the planar law used throughout the simulation:
//!
//! ```text
//! a = G · m · d / |d|²
//! ```
//!
//! where `d` points from the affected body to the source. The magnitude falls
//! off as `1 / r`.
//!
//! | Solver | Cost | Exact |
//! |--------|------|-------|
//! | [`AllPairsGravity`] | O(n·m) | yes |
//! | [`BarnesHutGravity`] | O(n log m) | within θ |
//!
//! Both solvers separate *affected* bodies (who receive an acceleration) from
//! *affectors* (who pull). A body never pulls on itself: a source is skipped
//! when it is the affected body, either because both slices are the same or
//! because it carries the same non-zero [`BodyId`](orbital_types::BodyId).
//!
//! Sources closer than the solver's `min_distance` contribute nothing, which
//! also covers exactly coincident bodies.

mod all_pairs;
mod barnes_hut;
mod quad_tree;

pub use all_pairs::AllPairsGravity;
pub use barnes_hut::BarnesHutGravity;
pub use quad_tree::{CenterOfMass, QuadTree};

use hashbrown::HashMap;
use nalgebra::{Point2, Vector2};
use orbital_types::{BodyId, GravityAlgorithm, GravityConfig, Result};

use crate::body::Body;

/// A solver producing one acceleration per affected body.
pub trait GravitySolver: Send + Sync + std::fmt::Debug {
    /// Human-readable algorithm name.
    fn name(&self) -> &'static str;

    /// The gravitational constant `G`.
    fn gravitational_constant(&self) -> f64;

    /// Accelerations of `bodies` under their mutual attraction.
    fn compute_accelerations(&self, bodies: &[Body]) -> Vec<Vector2<f64>> {
        self.compute_accelerations_selective(bodies, bodies)
    }

    /// Accelerations of `affected` under the pull of `affectors` only.
    ///
    /// The result has one entry per affected body, in order.
    fn compute_accelerations_selective(
        &self,
        affected: &[Body],
        affectors: &[Body],
    ) -> Vec<Vector2<f64>>;
}

/// Build the solver described by `config`.
///
/// # Errors
///
/// Returns an error if the configuration is invalid.
pub fn from_config(config: &GravityConfig) -> Result<Box<dyn GravitySolver>> {
    config.validate()?;

    Ok(match config.algorithm {
        GravityAlgorithm::AllPairs => Box::new(
            AllPairsGravity::new()
                .gravitational_constant(config.gravitational_constant)
                .min_distance(config.min_distance),
        ),
        GravityAlgorithm::BarnesHut => Box::new(
            BarnesHutGravity::new()
                .with_theta(config.theta)
                .gravitational_constant(config.gravitational_constant)
                .min_distance(config.min_distance),
        ),
    })
}

/// Pull of a point mass at `source` on a point at `at`.
///
/// Zero when the two are closer than `min_distance` or coincide.
#[must_use]
pub fn point_mass_acceleration(
    gravitational_constant: f64,
    min_distance: f64,
    at: Point2<f64>,
    source: Point2<f64>,
    mass: f64,
) -> Vector2<f64> {
    let displacement = source - at;
    let distance_sq = displacement.norm_squared();
    if distance_sq == 0.0 || distance_sq < min_distance * min_distance {
        return Vector2::zeros();
    }
    displacement * (gravitational_constant * mass / distance_sq)
}

/// For each affected body, the index of the same body among the affectors.
fn self_indices(affected: &[Body], affectors: &[Body]) -> Vec<Option<usize>> {
    if std::ptr::eq(affected, affectors) {
        return (0..affected.len()).map(Some).collect();
    }

    let by_id: HashMap<BodyId, usize> = affectors
        .iter()
        .enumerate()
        .filter(|(_, body)| body.id() != BodyId::default())
        .map(|(i, body)| (body.id(), i))
        .collect();

    affected
        .iter()
        .map(|body| {
            if body.id() == BodyId::default() {
                affectors.iter().position(|other| std::ptr::eq(body, other))
            } else {
                by_id.get(&body.id()).copied()
            }
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use orbital_types::Matter;

    pub(crate) fn body(id: u64, x: f64, y: f64, mass: f64) -> Body {
        let mut body = Body::new(Point2::new(x, y), Matter::hydrogen(mass));
        body.set_id(BodyId::new(id));
        body
    }

    #[test]
    fn test_point_mass_is_one_over_r() {
        let a = point_mass_acceleration(2.0, 0.0, Point2::origin(), Point2::new(4.0, 0.0), 3.0);
        // 2 · 3 / 4 along +x
        assert_relative_eq!(a, Vector2::new(1.5, 0.0), epsilon = 1e-12);

        let far = point_mass_acceleration(2.0, 0.0, Point2::origin(), Point2::new(8.0, 0.0), 3.0);
        assert_relative_eq!(far.norm() * 2.0, a.norm(), epsilon = 1e-12);
    }

    #[test]
    fn test_point_mass_singularity_policy() {
        let coincident = point_mass_acceleration(1.0, 0.0, Point2::origin(), Point2::origin(), 5.0);
        assert_eq!(coincident, Vector2::zeros());

        let close =
            point_mass_acceleration(1.0, 0.5, Point2::origin(), Point2::new(0.3, 0.0), 5.0);
        assert_eq!(close, Vector2::zeros());
    }

    #[test]
    fn test_self_indices() {
        let bodies = vec![body(1, 0.0, 0.0, 1.0), body(2, 1.0, 0.0, 1.0)];
        assert_eq!(self_indices(&bodies, &bodies), vec![Some(0), Some(1)]);

        let affected = vec![bodies[1].clone(), body(9, 5.0, 5.0, 1.0)];
        assert_eq!(self_indices(&affected, &bodies), vec![Some(1), None]);
    }

    #[test]
    fn test_from_config() {
        let solver = from_config(&GravityConfig::barnes_hut(0.5).gravitational_constant(3.0)).unwrap();
        assert_eq!(solver.name(), "barnes-hut");
        assert_eq!(solver.gravitational_constant(), 3.0);

        let solver = from_config(&GravityConfig::all_pairs()).unwrap();
        assert_eq!(solver.name(), "all pairs");

        assert!(from_config(&GravityConfig::barnes_hut(-1.0)).is_err());
    }
}
