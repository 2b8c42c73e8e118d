//! Barnes-Hut gravity over a mass-aggregating quad tree.

use nalgebra::Vector2;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::quad_tree::{CenterOfMass, QuadTree};
use super::{point_mass_acceleration, self_indices, GravitySolver};
use crate::body::Body;

/// Approximate O(n log m) gravity.
///
/// The affectors are inserted into a [`QuadTree`] once per call; each
/// affected body then walks the tree, replacing any node that is small and
/// far away (`size / distance < θ`) by its center of mass. `θ = 0` degrades to
/// the exact all-pairs sum. The tree is read-only during the walk, which runs
/// in parallel over affected bodies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarnesHutGravity {
    theta: f64,
    gravitational_constant: f64,
    min_distance: f64,
}

impl Default for BarnesHutGravity {
    fn default() -> Self {
        Self::new()
    }
}

impl BarnesHutGravity {
    /// `θ = 0.7`, `G = 1`, `min_distance = 1e-6`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            theta: 0.7,
            gravitational_constant: 1.0,
            min_distance: 1e-6,
        }
    }

    /// Set the opening angle θ.
    #[must_use]
    pub fn with_theta(mut self, theta: f64) -> Self {
        self.theta = theta;
        self
    }

    /// Set the gravitational constant.
    #[must_use]
    pub fn gravitational_constant(mut self, g: f64) -> Self {
        self.gravitational_constant = g;
        self
    }

    /// Set the distance below which a source is ignored.
    #[must_use]
    pub fn min_distance(mut self, min_distance: f64) -> Self {
        self.min_distance = min_distance;
        self
    }

    /// Opening angle θ.
    #[must_use]
    pub fn theta(&self) -> f64 {
        self.theta
    }
}

impl GravitySolver for BarnesHutGravity {
    fn name(&self) -> &'static str {
        "barnes-hut"
    }

    fn gravitational_constant(&self) -> f64 {
        self.gravitational_constant
    }

    fn compute_accelerations_selective(
        &self,
        affected: &[Body],
        affectors: &[Body],
    ) -> Vec<Vector2<f64>> {
        if affectors.is_empty() {
            return vec![Vector2::zeros(); affected.len()];
        }

        let tree = QuadTree::from_bodies(affectors);
        let skips = self_indices(affected, affectors);

        let solve = |(body, &skip): (&Body, &Option<usize>)| {
            let at = body.position;
            let pull = |source: &CenterOfMass| {
                point_mass_acceleration(
                    self.gravitational_constant,
                    self.min_distance,
                    at,
                    source.position,
                    source.mass,
                )
            };
            tree.acceleration(at, skip, self.theta, &pull)
        };

        #[cfg(feature = "parallel")]
        let iter = affected.par_iter().zip(skips.par_iter());
        #[cfg(not(feature = "parallel"))]
        let iter = affected.iter().zip(skips.iter());

        iter.map(solve).collect()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::cast_precision_loss
)]
mod tests {
    use super::*;
    use crate::gravity::tests::body;
    use crate::gravity::AllPairsGravity;
    use approx::assert_relative_eq;

    fn lattice() -> Vec<Body> {
        (0..25)
            .map(|i| {
                let (x, y) = ((i % 5) as f64 * 3.0, (i / 5) as f64 * 2.0 + (i % 3) as f64);
                body(i + 1, x, y, 1.0 + (i % 4) as f64)
            })
            .collect()
    }

    #[test]
    fn test_zero_theta_matches_all_pairs() {
        let bodies = lattice();
        let exact = AllPairsGravity::new().compute_accelerations(&bodies);
        let tree = BarnesHutGravity::new()
            .with_theta(0.0)
            .compute_accelerations(&bodies);

        for (a, b) in exact.iter().zip(&tree) {
            assert_relative_eq!(a, b, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_default_theta_is_close() {
        let bodies = lattice();
        let exact = AllPairsGravity::new().compute_accelerations(&bodies);
        let approx = BarnesHutGravity::new().compute_accelerations(&bodies);

        for (a, b) in exact.iter().zip(&approx) {
            assert!((a - b).norm() <= 0.1 * a.norm() + 1e-9, "{a:?} vs {b:?}");
        }
    }

    #[test]
    fn test_no_affectors() {
        let ships = vec![body(1, 0.0, 0.0, 1.0), body(2, 1.0, 0.0, 1.0)];
        let accels = BarnesHutGravity::new().compute_accelerations_selective(&ships, &[]);
        assert_eq!(accels, vec![Vector2::zeros(); 2]);
    }

    #[test]
    fn test_two_bodies() {
        let bodies = vec![body(1, 0.0, 0.0, 2.0), body(2, 4.0, 0.0, 8.0)];
        let accels = BarnesHutGravity::new().compute_accelerations(&bodies);
        assert_relative_eq!(accels[0], Vector2::new(2.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(accels[1], Vector2::new(-0.5, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_coincident_bodies_stay_finite() {
        let bodies: Vec<_> = (1..=4).map(|id| body(id, 2.0, 2.0, 1.0)).collect();
        let accels = BarnesHutGravity::new().compute_accelerations(&bodies);
        assert!(accels.iter().all(|a| *a == Vector2::zeros()));
    }

    #[test]
    fn test_selective_distant_cluster() {
        let cluster: Vec<_> = (0..8)
            .map(|i| body(i + 1, (i % 4) as f64, (i / 4) as f64, 1.0))
            .collect();
        let target = vec![body(100, 1000.0, 0.5, 1.0)];

        let exact = AllPairsGravity::new().compute_accelerations_selective(&target, &cluster);
        let approx = BarnesHutGravity::new().compute_accelerations_selective(&target, &cluster);
        assert_relative_eq!(exact[0], approx[0], max_relative = 1e-4);
    }
}
