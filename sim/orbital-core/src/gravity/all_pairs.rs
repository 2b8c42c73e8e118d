//! Direct O(n·m) gravity.

use nalgebra::Vector2;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::{point_mass_acceleration, self_indices, GravitySolver};
use crate::body::Body;

/// Exact pairwise gravity.
///
/// Each affected body sums the pull of every affector except itself. The
/// work is split over affected bodies, so every output slot is written by
/// exactly one task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AllPairsGravity {
    gravitational_constant: f64,
    min_distance: f64,
}

impl Default for AllPairsGravity {
    fn default() -> Self {
        Self::new()
    }
}

impl AllPairsGravity {
    /// `G = 1`, `min_distance = 1e-6`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            gravitational_constant: 1.0,
            min_distance: 1e-6,
        }
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

    fn acceleration_on(&self, body: &Body, skip: Option<usize>, affectors: &[Body]) -> Vector2<f64> {
        affectors
            .iter()
            .enumerate()
            .filter(|&(j, _)| skip != Some(j))
            .map(|(_, source)| {
                point_mass_acceleration(
                    self.gravitational_constant,
                    self.min_distance,
                    body.position,
                    source.position,
                    source.mass(),
                )
            })
            .fold(Vector2::zeros(), |acc, a| acc + a)
    }
}

impl GravitySolver for AllPairsGravity {
    fn name(&self) -> &'static str {
        "all pairs"
    }

    fn gravitational_constant(&self) -> f64 {
        self.gravitational_constant
    }

    fn compute_accelerations_selective(
        &self,
        affected: &[Body],
        affectors: &[Body],
    ) -> Vec<Vector2<f64>> {
        let skips = self_indices(affected, affectors);

        #[cfg(feature = "parallel")]
        let iter = affected.par_iter().zip(skips.par_iter());
        #[cfg(not(feature = "parallel"))]
        let iter = affected.iter().zip(skips.iter());

        iter.map(|(body, &skip)| self.acceleration_on(body, skip, affectors))
            .collect()
    }
}
