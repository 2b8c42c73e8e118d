//! Uniform-grid broad phase.

use orbital_types::{BodyId, PhysicsError, Result};
use tracing::trace;

use super::hash_grid::{build_grid, grid_candidates, grid_pairs};
use super::{snapshot, within_radius, BodyProxy, BroadPhase, HashGrid};
use crate::body::Body;

/// Broad phase backed by a [`HashGrid`] rebuilt on every update.
///
/// Each body's swept box is rasterized into every cell it covers. Cell size
/// is fixed; pick it close to the typical body diameter.
#[derive(Debug, Clone)]
pub struct SpatialHashing {
    cell_size: f64,
    grid: Option<HashGrid>,
    proxies: Vec<BodyProxy>,
}

impl Default for SpatialHashing {
    /// Cell size 40.
    fn default() -> Self {
        Self::with_valid_cell_size(40.0)
    }
}

impl SpatialHashing {
    /// Create a spatial hash with the given cell size.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError::InvalidCellSize`] unless `cell_size` is
    /// positive and finite.
    pub fn new(cell_size: f64) -> Result<Self> {
        if !cell_size.is_finite() || cell_size <= 0.0 {
            return Err(PhysicsError::InvalidCellSize(cell_size));
        }
        Ok(Self::with_valid_cell_size(cell_size))
    }

    fn with_valid_cell_size(cell_size: f64) -> Self {
        Self {
            cell_size,
            grid: None,
            proxies: Vec::new(),
        }
    }

    /// Grid cell size.
    #[must_use]
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// The grid built by the last update, if any.
    #[must_use]
    pub fn grid(&self) -> Option<&HashGrid> {
        self.grid.as_ref()
    }

    fn grid_or_err(&self) -> Result<&HashGrid> {
        self.grid
            .as_ref()
            .ok_or(PhysicsError::not_initialized(self.name()))
    }
}

impl BroadPhase for SpatialHashing {
    fn name(&self) -> &'static str {
        "spatial hashing"
    }

    fn update_bodies(&mut self, bodies: &[Body]) {
        self.proxies = snapshot(bodies);
        let grid = build_grid(self.cell_size, &self.proxies, BodyProxy::aabb);
        trace!(
            bodies = self.proxies.len(),
            cells = grid.occupied_cells(),
            "spatial hash rebuilt"
        );
        self.grid = Some(grid);
    }

    fn collisions(&mut self) -> Result<Vec<(BodyId, BodyId)>> {
        let grid = self.grid_or_err()?;
        Ok(grid_pairs(grid, &self.proxies, BodyProxy::aabb))
    }

    fn nearest(&self, body: &Body, radius: f64) -> Result<Vec<BodyId>> {
        let grid = self.grid_or_err()?;
        let candidates = grid_candidates(grid, body.position, radius);
        Ok(within_radius(&self.proxies, candidates, body, radius))
    }

    fn fresh(&self) -> Box<dyn BroadPhase> {
        Box::new(Self::with_valid_cell_size(self.cell_size))
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
    use crate::broad_phase::tests::{check_scene, resting_body};
    use orbital_types::BodyId;

    #[test]
    fn test_rejects_bad_cell_size() {
        assert!(SpatialHashing::new(0.0).is_err());
        assert!(SpatialHashing::new(f64::NAN).is_err());
        assert_eq!(SpatialHashing::default().cell_size(), 40.0);
    }

    #[test]
    fn test_scene() {
        check_scene(&mut SpatialHashing::new(3.0).unwrap());
        check_scene(&mut SpatialHashing::default());
    }

    #[test]
    fn test_pairs_reported_once_across_shared_cells() {
        // Both bodies straddle the same four cells.
        let bodies = vec![resting_body(1, 0.0, 0.0), resting_body(2, 0.5, 0.5)];
        let mut grid = SpatialHashing::new(1.0).unwrap();
        grid.update_bodies(&bodies);

        let pairs = grid.collisions().unwrap();
        assert_eq!(pairs, vec![(BodyId::new(1), BodyId::new(2))]);
    }

    #[test]
    fn test_negative_coordinates_do_not_alias() {
        // Truncation would put both in cell 0 on both axes.
        let bodies = vec![resting_body(1, -3.5, -3.5), resting_body(2, 3.5, 3.5)];
        let mut grid = SpatialHashing::new(5.0).unwrap();
        grid.update_bodies(&bodies);
        assert!(grid.collisions().unwrap().is_empty());
    }

    #[test]
    fn test_nearest() {
        let bodies: Vec<_> = (0..10)
            .map(|i| resting_body(i + 1, i as f64 * 3.0, 0.0))
            .collect();
        let mut grid = SpatialHashing::new(4.0).unwrap();

        assert!(grid.nearest(&bodies[0], 5.0).unwrap_err().is_not_initialized());

        grid.update_bodies(&bodies);
        let mut near = grid.nearest(&bodies[3], 6.0).unwrap();
        near.sort();
        assert_eq!(
            near,
            vec![BodyId::new(2), BodyId::new(3), BodyId::new(5), BodyId::new(6)]
        );
    }
}
