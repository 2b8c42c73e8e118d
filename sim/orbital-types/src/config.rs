//! Configuration types for the physics core.
//!
//! These control how a world is stepped (timestep, broad-phase strategy) and
//! how gravity is evaluated (solver, gravitational constant, opening angle).
//! The strategies themselves live in `orbital-core`; this module only
//! describes which one to build.

use crate::{PhysicsError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Main configuration for a physics world.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WorldConfig {
    /// Fixed timestep for physics integration.
    pub timestep: f64,
    /// Broad-phase strategy used for candidate-pair generation.
    pub broad_phase: BroadPhaseConfig,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            timestep: 0.2,
            broad_phase: BroadPhaseConfig::default(),
        }
    }
}

impl WorldConfig {
    /// Create a world config with the given timestep.
    #[must_use]
    pub fn with_timestep(timestep: f64) -> Self {
        Self {
            timestep,
            ..Default::default()
        }
    }

    /// Set the timestep.
    #[must_use]
    pub fn timestep(mut self, timestep: f64) -> Self {
        self.timestep = timestep;
        self
    }

    /// Set the broad-phase configuration.
    #[must_use]
    pub fn broad_phase(mut self, broad_phase: BroadPhaseConfig) -> Self {
        self.broad_phase = broad_phase;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError::InvalidTimestep`] unless the timestep is
    /// positive and finite, or the broad-phase error from
    /// [`BroadPhaseConfig::validate`].
    pub fn validate(&self) -> Result<()> {
        validate_timestep(self.timestep)?;
        self.broad_phase.validate()
    }

    /// Get the stepping frequency in Hz.
    #[must_use]
    pub fn frequency(&self) -> f64 {
        1.0 / self.timestep
    }
}

/// Reject timesteps that are not strictly positive and finite.
///
/// # Errors
///
/// Returns [`PhysicsError::InvalidTimestep`] for zero, negative, NaN or
/// infinite timesteps.
pub fn validate_timestep(timestep: f64) -> Result<()> {
    if !timestep.is_finite() || timestep <= 0.0 {
        return Err(PhysicsError::InvalidTimestep(timestep));
    }
    Ok(())
}

/// Configuration for broad-phase collision detection.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BroadPhaseConfig {
    /// Algorithm to use.
    pub algorithm: BroadPhaseAlgorithm,
    /// Grid cell size for the hashing variants; minimum leaf size for the
    /// quad tree. Ignored by sweep-and-prune.
    pub cell_size: f64,
}

impl Default for BroadPhaseConfig {
    fn default() -> Self {
        Self {
            algorithm: BroadPhaseAlgorithm::SpatialHashing,
            cell_size: 40.0,
        }
    }
}

impl BroadPhaseConfig {
    /// Spatial hashing with the given cell size.
    #[must_use]
    pub fn spatial_hashing(cell_size: f64) -> Self {
        Self {
            algorithm: BroadPhaseAlgorithm::SpatialHashing,
            cell_size,
        }
    }

    /// Sweep-and-prune.
    #[must_use]
    pub fn sweep_and_prune() -> Self {
        Self {
            algorithm: BroadPhaseAlgorithm::SweepAndPrune,
            ..Default::default()
        }
    }

    /// Quad tree with the given minimum cell size.
    #[must_use]
    pub fn quad_tree(min_cell_size: f64) -> Self {
        Self {
            algorithm: BroadPhaseAlgorithm::QuadTree,
            cell_size: min_cell_size,
        }
    }

    /// Predictive spatial hashing with the given cell size.
    #[must_use]
    pub fn predictive(cell_size: f64) -> Self {
        Self {
            algorithm: BroadPhaseAlgorithm::PredictiveSpatialHashing,
            cell_size,
        }
    }

    /// Set the cell size.
    #[must_use]
    pub fn with_cell_size(mut self, cell_size: f64) -> Self {
        self.cell_size = cell_size;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError::InvalidCellSize`] if the algorithm is grid based
    /// and the cell size is not positive and finite.
    pub fn validate(&self) -> Result<()> {
        if self.algorithm.uses_cell_size() && (!self.cell_size.is_finite() || self.cell_size <= 0.0)
        {
            return Err(PhysicsError::InvalidCellSize(self.cell_size));
        }
        Ok(())
    }
}

/// Broad-phase algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BroadPhaseAlgorithm {
    /// Uniform hash grid.
    #[default]
    SpatialHashing,
    /// Incrementally re-sorted interval sweep on both axes.
    SweepAndPrune,
    /// Quad tree rebuilt on every update.
    QuadTree,
    /// Hash grid with a one-step-ahead background prediction.
    PredictiveSpatialHashing,
}

impl BroadPhaseAlgorithm {
    /// Whether `cell_size` is meaningful for this algorithm.
    #[must_use]
    pub const fn uses_cell_size(self) -> bool {
        !matches!(self, Self::SweepAndPrune)
    }
}

impl std::fmt::Display for BroadPhaseAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SpatialHashing => write!(f, "Spatial Hashing"),
            Self::SweepAndPrune => write!(f, "Sweep and Prune"),
            Self::QuadTree => write!(f, "Quad Tree"),
            Self::PredictiveSpatialHashing => write!(f, "Predictive Spatial Hashing"),
        }
    }
}

/// Configuration for the gravity solver.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GravityConfig {
    /// Solver to use.
    pub algorithm: GravityAlgorithm,
    /// Gravitational constant `G`.
    pub gravitational_constant: f64,
    /// Barnes-Hut opening angle. Ignored by the all-pairs solver.
    pub theta: f64,
    /// Sources closer than this to the affected point contribute nothing.
    pub min_distance: f64,
}

impl Default for GravityConfig {
    fn default() -> Self {
        Self {
            algorithm: GravityAlgorithm::AllPairs,
            gravitational_constant: 1.0,
            theta: 0.7,
            min_distance: 1e-6,
        }
    }
}

impl GravityConfig {
    /// Exact O(n·m) summation.
    #[must_use]
    pub fn all_pairs() -> Self {
        Self::default()
    }

    /// Barnes-Hut approximation with the given opening angle.
    #[must_use]
    pub fn barnes_hut(theta: f64) -> Self {
        Self {
            algorithm: GravityAlgorithm::BarnesHut,
            theta,
            ..Default::default()
        }
    }

    /// Set the gravitational constant.
    #[must_use]
    pub fn gravitational_constant(mut self, g: f64) -> Self {
        self.gravitational_constant = g;
        self
    }

    /// Set the singularity cutoff distance.
    #[must_use]
    pub fn min_distance(mut self, min_distance: f64) -> Self {
        self.min_distance = min_distance;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError::InvalidTheta`] for a negative or non-finite
    /// opening angle, and [`PhysicsError::InvalidConfig`] for a non-finite
    /// gravitational constant or a negative or non-finite `min_distance`.
    pub fn validate(&self) -> Result<()> {
        if !self.gravitational_constant.is_finite() {
            return Err(PhysicsError::invalid_config(
                "gravitational constant must be finite",
            ));
        }

        if !self.theta.is_finite() || self.theta < 0.0 {
            return Err(PhysicsError::InvalidTheta(self.theta));
        }

        if !self.min_distance.is_finite() || self.min_distance < 0.0 {
            return Err(PhysicsError::invalid_config(
                "min_distance must be non-negative and finite",
            ));
        }

        Ok(())
    }
}

/// Gravity solver selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum GravityAlgorithm {
    /// Sum over every affector.
    #[default]
    AllPairs,
    /// Quad-tree mass aggregation.
    BarnesHut,
}

impl std::fmt::Display for GravityAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AllPairs => write!(f, "All Pairs"),
            Self::BarnesHut => write!(f, "Barnes-Hut"),
        }
    }
}
