//! Error types for physics operations.

use thiserror::Error;

/// Errors that can occur while configuring or driving the physics core.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PhysicsError {
    /// Invalid timestep.
    #[error("invalid timestep: {0} (must be positive and finite)")]
    InvalidTimestep(f64),

    /// A composition slice did not match the number of matter channels.
    #[error("composition has {actual} channels, expected {expected}")]
    CompositionMismatch {
        /// Number of channels the matter model carries.
        expected: usize,
        /// Number of channels that were supplied.
        actual: usize,
    },

    /// A matter channel index was out of range.
    #[error("matter channel {index} out of range (matter has {channels} channels)")]
    ChannelOutOfRange {
        /// Requested channel.
        index: usize,
        /// Number of channels available.
        channels: usize,
    },

    /// Grid or quad-tree cell size was not positive.
    #[error("invalid cell size: {0} (must be positive and finite)")]
    InvalidCellSize(f64),

    /// Barnes-Hut opening angle was negative or not finite.
    #[error("invalid opening angle: {0} (must be non-negative and finite)")]
    InvalidTheta(f64),

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// A broad phase was queried before any call to `update_bodies`.
    #[error("{broad_phase} broad phase queried before update_bodies")]
    NotInitialized {
        /// Name of the broad phase that was misused.
        broad_phase: &'static str,
    },

    /// Invalid body ID referenced.
    #[error("invalid body ID: {0}")]
    InvalidBodyId(u64),

    /// Simulation diverged (`NaN` or `Inf` detected).
    #[error("simulation diverged: {reason}")]
    Diverged {
        /// Description of what went wrong.
        reason: String,
    },
}

impl PhysicsError {
    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a not-initialized error for the named broad phase.
    #[must_use]
    pub const fn not_initialized(broad_phase: &'static str) -> Self {
        Self::NotInitialized { broad_phase }
    }

    /// Create a diverged error.
    #[must_use]
    pub fn diverged(reason: impl Into<String>) -> Self {
        Self::Diverged {
            reason: reason.into(),
        }
    }

    /// Check if this is a configuration error.
    ///
    /// Timestep, cell size, opening angle and composition errors all count:
    /// they are rejected at the point of mutation rather than clamped.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. }
                | Self::InvalidTimestep(_)
                | Self::InvalidCellSize(_)
                | Self::InvalidTheta(_)
                | Self::CompositionMismatch { .. }
                | Self::ChannelOutOfRange { .. }
        )
    }

    /// Check if this is a broad-phase precondition violation.
    #[must_use]
    pub fn is_not_initialized(&self) -> bool {
        matches!(self, Self::NotInitialized { .. })
    }

    /// Check if this is a divergence error.
    #[must_use]
    pub fn is_diverged(&self) -> bool {
        matches!(self, Self::Diverged { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PhysicsError::InvalidTimestep(-0.5);
        assert!(err.to_string().contains("-0.5"));

        let err = PhysicsError::CompositionMismatch {
            expected: 1,
            actual: 3,
        };
        assert!(err.to_string().contains('3'));

        let err = PhysicsError::not_initialized("spatial hashing");
        assert!(err.to_string().contains("spatial hashing"));
    }

    #[test]
    fn test_error_predicates() {
        let err = PhysicsError::InvalidTimestep(0.0);
        assert!(err.is_config_error());
        assert!(!err.is_not_initialized());

        let err = PhysicsError::not_initialized("quad tree");
        assert!(err.is_not_initialized());
        assert!(!err.is_config_error());

        let err = PhysicsError::diverged("NaN in momentum");
        assert!(err.is_diverged());
        assert!(!err.is_config_error());
    }
}
