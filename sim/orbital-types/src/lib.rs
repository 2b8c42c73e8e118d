//! Core types for the orbital physics substrate.
//!
//! This crate provides the data shared by the physics core and its consumers:
//!
//! - [`BodyId`] - Stable handle to a body owned by a world
//! - [`Matter`] - Composition vector with derived mass, density and heat capacity
//! - [`WorldConfig`], [`BroadPhaseConfig`], [`GravityConfig`] - Strategy selection
//! - [`PhysicsError`] - The single error type of the workspace
//!
//! # Design Philosophy
//!
//! These types are **pure data**. Integration, collision detection and gravity
//! live in `orbital-core`; this crate has no behavior beyond keeping derived
//! quantities consistent and validating configuration.
//!
//! # Coordinate System
//!
//! Two-dimensional, right-handed, `f64` throughout. Bodies are circles; there
//! is no rotational state.
//!
//! # Example
//!
//! ```
//! use orbital_types::{Matter, WorldConfig, BroadPhaseConfig};
//!
//! let config = WorldConfig::with_timestep(0.1)
//!     .broad_phase(BroadPhaseConfig::sweep_and_prune());
//! assert!(config.validate().is_ok());
//!
//! let matter = Matter::hydrogen(10.0) * 2.0;
//! assert_eq!(matter.mass(), 20.0);
//! ```

#![doc(html_root_url = "https://docs.rs/orbital-types/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
    clippy::cast_precision_loss,       // usize to f64 is fine for counts
    clippy::missing_errors_doc,        // Error docs added where non-obvious
)]

mod body;
mod config;
mod error;
mod matter;

pub use body::BodyId;
pub use config::{
    validate_timestep, BroadPhaseAlgorithm, BroadPhaseConfig, GravityAlgorithm, GravityConfig,
    WorldConfig,
};
pub use error::PhysicsError;
pub use matter::{Element, Matter, CHANNELS};

// Re-export math types for convenience
pub use nalgebra::{Point2, Vector2};

/// Result type for physics operations.
pub type Result<T> = std::result::Result<T, PhysicsError>;
