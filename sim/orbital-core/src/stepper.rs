//! Fixed-step frame loop.
//!
//! This module provides the [`Stepper`], which turns variable frame times into
//! fixed physics steps and schedules the collisions they produce:
//!
//! - A [`Clock`] accumulates scaled frame time and hands out fixed steps.
//! - Each fixed step applies gravity, steps the world and finds collisions.
//! - Collisions are not fired when found. They are held until the render
//!   fraction (`accumulator / fixed_timestep`) reaches their time of impact,
//!   or until the next fixed step starts.
//!
//! # Example
//!
//! ```
//! use orbital_core::{Body, Stepper, World};
//! use orbital_types::Matter;
//! use nalgebra::{Point2, Vector2};
//!
//! let mut world = World::default();
//! world.add_body(Body::new(Point2::new(0.0, 0.0), Matter::hydrogen(100.0)));
//! world.add_body(
//!     Body::new(Point2::new(20.0, 0.0), Matter::hydrogen(1.0))
//!         .with_velocity(Vector2::new(0.0, 3.0)),
//! );
//!
//! let mut stepper = Stepper::new();
//! for _ in 0..60 {
//!     let report = stepper.update(&mut world, 1.0 / 60.0).unwrap();
//!     assert!(report.steps <= 1);
//! }
//! assert!(world.step_count() > 0);
//! ```

use orbital_types::{validate_timestep, GravityConfig, PhysicsError, Result, WorldConfig};
use tracing::trace;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::gravity::{self, GravitySolver};
use crate::world::{Collision, World};

/// Fixed-timestep accumulator.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Clock {
    time_scale: f64,
    fixed_timestep: f64,
    current_time: f64,
    delta_time: f64,
    accumulator: f64,
}

impl Default for Clock {
    fn default() -> Self {
        Self {
            time_scale: 1.0,
            fixed_timestep: WorldConfig::default().timestep,
            current_time: 0.0,
            delta_time: 0.0,
            accumulator: 0.0,
        }
    }
}

impl Clock {
    /// Create a clock handing out steps of `fixed_timestep`.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError::InvalidTimestep`] unless `fixed_timestep` is
    /// positive and finite.
    pub fn new(fixed_timestep: f64) -> Result<Self> {
        validate_timestep(fixed_timestep)?;
        Ok(Self {
            fixed_timestep,
            ..Self::default()
        })
    }

    /// Set the factor applied to every frame time.
    #[must_use]
    pub fn with_time_scale(mut self, time_scale: f64) -> Self {
        self.time_scale = time_scale;
        self
    }

    /// Factor applied to every frame time.
    #[must_use]
    pub fn time_scale(&self) -> f64 {
        self.time_scale
    }

    /// Length of one fixed step.
    #[must_use]
    pub fn fixed_timestep(&self) -> f64 {
        self.fixed_timestep
    }

    /// Change the fixed step length.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError::InvalidTimestep`] unless `fixed_timestep` is
    /// positive and finite.
    pub fn set_fixed_timestep(&mut self, fixed_timestep: f64) -> Result<()> {
        validate_timestep(fixed_timestep)?;
        self.fixed_timestep = fixed_timestep;
        Ok(())
    }

    /// Scaled time elapsed since creation.
    #[must_use]
    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    /// Scaled length of the last frame.
    #[must_use]
    pub fn delta_time(&self) -> f64 {
        self.delta_time
    }

    /// Time not yet consumed by fixed steps.
    #[must_use]
    pub fn accumulator(&self) -> f64 {
        self.accumulator
    }

    /// Accumulated time as a fraction of one fixed step.
    #[must_use]
    pub fn accumulator_t(&self) -> f64 {
        self.accumulator / self.fixed_timestep
    }

    /// Add one frame's worth of time.
    pub fn update(&mut self, frame_dt: f64) {
        let dt = frame_dt * self.time_scale;
        self.delta_time = dt;
        self.accumulator += dt;
        self.current_time += dt;
    }

    /// Consume one fixed step if enough time has accumulated.
    pub fn do_fixed_step(&mut self) -> bool {
        if self.accumulator >= self.fixed_timestep {
            self.accumulator -= self.fixed_timestep;
            true
        } else {
            false
        }
    }
}

/// Configuration for the stepper.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StepperConfig {
    /// Factor applied to every frame time.
    pub time_scale: f64,
    /// Gravity applied before each fixed step, if any.
    pub gravity: Option<GravityConfig>,
    /// Whether to reject non-finite world state after each fixed step.
    pub check_divergence: bool,
}

impl Default for StepperConfig {
    fn default() -> Self {
        Self {
            time_scale: 1.0,
            gravity: Some(GravityConfig::default()),
            check_divergence: true,
        }
    }
}

impl StepperConfig {
    /// Create config without gravity.
    #[must_use]
    pub fn zero_gravity() -> Self {
        Self {
            gravity: None,
            ..Default::default()
        }
    }

    /// Set the time scale.
    #[must_use]
    pub fn with_time_scale(mut self, time_scale: f64) -> Self {
        self.time_scale = time_scale;
        self
    }

    /// Set the gravity solver configuration.
    #[must_use]
    pub fn with_gravity(mut self, gravity: GravityConfig) -> Self {
        self.gravity = Some(gravity);
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError::InvalidConfig`] if the time scale is negative
    /// or not finite, or the gravity error from [`GravityConfig::validate`].
    pub fn validate(&self) -> Result<()> {
        if !self.time_scale.is_finite() || self.time_scale < 0.0 {
            return Err(PhysicsError::invalid_config(format!(
                "time scale must be non-negative and finite, got {}",
                self.time_scale
            )));
        }
        if let Some(gravity) = &self.gravity {
            gravity.validate()?;
        }
        Ok(())
    }
}

/// What happened during one [`Stepper::update`].
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FrameReport {
    /// Number of fixed steps taken.
    pub steps: usize,
    /// Collisions found by those steps, in dispatch order.
    pub found: Vec<Collision>,
    /// Collisions whose time of impact was reached during this frame.
    pub passed: Vec<Collision>,
    /// Render fraction the world was interpolated at.
    pub accumulator_t: f64,
}

/// Drives a [`World`] from variable frame times.
#[derive(Debug)]
pub struct Stepper {
    clock: Clock,
    gravity: Option<Box<dyn GravitySolver>>,
    check_divergence: bool,
    /// Collisions of the last fixed step not yet passed, sorted by `t`.
    pending: Vec<Collision>,
}

impl Default for Stepper {
    fn default() -> Self {
        Self::new()
    }
}

impl Stepper {
    /// Create a stepper with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            clock: Clock::default(),
            gravity: Some(Box::new(gravity::AllPairsGravity::new())),
            check_divergence: true,
            pending: Vec::new(),
        }
    }

    /// Create a stepper with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_config(config: &StepperConfig) -> Result<Self> {
        config.validate()?;
        let gravity = config.gravity.as_ref().map(gravity::from_config).transpose()?;

        Ok(Self {
            clock: Clock::default().with_time_scale(config.time_scale),
            gravity,
            check_divergence: config.check_divergence,
            pending: Vec::new(),
        })
    }

    /// Replace the gravity solver.
    #[must_use]
    pub fn with_gravity(mut self, solver: Box<dyn GravitySolver>) -> Self {
        self.gravity = Some(solver);
        self
    }

    /// Disable gravity.
    #[must_use]
    pub fn without_gravity(mut self) -> Self {
        self.gravity = None;
        self
    }

    /// The frame clock.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// The gravity solver, if any.
    #[must_use]
    pub fn gravity(&self) -> Option<&dyn GravitySolver> {
        self.gravity.as_deref()
    }

    /// Collisions found but not yet passed, sorted by time of impact.
    #[must_use]
    pub fn pending_collisions(&self) -> &[Collision] {
        &self.pending
    }

    /// Advance `world` by one frame of `frame_dt` seconds.
    ///
    /// This performs:
    /// 1. Accumulate the scaled frame time
    /// 2. Pass pending collisions whose `t` has been reached
    /// 3. Run as many fixed steps as fit: pass what is still pending, apply
    ///    gravity, step the world, schedule the collisions it finds
    /// 4. Interpolate render positions at the leftover fraction
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `frame_dt` is negative or not finite
    /// - The world timestep is invalid
    /// - The world state diverges (with divergence checks enabled)
    pub fn update(&mut self, world: &mut World, frame_dt: f64) -> Result<FrameReport> {
        if !frame_dt.is_finite() || frame_dt < 0.0 {
            return Err(PhysicsError::invalid_config(format!(
                "frame time must be non-negative and finite, got {frame_dt}"
            )));
        }
        self.clock.set_fixed_timestep(world.timestep())?;

        let mut report = FrameReport::default();

        // 1. Accumulate frame time
        self.clock.update(frame_dt);

        // 2. Pass collisions reached by the render fraction
        self.release_until(self.clock.accumulator_t(), &mut report.passed);

        // 3. Fixed steps
        while self.clock.do_fixed_step() {
            // The previous step has fully elapsed.
            report.passed.append(&mut self.pending);

            if let Some(solver) = &self.gravity {
                world.apply_gravity(solver.as_ref());
            }
            world.step();
            if self.check_divergence {
                world.validate()?;
            }

            let found = world.find_collisions()?;
            report.found.extend_from_slice(&found);
            self.pending = found;
            report.steps += 1;
        }

        // 4. Interpolate for rendering
        report.accumulator_t = self.clock.accumulator_t();
        world.interpolate_linear(report.accumulator_t);

        trace!(
            steps = report.steps,
            found = report.found.len(),
            passed = report.passed.len(),
            pending = self.pending.len(),
            "frame"
        );

        Ok(report)
    }

    fn release_until(&mut self, t: f64, passed: &mut Vec<Collision>) {
        let reached = self.pending.iter().take_while(|c| c.t <= t).count();
        passed.extend(self.pending.drain(..reached));
    }
}
