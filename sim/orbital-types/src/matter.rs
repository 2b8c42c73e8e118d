//! Matter composition.
//!
//! A [`Matter`] value is a fixed-length vector of per-element amounts. The
//! total mass is the sum of the channels; density and heat capacity are the
//! mass-weighted averages of the per-element constants. All three derived
//! quantities are recomputed together on every write, so they can never be
//! observed out of sync with the composition.
//!
//! # Example
//!
//! ```
//! use orbital_types::Matter;
//!
//! let mut planet = Matter::hydrogen(10.0);
//! planet += Matter::hydrogen(5.0);
//!
//! assert_eq!(planet.mass(), 15.0);
//! assert_eq!(planet.density(), 10.0);
//! ```

use std::ops::{Add, AddAssign, Index, Mul, MulAssign};

use crate::{PhysicsError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of composition channels carried by every [`Matter`].
pub const CHANNELS: usize = Element::ALL.len();

/// A chemical element tracked as a matter channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Element {
    /// Channel 0.
    Hydrogen,
}

impl Element {
    /// Every element, in channel order.
    pub const ALL: [Self; 1] = [Self::Hydrogen];

    /// Channel index of this element.
    #[must_use]
    pub const fn channel(self) -> usize {
        match self {
            Self::Hydrogen => 0,
        }
    }

    /// Density of the pure element.
    #[must_use]
    pub const fn density(self) -> f64 {
        match self {
            Self::Hydrogen => 10.0,
        }
    }

    /// Heat capacity of the pure element.
    #[must_use]
    pub const fn heat_capacity(self) -> f64 {
        match self {
            Self::Hydrogen => 10.0,
        }
    }
}

/// Mutable composition vector with derived mass, density and heat capacity.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Matter {
    composition: [f64; CHANNELS],
    mass: f64,
    density: f64,
    heat_capacity: f64,
}

impl Default for Matter {
    fn default() -> Self {
        Self::from_array([0.0; CHANNELS])
    }
}

impl Matter {
    /// Create empty matter (all channels zero).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create matter made only of hydrogen.
    #[must_use]
    pub fn hydrogen(amount: f64) -> Self {
        let mut composition = [0.0; CHANNELS];
        composition[Element::Hydrogen.channel()] = amount;
        Self::from_array(composition)
    }

    /// Create matter from an explicit composition.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError::CompositionMismatch`] if `composition` does not
    /// have exactly [`CHANNELS`] entries.
    pub fn from_composition(composition: &[f64]) -> Result<Self> {
        let mut matter = Self::default();
        matter.set_composition(composition)?;
        Ok(matter)
    }

    fn from_array(composition: [f64; CHANNELS]) -> Self {
        let mut matter = Self {
            composition,
            mass: 0.0,
            density: 0.0,
            heat_capacity: 0.0,
        };
        matter.recompute();
        matter
    }

    /// Total mass (sum of all channels).
    #[must_use]
    pub fn mass(&self) -> f64 {
        self.mass
    }

    /// Mass-weighted average density.
    #[must_use]
    pub fn density(&self) -> f64 {
        self.density
    }

    /// Mass-weighted average heat capacity.
    #[must_use]
    pub fn heat_capacity(&self) -> f64 {
        self.heat_capacity
    }

    /// Per-channel amounts, in [`Element::ALL`] order.
    #[must_use]
    pub fn composition(&self) -> &[f64] {
        &self.composition
    }

    /// Amount of a single element.
    #[must_use]
    pub fn amount(&self, element: Element) -> f64 {
        self.composition[element.channel()]
    }

    /// Amount of hydrogen.
    #[must_use]
    pub fn hydrogen_amount(&self) -> f64 {
        self.amount(Element::Hydrogen)
    }

    /// Set the amount of a single element.
    pub fn set_amount(&mut self, element: Element, value: f64) {
        self.composition[element.channel()] = value;
        self.recompute();
    }

    /// Set the amount of hydrogen.
    pub fn set_hydrogen(&mut self, value: f64) {
        self.set_amount(Element::Hydrogen, value);
    }

    /// Set a channel by index.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError::ChannelOutOfRange`] if `index >= CHANNELS`.
    pub fn set(&mut self, index: usize, value: f64) -> Result<()> {
        let slot = self
            .composition
            .get_mut(index)
            .ok_or(PhysicsError::ChannelOutOfRange {
                index,
                channels: CHANNELS,
            })?;
        *slot = value;
        self.recompute();
        Ok(())
    }

    /// Replace the whole composition.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError::CompositionMismatch`] on a length mismatch; the
    /// matter is left untouched in that case.
    pub fn set_composition(&mut self, composition: &[f64]) -> Result<()> {
        if composition.len() != CHANNELS {
            return Err(PhysicsError::CompositionMismatch {
                expected: CHANNELS,
                actual: composition.len(),
            });
        }
        self.composition.copy_from_slice(composition);
        self.recompute();
        Ok(())
    }

    /// Add another matter channel-wise.
    pub fn absorb(&mut self, other: &Self) {
        for (mine, theirs) in self.composition.iter_mut().zip(other.composition) {
            *mine += theirs;
        }
        self.recompute();
    }

    /// Scale every channel by `factor`.
    pub fn scale(&mut self, factor: f64) {
        for amount in &mut self.composition {
            *amount *= factor;
        }
        self.recompute();
    }

    fn recompute(&mut self) {
        self.mass = self.composition.iter().sum();

        if self.mass > 0.0 {
            let weighted = |property: fn(Element) -> f64| {
                Element::ALL
                    .iter()
                    .map(|&element| self.composition[element.channel()] * property(element))
                    .sum::<f64>()
                    / self.mass
            };
            self.density = weighted(Element::density);
            self.heat_capacity = weighted(Element::heat_capacity);
        } else {
            // Empty matter takes channel 0's constants rather than 0/0.
            self.density = Element::ALL[0].density();
            self.heat_capacity = Element::ALL[0].heat_capacity();
        }
    }
}

impl Index<usize> for Matter {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.composition[index]
    }
}

impl Index<Element> for Matter {
    type Output = f64;

    fn index(&self, element: Element) -> &f64 {
        &self.composition[element.channel()]
    }
}

impl AddAssign<&Matter> for Matter {
    fn add_assign(&mut self, rhs: &Matter) {
        self.absorb(rhs);
    }
}

impl AddAssign for Matter {
    fn add_assign(&mut self, rhs: Matter) {
        self.absorb(&rhs);
    }
}

impl Add for Matter {
    type Output = Matter;

    fn add(mut self, rhs: Matter) -> Matter {
        self += &rhs;
        self
    }
}

impl Add<&Matter> for &Matter {
    type Output = Matter;

    fn add(self, rhs: &Matter) -> Matter {
        let mut sum = self.clone();
        sum += rhs;
        sum
    }
}

impl MulAssign<f64> for Matter {
    fn mul_assign(&mut self, rhs: f64) {
        self.scale(rhs);
    }
}

impl Mul<f64> for Matter {
    type Output = Matter;

    fn mul(mut self, rhs: f64) -> Matter {
        self.scale(rhs);
        self
    }
}

impl Mul<Matter> for f64 {
    type Output = Matter;

    fn mul(self, rhs: Matter) -> Matter {
        rhs * self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_matter_has_no_nan() {
        let matter = Matter::new();
        assert_eq!(matter.mass(), 0.0);
        assert!(matter.density().is_finite());
        assert!(matter.heat_capacity().is_finite());
    }

    #[test]
    fn test_mass_is_sum_of_composition() {
        let matter = Matter::from_composition(&[12.5]).unwrap();
        assert_eq!(matter.mass(), 12.5);
        assert_eq!(matter.hydrogen_amount(), 12.5);
        assert_eq!(matter[0], 12.5);
        assert_eq!(matter[Element::Hydrogen], 12.5);
    }

    #[test]
    fn test_composition_length_mismatch_rejected() {
        let err = Matter::from_composition(&[1.0, 2.0]).unwrap_err();
        assert_eq!(
            err,
            PhysicsError::CompositionMismatch {
                expected: CHANNELS,
                actual: 2
            }
        );

        let mut matter = Matter::hydrogen(3.0);
        assert!(matter.set_composition(&[]).is_err());
        assert_eq!(matter.mass(), 3.0, "failed write must not mutate");
    }

    #[test]
    fn test_indexed_set() {
        let mut matter = Matter::new();
        matter.set(0, 4.0).unwrap();
        assert_eq!(matter.mass(), 4.0);
        assert_eq!(matter.density(), Element::Hydrogen.density());

        let err = matter.set(CHANNELS, 1.0).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_absorb_and_scale() {
        let mut matter = Matter::hydrogen(2.0);
        matter.absorb(&Matter::hydrogen(3.0));
        assert_eq!(matter.mass(), 5.0);

        matter.scale(2.0);
        assert_eq!(matter.mass(), 10.0);
        assert_eq!(matter.heat_capacity(), Element::Hydrogen.heat_capacity());
    }

    #[test]
    fn test_operators() {
        let a = Matter::hydrogen(1.0);
        let b = Matter::hydrogen(2.0);

        assert_eq!((&a + &b).mass(), 3.0);
        assert_eq!((a.clone() * 4.0).mass(), 4.0);
        assert_eq!((0.5 * b.clone()).mass(), 1.0);

        let mut c = a;
        c += b;
        c *= 3.0;
        assert_eq!(c.mass(), 9.0);
    }

    #[test]
    fn test_add_method_syntax_uses_operator() {
        let sum = Add::add(Matter::hydrogen(1.0), Matter::hydrogen(2.0));
        assert_eq!(sum.mass(), 3.0);

        let sum = Matter::hydrogen(4.0).add(Matter::hydrogen(0.5));
        assert_eq!(sum.mass(), 4.5);
    }

    #[test]
    fn test_hydrogen_constructor_and_accessors() {
        let mut matter = Matter::hydrogen(2.0);
        assert_eq!(matter.hydrogen_amount(), 2.0);

        matter.set_hydrogen(6.0);
        assert_eq!(matter.hydrogen_amount(), 6.0);
        assert_eq!(matter.mass(), 6.0);
    }

    #[test]
    fn test_add_is_commutative() {
        let a = Matter::hydrogen(1.25);
        let b = Matter::hydrogen(7.5);
        assert_eq!((&a + &b).mass(), (&b + &a).mass());
    }
}
