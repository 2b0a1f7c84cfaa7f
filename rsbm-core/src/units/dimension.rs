//! Dimensional analysis for reservoir and flux units.
//!
//! Box models only ever combine four base quantities:
//! - Mass (M)
//! - Length (L), which only appears cubed as volume
//! - Time (T)
//! - Amount of substance (N)
//!
//! Derived dimensions (concentration, molality, rates) are represented as
//! integer exponents of these base dimensions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Mul, Neg, Sub};

/// Exponents of the base quantities making up a unit.
///
/// For example:
/// - Concentration has dimensions N·L⁻³ (amount = 1, length = -3)
/// - A molar flux has dimensions N·T⁻¹ (amount = 1, time = -1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Dimension {
    pub mass: i8,
    pub length: i8,
    pub time: i8,
    /// Moles (N)
    pub amount: i8,
}

impl Dimension {
    /// Ratios, scale factors and δ values.
    #[must_use]
    pub const fn dimensionless() -> Self {
        Self::new(0, 0, 0, 0)
    }

    #[must_use]
    pub const fn new(mass: i8, length: i8, time: i8, amount: i8) -> Self {
        Self {
            mass,
            length,
            time,
            amount,
        }
    }

    /// Mass dimension (M¹).
    pub const MASS: Self = Self::new(1, 0, 0, 0);

    /// Time dimension (T¹).
    pub const TIME: Self = Self::new(0, 0, 1, 0);

    /// Amount of substance dimension (N¹).
    pub const AMOUNT: Self = Self::new(0, 0, 0, 1);

    /// Volume dimension (L³).
    pub const VOLUME: Self = Self::new(0, 3, 0, 0);

    /// Amount concentration (N·L⁻³), e.g. mol/L.
    pub const CONCENTRATION: Self = Self::new(0, -3, 0, 1);

    /// Molality (N·M⁻¹), e.g. mol/kg.
    pub const MOLALITY: Self = Self::new(-1, 0, 0, 1);

    /// Density (M·L⁻³), e.g. kg/L.
    pub const DENSITY: Self = Self::new(1, -3, 0, 0);

    /// Molar flux (N·T⁻¹), e.g. mol/yr.
    pub const AMOUNT_RATE: Self = Self::new(0, 0, -1, 1);

    /// Mass flux (M·T⁻¹), e.g. Gt/yr.
    pub const MASS_RATE: Self = Self::new(1, 0, -1, 0);

    #[must_use]
    pub const fn is_dimensionless(&self) -> bool {
        self.is_compatible(&Self::dimensionless())
    }

    /// Units convert into each other only when their exponents match exactly.
    #[must_use]
    pub const fn is_compatible(&self, other: &Self) -> bool {
        self.mass == other.mass
            && self.length == other.length
            && self.time == other.time
            && self.amount == other.amount
    }

    /// True for quantities that can hold the contents of a reservoir (mass or amount).
    #[must_use]
    pub const fn is_extensive(&self) -> bool {
        self.is_compatible(&Self::MASS) || self.is_compatible(&Self::AMOUNT)
    }
}

impl Dimension {
    const fn combine(self, rhs: Self, sign: i8) -> Self {
        Self::new(
            self.mass + sign * rhs.mass,
            self.length + sign * rhs.length,
            self.time + sign * rhs.time,
            self.amount + sign * rhs.amount,
        )
    }
}

impl Mul for Dimension {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        self.combine(rhs, 1)
    }
}

/// Division of quantities, so `AMOUNT - VOLUME` is a concentration.
impl Sub for Dimension {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self.combine(rhs, -1)
    }
}

/// Reciprocal of a quantity.
impl Neg for Dimension {
    type Output = Self;

    fn neg(self) -> Self {
        Self::dimensionless().combine(self, -1)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dimensionless() {
            return write!(f, "dimensionless");
        }

        let symbols = [
            (self.mass, "M"),
            (self.length, "L"),
            (self.time, "T"),
            (self.amount, "N"),
        ];

        let parts: Vec<String> = symbols
            .iter()
            .filter(|(exp, _)| *exp != 0)
            .map(|(exp, sym)| match exp {
                1 => sym.to_string(),
                _ => format!("{sym}^{exp}"),
            })
            .collect();

        write!(f, "{}", parts.join(" "))
    }
}
