//! Unit conversion calculations.
//!
//! [`Unit`] resolves a symbol (`"mmol"`) or a single quotient of two symbols
//! (`"mmol/L"`, `"mol / yr"`) against the [`UNIT_REGISTRY`]. Anything richer
//! than that is left to a dedicated unit-string library.
//!
//! # Example
//!
//! ```
//! use rsbm_core::units::Unit;
//!
//! let mmol_l = Unit::parse("mmol/L").unwrap();
//! let mol_m3 = Unit::parse("mol / m3").unwrap();
//! assert!(mmol_l.is_compatible(&mol_m3));
//! assert_eq!(mmol_l.conversion_factor(&mol_m3).unwrap(), 1.0);
//! ```

use super::dimension::Dimension;
use super::registry::UNIT_REGISTRY;
use crate::errors::{RSBMError, RSBMResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A resolved unit: a display symbol, its dimension and the factor to base units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    symbol: String,
    dimension: Dimension,
    to_base_factor: f64,
}

impl Unit {
    /// Parses a unit symbol or a quotient `numerator/denominator`.
    pub fn parse(input: &str) -> RSBMResult<Self> {
        let input = input.trim();
        match input.split_once('/') {
            Some((numerator, denominator)) => {
                let numerator = Self::lookup(numerator.trim())?;
                let denominator = Self::lookup(denominator.trim())?;
                Ok(numerator.per(&denominator))
            }
            None => Self::lookup(input),
        }
    }

    fn lookup(symbol: &str) -> RSBMResult<Self> {
        let info = UNIT_REGISTRY
            .get(symbol)
            .ok_or_else(|| RSBMError::UnknownUnit(symbol.to_string()))?;
        Ok(Self {
            symbol: info.symbol.to_string(),
            dimension: info.dimension,
            to_base_factor: info.to_base_factor,
        })
    }

    /// The dimensionless unit.
    pub fn dimensionless() -> Self {
        Self {
            symbol: "1".to_string(),
            dimension: Dimension::dimensionless(),
            to_base_factor: 1.0,
        }
    }

    /// Quotient of two units, e.g. `mol` per `yr`.
    #[must_use]
    pub fn per(&self, denominator: &Unit) -> Self {
        Self {
            symbol: format!("{}/{}", self.symbol, denominator.symbol),
            dimension: self.dimension - denominator.dimension,
            to_base_factor: self.to_base_factor / denominator.to_base_factor,
        }
    }

    /// Product of two units.
    #[must_use]
    pub fn times(&self, other: &Unit) -> Self {
        let symbol = match (self.dimension.is_dimensionless(), other.dimension.is_dimensionless()) {
            (true, _) if self.to_base_factor == 1.0 => other.symbol.clone(),
            (_, true) if other.to_base_factor == 1.0 => self.symbol.clone(),
            _ => format!("{}*{}", self.symbol, other.symbol),
        };
        Self {
            symbol,
            dimension: self.dimension * other.dimension,
            to_base_factor: self.to_base_factor * other.to_base_factor,
        }
    }

    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    #[must_use]
    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    /// Factor converting a value in this unit into base units.
    #[must_use]
    pub fn to_base_factor(&self) -> f64 {
        self.to_base_factor
    }

    /// Returns true if both units measure the same physical dimension.
    #[must_use]
    pub fn is_compatible(&self, other: &Unit) -> bool {
        self.dimension.is_compatible(&other.dimension)
    }

    /// Multiplier converting a value in `self` into a value in `target`.
    ///
    /// Fails with [`RSBMError::UnitMismatch`] when the dimensions differ.
    pub fn conversion_factor(&self, target: &Unit) -> RSBMResult<f64> {
        if !self.is_compatible(target) {
            return Err(self.mismatch(target));
        }
        Ok(self.to_base_factor / target.to_base_factor)
    }

    pub(crate) fn mismatch(&self, other: &Unit) -> RSBMError {
        RSBMError::UnitMismatch {
            from: self.symbol.clone(),
            to: other.symbol.clone(),
            from_dimension: self.dimension.to_string(),
            to_dimension: other.dimension.to_string(),
        }
    }

    /// Checks that this unit has the expected dimension.
    pub(crate) fn expect_dimension(&self, expected: Dimension, label: &str) -> RSBMResult<()> {
        if self.dimension.is_compatible(&expected) {
            Ok(())
        } else {
            Err(RSBMError::UnitMismatch {
                from: self.symbol.clone(),
                to: label.to_string(),
                from_dimension: self.dimension.to_string(),
                to_dimension: expected.to_string(),
            })
        }
    }
}

/// Two units are equal if they describe the same dimension and scale.
impl PartialEq for Unit {
    fn eq(&self, other: &Self) -> bool {
        self.dimension == other.dimension
            && is_close::is_close!(self.to_base_factor, other.to_base_factor)
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol)
    }
}

/// Conversion factor between two unit strings.
pub fn conversion_factor(from: &str, to: &str) -> RSBMResult<f64> {
    Unit::parse(from)?.conversion_factor(&Unit::parse(to)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use is_close::is_close;

    #[test]
    fn test_parse_simple_and_compound() {
        let mol = Unit::parse("mol").unwrap();
        assert_eq!(mol.dimension(), Dimension::AMOUNT);

        let rate = Unit::parse("mol / yr").unwrap();
        assert_eq!(rate.dimension(), Dimension::AMOUNT_RATE);
        assert_eq!(rate.symbol(), "mol/yr");
    }

    #[test]
    fn test_unknown_unit() {
        let err = Unit::parse("mol/fortnight").unwrap_err();
        assert_eq!(err, RSBMError::UnknownUnit("fortnight".to_string()));
    }

    #[test]
    fn test_concentration_conversion() {
        let factor = conversion_factor("mmol/L", "mol/L").unwrap();
        assert!(is_close!(factor, 1e-3));
        let factor = conversion_factor("umol/kg", "mmol/kg").unwrap();
        assert!(is_close!(factor, 1e-3));
    }

    #[test]
    fn test_incompatible_units() {
        let err = conversion_factor("mol/L", "mol/kg").unwrap_err();
        assert!(matches!(err, RSBMError::UnitMismatch { .. }));
        assert!(err.to_string().contains("mol/L"));
    }

    #[test]
    fn test_equality_ignores_spelling() {
        assert_eq!(Unit::parse("mmol/L").unwrap(), Unit::parse("mol / m3").unwrap());
        assert_ne!(Unit::parse("mol").unwrap(), Unit::parse("mmol").unwrap());
    }

    #[test]
    fn test_times_and_per() {
        let rate = Unit::parse("Tmol/yr").unwrap();
        let time = Unit::parse("kyr").unwrap();
        let amount = rate.times(&time);
        assert_eq!(amount.dimension(), Dimension::AMOUNT);
        assert!(is_close!(
            amount.conversion_factor(&Unit::parse("Pmol").unwrap()).unwrap(),
            1.0
        ));
    }
}
