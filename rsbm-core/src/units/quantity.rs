//! Values tagged with a unit.
//!
//! Arithmetic is checked: adding a volume to an amount fails with
//! [`RSBMError::UnitMismatch`] instead of producing a number.
//! Crossing between amount-per-volume and amount-per-mass is only possible
//! through an explicit [`DensityModel`].

use super::conversion::Unit;
use super::dimension::Dimension;
use crate::errors::{RSBMError, RSBMResult};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Density used to move between concentration (mol/L) and molality (mol/kg).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DensityModel {
    /// Pure water at 1 kg/L.
    IdealWater,
    /// A caller-supplied density in kg/L (for example seawater at 1.025 kg/L).
    Explicit { kg_per_litre: f64 },
}

impl DensityModel {
    /// Density in base units (kg/m^3).
    fn base_density(&self) -> f64 {
        match self {
            DensityModel::IdealWater => 1_000.0,
            DensityModel::Explicit { kg_per_litre } => kg_per_litre * 1_000.0,
        }
    }
}

/// A scalar value with a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    value: f64,
    unit: Unit,
}

impl Quantity {
    /// Creates a quantity from a value and a unit string.
    pub fn new(value: f64, unit: &str) -> RSBMResult<Self> {
        Ok(Self {
            value,
            unit: Unit::parse(unit)?,
        })
    }

    pub fn from_unit(value: f64, unit: Unit) -> Self {
        Self { value, unit }
    }

    /// The numeric value expressed in [`Quantity::unit`].
    #[must_use]
    pub fn magnitude(&self) -> f64 {
        self.value
    }

    #[must_use]
    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    #[must_use]
    pub fn dimension(&self) -> Dimension {
        self.unit.dimension()
    }

    /// Converts into a compatible unit.
    pub fn to(&self, target: &Unit) -> RSBMResult<Quantity> {
        let factor = self.unit.conversion_factor(target)?;
        Ok(Self {
            value: self.value * factor,
            unit: target.clone(),
        })
    }

    /// Converts into a compatible unit given as a string.
    pub fn to_unit(&self, target: &str) -> RSBMResult<Quantity> {
        self.to(&Unit::parse(target)?)
    }

    /// Magnitude of this quantity expressed in `target`.
    pub fn magnitude_in(&self, target: &Unit) -> RSBMResult<f64> {
        Ok(self.to(target)?.value)
    }

    /// Adds a compatible quantity, returning the sum in the unit of `self`.
    pub fn checked_add(&self, rhs: &Quantity) -> RSBMResult<Quantity> {
        let rhs = rhs.to(&self.unit).map_err(|_| self.unit.mismatch(&rhs.unit))?;
        Ok(Self {
            value: self.value + rhs.value,
            unit: self.unit.clone(),
        })
    }

    /// Subtracts a compatible quantity, returning the difference in the unit of `self`.
    pub fn checked_sub(&self, rhs: &Quantity) -> RSBMResult<Quantity> {
        let rhs = rhs.to(&self.unit).map_err(|_| self.unit.mismatch(&rhs.unit))?;
        Ok(Self {
            value: self.value - rhs.value,
            unit: self.unit.clone(),
        })
    }

    #[must_use]
    pub fn multiply(&self, rhs: &Quantity) -> Quantity {
        Self {
            value: self.value * rhs.value,
            unit: self.unit.times(&rhs.unit),
        }
    }

    #[must_use]
    pub fn divide(&self, rhs: &Quantity) -> Quantity {
        Self {
            value: self.value / rhs.value,
            unit: self.unit.per(&rhs.unit),
        }
    }

    #[must_use]
    pub fn scale(&self, factor: f64) -> Quantity {
        Self {
            value: self.value * factor,
            unit: self.unit.clone(),
        }
    }

    /// Converts between concentration and molality through an explicit density.
    ///
    /// Conversions that stay within one dimension ignore the density.
    pub fn to_with_density(&self, target: &Unit, density: DensityModel) -> RSBMResult<Quantity> {
        if self.unit.is_compatible(target) {
            return self.to(target);
        }
        let base_value = self.value * self.unit.to_base_factor();
        let from = self.dimension();
        let to = target.dimension();
        let converted = if from == Dimension::CONCENTRATION && to == Dimension::MOLALITY {
            base_value / density.base_density()
        } else if from == Dimension::MOLALITY && to == Dimension::CONCENTRATION {
            base_value * density.base_density()
        } else {
            return Err(self.unit.mismatch(target));
        };
        Ok(Self {
            value: converted / target.to_base_factor(),
            unit: target.clone(),
        })
    }

    /// Converts a mass into an amount of substance using a molar mass in g/mol.
    pub fn to_amount(&self, molar_mass: f64, target: &Unit) -> RSBMResult<Quantity> {
        self.unit.expect_dimension(Dimension::MASS, "mass")?;
        target.expect_dimension(Dimension::AMOUNT, "amount")?;
        if molar_mass <= 0.0 {
            return Err(RSBMError::InvalidConfiguration(format!(
                "molar mass must be positive, got {molar_mass}"
            )));
        }
        // base mass is kg, molar mass is g/mol
        let moles = self.value * self.unit.to_base_factor() * 1_000.0 / molar_mass;
        Ok(Self {
            value: moles / target.to_base_factor(),
            unit: target.clone(),
        })
    }

    /// Converts an amount of substance into a mass using a molar mass in g/mol.
    pub fn to_mass(&self, molar_mass: f64, target: &Unit) -> RSBMResult<Quantity> {
        self.unit.expect_dimension(Dimension::AMOUNT, "amount")?;
        target.expect_dimension(Dimension::MASS, "mass")?;
        let kilograms = self.value * self.unit.to_base_factor() * molar_mass / 1_000.0;
        Ok(Self {
            value: kilograms / target.to_base_factor(),
            unit: target.clone(),
        })
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

/// An array of values sharing one unit, used for exported time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayQuantity {
    values: Array1<f64>,
    unit: Unit,
}

impl ArrayQuantity {
    pub fn new(values: Array1<f64>, unit: Unit) -> Self {
        Self { values, unit }
    }

    pub fn values(&self) -> &Array1<f64> {
        &self.values
    }

    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    /// Converts every element into a compatible unit.
    pub fn to(&self, target: &Unit) -> RSBMResult<ArrayQuantity> {
        let factor = self.unit.conversion_factor(target)?;
        Ok(Self {
            values: &self.values * factor,
            unit: target.clone(),
        })
    }

    /// Element-wise sum with a compatible array of the same length.
    pub fn checked_add(&self, rhs: &ArrayQuantity) -> RSBMResult<ArrayQuantity> {
        let rhs = rhs.to(&self.unit).map_err(|_| self.unit.mismatch(&rhs.unit))?;
        if rhs.values.len() != self.values.len() {
            return Err(RSBMError::Error(format!(
                "cannot add arrays of length {} and {}",
                self.values.len(),
                rhs.values.len()
            )));
        }
        Ok(Self {
            values: &self.values + &rhs.values,
            unit: self.unit.clone(),
        })
    }

    pub fn get(&self, index: usize) -> Option<Quantity> {
        self.values
            .get(index)
            .map(|value| Quantity::from_unit(*value, self.unit.clone()))
    }
}
