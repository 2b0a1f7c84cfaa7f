//! Chemical species and their isotope standards.
//!
//! Species are immutable once defined and shared between reservoirs as
//! `Arc<Species>`.

use crate::errors::{RSBMError, RSBMResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Reference ratio (heavy / light) against which delta values are expressed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsotopeStandard {
    /// Heavy to light isotope ratio of the standard
    pub ratio: f64,
    /// Name of the scale, e.g. "VPDB"
    pub scale: String,
}

impl IsotopeStandard {
    pub fn new(ratio: f64, scale: impl Into<String>) -> Self {
        Self {
            ratio,
            scale: scale.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Species {
    pub name: String,
    /// unit: g / mol
    pub molar_mass: f64,
    pub isotope_standard: Option<IsotopeStandard>,
    /// Label used when displaying the species, e.g. "DIC" for a carbon pool
    pub display_label: String,
}

impl Species {
    pub fn has_isotopes(&self) -> bool {
        self.isotope_standard.is_some()
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_label)
    }
}

/// Owns every species defined for a model, keyed by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeciesRegistry {
    species: BTreeMap<String, Arc<Species>>,
}

impl SpeciesRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines a new species.
    ///
    /// Names are unique within the registry and molar masses must be positive.
    pub fn define_species(
        &mut self,
        name: &str,
        molar_mass: f64,
        isotope_standard: Option<IsotopeStandard>,
    ) -> RSBMResult<Arc<Species>> {
        self.define_labelled(name, name, molar_mass, isotope_standard)
    }

    /// Defines a new species with a display label distinct from its name.
    pub fn define_labelled(
        &mut self,
        name: &str,
        display_label: &str,
        molar_mass: f64,
        isotope_standard: Option<IsotopeStandard>,
    ) -> RSBMResult<Arc<Species>> {
        if self.species.contains_key(name) {
            return Err(RSBMError::duplicate("species", name));
        }
        if !(molar_mass.is_finite() && molar_mass > 0.0) {
            return Err(RSBMError::InvalidConfiguration(format!(
                "molar mass of species '{name}' must be positive, got {molar_mass}"
            )));
        }
        if let Some(standard) = &isotope_standard {
            if !(standard.ratio.is_finite() && standard.ratio > 0.0) {
                return Err(RSBMError::InvalidConfiguration(format!(
                    "isotope standard of species '{name}' must have a positive ratio"
                )));
            }
        }

        let species = Arc::new(Species {
            name: name.to_string(),
            molar_mass,
            isotope_standard,
            display_label: display_label.to_string(),
        });
        self.species.insert(name.to_string(), species.clone());
        Ok(species)
    }

    /// Adds an already constructed species, for example one from a shared catalogue.
    pub fn insert(&mut self, species: Arc<Species>) -> RSBMResult<Arc<Species>> {
        if self.species.contains_key(&species.name) {
            return Err(RSBMError::duplicate("species", &species.name));
        }
        self.species.insert(species.name.clone(), species.clone());
        Ok(species)
    }

    pub fn get(&self, name: &str) -> RSBMResult<Arc<Species>> {
        self.species
            .get(name)
            .cloned()
            .ok_or_else(|| RSBMError::unknown("species", name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.species.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.species.len()
    }

    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Species>> {
        self.species.values()
    }
}
