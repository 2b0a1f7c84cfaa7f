//! Exported results and imported initial state.
//!
//! Both are plain serde structures. Writing them to disk is left to the caller.

use crate::errors::RSBMResult;
use crate::timeseries::{FloatValue, Time};
use crate::units::{ArrayQuantity, Unit};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// One point of a reservoir's history
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateRow {
    pub time: Time,
    pub mass: FloatValue,
    pub concentration: Option<FloatValue>,
    pub delta: Option<FloatValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservoirSeries {
    pub name: String,
    pub species: String,
    pub mass_unit: String,
    pub concentration_unit: String,
    /// Isotope scale of `delta`, if the species has one
    pub isotope_scale: Option<String>,
    pub rows: Vec<StateRow>,
}

impl ReservoirSeries {
    pub fn last(&self) -> Option<&StateRow> {
        self.rows.last()
    }

    pub fn masses(&self) -> Vec<FloatValue> {
        self.rows.iter().map(|row| row.mass).collect()
    }

    /// The mass history in `mass_unit`.
    pub fn mass_column(&self) -> RSBMResult<ArrayQuantity> {
        Ok(ArrayQuantity::new(
            self.rows.iter().map(|row| row.mass).collect(),
            Unit::parse(&self.mass_unit)?,
        ))
    }

    /// The concentration history in `concentration_unit`, or `None` for a
    /// reservoir without volume.
    pub fn concentration_column(&self) -> RSBMResult<Option<ArrayQuantity>> {
        let values: Option<Array1<FloatValue>> =
            self.rows.iter().map(|row| row.concentration).collect();
        match values {
            Some(values) if !values.is_empty() => Ok(Some(ArrayQuantity::new(
                values,
                Unit::parse(&self.concentration_unit)?,
            ))),
            _ => Ok(None),
        }
    }
}

/// One evaluated flux of a connection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FluxRow {
    /// Start of the step the flux was evaluated for
    pub time: Time,
    pub rate: FloatValue,
    pub delta: Option<FloatValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FluxSeries {
    pub connection: String,
    pub rate_unit: String,
    pub rows: Vec<FluxRow>,
}

impl FluxSeries {
    /// The evaluated rates in `rate_unit`.
    pub fn rate_column(&self) -> RSBMResult<ArrayQuantity> {
        Ok(ArrayQuantity::new(
            self.rows.iter().map(|row| row.rate).collect(),
            Unit::parse(&self.rate_unit)?,
        ))
    }
}

/// The results of a model run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelExport {
    pub time_unit: String,
    pub reservoirs: Vec<ReservoirSeries>,
    /// Empty unless the model records fluxes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fluxes: Vec<FluxSeries>,
}

impl ModelExport {
    pub fn reservoir(&self, name: &str) -> Option<&ReservoirSeries> {
        self.reservoirs.iter().find(|r| r.name == name)
    }

    pub fn flux(&self, connection: &str) -> Option<&FluxSeries> {
        self.fluxes.iter().find(|f| f.connection == connection)
    }

    /// The last exported state of every reservoir, for use as the initial
    /// state of a follow-up run.
    pub fn final_state(&self) -> InitialState {
        InitialState {
            reservoirs: self
                .reservoirs
                .iter()
                .filter_map(|series| {
                    series.last().map(|row| ReservoirInitialState {
                        name: series.name.clone(),
                        species: series.species.clone(),
                        mass: row.mass,
                        delta: row.delta,
                    })
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservoirInitialState {
    pub name: String,
    pub species: String,
    /// Mass in model units
    pub mass: FloatValue,
    pub delta: Option<FloatValue>,
}

/// Initial state for [`crate::model::Model::import_state`], matched by reservoir
/// name and species.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InitialState {
    pub reservoirs: Vec<ReservoirInitialState>,
}
