//! Run configuration.

use crate::errors::{RSBMError, RSBMResult};
use crate::timeseries::{Time, TimeAxis};
use crate::units::{Dimension, Unit};
use serde::{Deserialize, Serialize};

/// Embedded Runge-Kutta method used by the adaptive backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdaptiveMethod {
    /// Dormand-Prince 5(4)
    #[default]
    Dopri5,
    /// Dormand-Prince 8(5,3)
    Dop853,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveOptions {
    pub method: AdaptiveMethod,
    /// Relative tolerance
    pub rtol: f64,
    /// Absolute tolerance
    pub atol: f64,
}

impl Default for AdaptiveOptions {
    fn default() -> Self {
        Self {
            method: AdaptiveMethod::Dopri5,
            rtol: 1e-6,
            atol: 1e-9,
        }
    }
}

/// Integration backend
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Solver {
    /// Forward Euler on the model grid
    #[default]
    Euler,
    /// Variable step integration within each grid interval
    Adaptive(AdaptiveOptions),
}

/// Configuration of a model run.
///
/// ```
/// use rsbm_core::model::{ModelConfig, Solver};
///
/// let config = ModelConfig::from_toml(
///     r#"
///     stop = 1000
///     step = 10
///     step_unit = "yr"
///     mass_unit = "mol"
///
///     [solver]
///     type = "adaptive"
///     rtol = 1e-8
///     "#,
/// )
/// .unwrap();
/// assert_eq!(config.start, 0.0);
/// assert!(matches!(config.solver, Solver::Adaptive(_)));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub start: Time,
    pub stop: Time,
    pub step: Time,
    pub step_unit: String,
    /// Unit of reservoir masses; either a mass or an amount of substance
    pub mass_unit: String,
    pub volume_unit: String,
    pub solver: Solver,
    /// Track isotope ratios for reservoirs that declare an initial delta
    pub track_isotopes: bool,
    /// Keep a per-connection series of evaluated fluxes
    pub record_fluxes: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            start: 0.0,
            stop: 100.0,
            step: 1.0,
            step_unit: "yr".to_string(),
            mass_unit: "mol".to_string(),
            volume_unit: "L".to_string(),
            solver: Solver::Euler,
            track_isotopes: true,
            record_fluxes: false,
        }
    }
}

/// Units resolved from a [`ModelConfig`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelUnits {
    pub time: Unit,
    pub mass: Unit,
    pub volume: Unit,
}

impl ModelUnits {
    /// Unit of fluxes, model mass per model time
    pub fn rate(&self) -> Unit {
        self.mass.per(&self.time)
    }

    pub fn concentration(&self) -> Unit {
        self.mass.per(&self.volume)
    }
}

impl ModelConfig {
    pub fn from_toml(input: &str) -> RSBMResult<Self> {
        toml::from_str(input).map_err(|e| RSBMError::InvalidConfiguration(e.to_string()))
    }

    pub fn to_toml(&self) -> RSBMResult<String> {
        toml::to_string(self).map_err(|e| RSBMError::InvalidConfiguration(e.to_string()))
    }

    pub fn with_grid(mut self, start: Time, stop: Time, step: Time) -> Self {
        self.start = start;
        self.stop = stop;
        self.step = step;
        self
    }

    pub fn with_solver(mut self, solver: Solver) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_mass_unit(mut self, unit: &str) -> Self {
        self.mass_unit = unit.to_string();
        self
    }

    pub fn with_record_fluxes(mut self, record_fluxes: bool) -> Self {
        self.record_fluxes = record_fluxes;
        self
    }

    pub fn with_track_isotopes(mut self, track_isotopes: bool) -> Self {
        self.track_isotopes = track_isotopes;
        self
    }

    /// Resolves and checks the configured units.
    pub fn units(&self) -> RSBMResult<ModelUnits> {
        let time = Unit::parse(&self.step_unit)?;
        time.expect_dimension(Dimension::TIME, "step_unit")?;
        let mass = Unit::parse(&self.mass_unit)?;
        if !(mass.dimension() == Dimension::MASS || mass.dimension() == Dimension::AMOUNT) {
            return Err(RSBMError::InvalidConfiguration(format!(
                "mass_unit '{}' is neither a mass nor an amount of substance",
                self.mass_unit
            )));
        }
        let volume = Unit::parse(&self.volume_unit)?;
        volume.expect_dimension(Dimension::VOLUME, "volume_unit")?;
        Ok(ModelUnits { time, mass, volume })
    }

    pub fn time_axis(&self) -> RSBMResult<TimeAxis> {
        TimeAxis::from_grid(self.start, self.stop, self.step)
    }

    /// Checks the whole configuration, returning the resolved units and axis.
    pub fn validate(&self) -> RSBMResult<(ModelUnits, TimeAxis)> {
        if let Solver::Adaptive(options) = &self.solver {
            if !(options.rtol > 0.0 && options.atol > 0.0) {
                return Err(RSBMError::InvalidConfiguration(format!(
                    "adaptive tolerances must be positive (rtol = {}, atol = {})",
                    options.rtol, options.atol
                )));
            }
        }
        Ok((self.units()?, self.time_axis()?))
    }
}
