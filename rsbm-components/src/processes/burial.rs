//! Burial of a fraction of export production that grows with oxygenation.

use log::debug;
use rsbm_core::errors::{RSBMError, RSBMResult};
use rsbm_core::model::ModelBuilder;
use rsbm_core::process::{Dependency, FluxRate, Process, ProcessContext, ProcessParameters};
use rsbm_core::timeseries::{FloatValue, Time};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Name the burial function is registered under
pub const BURIAL: &str = "oxygen_dependent_burial";

/// Parameters for the oxygen-dependent burial rate law
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BurialParameters {
    /// Buried fraction of the productivity flux under anoxia
    pub min_fraction: FloatValue,
    /// Buried fraction once oxygen reaches `o2_saturation`
    pub max_fraction: FloatValue,
    /// Oxygen concentration at which `max_fraction` is reached
    /// unit: model concentration
    pub o2_saturation: FloatValue,
    pub scale: FloatValue,
}

impl Default for BurialParameters {
    fn default() -> Self {
        Self {
            min_fraction: 0.01,
            max_fraction: 0.1,
            o2_saturation: 100.0,
            scale: 1.0,
        }
    }
}

impl BurialParameters {
    /// Reads the parameters of a bound process, falling back to the defaults
    /// for missing keys.
    pub fn from_process_parameters(parameters: &ProcessParameters) -> Self {
        let defaults = Self::default();
        Self {
            min_fraction: parameters.get_or("min_fraction", defaults.min_fraction),
            max_fraction: parameters.get_or("max_fraction", defaults.max_fraction),
            o2_saturation: parameters.get_or("o2_saturation", defaults.o2_saturation),
            scale: parameters.scale,
        }
    }
}

/// Oxygen-dependent burial
///
/// A fraction of the productivity flux $P$ is buried, rising linearly with
/// the oxygen concentration of the reference reservoir:
///
/// $$ F = s \cdot P \left( f_{min} + (f_{max} - f_{min}) \min\left(\frac{[O_2]}{[O_2]_{sat}}, 1\right) \right) $$
///
/// The productivity flux is read from another connection in the same step, so
/// the binding declares a [`Dependency::Flux`] on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Burial {
    parameters: BurialParameters,
}

impl Burial {
    pub fn from_parameters(parameters: BurialParameters) -> Self {
        Self { parameters }
    }

    pub fn burial_fraction(&self, o2: FloatValue) -> FloatValue {
        let p = &self.parameters;
        let oxygenation = (o2 / p.o2_saturation).clamp(0.0, 1.0);
        p.min_fraction + (p.max_fraction - p.min_fraction) * oxygenation
    }

    pub fn calculate_flux(&self, productivity: FloatValue, o2: FloatValue) -> FloatValue {
        self.parameters.scale * productivity * self.burial_fraction(o2)
    }

    /// A binding reading oxygen from `oxygen` and productivity from the
    /// connection named `productivity`.
    pub fn process(&self, oxygen: &str, productivity: &str) -> Process {
        let p = &self.parameters;
        let parameters = ProcessParameters::new()
            .with_scale(p.scale)
            .with_reference(oxygen)
            .with("min_fraction", p.min_fraction)
            .with("max_fraction", p.max_fraction)
            .with("o2_saturation", p.o2_saturation);
        Process::custom(BURIAL, parameters)
            .depending_on(Dependency::Flux(productivity.to_string()))
    }
}

fn oxygen_dependent_burial(
    ctx: &ProcessContext<'_>,
    parameters: &ProcessParameters,
    _t: Time,
) -> RSBMResult<FluxRate> {
    let productivity = ctx
        .dependencies()
        .iter()
        .find_map(|dependency| match dependency {
            Dependency::Flux(name) => Some(name.clone()),
            Dependency::UpdatedReservoir(_) => None,
        })
        .ok_or_else(|| RSBMError::InvalidConnection {
            connection: ctx.connection().to_string(),
            reason: "burial needs a declared productivity flux".to_string(),
        })?;
    let productivity = ctx.flux(&productivity)?.rate;
    let oxygen = ctx.reference_or_source(parameters.reference.as_deref())?;
    let o2 = oxygen.concentration.unwrap_or(0.0);

    let burial = Burial::from_parameters(BurialParameters::from_process_parameters(parameters));
    Ok(FluxRate::new(burial.calculate_flux(productivity, o2)))
}

/// Makes [`BURIAL`] available to custom processes.
pub fn register(builder: &mut ModelBuilder) -> RSBMResult<()> {
    builder.register_process(BURIAL, Arc::new(oxygen_dependent_burial))?;
    debug!("Registered process function '{BURIAL}'");
    Ok(())
}
