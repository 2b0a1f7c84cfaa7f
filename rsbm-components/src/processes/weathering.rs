//! Weathering flux as a power law of a reference concentration.

use log::debug;
use rsbm_core::errors::{RSBMError, RSBMResult};
use rsbm_core::model::ModelBuilder;
use rsbm_core::process::{FluxRate, Process, ProcessContext, ProcessParameters};
use rsbm_core::timeseries::{FloatValue, Time};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Name the weathering function is registered under
pub const WEATHERING: &str = "weathering";

/// Parameters for the weathering rate law
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatheringParameters {
    /// Flux at the reference concentration
    /// unit: model mass / model time
    pub f0: FloatValue,
    /// Reference concentration
    /// unit: model concentration
    pub c0: FloatValue,
    /// Exponent of the power law
    pub n: FloatValue,
    /// Factor applied to the concentration before it is compared with `c0`
    pub scale: FloatValue,
}

impl WeatheringParameters {
    /// Reads the parameters back from a bound process.
    pub fn from_process_parameters(parameters: &ProcessParameters) -> RSBMResult<Self> {
        Ok(Self {
            f0: parameters.get("f0")?,
            c0: parameters.get("c0")?,
            n: parameters.get_or("n", 1.0),
            scale: parameters.scale,
        })
    }
}

/// Weathering rate law
///
/// $$ F = f_0 \left( \frac{s \cdot c}{c_0} \right)^n $$
///
/// Where:
/// - $c$ is the concentration of the reference reservoir (the source when none is given)
/// - $s$ is a scale factor
/// - $f_0$ is the flux at $s \cdot c = c_0$
/// - $n$ is the weathering exponent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weathering {
    parameters: WeatheringParameters,
}

impl Weathering {
    pub fn from_parameters(parameters: WeatheringParameters) -> Self {
        Self { parameters }
    }

    pub fn calculate_flux(&self, concentration: FloatValue) -> FloatValue {
        let p = &self.parameters;
        if concentration <= 0.0 {
            return 0.0;
        }
        p.f0 * (p.scale * concentration / p.c0).powf(p.n)
    }

    /// A binding of this rate law, reading the concentration of `reference`.
    pub fn process(&self, reference: Option<&str>) -> Process {
        let p = &self.parameters;
        let mut parameters = ProcessParameters::new()
            .with_scale(p.scale)
            .with("f0", p.f0)
            .with("c0", p.c0)
            .with("n", p.n);
        if let Some(reference) = reference {
            parameters = parameters.with_reference(reference);
        }
        Process::custom(WEATHERING, parameters)
    }
}

fn weathering(
    ctx: &ProcessContext<'_>,
    parameters: &ProcessParameters,
    _t: Time,
) -> RSBMResult<FluxRate> {
    let reference = ctx.reference_or_source(parameters.reference.as_deref())?;
    let parameters = WeatheringParameters::from_process_parameters(parameters)?;
    if parameters.c0 <= 0.0 {
        return Err(RSBMError::InvalidConfiguration(format!(
            "weathering reference concentration must be positive, got {}",
            parameters.c0
        )));
    }
    let concentration = reference.concentration.ok_or_else(|| {
        RSBMError::Error(format!(
            "weathering in '{}' needs a concentration, but '{}' has no volume",
            ctx.connection(),
            reference.name
        ))
    })?;
    Ok(FluxRate::new(
        Weathering::from_parameters(parameters).calculate_flux(concentration),
    ))
}

/// Makes [`WEATHERING`] available to custom processes.
pub fn register(builder: &mut ModelBuilder) -> RSBMResult<()> {
    builder.register_process(WEATHERING, Arc::new(weathering))?;
    debug!("Registered process function '{WEATHERING}'");
    Ok(())
}
