//! Integration tests for the model module.
//!
//! These tests build small models through the [`ModelBuilder`] and run them to
//! completion, checking the recorded reservoir state.

#[cfg(test)]
mod dependencies;
#[cfg(test)]
mod state_io;

use crate::connection::{ConnectionConfig, Endpoint};
use crate::model::{ModelBuilder, ModelConfig};
use crate::process::ProcessBinding;
use crate::species::IsotopeStandard;
use crate::units::Quantity;

/// A builder with carbon defined and mass in mol over `[0, stop]` with unit steps.
pub(super) fn carbon_builder(config: ModelConfig) -> ModelBuilder {
    let mut builder = ModelBuilder::new(config).unwrap();
    builder
        .define_species("C", 12.011, Some(IsotopeStandard::new(0.0112372, "VPDB")))
        .unwrap();
    builder
}

pub(super) fn euler(stop: f64) -> ModelConfig {
    ModelConfig::default().with_grid(0.0, stop, 1.0)
}

pub(super) fn add_reservoir(builder: &mut ModelBuilder, name: &str, mass: f64, delta: Option<f64>) {
    builder
        .create_reservoir(
            name,
            "C",
            Quantity::new(mass, "mol").unwrap(),
            Quantity::new(1.0, "L").unwrap(),
            delta,
        )
        .unwrap();
}

pub(super) fn link(
    builder: &mut ModelBuilder,
    name: &str,
    source: &str,
    sink: &str,
    bindings: Vec<ProcessBinding>,
) {
    let endpoint = |n: &str| {
        if n == "external" {
            Endpoint::External
        } else {
            Endpoint::reservoir(n)
        }
    };
    let mut config = ConnectionConfig::new(endpoint(source), endpoint(sink)).with_name(name);
    config.bindings = bindings;
    builder.connect(config).unwrap();
}
