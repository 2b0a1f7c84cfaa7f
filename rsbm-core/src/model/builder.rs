//! Model builder for assembling reservoirs and connections.

use super::config::{ModelConfig, ModelUnits};
use super::runtime::Model;
use crate::assembler::EvaluationPlan;
use crate::connection::{Connection, ConnectionConfig};
use crate::errors::{RSBMError, RSBMResult};
use crate::process::{Process, ProcessFn, ProcessRegistry};
use crate::reservoir::{Reservoir, ReservoirRegistry};
use crate::signal::{Signal, SignalRegistry};
use crate::species::{IsotopeStandard, Species, SpeciesRegistry};
use crate::timeseries::{FloatValue, TimeAxis};
use crate::units::{Dimension, Quantity};
use log::info;
use std::sync::Arc;

/// Build a new model from species, reservoirs and the connections between them.
///
/// Names are checked as they are added, so duplicates and unknown references
/// fail immediately.
/// References that may be satisfied later (signals, process functions and other
/// connections' fluxes) are checked by [`ModelBuilder::build`], which also
/// compiles the evaluation order and rejects cyclic dependencies.
pub struct ModelBuilder {
    config: ModelConfig,
    units: ModelUnits,
    time_axis: Arc<TimeAxis>,
    species: SpeciesRegistry,
    reservoirs: ReservoirRegistry,
    connections: Vec<Connection>,
    signals: SignalRegistry,
    processes: ProcessRegistry,
}

impl ModelBuilder {
    pub fn new(config: ModelConfig) -> RSBMResult<Self> {
        let (units, time_axis) = config.validate()?;
        Ok(Self {
            config,
            units,
            time_axis: Arc::new(time_axis),
            species: SpeciesRegistry::new(),
            reservoirs: ReservoirRegistry::new(),
            connections: vec![],
            signals: SignalRegistry::new(),
            processes: ProcessRegistry::new(),
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn time_axis(&self) -> &TimeAxis {
        &self.time_axis
    }

    pub fn define_species(
        &mut self,
        name: &str,
        molar_mass: FloatValue,
        isotope_standard: Option<IsotopeStandard>,
    ) -> RSBMResult<Arc<Species>> {
        self.species.define_species(name, molar_mass, isotope_standard)
    }

    /// Adds a species defined elsewhere, such as a standard element definition.
    pub fn with_species(&mut self, species: Arc<Species>) -> RSBMResult<&mut Self> {
        self.species.insert(species)?;
        Ok(self)
    }

    /// Creates a reservoir holding `species`.
    ///
    /// `initial` is either a mass (or amount), or a concentration that is
    /// multiplied by `volume`. Both are converted into model units; crossing
    /// between mass and amount uses the molar mass of the species.
    pub fn create_reservoir(
        &mut self,
        name: &str,
        species: &str,
        initial: Quantity,
        volume: Quantity,
        initial_delta: Option<FloatValue>,
    ) -> RSBMResult<&mut Self> {
        if self.reservoirs.contains(name) {
            return Err(RSBMError::duplicate("reservoir", name));
        }
        let species = self.species.get(species)?;
        let volume_value = volume.magnitude_in(&self.units.volume)?;
        let amount = match initial.dimension() {
            d if d == Dimension::CONCENTRATION || d == Dimension::DENSITY => {
                initial.multiply(&volume)
            }
            _ => initial,
        };
        let mass = self.to_model_mass(&amount, &species)?;

        let reservoir = Reservoir::new(
            name,
            species,
            mass,
            volume_value,
            initial_delta,
            self.config.track_isotopes,
            self.time_axis.len(),
        )?;
        self.reservoirs.insert(reservoir)?;
        Ok(self)
    }

    /// Adds a connection between two reservoirs (or a reservoir and the outside).
    pub fn connect(&mut self, config: ConnectionConfig) -> RSBMResult<&mut Self> {
        let name = config.resolved_name();
        if self.connections.iter().any(|c| c.name() == name) {
            return Err(RSBMError::duplicate("connection", &name));
        }
        let connection = Connection::resolve(config, &self.reservoirs)?;
        self.connections.push(connection);
        Ok(self)
    }

    /// Registers a forcing signal sampled on the model time axis.
    pub fn add_signal(&mut self, signal: Signal) -> RSBMResult<&mut Self> {
        self.signals.insert(signal, &self.time_axis)?;
        Ok(self)
    }

    /// Registers a process function for use by [`Process::Custom`].
    pub fn register_process(&mut self, name: &str, function: ProcessFn) -> RSBMResult<&mut Self> {
        self.processes.register(name, function)?;
        Ok(self)
    }

    /// Checks every reference and compiles the model.
    pub fn build(&self) -> RSBMResult<Model> {
        for connection in &self.connections {
            validate_bindings(connection, &self.reservoirs, &self.signals, &self.processes)?;
        }
        let plan = EvaluationPlan::compile(&self.connections, &self.reservoirs)?;
        info!(
            "Built model with {} reservoirs, {} connections and {} steps",
            self.reservoirs.len(),
            self.connections.len(),
            self.time_axis.n_steps()
        );

        Ok(Model::new(
            self.config.clone(),
            self.units.clone(),
            self.time_axis.clone(),
            self.species.clone(),
            self.reservoirs.clone(),
            self.connections.clone(),
            self.signals.clone(),
            self.processes.clone(),
            plan,
        ))
    }

    fn to_model_mass(&self, quantity: &Quantity, species: &Species) -> RSBMResult<FloatValue> {
        let target = &self.units.mass;
        if quantity.unit().is_compatible(target) {
            return quantity.magnitude_in(target);
        }
        let converted = match (quantity.dimension(), target.dimension()) {
            (Dimension::MASS, Dimension::AMOUNT) => quantity.to_amount(species.molar_mass, target)?,
            (Dimension::AMOUNT, Dimension::MASS) => quantity.to_mass(species.molar_mass, target)?,
            _ => return Err(quantity.unit().mismatch(target)),
        };
        Ok(converted.magnitude())
    }
}

/// Checks the references made by a connection's bindings.
pub(crate) fn validate_bindings(
    connection: &Connection,
    reservoirs: &ReservoirRegistry,
    signals: &SignalRegistry,
    processes: &ProcessRegistry,
) -> RSBMResult<()> {
    let invalid = |reason: String| RSBMError::InvalidConnection {
        connection: connection.name().to_string(),
        reason,
    };
    if connection.bindings().is_empty() {
        return Err(invalid("at least one process binding is required".to_string()));
    }

    for binding in connection.bindings() {
        match &binding.process {
            Process::ScaleWithConcentration { reference, .. } => {
                let reservoir = reference_or_source(connection, reservoirs, reference.as_deref())?;
                if reservoir.volume() <= 0.0 {
                    return Err(invalid(format!(
                        "reservoir '{}' has no volume, so its concentration is undefined",
                        reservoir.name()
                    )));
                }
            }
            Process::ScaleWithMass { reference, .. } => {
                reference_or_source(connection, reservoirs, reference.as_deref())?;
            }
            Process::Signal { signal, .. } => {
                signals.get(signal)?;
            }
            Process::Custom {
                function,
                parameters,
                ..
            } => {
                processes.get(function)?;
                if let Some(reference) = &parameters.reference {
                    reservoirs.index_of(reference)?;
                }
            }
            Process::Constant { .. }
            | Process::ScaleWithFlux { .. }
            | Process::Fractionation { .. } => {}
        }
    }
    Ok(())
}

fn reference_or_source<'a>(
    connection: &Connection,
    reservoirs: &'a ReservoirRegistry,
    reference: Option<&str>,
) -> RSBMResult<&'a Reservoir> {
    match reference {
        Some(name) => reservoirs.get(name),
        None => match connection.source_index() {
            Some(idx) => Ok(&reservoirs[idx]),
            None => Err(RSBMError::InvalidConnection {
                connection: connection.name().to_string(),
                reason: "an external source needs an explicit reference reservoir".to_string(),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Endpoint;
    use approx::assert_relative_eq;

    fn builder() -> ModelBuilder {
        let mut builder = ModelBuilder::new(ModelConfig::default().with_mass_unit("mmol")).unwrap();
        builder.define_species("C", 12.0, None).unwrap();
        builder
    }

    #[test]
    fn converts_into_model_units() {
        let mut builder = builder();
        builder
            .create_reservoir(
                "a",
                "C",
                Quantity::new(2.0, "mol").unwrap(),
                Quantity::new(1.0, "m3").unwrap(),
                None,
            )
            .unwrap()
            .create_reservoir(
                "b",
                "C",
                Quantity::new(24.0, "g").unwrap(),
                Quantity::new(1.0, "L").unwrap(),
                None,
            )
            .unwrap()
            .create_reservoir(
                "c",
                "C",
                Quantity::new(3.0, "mmol/L").unwrap(),
                Quantity::new(2.0, "L").unwrap(),
                None,
            )
            .unwrap();
        let model = builder.build().unwrap();
        assert_relative_eq!(model.reservoir("a").unwrap().mass(), 2000.0);
        assert_relative_eq!(model.reservoir("a").unwrap().volume(), 1000.0);
        assert_relative_eq!(model.reservoir("b").unwrap().mass(), 2000.0);
        assert_relative_eq!(model.reservoir("c").unwrap().mass(), 6.0);
    }

    #[test]
    fn rejects_incompatible_quantities() {
        let mut builder = builder();
        let err = builder
            .create_reservoir(
                "a",
                "C",
                Quantity::new(1.0, "L").unwrap(),
                Quantity::new(1.0, "L").unwrap(),
                None,
            )
            .err()
            .unwrap();
        assert!(matches!(err, RSBMError::UnitMismatch { .. }));
    }

    #[test]
    fn duplicate_names() {
        let mut builder = builder();
        let mass = Quantity::new(1.0, "mol").unwrap();
        let volume = Quantity::new(1.0, "L").unwrap();
        builder
            .create_reservoir("a", "C", mass.clone(), volume.clone(), None)
            .unwrap()
            .create_reservoir("b", "C", mass.clone(), volume.clone(), None)
            .unwrap();
        assert!(matches!(
            builder.create_reservoir("a", "C", mass, volume, None),
            Err(RSBMError::DuplicateName { .. })
        ));
        assert!(builder.define_species("C", 12.0, None).is_err());

        let connection = ConnectionConfig::new(Endpoint::reservoir("a"), Endpoint::reservoir("b"))
            .with_binding(Process::constant(1.0));
        builder.connect(connection.clone()).unwrap();
        assert!(matches!(
            builder.connect(connection),
            Err(RSBMError::DuplicateName { .. })
        ));
    }

    #[test]
    fn build_checks_references() {
        let mut builder = builder();
        builder
            .create_reservoir(
                "a",
                "C",
                Quantity::new(1.0, "mol").unwrap(),
                Quantity::new(1.0, "L").unwrap(),
                None,
            )
            .unwrap()
            .connect(
                ConnectionConfig::new(Endpoint::External, Endpoint::reservoir("a")).with_binding(
                    Process::ScaleWithConcentration {
                        scale: 1.0,
                        reference: None,
                    },
                ),
            )
            .unwrap();
        let err = builder.build().err().unwrap();
        assert!(err.to_string().contains("explicit reference"));
    }

    #[test]
    fn build_checks_signals_and_functions() {
        let mut builder = builder();
        builder
            .create_reservoir(
                "a",
                "C",
                Quantity::new(1.0, "mol").unwrap(),
                Quantity::new(1.0, "L").unwrap(),
                None,
            )
            .unwrap()
            .connect(
                ConnectionConfig::new(Endpoint::External, Endpoint::reservoir("a"))
                    .with_binding(Process::custom("missing", Default::default())),
            )
            .unwrap();
        assert!(matches!(
            builder.build(),
            Err(RSBMError::UnknownName { .. })
        ));
    }
}
