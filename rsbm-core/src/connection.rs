//! Directed connections between reservoirs.

use crate::errors::{RSBMError, RSBMResult};
use crate::process::{Dependency, ProcessBinding};
use crate::reservoir::{ReservoirIndex, ReservoirRegistry};
use crate::timeseries::FloatValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One end of a connection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endpoint {
    Reservoir(String),
    /// Outside the model: an unlimited source or sink without state
    External,
}

impl Endpoint {
    pub fn reservoir(name: &str) -> Self {
        Endpoint::Reservoir(name.to_string())
    }

    fn label(&self) -> &str {
        match self {
            Endpoint::Reservoir(name) => name.as_str(),
            Endpoint::External => "external",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Direction of a flux relative to a reservoir.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sign {
    In,
    Out,
}

impl Sign {
    pub fn factor(self) -> FloatValue {
        match self {
            Sign::In => 1.0,
            Sign::Out => -1.0,
        }
    }
}

/// Description of a connection passed to [`crate::model::ModelBuilder::connect`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub source: Endpoint,
    pub sink: Endpoint,
    pub bindings: Vec<ProcessBinding>,
    /// Defaults to `"<source>_to_<sink>"`
    pub name: Option<String>,
}

impl ConnectionConfig {
    pub fn new(source: Endpoint, sink: Endpoint) -> Self {
        Self {
            source,
            sink,
            bindings: vec![],
            name: None,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_binding(mut self, binding: impl Into<ProcessBinding>) -> Self {
        self.bindings.push(binding.into());
        self
    }

    /// The name the connection will be registered under
    pub fn resolved_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}_to_{}", self.source, self.sink))
    }
}

/// A validated connection with its endpoints resolved to reservoir indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    name: String,
    source: Endpoint,
    sink: Endpoint,
    source_index: Option<ReservoirIndex>,
    sink_index: Option<ReservoirIndex>,
    bindings: Vec<ProcessBinding>,
}

impl Connection {
    /// Resolves and checks `config` against the registered reservoirs.
    pub(crate) fn resolve(config: ConnectionConfig, reservoirs: &ReservoirRegistry) -> RSBMResult<Self> {
        let name = config.resolved_name();
        let invalid = |reason: &str| RSBMError::InvalidConnection {
            connection: name.clone(),
            reason: reason.to_string(),
        };
        if config.source == config.sink {
            return Err(invalid("source and sink must differ"));
        }
        if config.bindings.is_empty() {
            return Err(invalid("at least one process binding is required"));
        }

        let resolve = |endpoint: &Endpoint| match endpoint {
            Endpoint::Reservoir(r) => reservoirs.index_of(r).map(Some),
            Endpoint::External => Ok(None),
        };
        let source_index = resolve(&config.source)?;
        let sink_index = resolve(&config.sink)?;

        if let (Some(s), Some(t)) = (source_index, sink_index) {
            let (source, sink) = (&reservoirs[s], &reservoirs[t]);
            if source.species().name != sink.species().name {
                return Err(invalid(&format!(
                    "species differ: '{}' holds {} but '{}' holds {}",
                    source.name(),
                    source.species().name,
                    sink.name(),
                    sink.species().name
                )));
            }
        }

        Ok(Self {
            name,
            source: config.source,
            sink: config.sink,
            source_index,
            sink_index,
            bindings: config.bindings,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &Endpoint {
        &self.source
    }

    pub fn sink(&self) -> &Endpoint {
        &self.sink
    }

    pub fn source_index(&self) -> Option<ReservoirIndex> {
        self.source_index
    }

    pub fn sink_index(&self) -> Option<ReservoirIndex> {
        self.sink_index
    }

    pub fn bindings(&self) -> &[ProcessBinding] {
        &self.bindings
    }

    /// Whether either end of this connection is the reservoir `idx`
    pub fn touches(&self, idx: ReservoirIndex) -> bool {
        self.source_index == Some(idx) || self.sink_index == Some(idx)
    }

    /// Declared same-step reads across all bindings, without duplicates
    pub fn dependencies(&self) -> Vec<Dependency> {
        let mut dependencies: Vec<Dependency> = self
            .bindings
            .iter()
            .flat_map(|b| b.process.dependencies())
            .collect();
        dependencies.sort();
        dependencies.dedup();
        dependencies
    }

    pub(crate) fn replace_bindings(&mut self, bindings: Vec<ProcessBinding>) -> Vec<ProcessBinding> {
        std::mem::replace(&mut self.bindings, bindings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::Process;
    use crate::reservoir::Reservoir;
    use crate::species::SpeciesRegistry;

    fn reservoirs() -> ReservoirRegistry {
        let mut species = SpeciesRegistry::new();
        let carbon = species.define_species("C", 12.011, None).unwrap();
        let phosphorus = species.define_species("P", 30.97, None).unwrap();
        let mut registry = ReservoirRegistry::new();
        for (name, s) in [("a", &carbon), ("b", &carbon), ("p", &phosphorus)] {
            registry
                .insert(Reservoir::new(name, s.clone(), 1.0, 1.0, None, false, 2).unwrap())
                .unwrap();
        }
        registry
    }

    #[test]
    fn default_name() {
        let config = ConnectionConfig::new(Endpoint::External, Endpoint::reservoir("a"))
            .with_binding(Process::constant(1.0));
        let connection = Connection::resolve(config, &reservoirs()).unwrap();
        assert_eq!(connection.name(), "external_to_a");
        assert_eq!(connection.source_index(), None);
        assert_eq!(connection.sink_index(), Some(0));
    }

    #[test]
    fn rejects_self_connection() {
        let config = ConnectionConfig::new(Endpoint::reservoir("a"), Endpoint::reservoir("a"))
            .with_binding(Process::constant(1.0));
        assert!(matches!(
            Connection::resolve(config, &reservoirs()),
            Err(RSBMError::InvalidConnection { .. })
        ));
    }

    #[test]
    fn rejects_species_mismatch() {
        let config = ConnectionConfig::new(Endpoint::reservoir("a"), Endpoint::reservoir("p"))
            .with_binding(Process::constant(1.0));
        let err = Connection::resolve(config, &reservoirs()).unwrap_err();
        assert!(err.to_string().contains("species differ"));
    }

    #[test]
    fn rejects_unknown_and_empty() {
        let config = ConnectionConfig::new(Endpoint::reservoir("a"), Endpoint::reservoir("z"))
            .with_binding(Process::constant(1.0));
        assert!(matches!(
            Connection::resolve(config, &reservoirs()),
            Err(RSBMError::UnknownName { .. })
        ));
        let config = ConnectionConfig::new(Endpoint::reservoir("a"), Endpoint::reservoir("b"));
        assert!(Connection::resolve(config, &reservoirs()).is_err());
    }

    #[test]
    fn dependencies_are_deduplicated() {
        let flux = Process::ScaleWithFlux {
            scale: 1.0,
            flux: "x".to_string(),
        };
        let config = ConnectionConfig::new(Endpoint::reservoir("a"), Endpoint::reservoir("b"))
            .with_binding(flux.clone())
            .with_binding(flux);
        let connection = Connection::resolve(config, &reservoirs()).unwrap();
        assert_eq!(connection.dependencies(), vec![Dependency::Flux("x".to_string())]);
        assert!(connection.touches(1));
        assert!(!connection.touches(2));
    }
}
