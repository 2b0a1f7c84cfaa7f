//! Rate laws acting on connections.
//!
//! A connection carries an ordered list of [`ProcessBinding`]s.
//! Each binding wraps a [`Process`] (the rate law and its parameters) and
//! optionally fixes the isotope ratio of the material it moves.
//!
//! Built-in rate laws cover the common cases. Anything else is a
//! [`Process::Custom`] referring to a [`ProcessFn`] registered by name with the
//! model. Process functions receive a read-only [`ProcessContext`] and must be
//! pure: the same context and time always yield the same rate.
//!
//! Reading another connection's flux, or the same-step updated state of a
//! reservoir, orders the evaluation of connections. Those reads must be declared
//! up front as [`Dependency`] values so the dependency graph can be built;
//! an undeclared read fails with [`RSBMError::UndeclaredDependency`].

use crate::assembler::EvaluationPlan;
use crate::connection::Connection;
use crate::errors::{RSBMError, RSBMResult};
use crate::isotopes::mix;
use crate::reservoir::{concentration, ReservoirIndex, ReservoirRegistry, ReservoirState};
use crate::signal::{SignalMode, SignalRegistry};
use crate::timeseries::{FloatValue, Time, TimeAxis};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::mem::Discriminant;
use std::sync::Arc;

/// A same-step read that orders connection evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Dependency {
    /// The flux of another connection, by connection name
    Flux(String),
    /// A reservoir's state after every other connection touching it has been applied
    UpdatedReservoir(String),
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dependency::Flux(name) => write!(f, "flux '{name}'"),
            Dependency::UpdatedReservoir(name) => write!(f, "updated reservoir '{name}'"),
        }
    }
}

/// Parameters handed to a custom process function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessParameters {
    pub rate: FloatValue,
    pub scale: FloatValue,
    /// Reference reservoir, if the function reads one other than the source
    pub reference: Option<String>,
    /// Function-specific named parameters
    pub extra: BTreeMap<String, FloatValue>,
}

impl Default for ProcessParameters {
    fn default() -> Self {
        Self {
            rate: 0.0,
            scale: 1.0,
            reference: None,
            extra: BTreeMap::new(),
        }
    }
}

impl ProcessParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(mut self, rate: FloatValue) -> Self {
        self.rate = rate;
        self
    }

    pub fn with_scale(mut self, scale: FloatValue) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_reference(mut self, reference: &str) -> Self {
        self.reference = Some(reference.to_string());
        self
    }

    pub fn with(mut self, key: &str, value: FloatValue) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }

    /// A named parameter that the function requires.
    pub fn get(&self, key: &str) -> RSBMResult<FloatValue> {
        self.extra
            .get(key)
            .copied()
            .ok_or_else(|| RSBMError::unknown("process parameter", key))
    }

    pub fn get_or(&self, key: &str, default: FloatValue) -> FloatValue {
        self.extra.get(key).copied().unwrap_or(default)
    }
}

/// A rate law together with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Process {
    /// A fixed rate. Carries no reference reservoir.
    Constant { rate: FloatValue },
    /// `scale * concentration(reference)`; the reference defaults to the source
    ScaleWithConcentration {
        scale: FloatValue,
        reference: Option<String>,
    },
    /// `scale * mass(reference)`; the reference defaults to the source
    ScaleWithMass {
        scale: FloatValue,
        reference: Option<String>,
    },
    /// `scale * rate(flux)` for another connection's flux
    ScaleWithFlux { scale: FloatValue, flux: String },
    /// Kinetic fractionation (per mil) of the flux accumulated so far
    Fractionation { alpha: FloatValue },
    /// A forcing signal added to, or multiplied into, the flux
    Signal { signal: String, mode: SignalMode },
    /// A user function registered with the model
    Custom {
        function: String,
        parameters: ProcessParameters,
        dependencies: Vec<Dependency>,
    },
}

impl Process {
    pub fn constant(rate: FloatValue) -> Self {
        Process::Constant { rate }
    }

    pub fn custom(function: &str, parameters: ProcessParameters) -> Self {
        Process::Custom {
            function: function.to_string(),
            parameters,
            dependencies: vec![],
        }
    }

    /// Adds a declared dependency to a custom process. Other variants are unchanged.
    pub fn depending_on(mut self, dependency: Dependency) -> Self {
        if let Process::Custom { dependencies, .. } = &mut self {
            dependencies.push(dependency);
        }
        self
    }

    /// The same-step reads this process makes
    pub fn dependencies(&self) -> Vec<Dependency> {
        match self {
            Process::ScaleWithFlux { flux, .. } => vec![Dependency::Flux(flux.clone())],
            Process::Custom { dependencies, .. } => dependencies.clone(),
            _ => vec![],
        }
    }

    /// The qualitative kind of rate law, ignoring parameter values
    pub fn kind(&self) -> Discriminant<Process> {
        std::mem::discriminant(self)
    }

    pub fn label(&self) -> &str {
        match self {
            Process::Constant { .. } => "constant",
            Process::ScaleWithConcentration { .. } => "scale_with_concentration",
            Process::ScaleWithMass { .. } => "scale_with_mass",
            Process::ScaleWithFlux { .. } => "scale_with_flux",
            Process::Fractionation { .. } => "fractionation",
            Process::Signal { .. } => "signal",
            Process::Custom { function, .. } => function,
        }
    }

    /// Evaluates this process within the connection described by `ctx`.
    pub(crate) fn contribution(
        &self,
        ctx: &ProcessContext<'_>,
        functions: &ProcessRegistry,
        t: Time,
    ) -> RSBMResult<Contribution> {
        let contribution = match self {
            Process::Constant { rate } => Contribution::Rate(FluxRate::new(*rate)),
            Process::ScaleWithConcentration { scale, reference } => {
                let reservoir = ctx.reference_or_source(reference.as_deref())?;
                let rate = if reservoir.mass <= 0.0 {
                    0.0
                } else {
                    let c = reservoir
                        .concentration
                        .ok_or_else(|| RSBMError::InvalidConnection {
                            connection: ctx.connection().to_string(),
                            reason: format!(
                                "reservoir '{}' has no volume, so no concentration",
                                reservoir.name
                            ),
                        })?;
                    scale * c
                };
                Contribution::Rate(FluxRate::new(rate))
            }
            Process::ScaleWithMass { scale, reference } => {
                let reservoir = ctx.reference_or_source(reference.as_deref())?;
                Contribution::Rate(FluxRate::new(scale * reservoir.mass.max(0.0)))
            }
            Process::ScaleWithFlux { scale, flux } => {
                Contribution::Rate(FluxRate::new(scale * ctx.flux(flux)?.rate))
            }
            Process::Fractionation { alpha } => Contribution::Fractionate(*alpha),
            Process::Signal { signal, mode } => {
                let value = ctx.signal(signal)?;
                match mode {
                    SignalMode::Add => Contribution::Rate(FluxRate::new(value)),
                    SignalMode::Multiply => Contribution::Scale(value),
                }
            }
            Process::Custom {
                function,
                parameters,
                ..
            } => {
                let f = functions.get(function)?;
                let result = f(ctx, parameters, t)?;
                if !result.rate.is_finite() {
                    return Err(RSBMError::Error(format!(
                        "process function '{function}' returned a non-finite rate ({})",
                        result.rate
                    )));
                }
                Contribution::Rate(result)
            }
        };
        Ok(contribution)
    }
}

/// The effect of one binding on the flux of its connection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Contribution {
    /// An additive rate contribution
    Rate(FluxRate),
    /// Multiplies the rate accumulated so far
    Scale(FloatValue),
    /// Fractionates the isotope ratio accumulated so far
    Fractionate(FloatValue),
}

/// A process as bound to a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessBinding {
    pub process: Process,
    /// Fixed isotope ratio (per mil) of the material this binding moves
    pub delta: Option<FloatValue>,
}

impl ProcessBinding {
    pub fn new(process: Process) -> Self {
        Self {
            process,
            delta: None,
        }
    }

    pub fn with_delta(mut self, delta: FloatValue) -> Self {
        self.delta = Some(delta);
        self
    }
}

impl From<Process> for ProcessBinding {
    fn from(process: Process) -> Self {
        Self::new(process)
    }
}

/// A signed rate (model mass per model time, positive from source to sink)
/// and the isotope ratio of the moved material.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FluxRate {
    pub rate: FloatValue,
    pub delta: Option<FloatValue>,
}

impl FluxRate {
    pub fn new(rate: FloatValue) -> Self {
        Self { rate, delta: None }
    }

    pub fn with_delta(mut self, delta: FloatValue) -> Self {
        self.delta = Some(delta);
        self
    }
}

/// The contract for user-supplied rate laws.
pub type ProcessFn = Arc<
    dyn Fn(&ProcessContext<'_>, &ProcessParameters, Time) -> RSBMResult<FluxRate> + Send + Sync,
>;

/// Process functions available to [`Process::Custom`], keyed by name.
#[derive(Clone, Default)]
pub struct ProcessRegistry {
    functions: HashMap<String, ProcessFn>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, function: ProcessFn) -> RSBMResult<()> {
        if self.functions.contains_key(name) {
            return Err(RSBMError::duplicate("process function", name));
        }
        self.functions.insert(name.to_string(), function);
        Ok(())
    }

    pub fn get(&self, name: &str) -> RSBMResult<&ProcessFn> {
        self.functions
            .get(name)
            .ok_or_else(|| RSBMError::unknown("process function", name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

impl fmt::Debug for ProcessRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("ProcessRegistry")
            .field("functions", &names)
            .finish()
    }
}

/// Read-only view of a reservoir handed to process functions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReservoirView<'a> {
    pub name: &'a str,
    pub mass: FloatValue,
    pub volume: FloatValue,
    pub concentration: Option<FloatValue>,
    pub delta: Option<FloatValue>,
}

/// Everything a process may read while its connection is evaluated.
///
/// Reservoir reads return the state at the start of the step.
pub struct ProcessContext<'a> {
    pub(crate) connection: &'a Connection,
    pub(crate) dependencies: Vec<Dependency>,
    pub(crate) reservoirs: &'a ReservoirRegistry,
    pub(crate) states: &'a [ReservoirState],
    pub(crate) connections: &'a [Connection],
    pub(crate) plan: &'a EvaluationPlan,
    pub(crate) fluxes: &'a [Option<FluxRate>],
    pub(crate) signals: &'a SignalRegistry,
    pub(crate) time_axis: &'a TimeAxis,
    pub(crate) time: Time,
    pub(crate) step: usize,
    pub(crate) dt: Time,
}

impl<'a> ProcessContext<'a> {
    /// Name of the connection being evaluated
    pub fn connection(&self) -> &'a str {
        self.connection.name()
    }

    /// Index of the current step
    pub fn step(&self) -> usize {
        self.step
    }

    /// Length of the current step.
    ///
    /// Zero when the adaptive backend evaluates the instantaneous rate.
    pub fn dt(&self) -> Time {
        self.dt
    }

    /// The declared same-step reads of the process being evaluated
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub fn reservoir(&self, name: &str) -> RSBMResult<ReservoirView<'a>> {
        let idx = self.reservoirs.index_of(name)?;
        Ok(self.view(idx, self.states[idx]))
    }

    pub fn source(&self) -> RSBMResult<ReservoirView<'a>> {
        let idx = self.connection.source_index().ok_or_else(|| self.external("source"))?;
        Ok(self.view(idx, self.states[idx]))
    }

    pub fn sink(&self) -> RSBMResult<ReservoirView<'a>> {
        let idx = self.connection.sink_index().ok_or_else(|| self.external("sink"))?;
        Ok(self.view(idx, self.states[idx]))
    }

    /// The named reservoir, or the source when `reference` is `None`.
    pub fn reference_or_source(&self, reference: Option<&str>) -> RSBMResult<ReservoirView<'a>> {
        match reference {
            Some(name) => self.reservoir(name),
            None => self.source(),
        }
    }

    /// A reservoir's state with every other connection touching it applied for
    /// this step.
    pub fn updated_reservoir(&self, name: &str) -> RSBMResult<ReservoirView<'a>> {
        self.check_declared(Dependency::UpdatedReservoir(name.to_string()))?;
        let idx = self.reservoirs.index_of(name)?;
        let own = self.plan.connection_index(self.connection.name());
        let start = self.states[idx];

        let transfers: Vec<(FloatValue, Option<FloatValue>)> = self
            .plan
            .accumulation(idx)
            .iter()
            .filter(|(c, _)| Some(*c) != own)
            .filter_map(|(c, sign)| {
                self.fluxes[*c].map(|flux| (sign.factor() * flux.rate * self.dt, flux.delta))
            })
            .collect();
        let mass = start.mass + transfers.iter().map(|(m, _)| m).sum::<FloatValue>();
        let delta = match start.delta {
            Some(_) if mass > 0.0 => mix(start.mass, start.delta, transfers).ok(),
            _ => None,
        };
        Ok(self.view(idx, ReservoirState { mass, delta }))
    }

    /// Another connection's flux for this step.
    pub fn flux(&self, name: &str) -> RSBMResult<FluxRate> {
        self.check_declared(Dependency::Flux(name.to_string()))?;
        let idx = self
            .plan
            .connection_index(name)
            .ok_or_else(|| RSBMError::unknown("connection", name))?;
        self.fluxes[idx].ok_or_else(|| {
            RSBMError::Error(format!(
                "flux '{}' was read by '{}' before it was evaluated",
                self.connections[idx].name(),
                self.connection()
            ))
        })
    }

    /// Value of a forcing signal at the evaluation time
    pub fn signal(&self, name: &str) -> RSBMResult<FloatValue> {
        Ok(self.signals.get(name)?.value_at(self.time_axis, self.time))
    }

    fn check_declared(&self, dependency: Dependency) -> RSBMResult<()> {
        if self.dependencies.contains(&dependency) {
            Ok(())
        } else {
            Err(RSBMError::UndeclaredDependency {
                connection: self.connection().to_string(),
                target: dependency.to_string(),
            })
        }
    }

    fn external(&self, end: &str) -> RSBMError {
        RSBMError::InvalidConnection {
            connection: self.connection().to_string(),
            reason: format!("the {end} is external and has no state"),
        }
    }

    fn view(&self, idx: ReservoirIndex, state: ReservoirState) -> ReservoirView<'a> {
        let reservoir = &self.reservoirs[idx];
        ReservoirView {
            name: reservoir.name(),
            mass: state.mass,
            volume: reservoir.volume(),
            concentration: concentration(state.mass, reservoir.volume()),
            delta: state.delta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependencies_of_builtins() {
        assert!(Process::constant(1.0).dependencies().is_empty());
        assert_eq!(
            Process::ScaleWithFlux {
                scale: 0.5,
                flux: "export".to_string()
            }
            .dependencies(),
            vec![Dependency::Flux("export".to_string())]
        );
        let custom = Process::custom("f", ProcessParameters::new())
            .depending_on(Dependency::UpdatedReservoir("ocean".to_string()));
        assert_eq!(
            custom.dependencies(),
            vec![Dependency::UpdatedReservoir("ocean".to_string())]
        );
    }

    #[test]
    fn kind_ignores_parameters() {
        assert_eq!(Process::constant(1.0).kind(), Process::constant(2.0).kind());
        assert_ne!(
            Process::constant(1.0).kind(),
            Process::Fractionation { alpha: 1.0 }.kind()
        );
    }

    #[test]
    fn parameters() {
        let params = ProcessParameters::new()
            .with_rate(2.0)
            .with_reference("atmosphere")
            .with("n", 0.2);
        assert_eq!(params.scale, 1.0);
        assert_eq!(params.get("n").unwrap(), 0.2);
        assert!(params.get("missing").is_err());
        assert_eq!(params.get_or("missing", 3.0), 3.0);
    }

    #[test]
    fn registry() {
        let mut registry = ProcessRegistry::new();
        let f: ProcessFn = Arc::new(|_, params, _| Ok(FluxRate::new(params.rate)));
        registry.register("fixed", f.clone()).unwrap();
        assert!(matches!(
            registry.register("fixed", f),
            Err(RSBMError::DuplicateName { .. })
        ));
        assert!(registry.get("other").is_err());
        assert_eq!(
            format!("{registry:?}"),
            "ProcessRegistry { functions: [\"fixed\"] }"
        );
    }
}
