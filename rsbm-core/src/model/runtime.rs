//! Model struct and runtime execution.

use super::builder::validate_bindings;
use super::config::{ModelConfig, ModelUnits, Solver};
use super::diagnostics::{Diagnostics, ModelWarning};
use super::evaluation::FluxEvaluator;
use super::solvers::{adaptive_step, euler_step, StepResult};
use super::state_io::{
    FluxRow, FluxSeries, InitialState, ModelExport, ReservoirSeries, StateRow,
};
use crate::assembler::{DependencyGraph, EvaluationPlan};
use crate::connection::Connection;
use crate::errors::{RSBMError, RSBMResult};
use crate::process::{ProcessBinding, ProcessRegistry};
use crate::reservoir::{concentration, Reservoir, ReservoirRegistry, ReservoirState};
use crate::signal::SignalRegistry;
use crate::species::SpeciesRegistry;
use crate::timeseries::{FloatValue, Time, TimeAxis, Timeseries};
use log::{debug, error, info};
use petgraph::dot::Dot;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Lifecycle of a model run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelStatus {
    /// Compiled and at the start of the time axis
    Built,
    Running,
    Completed,
    /// A step failed; the series up to the failing step are kept
    Failed,
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ModelStatus::Built => "built",
            ModelStatus::Running => "running",
            ModelStatus::Completed => "completed",
            ModelStatus::Failed => "failed",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone)]
struct FluxHistory {
    rates: Timeseries,
    deltas: Timeseries,
}

/// A set of reservoirs exchanging mass through connections, solved on a common
/// time axis.
///
/// Each step evaluates every connection in the order fixed by the
/// [`EvaluationPlan`], sums the signed fluxes per reservoir and advances the
/// reservoirs to the end of the step.
/// The state at every point of the time axis is kept in the reservoirs'
/// histories and can be exported with [`Model::export`].
pub struct Model {
    config: ModelConfig,
    units: ModelUnits,
    time_axis: Arc<TimeAxis>,
    species: SpeciesRegistry,
    reservoirs: ReservoirRegistry,
    connections: Vec<Connection>,
    signals: SignalRegistry,
    processes: ProcessRegistry,
    plan: EvaluationPlan,
    time_index: usize,
    status: ModelStatus,
    diagnostics: Diagnostics,
    flux_history: Option<Vec<FluxHistory>>,
}

impl Model {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: ModelConfig,
        units: ModelUnits,
        time_axis: Arc<TimeAxis>,
        species: SpeciesRegistry,
        reservoirs: ReservoirRegistry,
        connections: Vec<Connection>,
        signals: SignalRegistry,
        processes: ProcessRegistry,
        plan: EvaluationPlan,
    ) -> Self {
        let flux_history = config.record_fluxes.then(|| {
            connections
                .iter()
                .map(|_| FluxHistory {
                    rates: Timeseries::new_empty(time_axis.n_steps()),
                    deltas: Timeseries::new_empty(time_axis.n_steps()),
                })
                .collect()
        });
        Self {
            config,
            units,
            time_axis,
            species,
            reservoirs,
            connections,
            signals,
            processes,
            plan,
            time_index: 0,
            status: ModelStatus::Built,
            diagnostics: Diagnostics::default(),
            flux_history,
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn units(&self) -> &ModelUnits {
        &self.units
    }

    pub fn status(&self) -> ModelStatus {
        self.status
    }

    pub fn time_axis(&self) -> &TimeAxis {
        &self.time_axis
    }

    /// Index of the current point on the time axis
    pub fn time_index(&self) -> usize {
        self.time_index
    }

    /// Gets the time value at the current step.
    pub fn current_time(&self) -> Time {
        self.time_axis.at(self.time_index).unwrap_or(self.time_axis.last())
    }

    /// Gets the time bounds of the current step, if any steps remain.
    pub fn current_time_bounds(&self) -> Option<(Time, Time)> {
        self.time_axis.at_bounds(self.time_index)
    }

    /// Returns true if the model has no more time steps to process.
    pub fn finished(&self) -> bool {
        self.time_index == self.time_axis.n_steps()
    }

    pub fn species(&self) -> &SpeciesRegistry {
        &self.species
    }

    pub fn reservoirs(&self) -> &ReservoirRegistry {
        &self.reservoirs
    }

    pub fn reservoir(&self, name: &str) -> RSBMResult<&Reservoir> {
        self.reservoirs.get(name)
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn connection(&self, name: &str) -> RSBMResult<&Connection> {
        self.plan
            .connection_index(name)
            .map(|idx| &self.connections[idx])
            .ok_or_else(|| RSBMError::unknown("connection", name))
    }

    pub fn plan(&self) -> &EvaluationPlan {
        &self.plan
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Sum of the masses of every reservoir
    pub fn total_mass(&self) -> FloatValue {
        self.reservoirs.total_mass()
    }

    /// Steps the model forward one time step.
    ///
    /// A failing step sets the status to [`ModelStatus::Failed`] and returns
    /// [`RSBMError::Integration`]; the state recorded so far is kept.
    pub fn step(&mut self) -> RSBMResult<()> {
        match self.status {
            ModelStatus::Built => {
                info!(
                    "Starting run from t = {} to t = {} ({} steps)",
                    self.time_axis.first(),
                    self.time_axis.last(),
                    self.time_axis.n_steps()
                );
                self.status = ModelStatus::Running;
            }
            ModelStatus::Running => {}
            status => {
                return Err(RSBMError::InvalidModelState {
                    expected: "built or running".to_string(),
                    actual: status.to_string(),
                })
            }
        }

        let step = self.time_index;
        let bounds = self
            .time_axis
            .at_bounds(step)
            .ok_or_else(|| RSBMError::Error(format!("no time step at index {step}")))?;
        let states = self.reservoirs.states();

        let evaluator = FluxEvaluator {
            connections: &self.connections,
            plan: &self.plan,
            reservoirs: &self.reservoirs,
            signals: &self.signals,
            processes: &self.processes,
            time_axis: &self.time_axis,
        };
        let result = match &self.config.solver {
            Solver::Euler => euler_step(&evaluator, &states, bounds, step),
            Solver::Adaptive(options) => adaptive_step(&evaluator, &states, bounds, step, options),
        };

        let result = match result {
            Ok(result) => result,
            Err(failure) => {
                self.status = ModelStatus::Failed;
                let err = RSBMError::Integration {
                    step,
                    time: failure.time,
                    location: failure.location,
                    details: failure.details,
                };
                error!("{err}");
                return Err(err);
            }
        };
        self.commit(step, bounds.1, result)?;

        self.time_index += 1;
        if self.finished() {
            self.status = ModelStatus::Completed;
            info!("Run completed at t = {}", self.current_time());
        }
        Ok(())
    }

    /// Clamps, records and stores the end-of-step state.
    fn commit(&mut self, step: usize, time: Time, result: StepResult) -> RSBMResult<()> {
        for (r, proposed) in result.states.into_iter().enumerate() {
            let reservoir = self.reservoirs[r].name().to_string();
            let state = if proposed.mass < 0.0 {
                self.diagnostics.record(ModelWarning::NegativeMass {
                    reservoir,
                    step,
                    time,
                    mass: proposed.mass,
                });
                ReservoirState {
                    mass: 0.0,
                    delta: None,
                }
            } else {
                if proposed.undefined_ratio {
                    self.diagnostics.record(ModelWarning::UndefinedRatio {
                        reservoir,
                        step,
                        time,
                    });
                }
                ReservoirState {
                    mass: proposed.mass,
                    delta: proposed.delta,
                }
            };
            self.reservoirs[r].advance(state)?;
        }

        if let Some(history) = &mut self.flux_history {
            for (record, flux) in history.iter_mut().zip(result.fluxes.iter()) {
                record.rates.push(flux.rate)?;
                record.deltas.push(flux.delta.unwrap_or(FloatValue::NAN))?;
            }
        }
        Ok(())
    }

    /// Steps the model until the end of the time axis.
    pub fn run(&mut self) -> RSBMResult<()> {
        if matches!(self.status, ModelStatus::Completed | ModelStatus::Failed) {
            return Err(RSBMError::InvalidModelState {
                expected: "built or running".to_string(),
                actual: self.status.to_string(),
            });
        }
        while !self.finished() {
            self.step()?;
        }
        Ok(())
    }

    /// Returns every reservoir to its initial state and the model to `Built`.
    pub fn reset(&mut self) -> RSBMResult<()> {
        for reservoir in self.reservoirs.iter_mut() {
            reservoir.reset()?;
        }
        if let Some(history) = &mut self.flux_history {
            for record in history.iter_mut() {
                record.rates.truncate(0);
                record.deltas.truncate(0);
            }
        }
        self.diagnostics.clear();
        self.time_index = 0;
        self.status = ModelStatus::Built;
        debug!("Model reset");
        Ok(())
    }

    /// Replaces the process bindings of a connection.
    ///
    /// If the rate laws or the declared dependencies change, the evaluation
    /// order is recompiled first. Any failure yields
    /// [`RSBMError::InvalidConnectionUpdate`] and leaves the model unchanged.
    pub fn update_connection(&mut self, name: &str, bindings: Vec<ProcessBinding>) -> RSBMResult<()> {
        if self.status != ModelStatus::Built {
            return Err(RSBMError::InvalidModelState {
                expected: ModelStatus::Built.to_string(),
                actual: self.status.to_string(),
            });
        }
        let idx = self
            .plan
            .connection_index(name)
            .ok_or_else(|| RSBMError::unknown("connection", name))?;

        let before_dependencies = self.connections[idx].dependencies();
        let previous = self.connections[idx].replace_bindings(bindings);
        let connection = &self.connections[idx];
        let structural = connection.dependencies() != before_dependencies
            || !previous
                .iter()
                .map(|b| b.process.kind())
                .eq(connection.bindings().iter().map(|b| b.process.kind()));

        let mut result =
            validate_bindings(connection, &self.reservoirs, &self.signals, &self.processes);
        if result.is_ok() && structural {
            result = self
                .plan
                .recompile_connection(&self.connections, &self.reservoirs, idx);
        }

        match result {
            Ok(()) => {
                debug!("Updated connection '{name}' (recompiled: {structural})");
                Ok(())
            }
            Err(err) => {
                self.connections[idx].replace_bindings(previous);
                Err(RSBMError::InvalidConnectionUpdate {
                    connection: name.to_string(),
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Per-reservoir series of everything computed so far.
    pub fn export(&self) -> ModelExport {
        let times = self.time_axis.values();
        let concentration_unit = self.units.concentration().symbol().to_string();
        let reservoirs = self
            .reservoirs
            .iter()
            .map(|reservoir| ReservoirSeries {
                name: reservoir.name().to_string(),
                species: reservoir.species().name.clone(),
                mass_unit: self.units.mass.symbol().to_string(),
                concentration_unit: concentration_unit.clone(),
                isotope_scale: reservoir
                    .tracks_isotopes()
                    .then(|| reservoir.species().isotope_standard.as_ref())
                    .flatten()
                    .map(|standard| standard.scale.clone()),
                rows: (0..reservoir.history_len())
                    .filter_map(|i| {
                        reservoir.at(i).map(|state| StateRow {
                            time: times[i],
                            mass: state.mass,
                            concentration: concentration(state.mass, reservoir.volume()),
                            delta: state.delta,
                        })
                    })
                    .collect(),
            })
            .collect();

        let rate_unit = self.units.rate().symbol().to_string();
        let fluxes = self
            .flux_history
            .iter()
            .flatten()
            .zip(&self.connections)
            .map(|(record, connection)| FluxSeries {
                connection: connection.name().to_string(),
                rate_unit: rate_unit.clone(),
                rows: record
                    .rates
                    .values()
                    .iter()
                    .zip(record.deltas.values().iter())
                    .enumerate()
                    .map(|(i, (rate, delta))| FluxRow {
                        time: times[i],
                        rate: *rate,
                        delta: (!delta.is_nan()).then_some(*delta),
                    })
                    .collect(),
            })
            .collect();

        ModelExport {
            time_unit: self.units.time.symbol().to_string(),
            reservoirs,
            fluxes,
        }
    }

    /// Replaces the initial state of reservoirs, matched by name and species.
    ///
    /// Entries that match no reservoir are skipped with an
    /// [`ModelWarning::UnmatchedState`] warning.
    pub fn import_state(&mut self, state: &InitialState) -> RSBMResult<()> {
        if self.status != ModelStatus::Built {
            return Err(RSBMError::InvalidModelState {
                expected: ModelStatus::Built.to_string(),
                actual: self.status.to_string(),
            });
        }

        let mut matched = vec![];
        for entry in &state.reservoirs {
            let idx = match self.reservoirs.index_of(&entry.name) {
                Ok(idx) => idx,
                Err(_) => {
                    self.diagnostics.record(ModelWarning::UnmatchedState {
                        reservoir: entry.name.clone(),
                        reason: "no reservoir with this name".to_string(),
                    });
                    continue;
                }
            };
            let species = &self.reservoirs[idx].species().name;
            if *species != entry.species {
                self.diagnostics.record(ModelWarning::UnmatchedState {
                    reservoir: entry.name.clone(),
                    reason: format!("species '{}' does not match '{}'", entry.species, species),
                });
                continue;
            }
            if !(entry.mass.is_finite() && entry.mass >= 0.0) {
                return Err(RSBMError::InvalidConfiguration(format!(
                    "imported mass of reservoir '{}' must be non-negative, got {}",
                    entry.name, entry.mass
                )));
            }
            matched.push((idx, entry));
        }

        for (idx, entry) in matched {
            self.reservoirs[idx].set_initial(ReservoirState {
                mass: entry.mass,
                delta: entry.delta,
            })?;
        }
        Ok(())
    }

    /// Create a diagram of the same-step dependencies between connections.
    ///
    /// Useful for debugging.
    pub fn as_dot(&self) -> Dot<'_, &DependencyGraph> {
        self.plan.as_dot()
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("status", &self.status)
            .field("time_index", &self.time_index)
            .field("reservoirs", &self.reservoirs.len())
            .field("connections", &self.plan.ordered_names())
            .finish()
    }
}
