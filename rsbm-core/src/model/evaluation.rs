//! Flux evaluation shared by every integration backend.

use crate::assembler::EvaluationPlan;
use crate::connection::Connection;
use crate::errors::RSBMError;
use crate::isotopes::fractionate;
use crate::process::{Contribution, FluxRate, ProcessContext, ProcessRegistry};
use crate::reservoir::{ReservoirRegistry, ReservoirState};
use crate::signal::SignalRegistry;
use crate::timeseries::{FloatValue, Time, TimeAxis};

/// A failure while evaluating a single connection
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EvaluationError {
    pub connection: String,
    pub error: RSBMError,
}

impl EvaluationError {
    pub fn location(&self) -> String {
        format!("connection '{}'", self.connection)
    }
}

/// Rate of change of a reservoir's mass, of its isotope mass (mass times
/// delta) and of the part of its mass with a known composition
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct Derivative {
    pub mass: FloatValue,
    pub isotope_mass: FloatValue,
    pub defined_mass: FloatValue,
}

/// Evaluates the fluxes of every connection for a given reservoir state.
pub(crate) struct FluxEvaluator<'a> {
    pub connections: &'a [Connection],
    pub plan: &'a EvaluationPlan,
    pub reservoirs: &'a ReservoirRegistry,
    pub signals: &'a SignalRegistry,
    pub processes: &'a ProcessRegistry,
    pub time_axis: &'a TimeAxis,
}

impl FluxEvaluator<'_> {
    /// Evaluates every connection in plan order.
    ///
    /// `dt` is the length of the step for same-step updated reads and zero when
    /// the instantaneous rate is wanted.
    pub fn evaluate(
        &self,
        states: &[ReservoirState],
        time: Time,
        step: usize,
        dt: Time,
    ) -> Result<Vec<FluxRate>, EvaluationError> {
        let mut fluxes: Vec<Option<FluxRate>> = vec![None; self.connections.len()];
        for &idx in self.plan.order() {
            let flux = self.evaluate_connection(idx, states, &fluxes, time, step, dt)?;
            fluxes[idx] = Some(flux);
        }
        // Every connection appears in the plan order exactly once
        Ok(fluxes.into_iter().flatten().collect())
    }

    fn evaluate_connection(
        &self,
        idx: usize,
        states: &[ReservoirState],
        fluxes: &[Option<FluxRate>],
        time: Time,
        step: usize,
        dt: Time,
    ) -> Result<FluxRate, EvaluationError> {
        let connection = &self.connections[idx];

        let mut contributions = Vec::with_capacity(connection.bindings().len());
        for binding in connection.bindings() {
            let ctx = ProcessContext {
                connection,
                dependencies: binding.process.dependencies(),
                reservoirs: self.reservoirs,
                states,
                connections: self.connections,
                plan: self.plan,
                fluxes,
                signals: self.signals,
                time_axis: self.time_axis,
                time,
                step,
                dt,
            };
            let contribution = binding
                .process
                .contribution(&ctx, self.processes, time)
                .map_err(|error| EvaluationError {
                    connection: connection.name().to_string(),
                    error,
                })?;
            contributions.push((binding.delta, contribution));
        }

        // A negative net rate moves material out of the sink
        let donor = if net_rate(&contributions) < 0.0 {
            connection.sink_index()
        } else {
            connection.source_index()
        };
        let donor_delta = donor.and_then(|r| states[r].delta);

        let mut accumulator = Accumulator::default();
        for (fixed_delta, contribution) in contributions {
            match contribution {
                Contribution::Rate(flux) => {
                    // A fixed binding ratio wins over the process, which wins over the donor
                    let delta = fixed_delta.or(flux.delta).or(donor_delta);
                    accumulator.add(flux.rate, delta);
                }
                Contribution::Scale(factor) => accumulator.scale(factor),
                Contribution::Fractionate(alpha) => accumulator.fractionate(alpha),
            }
        }
        Ok(accumulator.finish())
    }

    /// Sums the signed fluxes touching each reservoir.
    pub fn derivatives(&self, states: &[ReservoirState], fluxes: &[FluxRate]) -> Vec<Derivative> {
        states
            .iter()
            .enumerate()
            .map(|(r, state)| {
                let mut derivative = Derivative::default();
                for &(c, sign) in self.plan.accumulation(r) {
                    let rate = sign.factor() * fluxes[c].rate;
                    derivative.mass += rate;
                    // Material without a ratio carries the composition of the reservoir
                    if let Some(delta) = fluxes[c].delta.or(state.delta) {
                        derivative.isotope_mass += rate * delta;
                        derivative.defined_mass += rate;
                    }
                }
                derivative
            })
            .collect()
    }
}

fn net_rate(contributions: &[(Option<FloatValue>, Contribution)]) -> FloatValue {
    contributions
        .iter()
        .fold(0.0, |rate, (_, contribution)| match contribution {
            Contribution::Rate(flux) => rate + flux.rate,
            Contribution::Scale(factor) => rate * factor,
            Contribution::Fractionate(_) => rate,
        })
}

/// Net rate and rate-weighted isotope ratio of a connection's bindings.
#[derive(Debug, Default)]
struct Accumulator {
    rate: FloatValue,
    weighted: FloatValue,
    undefined: bool,
    /// Ratio set explicitly by fractionation; replaces the weighted mean
    fractionated: Option<Option<FloatValue>>,
}

impl Accumulator {
    fn add(&mut self, rate: FloatValue, delta: Option<FloatValue>) {
        if let Some(current) = self.fractionated.take() {
            // Fold the fractionated ratio back into the weighted sum
            match current {
                Some(d) => self.weighted = self.rate * d,
                None => self.undefined = true,
            }
        }
        self.rate += rate;
        match delta {
            Some(d) => self.weighted += rate * d,
            None => self.undefined = true,
        }
    }

    fn scale(&mut self, factor: FloatValue) {
        self.rate *= factor;
        self.weighted *= factor;
    }

    fn fractionate(&mut self, alpha: FloatValue) {
        self.fractionated = Some(self.delta().map(|d| fractionate(d, alpha)));
    }

    fn delta(&self) -> Option<FloatValue> {
        if let Some(current) = self.fractionated {
            return current;
        }
        if self.undefined || self.rate == 0.0 {
            None
        } else {
            Some(self.weighted / self.rate)
        }
    }

    fn finish(self) -> FluxRate {
        FluxRate {
            rate: self.rate,
            delta: self.delta(),
        }
    }
}
