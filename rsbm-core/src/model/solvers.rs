//! Integration backends.
//!
//! Both backends advance the reservoirs across one interval of the time axis
//! and return the proposed end-of-step state. Clamping, warnings and recording
//! are left to the model so they behave identically for every backend.

use super::config::{AdaptiveMethod, AdaptiveOptions};
use super::evaluation::{EvaluationError, FluxEvaluator};
use crate::isotopes::mix;
use crate::process::FluxRate;
use crate::reservoir::ReservoirState;
use crate::timeseries::{FloatValue, Time};
use nalgebra::DVector;
use ode_solvers::{Dop853, Dopri5, System};
use std::cell::RefCell;

/// Offsets of the isotope mass and defined mass blocks, in multiples of `n`
const ISOTOPE_MASS: usize = 1;
const DEFINED_MASS: usize = 2;

/// End-of-step state of a reservoir before clamping
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ProposedState {
    pub mass: FloatValue,
    pub delta: Option<FloatValue>,
    /// The reservoir holds mass but no composition could be derived for it
    pub undefined_ratio: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StepResult {
    pub states: Vec<ProposedState>,
    /// Fluxes at the start of the step
    pub fluxes: Vec<FluxRate>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StepError {
    pub time: Time,
    pub location: String,
    pub details: String,
}

impl StepError {
    fn evaluation(time: Time, err: EvaluationError) -> Self {
        Self {
            time,
            location: err.location(),
            details: err.error.to_string(),
        }
    }
}

/// Forward Euler across `[t0, t1]`.
pub(crate) fn euler_step(
    evaluator: &FluxEvaluator<'_>,
    states: &[ReservoirState],
    (t0, t1): (Time, Time),
    step: usize,
) -> Result<StepResult, StepError> {
    let dt = t1 - t0;
    let fluxes = evaluator
        .evaluate(states, t0, step, dt)
        .map_err(|e| StepError::evaluation(t0, e))?;

    let proposed = states
        .iter()
        .enumerate()
        .map(|(r, state)| {
            let transfers: Vec<(FloatValue, Option<FloatValue>)> = evaluator
                .plan
                .accumulation(r)
                .iter()
                .map(|&(c, sign)| (sign.factor() * fluxes[c].rate * dt, fluxes[c].delta))
                .collect();
            let mass = state.mass + transfers.iter().map(|(m, _)| m).sum::<FloatValue>();

            if !evaluator.reservoirs[r].tracks_isotopes() || mass <= 0.0 {
                return ProposedState {
                    mass,
                    delta: None,
                    undefined_ratio: false,
                };
            }
            match mix(state.mass, state.delta, transfers) {
                Ok(delta) => ProposedState {
                    mass,
                    delta: Some(delta),
                    undefined_ratio: false,
                },
                Err(_) => ProposedState {
                    mass,
                    delta: None,
                    undefined_ratio: true,
                },
            }
        })
        .collect();

    Ok(StepResult {
        states: proposed,
        fluxes,
    })
}

/// Right-hand side over the state vector `[M, M*delta, D]` with one block of
/// `n` entries each, where `D` is the mass of known composition.
///
/// Mass without a composition carries no weight in the ratio, so the delta of
/// a reservoir is `(M*delta) / D` rather than `(M*delta) / M`.
struct BoxModelSystem<'a> {
    evaluator: &'a FluxEvaluator<'a>,
    step: usize,
    tracked: Vec<bool>,
    /// The first evaluation failure; the solver itself cannot carry errors
    failure: &'a RefCell<Option<StepError>>,
}

impl BoxModelSystem<'_> {
    fn unpack(&self, y: &DVector<FloatValue>) -> Vec<ReservoirState> {
        let n = self.tracked.len();
        (0..n)
            .map(|r| ReservoirState {
                mass: y[r],
                delta: delta_of(self.tracked[r], y, n, r),
            })
            .collect()
    }
}

impl System<Time, DVector<FloatValue>> for BoxModelSystem<'_> {
    fn system(&self, t: Time, y: &DVector<FloatValue>, dy: &mut DVector<FloatValue>) {
        let n = self.tracked.len();
        if self.failure.borrow().is_some() {
            dy.fill(0.0);
            return;
        }
        let states = self.unpack(y);
        match self.evaluator.evaluate(&states, t, self.step, 0.0) {
            Ok(fluxes) => {
                let derivatives = self.evaluator.derivatives(&states, &fluxes);
                for (r, derivative) in derivatives.iter().enumerate() {
                    dy[r] = derivative.mass;
                    let (isotope_mass, defined_mass) = if self.tracked[r] {
                        (derivative.isotope_mass, derivative.defined_mass)
                    } else {
                        (0.0, 0.0)
                    };
                    dy[ISOTOPE_MASS * n + r] = isotope_mass;
                    dy[DEFINED_MASS * n + r] = defined_mass;
                }
            }
            Err(e) => {
                *self.failure.borrow_mut() = Some(StepError::evaluation(t, e));
                dy.fill(0.0);
            }
        }
    }
}

/// Variable step integration across `[t0, t1]`.
pub(crate) fn adaptive_step(
    evaluator: &FluxEvaluator<'_>,
    states: &[ReservoirState],
    (t0, t1): (Time, Time),
    step: usize,
    options: &AdaptiveOptions,
) -> Result<StepResult, StepError> {
    let fluxes = evaluator
        .evaluate(states, t0, step, 0.0)
        .map_err(|e| StepError::evaluation(t0, e))?;

    let n = states.len();
    let tracked: Vec<bool> = (0..n)
        .map(|r| evaluator.reservoirs[r].tracks_isotopes())
        .collect();
    let failure = RefCell::new(None);

    let mut y0 = DVector::<FloatValue>::zeros(3 * n);
    for (r, state) in states.iter().enumerate() {
        y0[r] = state.mass;
        if let Some(delta) = state.delta {
            y0[ISOTOPE_MASS * n + r] = state.mass * delta;
            y0[DEFINED_MASS * n + r] = state.mass;
        }
    }

    let system = BoxModelSystem {
        evaluator,
        step,
        tracked: tracked.clone(),
        failure: &failure,
    };
    let dx = t1 - t0;
    let y_end = match options.method {
        AdaptiveMethod::Dopri5 => {
            let mut solver = Dopri5::new(system, t0, t1, dx, y0, options.rtol, options.atol);
            solver.integrate().map_err(solver_error(t0))?;
            last_output(solver.results().get().1)
        }
        AdaptiveMethod::Dop853 => {
            let mut solver = Dop853::new(system, t0, t1, dx, y0, options.rtol, options.atol);
            solver.integrate().map_err(solver_error(t0))?;
            last_output(solver.results().get().1)
        }
    };
    if let Some(err) = failure.into_inner() {
        return Err(err);
    }
    let y_end = y_end.ok_or_else(|| StepError {
        time: t0,
        location: "adaptive solver".to_string(),
        details: "the solver produced no output".to_string(),
    })?;

    let proposed = (0..n)
        .map(|r| {
            let mass = y_end[r];
            if !tracked[r] || mass <= 0.0 {
                return ProposedState {
                    mass,
                    delta: None,
                    undefined_ratio: false,
                };
            }
            let delta = delta_of(true, &y_end, n, r);
            ProposedState {
                mass,
                delta,
                undefined_ratio: delta.is_none(),
            }
        })
        .collect();

    Ok(StepResult {
        states: proposed,
        fluxes,
    })
}

fn delta_of(tracked: bool, y: &DVector<FloatValue>, n: usize, r: usize) -> Option<FloatValue> {
    let defined_mass = y[DEFINED_MASS * n + r];
    (tracked && y[r] > 0.0 && defined_mass > 0.0).then(|| y[ISOTOPE_MASS * n + r] / defined_mass)
}

fn solver_error<E: std::fmt::Debug>(time: Time) -> impl Fn(E) -> StepError {
    move |e| StepError {
        time,
        location: "adaptive solver".to_string(),
        details: format!("{e:?}"),
    }
}

fn last_output(outputs: &[DVector<FloatValue>]) -> Option<DVector<FloatValue>> {
    outputs.last().cloned()
}
