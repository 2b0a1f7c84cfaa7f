//! A model consists of reservoirs exchanging mass through connections, solved
//! together on a common time axis.
//!
//! The [`ModelBuilder`] collects species, reservoirs, connections, forcing
//! signals and process functions, then compiles them into a [`Model`].
//! Compilation fixes the order in which connections are evaluated within a
//! step (see [`crate::assembler`]) and rejects cyclic same-step dependencies.
//!
//! Each step evaluates every connection against the state at the start of the
//! step, sums the signed fluxes per reservoir and advances the reservoirs with
//! the configured [`Solver`]. Negative masses are clamped to zero and recorded
//! as [`ModelWarning`]s rather than failing the run.
//! The state at every point of the time axis is kept and can be exported.

mod builder;
mod config;
mod diagnostics;
mod evaluation;
mod runtime;
mod solvers;
mod state_io;

#[cfg(test)]
mod tests;

pub use builder::ModelBuilder;
pub use config::{AdaptiveMethod, AdaptiveOptions, ModelConfig, ModelUnits, Solver};
pub use diagnostics::{Diagnostics, ModelWarning};
pub use runtime::{Model, ModelStatus};
pub use state_io::{
    FluxRow, FluxSeries, InitialState, ModelExport, ReservoirInitialState, ReservoirSeries,
    StateRow,
};
