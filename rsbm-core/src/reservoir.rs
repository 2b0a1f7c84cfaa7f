//! Reservoirs (boxes) and the registry that owns them.

use crate::errors::{RSBMError, RSBMResult};
use crate::species::Species;
use crate::timeseries::{FloatValue, Timeseries};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Index of a reservoir within its [`ReservoirRegistry`].
pub type ReservoirIndex = usize;

/// A snapshot of a reservoir's state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReservoirState {
    /// Mass (or amount) in model units
    pub mass: FloatValue,
    /// Isotope composition in per mil; `None` when undefined
    pub delta: Option<FloatValue>,
}

/// A well-mixed box holding a single species.
///
/// The current state and its history live together.
/// History is written by the integration engine one point per time step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservoir {
    name: String,
    species: Arc<Species>,
    /// Volume in model units
    volume: FloatValue,
    initial: ReservoirState,
    state: ReservoirState,
    track_isotopes: bool,
    mass_history: Timeseries,
    delta_history: Timeseries,
}

impl Reservoir {
    pub(crate) fn new(
        name: &str,
        species: Arc<Species>,
        mass: FloatValue,
        volume: FloatValue,
        delta: Option<FloatValue>,
        track_isotopes: bool,
        capacity: usize,
    ) -> RSBMResult<Self> {
        if !(mass.is_finite() && mass >= 0.0) {
            return Err(RSBMError::InvalidConfiguration(format!(
                "initial mass of reservoir '{name}' must be non-negative, got {mass}"
            )));
        }
        if !(volume.is_finite() && volume >= 0.0) {
            return Err(RSBMError::InvalidConfiguration(format!(
                "volume of reservoir '{name}' must be non-negative, got {volume}"
            )));
        }
        if delta.is_some() && !species.has_isotopes() {
            return Err(RSBMError::InvalidConfiguration(format!(
                "reservoir '{name}' has an initial delta but species '{}' has no isotope standard",
                species.name
            )));
        }
        let track_isotopes = track_isotopes && delta.is_some();
        let initial = ReservoirState {
            mass,
            delta: if track_isotopes && mass > 0.0 { delta } else { None },
        };

        let mut reservoir = Self {
            name: name.to_string(),
            species,
            volume,
            initial,
            state: initial,
            track_isotopes,
            mass_history: Timeseries::new_empty(capacity),
            delta_history: Timeseries::new_empty(capacity),
        };
        reservoir.record()?;
        Ok(reservoir)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn species(&self) -> &Arc<Species> {
        &self.species
    }

    pub fn volume(&self) -> FloatValue {
        self.volume
    }

    pub fn mass(&self) -> FloatValue {
        self.state.mass
    }

    pub fn delta(&self) -> Option<FloatValue> {
        self.state.delta
    }

    pub fn state(&self) -> ReservoirState {
        self.state
    }

    pub fn initial_state(&self) -> ReservoirState {
        self.initial
    }

    /// Whether the isotope composition of this reservoir is tracked
    pub fn tracks_isotopes(&self) -> bool {
        self.track_isotopes
    }

    /// Mass per unit volume, undefined for a reservoir without volume.
    pub fn concentration(&self) -> Option<FloatValue> {
        concentration(self.state.mass, self.volume)
    }

    /// Historical state at time index `index`
    pub fn at(&self, index: usize) -> Option<ReservoirState> {
        let mass = self.mass_history.at(index)?;
        let delta = self.delta_history.at(index)?;
        Some(ReservoirState {
            mass,
            delta: (!delta.is_nan()).then_some(delta),
        })
    }

    pub fn history_len(&self) -> usize {
        self.mass_history.len()
    }

    pub fn mass_history(&self) -> &Timeseries {
        &self.mass_history
    }

    pub fn delta_history(&self) -> &Timeseries {
        &self.delta_history
    }

    /// Sets the current state and appends it to the history.
    pub(crate) fn advance(&mut self, state: ReservoirState) -> RSBMResult<()> {
        self.state = self.sanitise(state);
        self.record()
    }

    /// Replaces the initial state. Only valid before any step has been taken.
    pub(crate) fn set_initial(&mut self, state: ReservoirState) -> RSBMResult<()> {
        self.initial = self.sanitise(state);
        self.reset()
    }

    /// Discards the history and returns to the initial state.
    pub(crate) fn reset(&mut self) -> RSBMResult<()> {
        self.state = self.initial;
        self.mass_history.truncate(0);
        self.delta_history.truncate(0);
        self.record()
    }

    fn sanitise(&self, state: ReservoirState) -> ReservoirState {
        ReservoirState {
            mass: state.mass,
            delta: if self.track_isotopes && state.mass > 0.0 {
                state.delta
            } else {
                None
            },
        }
    }

    fn record(&mut self) -> RSBMResult<()> {
        self.mass_history.push(self.state.mass)?;
        self.delta_history
            .push(self.state.delta.unwrap_or(FloatValue::NAN))
    }
}

pub(crate) fn concentration(mass: FloatValue, volume: FloatValue) -> Option<FloatValue> {
    (volume > 0.0).then(|| mass / volume)
}

/// Owns the reservoirs of a model in creation order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReservoirRegistry {
    reservoirs: Vec<Reservoir>,
    index: HashMap<String, ReservoirIndex>,
}

impl ReservoirRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, reservoir: Reservoir) -> RSBMResult<ReservoirIndex> {
        if self.index.contains_key(reservoir.name()) {
            return Err(RSBMError::duplicate("reservoir", reservoir.name()));
        }
        let idx = self.reservoirs.len();
        self.index.insert(reservoir.name().to_string(), idx);
        self.reservoirs.push(reservoir);
        Ok(idx)
    }

    pub fn index_of(&self, name: &str) -> RSBMResult<ReservoirIndex> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| RSBMError::unknown("reservoir", name))
    }

    pub fn get(&self, name: &str) -> RSBMResult<&Reservoir> {
        Ok(&self.reservoirs[self.index_of(name)?])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.reservoirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reservoirs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reservoir> {
        self.reservoirs.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Reservoir> {
        self.reservoirs.iter_mut()
    }

    pub(crate) fn states(&self) -> Vec<ReservoirState> {
        self.reservoirs.iter().map(Reservoir::state).collect()
    }

    /// Total mass across reservoirs, used for conservation checks
    pub fn total_mass(&self) -> FloatValue {
        self.reservoirs.iter().map(Reservoir::mass).sum()
    }
}

impl std::ops::Index<ReservoirIndex> for ReservoirRegistry {
    type Output = Reservoir;

    fn index(&self, index: ReservoirIndex) -> &Self::Output {
        &self.reservoirs[index]
    }
}

impl std::ops::IndexMut<ReservoirIndex> for ReservoirRegistry {
    fn index_mut(&mut self, index: ReservoirIndex) -> &mut Self::Output {
        &mut self.reservoirs[index]
    }
}
