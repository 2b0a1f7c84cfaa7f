//! Forcing signals.
//!
//! A signal is a named series of values on the model time axis.
//! Connections consume signals through [`crate::process::Process::Signal`],
//! either adding the signal to the flux or scaling the flux by it.

use crate::errors::{RSBMError, RSBMResult};
use crate::timeseries::{FloatValue, Time, TimeAxis};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a signal acts on the flux of the connection it is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalMode {
    /// The signal value is an additional rate contribution
    Add,
    /// The accumulated rate is multiplied by the signal value
    Multiply,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    name: String,
    values: Array1<FloatValue>,
}

impl Signal {
    /// Creates a signal from values already sampled on the model grid.
    pub fn new(name: &str, values: Array1<FloatValue>) -> Self {
        Self {
            name: name.to_string(),
            values,
        }
    }

    /// A signal with the same value at every point of `time_axis`.
    pub fn constant(name: &str, value: FloatValue, time_axis: &TimeAxis) -> Self {
        Self::new(name, Array1::from_elem(time_axis.len(), value))
    }

    /// Resamples `(times, values)` onto `time_axis` by linear interpolation.
    ///
    /// The points must cover the whole axis; the signal is not extrapolated.
    pub fn from_points(
        name: &str,
        times: &[Time],
        values: &[FloatValue],
        time_axis: &TimeAxis,
    ) -> RSBMResult<Self> {
        let invalid = |reason: String| RSBMError::InvalidSignal {
            signal: name.to_string(),
            reason,
        };
        if times.len() != values.len() {
            return Err(invalid(format!(
                "{} times but {} values",
                times.len(),
                values.len()
            )));
        }
        let source = TimeAxis::from_values(Array1::from(times.to_vec()))
            .map_err(|e| invalid(e.to_string()))?;
        if source.first() > time_axis.first() || source.last() < time_axis.last() {
            return Err(invalid(format!(
                "points span [{}, {}] but the model runs over [{}, {}]",
                source.first(),
                source.last(),
                time_axis.first(),
                time_axis.last()
            )));
        }

        let resampled = time_axis
            .values()
            .iter()
            .map(|t| {
                let (left, fraction) = source.locate(*t);
                interpolate(values[left], values[left + 1], fraction)
            })
            .collect();
        Ok(Self::new(name, resampled))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &Array1<FloatValue> {
        &self.values
    }

    /// Checks that the signal has one finite value per point of `time_axis`.
    pub fn validate(&self, time_axis: &TimeAxis) -> RSBMResult<()> {
        if self.values.len() != time_axis.len() {
            return Err(RSBMError::InvalidSignal {
                signal: self.name.clone(),
                reason: format!(
                    "expected {} values (one per time point), got {}",
                    time_axis.len(),
                    self.values.len()
                ),
            });
        }
        if let Some(index) = self.values.iter().position(|v| !v.is_finite()) {
            return Err(RSBMError::InvalidSignal {
                signal: self.name.clone(),
                reason: format!("value at index {index} is not finite"),
            });
        }
        Ok(())
    }

    /// Value at grid point `index`.
    pub fn at(&self, index: usize) -> Option<FloatValue> {
        self.values.get(index).copied()
    }

    /// Value at an arbitrary time, linearly interpolated between grid points.
    pub fn value_at(&self, time_axis: &TimeAxis, time: Time) -> FloatValue {
        let (left, fraction) = time_axis.locate(time);
        interpolate(self.values[left], self.values[left + 1], fraction)
    }
}

fn interpolate(left: FloatValue, right: FloatValue, fraction: f64) -> FloatValue {
    // Exact at grid points
    if fraction == 0.0 {
        left
    } else if fraction == 1.0 {
        right
    } else {
        left + fraction * (right - left)
    }
}

/// The signals registered with a model, keyed by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalRegistry {
    signals: BTreeMap<String, Signal>,
}

impl SignalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, signal: Signal, time_axis: &TimeAxis) -> RSBMResult<()> {
        if self.signals.contains_key(signal.name()) {
            return Err(RSBMError::duplicate("signal", signal.name()));
        }
        signal.validate(time_axis)?;
        self.signals.insert(signal.name().to_string(), signal);
        Ok(())
    }

    pub fn get(&self, name: &str) -> RSBMResult<&Signal> {
        self.signals
            .get(name)
            .ok_or_else(|| RSBMError::unknown("signal", name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.signals.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}
