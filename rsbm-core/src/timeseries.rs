use crate::errors::{RSBMError, RSBMResult};
use ndarray::{s, Array1, ArrayView1};
use serde::{Deserialize, Serialize};

pub type Time = f64;
pub type FloatValue = f64;

/// The grid of time points a model is solved on.
///
/// Points are `start + i * step`, with the final interval shortened so that the
/// last point is exactly `stop`.
/// Values are computed by multiplication rather than accumulation so long runs
/// do not drift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeAxis {
    values: Array1<Time>,
}

/// Relative tolerance used when deciding whether `stop` falls on the grid.
const GRID_TOLERANCE: f64 = 1e-9;

impl TimeAxis {
    pub fn from_grid(start: Time, stop: Time, step: Time) -> RSBMResult<Self> {
        if !(start.is_finite() && stop.is_finite() && step.is_finite()) {
            return Err(RSBMError::InvalidConfiguration(
                "start, stop and step must be finite".to_string(),
            ));
        }
        if step <= 0.0 {
            return Err(RSBMError::InvalidConfiguration(format!(
                "step must be positive, got {step}"
            )));
        }
        if stop <= start {
            return Err(RSBMError::InvalidConfiguration(format!(
                "stop ({stop}) must be after start ({start})"
            )));
        }

        let intervals = (stop - start) / step;
        let n_steps = (intervals - GRID_TOLERANCE).ceil().max(1.0) as usize;

        let mut values: Array1<Time> = (0..=n_steps).map(|i| start + i as Time * step).collect();
        values[n_steps] = stop;
        Ok(Self { values })
    }

    pub fn from_values(values: Array1<Time>) -> RSBMResult<Self> {
        if values.len() < 2 {
            return Err(RSBMError::InvalidConfiguration(
                "a time axis needs at least two points".to_string(),
            ));
        }
        if values.windows(2).into_iter().any(|w| w[1] <= w[0]) {
            return Err(RSBMError::InvalidConfiguration(
                "time axis values must be strictly increasing".to_string(),
            ));
        }
        Ok(Self { values })
    }

    /// Number of points on the axis (one more than the number of steps)
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn n_steps(&self) -> usize {
        self.values.len() - 1
    }

    pub fn at(&self, index: usize) -> Option<Time> {
        self.values.get(index).copied()
    }

    /// Start and end of the step beginning at `index`
    pub fn at_bounds(&self, index: usize) -> Option<(Time, Time)> {
        Some((self.at(index)?, self.at(index + 1)?))
    }

    pub fn dt(&self, index: usize) -> Option<Time> {
        self.at_bounds(index).map(|(start, end)| end - start)
    }

    pub fn first(&self) -> Time {
        self.values[0]
    }

    pub fn last(&self) -> Time {
        self.values[self.values.len() - 1]
    }

    pub fn values(&self) -> ArrayView1<'_, Time> {
        self.values.view()
    }

    /// Index of the grid point matching `time`, if any
    pub fn index_of(&self, time: Time) -> Option<usize> {
        let scale = (self.last() - self.first()).abs().max(1.0);
        self.values
            .iter()
            .position(|t| (t - time).abs() <= GRID_TOLERANCE * scale)
    }

    /// Locates `time` between two grid points.
    ///
    /// Returns the index of the left point and the fractional position within
    /// the interval. Times outside the axis are clamped to its ends.
    pub fn locate(&self, time: Time) -> (usize, f64) {
        let n = self.values.len();
        if time <= self.first() {
            return (0, 0.0);
        }
        if time >= self.last() {
            return (n - 2, 1.0);
        }
        // partition_point gives the first value greater than time
        let right = self
            .values
            .as_slice()
            .map(|v| v.partition_point(|t| *t <= time))
            .unwrap_or_else(|| self.values.iter().take_while(|t| **t <= time).count());
        let left = right - 1;
        let (t0, t1) = (self.values[left], self.values[right]);
        (left, (time - t0) / (t1 - t0))
    }
}

/// A fixed-capacity, append-only series of values on a [`TimeAxis`].
///
/// Storage for every point is allocated up front and filled with NaN.
/// `latest` tracks how many points have been written so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeseries {
    values: Array1<FloatValue>,
    latest: usize,
}

impl Timeseries {
    pub fn new_empty(capacity: usize) -> Self {
        Self {
            values: Array1::from_elem(capacity, FloatValue::NAN),
            latest: 0,
        }
    }

    /// Appends the value for the next time point.
    pub fn push(&mut self, value: FloatValue) -> RSBMResult<()> {
        if self.latest >= self.values.len() {
            return Err(RSBMError::Error(format!(
                "timeseries is full ({} points)",
                self.values.len()
            )));
        }
        self.values[self.latest] = value;
        self.latest += 1;
        Ok(())
    }

    /// Overwrites the most recently written point.
    pub fn replace_latest(&mut self, value: FloatValue) -> RSBMResult<()> {
        if self.latest == 0 {
            return Err(RSBMError::Error("timeseries is empty".to_string()));
        }
        self.values[self.latest - 1] = value;
        Ok(())
    }

    /// Discards everything after the first `len` points.
    pub fn truncate(&mut self, len: usize) {
        let len = len.min(self.latest);
        self.values.slice_mut(s![len..]).fill(FloatValue::NAN);
        self.latest = len;
    }

    pub fn len(&self) -> usize {
        self.latest
    }

    pub fn is_empty(&self) -> bool {
        self.latest == 0
    }

    pub fn capacity(&self) -> usize {
        self.values.len()
    }

    pub fn at(&self, index: usize) -> Option<FloatValue> {
        if index < self.latest {
            Some(self.values[index])
        } else {
            None
        }
    }

    pub fn latest_value(&self) -> Option<FloatValue> {
        self.latest.checked_sub(1).and_then(|i| self.at(i))
    }

    /// The written part of the series
    pub fn values(&self) -> ArrayView1<'_, FloatValue> {
        self.values.slice(s![..self.latest])
    }
}
