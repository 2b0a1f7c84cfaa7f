//! Non-fatal conditions raised while building or running a model.

use crate::timeseries::{FloatValue, Time};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ModelWarning {
    /// A reservoir would have gone below zero and was clamped
    NegativeMass {
        reservoir: String,
        step: usize,
        time: Time,
        mass: FloatValue,
    },
    /// An imported state entry matched no reservoir
    UnmatchedState { reservoir: String, reason: String },
    /// A reservoir holds mass whose isotope composition could not be determined
    UndefinedRatio {
        reservoir: String,
        step: usize,
        time: Time,
    },
}

impl fmt::Display for ModelWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelWarning::NegativeMass {
                reservoir,
                step,
                time,
                mass,
            } => write!(
                f,
                "reservoir '{reservoir}' went negative ({mass}) at step {step} (t = {time}) and was clamped to zero"
            ),
            ModelWarning::UnmatchedState { reservoir, reason } => {
                write!(f, "imported state for '{reservoir}' was ignored: {reason}")
            }
            ModelWarning::UndefinedRatio {
                reservoir,
                step,
                time,
            } => write!(
                f,
                "isotope ratio of reservoir '{reservoir}' is undefined after step {step} (t = {time})"
            ),
        }
    }
}

/// Warnings recorded by a model, in the order they occurred.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    warnings: Vec<ModelWarning>,
}

impl Diagnostics {
    pub(crate) fn record(&mut self, warning: ModelWarning) {
        warn!("{warning}");
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[ModelWarning] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Warnings about negative masses
    pub fn negative_mass(&self) -> impl Iterator<Item = &ModelWarning> {
        self.warnings
            .iter()
            .filter(|w| matches!(w, ModelWarning::NegativeMass { .. }))
    }

    pub(crate) fn clear(&mut self) {
        self.warnings.clear();
    }
}
