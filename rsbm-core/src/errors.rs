use crate::timeseries::Time;
use thiserror::Error;

/// Error type for invalid operations.
///
/// Build-time variants are returned synchronously by the builder and by
/// [`crate::model::Model::update_connection`].
/// Run-time failures are reported as [`RSBMError::Integration`] which wraps the
/// underlying cause together with the step at which the run stopped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RSBMError {
    #[error("{0}")]
    Error(String),
    #[error("Unit mismatch: cannot combine '{from}' ({from_dimension}) with '{to}' ({to_dimension})")]
    UnitMismatch {
        from: String,
        to: String,
        from_dimension: String,
        to_dimension: String,
    },
    #[error("Unknown unit '{0}'")]
    UnknownUnit(String),
    #[error("Duplicate {kind} name '{name}'")]
    DuplicateName { kind: String, name: String },
    #[error("Unknown {kind} '{name}'")]
    UnknownName { kind: String, name: String },
    #[error("Invalid connection '{connection}': {reason}")]
    InvalidConnection { connection: String, reason: String },
    #[error("Cannot update connection '{connection}': {reason}")]
    InvalidConnectionUpdate { connection: String, reason: String },
    #[error("Cyclic same-step dependency between connections: {}. Express the coupling as a single joint process function instead.", .connections.join(", "))]
    CyclicDependency { connections: Vec<String> },
    #[error("Connection '{connection}' read {target} without declaring it as a dependency")]
    UndeclaredDependency { connection: String, target: String },
    #[error("Invalid signal '{signal}': {reason}")]
    InvalidSignal { signal: String, reason: String },
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Model is {actual}, but the operation requires it to be {expected}")]
    InvalidModelState { expected: String, actual: String },
    #[error("Isotope ratio is undefined for {context}: total mass is zero")]
    UndefinedRatio { context: String },
    #[error("Integration failed at step {step} (t = {time}) in {location}: {details}")]
    Integration {
        step: usize,
        time: Time,
        location: String,
        details: String,
    },
}

impl RSBMError {
    pub(crate) fn duplicate(kind: &str, name: &str) -> Self {
        Self::DuplicateName {
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }

    pub(crate) fn unknown(kind: &str, name: &str) -> Self {
        Self::UnknownName {
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }
}

/// Convenience type for `Result<T, RSBMError>`.
pub type RSBMResult<T> = Result<T, RSBMError>;
