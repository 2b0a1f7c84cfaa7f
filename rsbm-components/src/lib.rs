//! Standard species and rate laws for use with `rsbm-core` models.

pub mod processes;
pub mod species;
