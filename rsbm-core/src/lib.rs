pub mod assembler;
pub mod connection;
pub mod isotopes;
pub mod model;
pub mod process;
pub mod reservoir;
pub mod signal;
pub mod species;
pub mod timeseries;
pub mod units;

pub mod errors;
