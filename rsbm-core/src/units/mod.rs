//! Quantities and units for reservoir masses, volumes and rates.
//!
//! A model declares its mass (or amount), volume and time units once.
//! User-facing inputs such as initial masses and reservoir volumes are given as
//! [`Quantity`] values and converted into the model units when they are
//! registered, so the integration loop only ever sees plain `f64` values that
//! are already consistent.
//!
//! ```
//! use rsbm_core::units::{Quantity, Unit};
//!
//! let ocean = Quantity::new(1.4e21, "L").unwrap();
//! let in_m3 = ocean.to(&Unit::parse("m3").unwrap()).unwrap();
//! assert!((in_m3.magnitude() / 1.4e18 - 1.0).abs() < 1e-12);
//!
//! // Incompatible arithmetic is an error, not a number
//! let dic = Quantity::new(2.0, "mmol").unwrap();
//! assert!(dic.checked_add(&ocean).is_err());
//! ```
//!
//! # Module Structure
//!
//! - [`dimension`]: Physical dimension types (M, L, T, N)
//! - [`registry`]: Known units with conversion factors
//! - [`conversion`]: The [`Unit`] type and conversion factors
//! - [`quantity`]: [`Quantity`] and [`ArrayQuantity`]

pub mod conversion;
pub mod dimension;
pub mod quantity;
pub mod registry;

pub use conversion::{conversion_factor, Unit};
pub use dimension::Dimension;
pub use quantity::{ArrayQuantity, DensityModel, Quantity};
pub use registry::{UnitInfo, UnitRegistry, SECONDS_PER_YEAR, UNIT_REGISTRY};
