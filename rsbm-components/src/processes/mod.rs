//! Rate laws implemented as custom process functions.
//!
//! Each rate law has a parameter struct, a `calculate_flux` method holding the
//! physics and a `register` function that makes it available to a
//! [`rsbm_core::model::ModelBuilder`] under a fixed name.

mod burial;
mod weathering;

pub use burial::{Burial, BurialParameters, BURIAL};
pub use weathering::{Weathering, WeatheringParameters, WEATHERING};

use rsbm_core::errors::RSBMResult;
use rsbm_core::model::ModelBuilder;

/// Registers every rate law in this module.
pub fn register_all(builder: &mut ModelBuilder) -> RSBMResult<()> {
    weathering::register(builder)?;
    burial::register(builder)?;
    Ok(())
}
