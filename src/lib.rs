//! Reservoir and flux box models for Earth-science mass and isotope budgets.
//!
//! The engine lives in `rsbm-core` and is re-exported here module by module.
//! Standard species and rate laws from `rsbm-components` are available under
//! [`components`].
//!
//! ```
//! use rsbm::connection::{ConnectionConfig, Endpoint};
//! use rsbm::model::{ModelBuilder, ModelConfig};
//! use rsbm::process::Process;
//! use rsbm::units::Quantity;
//!
//! let mut builder = ModelBuilder::new(ModelConfig::default().with_grid(0.0, 5.0, 1.0)).unwrap();
//! builder.with_species(rsbm::components::species::carbon()).unwrap();
//! let volume = Quantity::new(1.0, "L").unwrap();
//! builder
//!     .create_reservoir("A", "C", Quantity::new(100.0, "mol").unwrap(), volume.clone(), Some(0.0))
//!     .unwrap()
//!     .create_reservoir("B", "C", Quantity::new(0.0, "mol").unwrap(), volume, Some(0.0))
//!     .unwrap()
//!     .connect(
//!         ConnectionConfig::new(Endpoint::reservoir("A"), Endpoint::reservoir("B"))
//!             .with_binding(Process::constant(10.0)),
//!     )
//!     .unwrap();
//!
//! let mut model = builder.build().unwrap();
//! model.run().unwrap();
//! assert_eq!(model.reservoir("B").unwrap().mass(), 50.0);
//! ```

pub use rsbm_components as components;
pub use rsbm_core::{
    assembler, connection, errors, isotopes, model, process, reservoir, signal, species,
    timeseries, units,
};
