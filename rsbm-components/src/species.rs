//! Element definitions with their conventional isotope standards.
//!
//! Ratios are heavy / light isotope abundance ratios of the reference
//! materials, e.g. 13C/12C for carbon on the VPDB scale.

use rsbm_core::errors::RSBMResult;
use rsbm_core::model::ModelBuilder;
use rsbm_core::species::{IsotopeStandard, Species};
use std::sync::Arc;

/// 13C/12C of Vienna Pee Dee Belemnite
pub const VPDB_13C: f64 = 0.0112372;
/// 34S/32S of Vienna Canyon Diablo Troilite
pub const VCDT_34S: f64 = 0.044162589;
/// D/H of Vienna Standard Mean Ocean Water
pub const VSMOW_2H: f64 = 155.601e-6;
/// 18O/16O of Vienna Standard Mean Ocean Water
pub const VSMOW_18O: f64 = 2005.201e-6;

fn element(name: &str, molar_mass: f64, isotope_standard: Option<IsotopeStandard>) -> Arc<Species> {
    Arc::new(Species {
        name: name.to_string(),
        molar_mass,
        isotope_standard,
        display_label: name.to_string(),
    })
}

pub fn carbon() -> Arc<Species> {
    element("C", 12.011, Some(IsotopeStandard::new(VPDB_13C, "VPDB")))
}

pub fn sulfur() -> Arc<Species> {
    element("S", 32.06, Some(IsotopeStandard::new(VCDT_34S, "VCDT")))
}

pub fn hydrogen() -> Arc<Species> {
    element("H", 1.008, Some(IsotopeStandard::new(VSMOW_2H, "VSMOW")))
}

pub fn oxygen() -> Arc<Species> {
    element("O", 15.999, Some(IsotopeStandard::new(VSMOW_18O, "VSMOW")))
}

/// Phosphorus has a single stable isotope, so it carries no standard.
pub fn phosphorus() -> Arc<Species> {
    element("P", 30.974, None)
}

/// Every element defined in this module
pub fn standard_species() -> Vec<Arc<Species>> {
    vec![carbon(), sulfur(), hydrogen(), oxygen(), phosphorus()]
}

/// Adds every standard element to a model builder.
pub fn register_standard_species(builder: &mut ModelBuilder) -> RSBMResult<()> {
    for species in standard_species() {
        builder.with_species(species)?;
    }
    Ok(())
}
