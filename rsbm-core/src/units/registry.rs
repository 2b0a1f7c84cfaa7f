//! Registry of the units a box model understands.
//!
//! # Conversion Factor Convention
//!
//! All conversion factors are defined as the multiplier to convert FROM
//! the registered unit TO the base unit of its dimension
//! (mol, kg, m^3 and s). For example:
//! - mmol has factor 1e-3 (1 mmol = 1e-3 mol)
//! - L has factor 1e-3 (1 L = 1e-3 m^3)
//! - yr has factor 31557600 (1 yr = 31557600 s, using 365.25 days)

use super::dimension::Dimension;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Seconds in a Julian year (365.25 days).
pub const SECONDS_PER_YEAR: f64 = 365.25 * 86_400.0;

/// Information about a known unit.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitInfo {
    /// The canonical symbol of this unit.
    pub symbol: &'static str,
    /// The physical dimension of this unit.
    pub dimension: Dimension,
    /// Conversion factor to the base unit of the dimension.
    pub to_base_factor: f64,
}

const fn unit(symbol: &'static str, dimension: Dimension, to_base_factor: f64) -> UnitInfo {
    UnitInfo {
        symbol,
        dimension,
        to_base_factor,
    }
}

static KNOWN_UNITS: &[UnitInfo] = &[
    // Amount of substance
    unit("mol", Dimension::AMOUNT, 1.0),
    unit("nmol", Dimension::AMOUNT, 1e-9),
    unit("umol", Dimension::AMOUNT, 1e-6),
    unit("mmol", Dimension::AMOUNT, 1e-3),
    unit("kmol", Dimension::AMOUNT, 1e3),
    unit("Mmol", Dimension::AMOUNT, 1e6),
    unit("Gmol", Dimension::AMOUNT, 1e9),
    unit("Tmol", Dimension::AMOUNT, 1e12),
    unit("Pmol", Dimension::AMOUNT, 1e15),
    // Mass
    unit("g", Dimension::MASS, 1e-3),
    unit("kg", Dimension::MASS, 1.0),
    unit("t", Dimension::MASS, 1e3),
    unit("kt", Dimension::MASS, 1e6),
    unit("Mt", Dimension::MASS, 1e9),
    unit("Tg", Dimension::MASS, 1e9),
    unit("Gt", Dimension::MASS, 1e12),
    unit("Pg", Dimension::MASS, 1e12),
    // Volume
    unit("mL", Dimension::VOLUME, 1e-6),
    unit("L", Dimension::VOLUME, 1e-3),
    unit("m3", Dimension::VOLUME, 1.0),
    unit("km3", Dimension::VOLUME, 1e9),
    // Time
    unit("s", Dimension::TIME, 1.0),
    unit("min", Dimension::TIME, 60.0),
    unit("h", Dimension::TIME, 3_600.0),
    unit("day", Dimension::TIME, 86_400.0),
    unit("yr", Dimension::TIME, SECONDS_PER_YEAR),
    unit("kyr", Dimension::TIME, SECONDS_PER_YEAR * 1e3),
    unit("Myr", Dimension::TIME, SECONDS_PER_YEAR * 1e6),
    // Dimensionless
    unit("1", Dimension::dimensionless(), 1.0),
];

/// Alternative spellings accepted for registered units.
static ALIASES: &[(&str, &str)] = &[
    ("l", "L"),
    ("ml", "mL"),
    ("m^3", "m3"),
    ("km^3", "km3"),
    ("µmol", "umol"),
    ("a", "yr"),
    ("year", "yr"),
    ("d", "day"),
    ("dimensionless", "1"),
];

/// Lookup table from symbol (or alias) to unit information.
pub struct UnitRegistry {
    units: HashMap<&'static str, &'static UnitInfo>,
}

impl UnitRegistry {
    fn new() -> Self {
        let mut units: HashMap<&'static str, &'static UnitInfo> =
            KNOWN_UNITS.iter().map(|info| (info.symbol, info)).collect();
        for (alias, target) in ALIASES {
            if let Some(info) = units.get(target).copied() {
                units.insert(*alias, info);
            }
        }
        Self { units }
    }

    /// Looks up a single (non-compound) unit symbol.
    pub fn get(&self, symbol: &str) -> Option<&'static UnitInfo> {
        self.units.get(symbol).copied()
    }

    /// Iterates over the canonical units in the registry.
    pub fn iter(&self) -> impl Iterator<Item = &'static UnitInfo> {
        KNOWN_UNITS.iter()
    }
}

/// The process-wide, read-only unit table.
pub static UNIT_REGISTRY: LazyLock<UnitRegistry> = LazyLock::new(UnitRegistry::new);
