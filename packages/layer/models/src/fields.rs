//! Column names written to the derived layer files.
//!
//! These are the user-facing labels shown by the dashboard, so they are
//! part of the file format.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Property holding the H3 cell index in every layer file.
pub const H3_ID: &str = "h3_id";

/// Forecast variable sampled by the hazard stage.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
pub enum HazardVariable {
    /// Accumulated precipitation over the horizon (mm).
    #[strum(serialize = "Precipitation")]
    Precipitation,
    /// Peak 10 m wind speed (km/h).
    #[strum(serialize = "Wind Speed")]
    WindSpeed,
    /// Peak 2 m temperature (°C).
    #[strum(serialize = "Temperature")]
    Temperature,
}

/// One of the three scenario bands of a hazard variable.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
pub enum Scenario {
    /// Lower bound, floored at zero.
    #[strum(serialize = "Best Case")]
    Best,
    /// Point estimate.
    #[strum(serialize = "Likely")]
    Likely,
    /// Upper bound.
    #[strum(serialize = "Worst Case")]
    Worst,
}

/// Column name for a hazard band, e.g. `"Worst Case: Wind Speed"`.
#[must_use]
pub fn hazard_field(scenario: Scenario, variable: HazardVariable) -> String {
    format!("{scenario}: {variable}")
}

/// All nine hazard columns in output order (variable-major).
#[must_use]
pub fn hazard_fields() -> Vec<String> {
    use strum::IntoEnumIterator as _;

    HazardVariable::iter()
        .flat_map(|v| Scenario::iter().map(move |s| hazard_field(s, v)))
        .collect()
}

/// Normalized density of children under 5.
pub const DENSITY_U5_NORMALIZED: &str = "Density <5 years (normalized)";
/// Normalized density of children under 10.
pub const DENSITY_U10_NORMALIZED: &str = "Density <10 years (normalized)";
/// Normalized density of children under 15.
pub const DENSITY_U15_NORMALIZED: &str = "Density <15 years (normalized)";

/// The three population columns in output order.
pub const POPULATION_FIELDS: [&str; 3] = [
    DENSITY_U5_NORMALIZED,
    DENSITY_U10_NORMALIZED,
    DENSITY_U15_NORMALIZED,
];

pub const SCHOOL_COUNT: &str = "Number of schools";
pub const SCHOOL_CAPACITY: &str = "Total school capacity";
pub const SCHOOL_DENSITY: &str = "School density (per km²)";
pub const SCHOOL_DISTANCE: &str = "Distance to nearest school (km)";
pub const HOSPITAL_COUNT: &str = "Number of hospitals";
pub const HOSPITAL_CAPACITY: &str = "Total hospital capacity";
pub const HOSPITAL_DENSITY: &str = "Hospital density (per km²)";
pub const HOSPITAL_DISTANCE: &str = "Distance to nearest hospital (km)";
pub const CELL_AREA_KM2: &str = "Area (km²)";
pub const ROAD_LENGTH_KM: &str = "Total road length (km)";
pub const ROAD_DENSITY: &str = "Road density (km of road per km²)";
pub const MAIN_ROAD_DISTANCE: &str = "Distance to main road (km)";

/// Curated infrastructure columns persisted to the layer file.
///
/// Raw counts, hospital capacity, area and road length are computed but not
/// exported.
pub const INFRASTRUCTURE_EXPORT_FIELDS: [&str; 7] = [
    SCHOOL_CAPACITY,
    SCHOOL_DENSITY,
    SCHOOL_DISTANCE,
    HOSPITAL_DENSITY,
    HOSPITAL_DISTANCE,
    ROAD_DENSITY,
    MAIN_ROAD_DISTANCE,
];
