#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Infrastructure indicators per grid cell.
//!
//! Schools and hospitals are joined to the cells that strictly contain
//! them (counts and capacities) and divided by cell area; each cell
//! centroid also gets the distance to the nearest one. Main roads are
//! clipped to every cell for length and density, and a sample of their
//! vertices gives the distance to the nearest main road.
//!
//! Nearest-neighbor distances are Euclidean in degrees times 111 km, which
//! overstates east-west distances away from the equator.

pub mod inputs;
pub mod metrics;

pub use inputs::{InfrastructureInputs, PointFeature, RoadSegment};
pub use metrics::{compute_infra_metrics, curated};

use serde::{Deserialize, Serialize};
use storm_map_geometry::GeometryError;
use thiserror::Error;

/// Errors that can occur while computing infrastructure indicators.
#[derive(Debug, Error)]
pub enum InfrastructureError {
    /// Reading or projecting an input failed.
    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),
}

/// Where the infrastructure inputs live and how to read them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InfrastructureConfig {
    /// Whether the infrastructure stage runs at all.
    pub enabled: bool,
    /// School points (`GeoJSON`).
    pub schools: std::path::PathBuf,
    /// Hospital points (`GeoJSON`).
    pub hospitals: std::path::PathBuf,
    /// Road lines (`GeoJSON`) with an OSM `highway` property.
    pub roads: std::path::PathBuf,
    /// Point property holding the capacity in persons.
    pub capacity_field: String,
    /// `highway` classes counted as main roads. Empty keeps every road.
    pub main_road_classes: Vec<String>,
}

impl Default for InfrastructureConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            schools: "data/raw/infrastructure/schools.geojson".into(),
            hospitals: "data/raw/infrastructure/hospitals.geojson".into(),
            roads: "data/raw/infrastructure/roads.geojson".into(),
            capacity_field: "capacity:persons".to_string(),
            main_road_classes: ["motorway", "trunk", "primary", "secondary"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}
