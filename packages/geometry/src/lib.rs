#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geometry plumbing shared by the storm map stages.
//!
//! Reads boundaries and infrastructure inputs from `GeoJSON` in whatever CRS
//! they declare, reprojects them to EPSG:4326, and reads/writes
//! [`LayerTable`](storm_map_layer_models::LayerTable) files. The [`planar`]
//! module provides the temporary Mercator projection used for areas and
//! lengths.

pub mod boundary;
pub mod crs;
pub mod io;
pub mod planar;

pub use boundary::Boundary;
pub use crs::Crs;

use thiserror::Error;

/// Errors raised while reading, writing or reprojecting geometries.
#[derive(Debug, Error)]
pub enum GeometryError {
    /// I/O error (file read/write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `GeoJSON` parsing or conversion failed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The declared CRS is not one we can reproject from.
    #[error("Unsupported CRS: {0}")]
    UnsupportedCrs(String),

    /// A coordinate transform failed.
    #[error("Projection error: {message}")]
    Projection {
        /// Description of what went wrong.
        message: String,
    },

    /// Geometry is structurally invalid for the requested operation.
    #[error("Invalid geometry: {message}")]
    InvalidGeometry {
        /// Description of what went wrong.
        message: String,
    },
}
