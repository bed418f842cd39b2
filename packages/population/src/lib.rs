#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Child population densities per grid cell.
//!
//! Total population is summed from a single-band raster (`WorldPop`
//! style, EPSG:4326) over every pixel touched by a cell, split into the
//! under-5/10/15 shares of the country's demographic table, divided by the
//! cell area and min-max normalized across the grid.

pub mod demographics;
pub mod densifier;
pub mod raster;

pub use demographics::{AgeProportions, DemographicTable};
pub use densifier::{densify, min_max_normalize, standardize_child_population};
pub use raster::{GeoRaster, ZonalSource};

use storm_map_geometry::GeometryError;
use thiserror::Error;

/// Errors that can occur while building the population layer.
#[derive(Debug, Error)]
pub enum PopulationError {
    /// I/O error (file read).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TIFF decoding failed.
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// Reprojection for cell areas failed.
    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    /// The demographic table has no row for the country and year.
    #[error("No demographic data for {iso} in {year}")]
    MissingDemographics {
        /// ISO 3166-1 alpha-3 code looked up.
        iso: String,
        /// Year looked up.
        year: u16,
    },

    /// The demographic table is malformed.
    #[error("Invalid demographic table: {message}")]
    InvalidDemographics {
        /// Description of what went wrong.
        message: String,
    },

    /// The raster is missing georeferencing or has an unexpected layout.
    #[error("Invalid raster: {message}")]
    InvalidRaster {
        /// Description of what went wrong.
        message: String,
    },
}
