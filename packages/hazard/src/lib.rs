#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Hazard sampling: weather forecasts reduced to scenario bands per cell.
//!
//! For every grid cell the centroid is sent to an hourly forecast service
//! (Open-Meteo by default) and the 7-day precipitation, wind speed and
//! temperature series are reduced to best/likely/worst bands. Requests run
//! concurrently with a bounded pool; a failed cell is logged and left
//! without hazard values.

pub mod bands;
pub mod forecast;
pub mod retry;
pub mod sampler;

pub use bands::{Band, HazardBands};
pub use forecast::{ForecastSource, HourlySeries, OpenMeteo};
pub use sampler::{sample_cells, sample_hazards};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while sampling a single cell.
#[derive(Debug, Error)]
pub enum HazardError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Server answered with a non-success status.
    #[error("HTTP {status}")]
    Status {
        /// Status code returned.
        status: u16,
    },

    /// A forecast variable had no usable values.
    #[error("Forecast series {variable} is empty")]
    EmptySeries {
        /// Name of the variable.
        variable: String,
    },

    /// The cell polygon has no centroid.
    #[error("Cell {cell_id} has no centroid")]
    NoCentroid {
        /// Cell that failed.
        cell_id: String,
    },
}

/// Forecast service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HazardConfig {
    /// Forecast endpoint.
    pub base_url: String,
    /// Forecast horizon in days.
    pub forecast_days: u8,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum number of requests in flight.
    pub concurrency: usize,
    /// Retries for transient failures (timeouts, 429, 5xx).
    pub max_retries: u32,
}

impl Default for HazardConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.open-meteo.com/v1/forecast".to_string(),
            forecast_days: 7,
            timeout_secs: 10,
            concurrency: 8,
            max_retries: 2,
        }
    }
}
