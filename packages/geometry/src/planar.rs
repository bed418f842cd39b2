//! Temporary planar projection for metric computations.
//!
//! Areas and road lengths are computed in spherical (web) Mercator, the same
//! projection the dashboard tiles use. Mercator inflates areas away from the
//! equator; densities are only compared within a country, where the factor
//! is roughly uniform.

use geo::{Area, Euclidean, Length, LineString, MultiLineString, Polygon};

use crate::GeometryError;
use crate::crs::{Crs, Projector};

/// Square meters per square kilometer.
const M2_PER_KM2: f64 = 1_000_000.0;

/// Meters per kilometer.
const M_PER_KM: f64 = 1_000.0;

/// WGS84 → Mercator projector with metric helpers.
pub struct Planar {
    forward: Projector,
}

impl Planar {
    /// Builds the Mercator projector.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::Projection`] if `proj4rs` rejects the
    /// definition.
    pub fn mercator() -> Result<Self, GeometryError> {
        Ok(Self {
            forward: Projector::new(Crs::Wgs84, Crs::WebMercator)?,
        })
    }

    /// Projects a polygon to Mercator meters.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::Projection`] if any coordinate fails.
    pub fn polygon(&self, polygon: &Polygon<f64>) -> Result<Polygon<f64>, GeometryError> {
        self.forward.geometry(polygon)
    }

    /// Projects a line to Mercator meters.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::Projection`] if any coordinate fails.
    pub fn line(&self, line: &LineString<f64>) -> Result<LineString<f64>, GeometryError> {
        self.forward.geometry(line)
    }

    /// Area of an EPSG:4326 polygon in km².
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::Projection`] if any coordinate fails.
    pub fn area_km2(&self, polygon: &Polygon<f64>) -> Result<f64, GeometryError> {
        Ok(self.polygon(polygon)?.unsigned_area() / M2_PER_KM2)
    }
}

/// Length in km of an already-projected (meter) multi-line.
#[must_use]
pub fn length_km(lines: &MultiLineString<f64>) -> f64 {
    Euclidean.length(lines) / M_PER_KM
}

/// Density guarded against zero or invalid area.
///
/// Returns `0.0` when `area` is not positive so downstream consumers never
/// see infinities.
#[must_use]
pub fn per_km2(value: f64, area: f64) -> f64 {
    if area > 0.0 { value / area } else { 0.0 }
}
