//! Reduction of hourly series to best/likely/worst bands.
//!
//! Each variable is summarized by a center value (sum for precipitation,
//! peak for wind and temperature) and a spread: the population standard
//! deviation of the hourly values, but never less than a fixed fraction of
//! the center. The best case is floored at zero unless the center itself is
//! negative, in which case it equals the center so the band stays ordered.

use storm_map_layer_models::LayerRow;
use storm_map_layer_models::fields::{HazardVariable, Scenario, hazard_field};

use crate::{HazardError, HourlySeries};

/// Minimum relative spread for accumulated precipitation.
const PRECIPITATION_MIN_SPREAD: f64 = 0.20;

/// Minimum relative spread for peak wind speed.
const WIND_SPEED_MIN_SPREAD: f64 = 0.15;

/// Minimum relative spread for peak temperature.
const TEMPERATURE_MIN_SPREAD: f64 = 0.05;

/// A three-point scenario summary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub best: f64,
    pub likely: f64,
    pub worst: f64,
}

impl Band {
    /// Builds a band around `center` with the given spread.
    ///
    /// `best ≤ likely ≤ worst` always holds.
    #[must_use]
    pub fn around(center: f64, spread: f64) -> Self {
        let spread = spread.abs();
        Self {
            best: (center - spread).max(0.0).min(center),
            likely: center,
            worst: center + spread,
        }
    }

    /// Value for a scenario.
    #[must_use]
    pub const fn get(&self, scenario: Scenario) -> f64 {
        match scenario {
            Scenario::Best => self.best,
            Scenario::Likely => self.likely,
            Scenario::Worst => self.worst,
        }
    }
}

/// The three bands computed for one cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HazardBands {
    pub precipitation: Band,
    pub wind_speed: Band,
    pub temperature: Band,
}

impl HazardBands {
    /// Reduces a forecast to bands.
    ///
    /// # Errors
    ///
    /// Returns [`HazardError::EmptySeries`] if any variable has no values.
    pub fn from_series(series: &HourlySeries) -> Result<Self, HazardError> {
        let precipitation = {
            let values = non_empty(&series.precipitation, "precipitation")?;
            let sum: f64 = values.iter().sum();
            Band::around(sum, spread(values, sum, PRECIPITATION_MIN_SPREAD))
        };

        let wind_speed = {
            let values = non_empty(&series.wind_speed, "wind_speed_10m")?;
            let peak = max(values);
            Band::around(peak, spread(values, peak, WIND_SPEED_MIN_SPREAD))
        };

        let temperature = {
            let values = non_empty(&series.temperature, "temperature_2m")?;
            let peak = max(values);
            Band::around(peak, spread(values, peak, TEMPERATURE_MIN_SPREAD))
        };

        Ok(Self {
            precipitation,
            wind_speed,
            temperature,
        })
    }

    /// Band for a variable.
    #[must_use]
    pub const fn band(&self, variable: HazardVariable) -> Band {
        match variable {
            HazardVariable::Precipitation => self.precipitation,
            HazardVariable::WindSpeed => self.wind_speed,
            HazardVariable::Temperature => self.temperature,
        }
    }

    /// Writes the nine band values into a row.
    pub fn write_to(&self, row: &mut LayerRow) {
        use strum::IntoEnumIterator as _;

        for variable in HazardVariable::iter() {
            let band = self.band(variable);
            for scenario in Scenario::iter() {
                row.set(&hazard_field(scenario, variable), band.get(scenario));
            }
        }
    }
}

fn non_empty<'a>(values: &'a [f64], variable: &str) -> Result<&'a [f64], HazardError> {
    if values.is_empty() {
        return Err(HazardError::EmptySeries {
            variable: variable.to_string(),
        });
    }
    Ok(values)
}

fn max(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

/// `max(std, center * min_fraction)`. A negative center leaves the std.
fn spread(values: &[f64], center: f64, min_fraction: f64) -> f64 {
    population_std(values).max(center * min_fraction)
}

#[allow(clippy::cast_precision_loss)]
fn population_std(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}
