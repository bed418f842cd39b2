//! Hourly forecast sources.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::{HazardConfig, HazardError, retry};

/// Variables requested from Open-Meteo, in its naming.
const HOURLY_VARIABLES: &str = "precipitation,wind_speed_10m,temperature_2m";

/// Hourly values over the forecast horizon. Missing hours are dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HourlySeries {
    /// Precipitation per hour (mm).
    pub precipitation: Vec<f64>,
    /// Wind speed at 10 m (km/h).
    pub wind_speed: Vec<f64>,
    /// Air temperature at 2 m (°C).
    pub temperature: Vec<f64>,
}

/// Something that can produce an hourly forecast for a location.
#[async_trait]
pub trait ForecastSource: Send + Sync {
    /// Fetches the hourly forecast at `(lat, lng)` in degrees.
    ///
    /// # Errors
    ///
    /// Returns [`HazardError`] if the forecast cannot be fetched or parsed.
    async fn hourly(&self, lat: f64, lng: f64) -> Result<HourlySeries, HazardError>;
}

/// Open-Meteo deterministic forecast API client.
pub struct OpenMeteo {
    client: reqwest::Client,
    config: HazardConfig,
}

impl OpenMeteo {
    /// Builds a client with the configured per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`HazardError::Http`] if the client cannot be built.
    pub fn new(config: HazardConfig) -> Result<Self, HazardError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("storm-map/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    hourly: HourlyPayload,
}

#[derive(Debug, Deserialize)]
struct HourlyPayload {
    #[serde(default)]
    precipitation: Vec<Option<f64>>,
    #[serde(default)]
    wind_speed_10m: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m: Vec<Option<f64>>,
}

impl From<HourlyPayload> for HourlySeries {
    fn from(payload: HourlyPayload) -> Self {
        let present = |v: Vec<Option<f64>>| v.into_iter().flatten().collect();
        Self {
            precipitation: present(payload.precipitation),
            wind_speed: present(payload.wind_speed_10m),
            temperature: present(payload.temperature_2m),
        }
    }
}

/// Parses an Open-Meteo forecast response body.
///
/// # Errors
///
/// Returns [`HazardError::Json`] if `hourly` is missing or malformed.
pub fn parse_forecast(body: serde_json::Value) -> Result<HourlySeries, HazardError> {
    let response: ForecastResponse = serde_json::from_value(body)?;
    Ok(response.hourly.into())
}

#[async_trait]
impl ForecastSource for OpenMeteo {
    async fn hourly(&self, lat: f64, lng: f64) -> Result<HourlySeries, HazardError> {
        let lat = format!("{lat:.6}");
        let lng = format!("{lng:.6}");
        let days = self.config.forecast_days.to_string();

        let body = retry::send_json(
            || {
                self.client.get(&self.config.base_url).query(&[
                    ("latitude", lat.as_str()),
                    ("longitude", lng.as_str()),
                    ("hourly", HOURLY_VARIABLES),
                    ("forecast_days", days.as_str()),
                ])
            },
            self.config.max_retries,
        )
        .await?;

        parse_forecast(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_open_meteo_payload() {
        let body = serde_json::json!({
            "latitude": 18.5,
            "longitude": -72.3,
            "hourly_units": { "precipitation": "mm" },
            "hourly": {
                "time": ["2026-10-16T00:00", "2026-10-16T01:00", "2026-10-16T02:00"],
                "precipitation": [0.0, 1.5, null],
                "wind_speed_10m": [10.2, 12.0, 9.1],
                "temperature_2m": [27.0, 26.4, 25.9]
            }
        });
        let series = parse_forecast(body).unwrap();
        assert_eq!(series.precipitation, vec![0.0, 1.5]);
        assert_eq!(series.wind_speed.len(), 3);
        assert_eq!(series.temperature[0], 27.0);
    }

    #[test]
    fn missing_hourly_block_is_an_error() {
        let body = serde_json::json!({ "error": true, "reason": "Latitude must be in range" });
        assert!(matches!(parse_forecast(body), Err(HazardError::Json(_))));
    }
}
