//! The layer-producing components the orchestrator drives.

use std::sync::Arc;

use async_trait::async_trait;
use storm_map_geometry::Boundary;
use storm_map_hazard::{ForecastSource, OpenMeteo, sample_hazards};
use storm_map_infrastructure::{InfrastructureInputs, compute_infra_metrics, curated};
use storm_map_layer_models::LayerTable;
use storm_map_layer_models::progress::{ProgressCallback, null_progress};
use storm_map_population::{DemographicTable, GeoRaster, standardize_child_population};

use crate::PipelineError;
use crate::config::PipelineInputs;

/// Produces each derived layer from its inputs.
///
/// The orchestrator decides *whether* a layer is computed; implementations
/// only decide *how*.
#[async_trait]
pub trait LayerComponents: Send + Sync {
    /// Tessellates a boundary.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the resolution or boundary is invalid.
    fn grid(&self, boundary: &Boundary, resolution: u8) -> Result<LayerTable, PipelineError>;

    /// Samples hazard bands for every grid cell.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] only for failures that affect the whole
    /// layer; per-cell failures leave that cell's fields unset.
    async fn hazard(&self, grid: &LayerTable) -> Result<LayerTable, PipelineError>;

    /// Computes normalized child densities.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the demographic row or the raster is
    /// missing.
    fn population(&self, grid: &LayerTable, iso: &str) -> Result<LayerTable, PipelineError>;

    /// Computes the curated infrastructure indicators.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if an input cannot be read.
    fn infrastructure(&self, grid: &LayerTable) -> Result<LayerTable, PipelineError>;

    /// Whether the infrastructure stage runs.
    fn infrastructure_enabled(&self) -> bool;
}

/// Production components backed by the configured input files and a
/// forecast source.
pub struct DefaultComponents {
    inputs: PipelineInputs,
    forecast: Arc<dyn ForecastSource>,
    progress: Arc<dyn ProgressCallback>,
}

impl DefaultComponents {
    /// Uses Open-Meteo with the configured hazard settings.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Hazard`] if the HTTP client cannot be built.
    pub fn new(inputs: PipelineInputs) -> Result<Self, PipelineError> {
        let forecast = Arc::new(OpenMeteo::new(inputs.hazard.clone())?);
        Ok(Self::with_forecast(inputs, forecast))
    }

    #[must_use]
    pub fn with_forecast(inputs: PipelineInputs, forecast: Arc<dyn ForecastSource>) -> Self {
        Self {
            inputs,
            forecast,
            progress: null_progress(),
        }
    }

    /// Reports hazard sampling progress to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }
}

#[async_trait]
impl LayerComponents for DefaultComponents {
    fn grid(&self, boundary: &Boundary, resolution: u8) -> Result<LayerTable, PipelineError> {
        Ok(storm_map_grid::generate_grid(boundary, resolution)?)
    }

    async fn hazard(&self, grid: &LayerTable) -> Result<LayerTable, PipelineError> {
        Ok(sample_hazards(
            grid,
            self.forecast.as_ref(),
            self.inputs.hazard.concurrency,
            Arc::clone(&self.progress),
        )
        .await)
    }

    fn population(&self, grid: &LayerTable, iso: &str) -> Result<LayerTable, PipelineError> {
        let demographics = DemographicTable::from_path(&self.inputs.demographics)?;
        // Fail on a missing row before decoding the raster.
        demographics.proportions(iso, self.inputs.year)?;

        let raster = match grid.bounds() {
            Some(bounds) => GeoRaster::read_window(&self.inputs.population_raster, bounds)?,
            None => GeoRaster::empty(),
        };
        Ok(standardize_child_population(
            grid,
            &demographics,
            &raster,
            iso,
            self.inputs.year,
        )?)
    }

    fn infrastructure(&self, grid: &LayerTable) -> Result<LayerTable, PipelineError> {
        let inputs = InfrastructureInputs::load(&self.inputs.infrastructure)?;
        let metrics = compute_infra_metrics(grid, &inputs)?;
        Ok(curated(&metrics))
    }

    fn infrastructure_enabled(&self) -> bool {
        self.inputs.infrastructure.enabled
    }
}
