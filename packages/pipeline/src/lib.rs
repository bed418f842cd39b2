#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Per-country layer pipeline.
//!
//! A run is keyed by `(continent, iso, resolution)`. Given the country's
//! boundary it produces, in order, the H3 grid, hazard bands, normalized
//! child population densities and (optionally) infrastructure indicators.
//! Each layer is a `GeoJSON` artifact in the country folder; a layer that
//! already exists is never recomputed, so runs can be repeated safely.

pub mod artifact;
pub mod catalogue;
pub mod components;
pub mod config;
pub mod orchestrator;
pub mod store;

pub use artifact::{ArtifactKey, ArtifactKind};
pub use catalogue::{DashboardLayer, catalogue, discover_countries, layer_files};
pub use components::{DefaultComponents, LayerComponents};
pub use config::{PipelineConfig, PipelineInputs, default_base_dir};
pub use orchestrator::{Pipeline, PipelineState, RunReport, Stage, StageOutcome};
pub use store::{ArtifactStore, FsStore, MemoryStore, StoreError};

use storm_map_geometry::GeometryError;
use storm_map_grid::GridError;
use storm_map_hazard::HazardError;
use storm_map_infrastructure::InfrastructureError;
use storm_map_population::PopulationError;
use thiserror::Error;

/// Errors that can occur while running the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Grid generation or resolution validation failed.
    #[error("Grid error: {0}")]
    Grid(#[from] GridError),

    /// Hazard sampling failed as a whole.
    #[error("Hazard error: {0}")]
    Hazard(#[from] HazardError),

    /// Population densification failed.
    #[error("Population error: {0}")]
    Population(#[from] PopulationError),

    /// Infrastructure metrics failed.
    #[error("Infrastructure error: {0}")]
    Infrastructure(#[from] InfrastructureError),

    /// Geometry could not be read or written.
    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    /// Artifact store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The inputs file is not valid.
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A derived stage ran without a grid.
    #[error("Grid artifact is not available")]
    MissingGrid,

    /// A stage failed; artifacts of earlier stages were kept.
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<Self>,
    },
}

impl PipelineError {
    /// Attributes this error to `stage`.
    #[must_use]
    pub fn in_stage(self, stage: Stage) -> Self {
        Self::Stage {
            stage,
            source: Box::new(self),
        }
    }
}
