//! Idempotent driver for one (continent, iso, resolution) key.
//!
//! Stages run in a fixed order: grid, hazard, population, then
//! infrastructure when enabled. A stage whose artifact already exists is
//! skipped without reading or validating it. A missing boundary makes the
//! whole run a no-op. The first failing stage aborts the run; artifacts
//! written by earlier stages stay in place.

use std::fmt;

use serde::Serialize;
use storm_map_layer_models::{CountryKey, LayerTable};
use strum::IntoEnumIterator as _;
use strum_macros::{AsRefStr, Display, EnumIter};

use crate::PipelineError;
use crate::artifact::{ArtifactKey, ArtifactKind};
use crate::components::LayerComponents;
use crate::config::PipelineConfig;
use crate::store::ArtifactStore;

/// A derived layer, in execution order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Display, EnumIter, AsRefStr,
)]
pub enum Stage {
    Grid,
    Hazard,
    Population,
    Infrastructure,
}

impl Stage {
    /// Artifact this stage produces at `resolution`.
    #[must_use]
    pub const fn kind(self, resolution: u8) -> ArtifactKind {
        match self {
            Self::Grid => ArtifactKind::Grid { resolution },
            Self::Hazard => ArtifactKind::Hazard,
            Self::Population => ArtifactKind::Population,
            Self::Infrastructure => ArtifactKind::Infrastructure,
        }
    }
}

/// Where a key stands, judged by which artifacts exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
pub enum PipelineState {
    NoBoundary,
    GridMissing,
    HazardMissing,
    PopulationMissing,
    InfrastructureMissing,
    Complete,
}

/// What happened to one stage during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StageOutcome {
    /// The artifact already existed.
    Skipped,
    /// The artifact was computed and stored.
    Computed { cells: usize },
    /// The stage is turned off.
    Disabled,
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped => f.write_str("skipped (exists)"),
            Self::Computed { cells } => write!(f, "computed ({cells} cells)"),
            Self::Disabled => f.write_str("disabled"),
        }
    }
}

/// Summary of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub country: CountryKey,
    pub resolution: u8,
    /// `false` when the run stopped because there is no boundary.
    pub boundary_found: bool,
    pub stages: Vec<(Stage, StageOutcome)>,
}

impl RunReport {
    /// Number of stages that computed something.
    #[must_use]
    pub fn computed(&self) -> usize {
        self.stages
            .iter()
            .filter(|(_, o)| matches!(o, StageOutcome::Computed { .. }))
            .count()
    }
}

/// Drives the components for one configured key.
pub struct Pipeline<'a> {
    config: PipelineConfig,
    store: &'a dyn ArtifactStore,
    components: &'a dyn LayerComponents,
}

impl<'a> Pipeline<'a> {
    #[must_use]
    pub const fn new(
        config: PipelineConfig,
        store: &'a dyn ArtifactStore,
        components: &'a dyn LayerComponents,
    ) -> Self {
        Self {
            config,
            store,
            components,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn key(&self, stage: Stage) -> ArtifactKey {
        self.config.artifact(stage.kind(self.config.resolution))
    }

    fn boundary_exists(&self) -> bool {
        self.store
            .exists(&self.config.artifact(ArtifactKind::Boundary))
    }

    fn enabled(&self, stage: Stage) -> bool {
        stage != Stage::Infrastructure || self.components.infrastructure_enabled()
    }

    /// Current state without running anything.
    #[must_use]
    pub fn status(&self) -> PipelineState {
        if !self.boundary_exists() {
            return PipelineState::NoBoundary;
        }

        Stage::iter()
            .filter(|&stage| self.enabled(stage))
            .find(|&stage| !self.store.exists(&self.key(stage)))
            .map_or(PipelineState::Complete, |stage| match stage {
                Stage::Grid => PipelineState::GridMissing,
                Stage::Hazard => PipelineState::HazardMissing,
                Stage::Population => PipelineState::PopulationMissing,
                Stage::Infrastructure => PipelineState::InfrastructureMissing,
            })
    }

    /// Produces every missing artifact of the key.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Grid`] if the resolution is out of range and
    /// [`PipelineError::Stage`] wrapping the cause of the first failing
    /// stage.
    pub async fn run(&self) -> Result<RunReport, PipelineError> {
        storm_map_grid::resolution(self.config.resolution)?;

        let country = self.config.country();
        let mut report = RunReport {
            country: country.clone(),
            resolution: self.config.resolution,
            boundary_found: false,
            stages: Vec::new(),
        };

        if !self.boundary_exists() {
            log::info!("No boundary for {country}, nothing to do");
            return Ok(report);
        }
        report.boundary_found = true;

        log::info!(
            "Running pipeline for {country} at resolution {}",
            self.config.resolution
        );

        // Loaded at most once, and only if a later stage needs computing.
        let mut grid: Option<LayerTable> = None;

        for stage in Stage::iter() {
            if !self.enabled(stage) {
                report.stages.push((stage, StageOutcome::Disabled));
                continue;
            }

            let key = self.key(stage);
            if self.store.exists(&key) {
                log::info!("{stage}: {key} exists, skipping");
                report.stages.push((stage, StageOutcome::Skipped));
                continue;
            }

            log::info!("{stage}: computing {key}...");
            let table = self
                .compute(stage, &mut grid)
                .await
                .map_err(|e| e.in_stage(stage))?;
            self.store
                .put(&key, &table)
                .map_err(|e| PipelineError::from(e).in_stage(stage))?;

            let cells = table.len();
            if stage == Stage::Grid {
                grid = Some(table);
            }
            report.stages.push((stage, StageOutcome::Computed { cells }));
        }

        log::info!(
            "Pipeline for {country} done ({} stages computed)",
            report.computed()
        );
        Ok(report)
    }

    async fn compute(
        &self,
        stage: Stage,
        grid: &mut Option<LayerTable>,
    ) -> Result<LayerTable, PipelineError> {
        if stage == Stage::Grid {
            let boundary = self.store.boundary(&self.config.country())?;
            return self.components.grid(&boundary, self.config.resolution);
        }

        if grid.is_none() {
            *grid = Some(self.store.get(&self.key(Stage::Grid))?);
        }
        let Some(grid) = grid.as_ref() else {
            return Err(PipelineError::MissingGrid);
        };

        match stage {
            Stage::Hazard => self.components.hazard(grid).await,
            Stage::Population => self.components.population(grid, &self.config.iso),
            Stage::Infrastructure => self.components.infrastructure(grid),
            Stage::Grid => Err(PipelineError::MissingGrid),
        }
    }
}
