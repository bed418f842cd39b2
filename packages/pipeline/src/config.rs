//! Run configuration.
//!
//! [`PipelineConfig`] is the key of a run and is resolved once at entry.
//! [`PipelineInputs`] describes where the raw inputs live and is read from
//! a TOML file; every field has a default matching the usual data layout.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use storm_map_hazard::HazardConfig;
use storm_map_infrastructure::InfrastructureConfig;
use storm_map_layer_models::CountryKey;

use crate::PipelineError;
use crate::artifact::{ArtifactKey, ArtifactKind};

/// Environment variable overriding the default data directory.
pub const DATA_DIR_ENV: &str = "STORM_MAP_DATA_DIR";

/// Data directory used when nothing else is configured.
pub const DEFAULT_DATA_DIR: &str = "data_v2";

/// `{base_dir, continent, iso, resolution}` for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub base_dir: PathBuf,
    pub continent: String,
    pub iso: String,
    /// H3 resolution, 0 (coarsest) to 15 (finest).
    pub resolution: u8,
}

impl PipelineConfig {
    #[must_use]
    pub fn new(
        base_dir: impl Into<PathBuf>,
        continent: impl Into<String>,
        iso: impl Into<String>,
        resolution: u8,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            continent: continent.into(),
            iso: iso.into().to_ascii_uppercase(),
            resolution,
        }
    }

    #[must_use]
    pub fn country(&self) -> CountryKey {
        CountryKey::new(self.continent.clone(), self.iso.clone())
    }

    /// Key of one of this run's artifacts.
    #[must_use]
    pub fn artifact(&self, kind: ArtifactKind) -> ArtifactKey {
        ArtifactKey::new(self.country(), kind)
    }

    /// Key of this run's grid.
    #[must_use]
    pub fn grid_key(&self) -> ArtifactKey {
        self.artifact(ArtifactKind::Grid {
            resolution: self.resolution,
        })
    }
}

/// `$STORM_MAP_DATA_DIR`, or `data_v2`.
#[must_use]
pub fn default_base_dir() -> PathBuf {
    base_dir_from(std::env::var(DATA_DIR_ENV).ok())
}

fn base_dir_from(value: Option<String>) -> PathBuf {
    value
        .filter(|v| !v.trim().is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_DATA_DIR), PathBuf::from)
}

/// Raw inputs and per-stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineInputs {
    /// Single-band population count raster (`GeoTIFF`, EPSG:4326).
    pub population_raster: PathBuf,
    /// World Population Prospects 5-year age groups, exported to CSV.
    pub demographics: PathBuf,
    /// Year looked up in the demographic table.
    pub year: u16,
    pub hazard: HazardConfig,
    pub infrastructure: InfrastructureConfig,
}

impl Default for PipelineInputs {
    fn default() -> Self {
        Self {
            population_raster: "data/raw/ppp_2020_1km_Aggregated.tif".into(),
            demographics: "data/raw/WPP2024_POP_F02_1_POPULATION_5-YEAR_AGE_GROUPS_BOTH_SEXES.csv"
                .into(),
            year: 2020,
            hazard: HazardConfig::default(),
            infrastructure: InfrastructureConfig::default(),
        }
    }
}

impl PipelineInputs {
    /// Parses inputs from TOML. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if the text is not valid TOML or a
    /// value has the wrong type.
    pub fn from_toml_str(text: &str) -> Result<Self, PipelineError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads inputs from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Io`] if the file cannot be read, or see
    /// [`Self::from_toml_str`].
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path)?;
        let inputs = Self::from_toml_str(&text)?;
        log::info!("Loaded pipeline inputs from {}", path.display());
        Ok(inputs)
    }
}
