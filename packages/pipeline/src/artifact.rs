//! Artifact keys and their on-disk layout.
//!
//! Every artifact of a country lives in `{base_dir}/{continent}/{iso}/`.
//! Only the grid file name carries the resolution.

use std::fmt;
use std::path::{Path, PathBuf};

use storm_map_layer_models::CountryKey;

/// Raw boundary input.
pub const BOUNDARY_FILE: &str = "boundarie.geojson";
/// Hazard bands layer.
pub const HAZARD_FILE: &str = "hazard.geojson";
/// Normalized child population densities.
pub const POPULATION_FILE: &str = "h3_age_standardized.geojson";
/// Curated infrastructure indicators.
pub const INFRASTRUCTURE_FILE: &str = "h3_infra_indicators_user_friendly.geojson";

/// What an artifact holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArtifactKind {
    Boundary,
    Grid { resolution: u8 },
    Hazard,
    Population,
    Infrastructure,
}

impl ArtifactKind {
    /// File name inside the country folder.
    #[must_use]
    pub fn file_name(self) -> String {
        match self {
            Self::Boundary => BOUNDARY_FILE.to_string(),
            Self::Grid { resolution } => format!("h3_grid_res{resolution}.geojson"),
            Self::Hazard => HAZARD_FILE.to_string(),
            Self::Population => POPULATION_FILE.to_string(),
            Self::Infrastructure => INFRASTRUCTURE_FILE.to_string(),
        }
    }
}

/// Addresses one artifact of one country.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArtifactKey {
    pub country: CountryKey,
    pub kind: ArtifactKind,
}

impl ArtifactKey {
    #[must_use]
    pub const fn new(country: CountryKey, kind: ArtifactKind) -> Self {
        Self { country, kind }
    }

    /// Path relative to the data directory.
    #[must_use]
    pub fn relative_path(&self) -> PathBuf {
        country_dir(Path::new(""), &self.country).join(self.kind.file_name())
    }

    /// Absolute path under `base_dir`.
    #[must_use]
    pub fn path(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(self.relative_path())
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.country, self.kind.file_name())
    }
}

/// `{base_dir}/{continent}/{iso}`.
#[must_use]
pub fn country_dir(base_dir: &Path, country: &CountryKey) -> PathBuf {
    base_dir.join(&country.continent).join(&country.iso)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_follow_country_layout() {
        let country = CountryKey::new("Latin America and the Caribbean", "hti");
        let base = Path::new("data_v2");

        let grid = ArtifactKey::new(country.clone(), ArtifactKind::Grid { resolution: 7 });
        assert_eq!(
            grid.path(base),
            Path::new("data_v2/Latin America and the Caribbean/HTI/h3_grid_res7.geojson")
        );

        let boundary = ArtifactKey::new(country.clone(), ArtifactKind::Boundary);
        assert!(boundary.path(base).ends_with("HTI/boundarie.geojson"));

        let hazard = ArtifactKey::new(country, ArtifactKind::Hazard);
        assert_eq!(
            hazard.to_string(),
            "Latin America and the Caribbean/HTI/hazard.geojson"
        );
    }

    #[test]
    fn resolution_is_part_of_the_grid_key_only() {
        assert_ne!(
            ArtifactKind::Grid { resolution: 5 }.file_name(),
            ArtifactKind::Grid { resolution: 6 }.file_name()
        );
        assert_eq!(ArtifactKind::Population.file_name(), POPULATION_FILE);
    }
}
