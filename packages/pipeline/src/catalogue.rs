//! Which dashboard layers exist for which countries.
//!
//! Layers that have not been computed yet are reported as `None` so a
//! consumer can show them as pending instead of failing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use storm_map_layer_models::CountryKey;
use strum::IntoEnumIterator as _;
use strum_macros::{AsRefStr, Display, EnumIter};

use crate::artifact::{ArtifactKey, ArtifactKind};

/// A layer as shown on the dashboard.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Display, EnumIter, AsRefStr,
)]
pub enum DashboardLayer {
    #[strum(serialize = "Population")]
    Population,
    #[strum(serialize = "Weather Scenarios")]
    WeatherScenarios,
    #[strum(serialize = "Infrastructure")]
    Infrastructure,
}

impl DashboardLayer {
    /// Artifact backing this layer.
    #[must_use]
    pub const fn artifact(self) -> ArtifactKind {
        match self {
            Self::Population => ArtifactKind::Population,
            Self::WeatherScenarios => ArtifactKind::Hazard,
            Self::Infrastructure => ArtifactKind::Infrastructure,
        }
    }
}

/// Path of every dashboard layer of `country`, or `None` when absent.
#[must_use]
pub fn layer_files(base_dir: &Path, country: &CountryKey) -> BTreeMap<DashboardLayer, Option<PathBuf>> {
    DashboardLayer::iter()
        .map(|layer| {
            let path = ArtifactKey::new(country.clone(), layer.artifact()).path(base_dir);
            (layer, path.is_file().then_some(path))
        })
        .collect()
}

/// Every `{continent}/{iso}` folder under `base_dir`, sorted.
///
/// A missing base directory yields no countries. Unreadable entries are
/// skipped.
#[must_use]
pub fn discover_countries(base_dir: &Path) -> Vec<CountryKey> {
    let mut countries = Vec::new();

    for continent in sub_dirs(base_dir) {
        for iso in sub_dirs(&base_dir.join(&continent)) {
            countries.push(CountryKey::new(continent.clone(), iso));
        }
    }

    countries.sort();
    log::debug!("Discovered {} countries under {}", countries.len(), base_dir.display());
    countries
}

/// Layer files for every discovered country.
#[must_use]
pub fn catalogue(base_dir: &Path) -> BTreeMap<CountryKey, BTreeMap<DashboardLayer, Option<PathBuf>>> {
    discover_countries(base_dir)
        .into_iter()
        .map(|country| {
            let layers = layer_files(base_dir, &country);
            (country, layers)
        })
        .collect()
}

fn sub_dirs(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    entries
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| !name.starts_with('.'))
        .collect()
}
