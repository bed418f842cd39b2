#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Country catalogue and boundary files from geoBoundaries.
//!
//! The `gbOpen/ALL/ADM1` listing names every country with its ISO code and
//! continent. It is used to lay out the `{continent}/{iso}` data folders
//! and to fetch a country's boundary `GeoJSON` the first time it is needed.
//! An existing boundary file is never replaced.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use storm_map_layer_models::CountryKey;
use thiserror::Error;

/// Default listing endpoint.
pub const DEFAULT_LISTING_URL: &str = "https://www.geoboundaries.org/api/current/gbOpen/ALL/ADM1/";

/// Listing request timeout.
const TIMEOUT_SECS: u64 = 15;

/// Errors from the geoBoundaries client.
#[derive(Debug, Error)]
pub enum BoundaryError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error (folder creation, file write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The listing has no entry for an ISO code.
    #[error("Country {0} is not in the geoBoundaries listing")]
    UnknownCountry(String),

    /// The listing entry has no download link.
    #[error("No boundary download URL for {0}")]
    NoDownloadUrl(String),
}

/// One country of the geoBoundaries listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryRecord {
    #[serde(rename = "boundaryName")]
    pub name: String,
    #[serde(rename = "boundaryISO")]
    pub iso: String,
    #[serde(rename = "Continent")]
    pub continent: String,
    /// Full-resolution `GeoJSON`.
    #[serde(rename = "gjDownloadURL", default)]
    pub geojson_url: Option<String>,
    /// Simplified `GeoJSON`.
    #[serde(rename = "simplifiedGeometryGeoJSON", default)]
    pub simplified_url: Option<String>,
}

impl CountryRecord {
    /// Key of this country's data folder.
    #[must_use]
    pub fn key(&self) -> CountryKey {
        CountryKey::new(self.continent.clone(), self.iso.clone())
    }

    /// Preferred download link: simplified geometry, else full resolution.
    #[must_use]
    pub fn download_url(&self) -> Option<&str> {
        self.simplified_url
            .as_deref()
            .or(self.geojson_url.as_deref())
            .filter(|url| !url.is_empty())
    }
}

/// Parses a listing response body.
///
/// # Errors
///
/// Returns [`BoundaryError::Json`] if the body is not a list of records.
pub fn parse_listing(body: &str) -> Result<Vec<CountryRecord>, BoundaryError> {
    Ok(serde_json::from_str(body)?)
}

/// Distinct continents of a listing, sorted.
#[must_use]
pub fn continents(records: &[CountryRecord]) -> Vec<String> {
    records
        .iter()
        .map(|r| r.continent.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Creates `{base_dir}/{continent}/{iso}` for every record.
///
/// Returns how many folders were newly created.
///
/// # Errors
///
/// Returns [`BoundaryError::Io`] if a folder cannot be created.
pub fn ensure_country_dirs(base_dir: &Path, records: &[CountryRecord]) -> Result<usize, BoundaryError> {
    let mut created = 0;
    for record in records {
        let key = record.key();
        let dir = base_dir.join(&key.continent).join(&key.iso);
        if !dir.is_dir() {
            std::fs::create_dir_all(&dir)?;
            created += 1;
        }
    }
    log::info!(
        "Country folders ready under {} ({created} created)",
        base_dir.display()
    );
    Ok(created)
}

/// Outcome of [`GeoBoundaries::download_boundary`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundaryDownload {
    /// A file was already there; nothing was fetched.
    Existing(PathBuf),
    /// The file was fetched and written.
    Downloaded(PathBuf),
}

/// geoBoundaries HTTP client.
pub struct GeoBoundaries {
    client: reqwest::Client,
    listing_url: String,
}

impl GeoBoundaries {
    /// Builds a client for `listing_url`.
    ///
    /// # Errors
    ///
    /// Returns [`BoundaryError::Http`] if the client cannot be built.
    pub fn new(listing_url: impl Into<String>) -> Result<Self, BoundaryError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("storm-map/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            listing_url: listing_url.into(),
        })
    }

    /// Fetches the country listing.
    ///
    /// # Errors
    ///
    /// Returns [`BoundaryError`] if the request fails or the body is not a
    /// listing.
    pub async fn countries(&self) -> Result<Vec<CountryRecord>, BoundaryError> {
        let response = self
            .client
            .get(&self.listing_url)
            .send()
            .await?
            .error_for_status()?;
        let body = response.text().await?;
        let records = parse_listing(&body)?;
        log::info!("geoBoundaries lists {} countries", records.len());
        Ok(records)
    }

    /// Finds a country in the listing by ISO code.
    ///
    /// # Errors
    ///
    /// Returns [`BoundaryError::UnknownCountry`] if it is not listed.
    pub async fn country(&self, iso: &str) -> Result<CountryRecord, BoundaryError> {
        self.countries()
            .await?
            .into_iter()
            .find(|r| r.iso.eq_ignore_ascii_case(iso))
            .ok_or_else(|| BoundaryError::UnknownCountry(iso.to_string()))
    }

    /// Downloads a country's boundary to `dest` unless a file is already
    /// there.
    ///
    /// The body is written to a temporary sibling and renamed into place.
    ///
    /// # Errors
    ///
    /// Returns [`BoundaryError`] if the record has no link, the download
    /// fails, or the file cannot be written.
    pub async fn download_boundary(
        &self,
        record: &CountryRecord,
        dest: &Path,
    ) -> Result<BoundaryDownload, BoundaryError> {
        if dest.is_file() {
            log::info!("Boundary for {} already at {}", record.iso, dest.display());
            return Ok(BoundaryDownload::Existing(dest.to_path_buf()));
        }

        let url = record
            .download_url()
            .ok_or_else(|| BoundaryError::NoDownloadUrl(record.iso.clone()))?;

        log::info!("Downloading boundary for {} from {url}", record.iso);
        let bytes = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = dest.with_extension(format!("geojson.{}.tmp", std::process::id()));
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, dest).await?;

        log::info!("Saved {} bytes to {}", bytes.len(), dest.display());
        Ok(BoundaryDownload::Downloaded(dest.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"[
        {"boundaryID": "HTI-ADM1-1", "boundaryName": "Haiti", "boundaryISO": "HTI",
         "boundaryType": "ADM1", "Continent": "Latin America and the Caribbean",
         "gjDownloadURL": "https://example.org/HTI.geojson",
         "simplifiedGeometryGeoJSON": "https://example.org/HTI_simplified.geojson"},
        {"boundaryName": "Kenya", "boundaryISO": "KEN", "Continent": "Africa",
         "gjDownloadURL": "https://example.org/KEN.geojson"},
        {"boundaryName": "Argentina", "boundaryISO": "ARG",
         "Continent": "Latin America and the Caribbean"}
    ]"#;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("storm_map_boundaries_{name}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn parses_listing_fields() {
        let records = parse_listing(LISTING).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].iso, "HTI");
        assert_eq!(records[0].continent, "Latin America and the Caribbean");
        assert_eq!(
            records[0].download_url(),
            Some("https://example.org/HTI_simplified.geojson")
        );
        assert_eq!(records[1].download_url(), Some("https://example.org/KEN.geojson"));
        assert_eq!(records[2].download_url(), None);
    }

    #[test]
    fn continents_are_unique_and_sorted() {
        let records = parse_listing(LISTING).unwrap();
        assert_eq!(
            continents(&records),
            vec!["Africa", "Latin America and the Caribbean"]
        );
    }

    #[test]
    fn creates_country_folders_once() {
        let dir = temp_dir("folders");
        let records = parse_listing(LISTING).unwrap();

        assert_eq!(ensure_country_dirs(&dir, &records).unwrap(), 3);
        assert!(dir.join("Africa").join("KEN").is_dir());
        assert_eq!(ensure_country_dirs(&dir, &records).unwrap(), 0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn existing_boundary_is_not_downloaded_again() {
        let dir = temp_dir("existing");
        std::fs::create_dir_all(&dir).unwrap();
        let dest = dir.join("boundarie.geojson");
        std::fs::write(&dest, "{}").unwrap();

        // Unroutable listing; no request may be made.
        let client = GeoBoundaries::new("http://127.0.0.1:9/").unwrap();
        let record = parse_listing(LISTING).unwrap().remove(0);
        let outcome = client.download_boundary(&record, &dest).await.unwrap();

        assert_eq!(outcome, BoundaryDownload::Existing(dest.clone()));
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "{}");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn record_without_link_is_an_error() {
        let dir = temp_dir("nolink");
        let client = GeoBoundaries::new(DEFAULT_LISTING_URL).unwrap();
        let record = parse_listing(LISTING).unwrap().remove(2);
        let err = client
            .download_boundary(&record, &dir.join("boundarie.geojson"))
            .await
            .unwrap_err();
        assert!(matches!(err, BoundaryError::NoDownloadUrl(iso) if iso == "ARG"));
    }
}
