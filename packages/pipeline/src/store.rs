//! Key-addressed artifact storage.
//!
//! The orchestrator only talks to [`ArtifactStore`]. [`FsStore`] is the
//! production backend over the data directory; [`MemoryStore`] backs
//! tests. Neither ever replaces an artifact that already exists.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use storm_map_geometry::{Boundary, GeometryError, io};
use storm_map_layer_models::{CountryKey, LayerTable};
use thiserror::Error;

use crate::artifact::{ArtifactKey, ArtifactKind};

/// Errors raised by artifact stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error (directory creation, write, link).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The artifact could not be parsed or serialized.
    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    /// The artifact does not exist.
    #[error("Artifact {0} not found")]
    NotFound(String),

    /// The artifact exists and would be overwritten.
    #[error("Artifact {0} already exists")]
    AlreadyExists(String),

    /// Boundaries are inputs and cannot be written through the store.
    #[error("Artifact {0} is read-only")]
    ReadOnly(String),

    /// The in-memory store's lock was poisoned.
    #[error("Store lock was poisoned")]
    LockPoisoned,
}

/// Storage addressed by [`ArtifactKey`].
pub trait ArtifactStore: Send + Sync {
    /// Whether the artifact is present. Presence is not validated further.
    fn exists(&self, key: &ArtifactKey) -> bool;

    /// Reads a layer table.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if absent, or a read/parse error.
    fn get(&self, key: &ArtifactKey) -> Result<LayerTable, StoreError>;

    /// Writes a layer table that does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`] if the artifact is present,
    /// [`StoreError::ReadOnly`] for boundaries, or a write error.
    fn put(&self, key: &ArtifactKey, table: &LayerTable) -> Result<(), StoreError>;

    /// Reads a country's boundary.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if absent, or a read/parse error.
    fn boundary(&self, country: &CountryKey) -> Result<Boundary, StoreError>;
}

/// Artifacts as `GeoJSON` files under a base directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    base_dir: PathBuf,
}

impl FsStore {
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Absolute path of an artifact.
    #[must_use]
    pub fn path(&self, key: &ArtifactKey) -> PathBuf {
        key.path(&self.base_dir)
    }
}

impl ArtifactStore for FsStore {
    fn exists(&self, key: &ArtifactKey) -> bool {
        self.path(key).is_file()
    }

    fn get(&self, key: &ArtifactKey) -> Result<LayerTable, StoreError> {
        let path = self.path(key);
        if !path.is_file() {
            return Err(StoreError::NotFound(key.to_string()));
        }
        Ok(io::read_layer(&path)?)
    }

    /// Writes to a unique temporary sibling, then links it into place
    /// without replacing a file that appeared in the meantime.
    fn put(&self, key: &ArtifactKey, table: &LayerTable) -> Result<(), StoreError> {
        if key.kind == ArtifactKind::Boundary {
            return Err(StoreError::ReadOnly(key.to_string()));
        }

        let path = self.path(key);
        if path.is_file() {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp_path = temp_sibling(&path);
        if let Err(e) = io::write_layer(&tmp_path, table) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        if !persist_no_clobber(&tmp_path, &path)? {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }

        log::info!("Saved {} ({} cells)", path.display(), table.len());
        Ok(())
    }

    fn boundary(&self, country: &CountryKey) -> Result<Boundary, StoreError> {
        let key = ArtifactKey::new(country.clone(), ArtifactKind::Boundary);
        let path = self.path(&key);
        if !path.is_file() {
            return Err(StoreError::NotFound(key.to_string()));
        }
        Ok(io::read_boundary(&path)?)
    }
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// `{path}.{pid}.{n}.tmp`, unique within and across processes.
fn temp_sibling(path: &Path) -> PathBuf {
    let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_extension(format!("geojson.{}.{n}.tmp", std::process::id()))
}

/// Moves `tmp` to `dest` unless `dest` already exists.
///
/// Returns `false` if `dest` was taken. `tmp` is removed either way.
fn persist_no_clobber(tmp: &Path, dest: &Path) -> std::io::Result<bool> {
    let linked = std::fs::hard_link(tmp, dest);
    let removed = std::fs::remove_file(tmp);
    match linked {
        Ok(()) => removed.map(|()| true),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e),
    }
}

/// In-memory store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    boundaries: Mutex<BTreeMap<CountryKey, Boundary>>,
    tables: Mutex<BTreeMap<ArtifactKey, LayerTable>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a boundary input.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LockPoisoned`] if the lock was poisoned.
    pub fn insert_boundary(&self, country: CountryKey, boundary: Boundary) -> Result<(), StoreError> {
        self.boundaries
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?
            .insert(country, boundary);
        Ok(())
    }

    /// Keys of every stored table.
    #[must_use]
    pub fn keys(&self) -> Vec<ArtifactKey> {
        self.tables
            .lock()
            .map(|tables| tables.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl ArtifactStore for MemoryStore {
    fn exists(&self, key: &ArtifactKey) -> bool {
        if key.kind == ArtifactKind::Boundary {
            return self
                .boundaries
                .lock()
                .is_ok_and(|b| b.contains_key(&key.country));
        }
        self.tables.lock().is_ok_and(|t| t.contains_key(key))
    }

    fn get(&self, key: &ArtifactKey) -> Result<LayerTable, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn put(&self, key: &ArtifactKey, table: &LayerTable) -> Result<(), StoreError> {
        if key.kind == ArtifactKind::Boundary {
            return Err(StoreError::ReadOnly(key.to_string()));
        }
        let mut tables = self.tables.lock().map_err(|_| StoreError::LockPoisoned)?;
        if tables.contains_key(key) {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }
        tables.insert(key.clone(), table.clone());
        Ok(())
    }

    fn boundary(&self, country: &CountryKey) -> Result<Boundary, StoreError> {
        self.boundaries
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?
            .get(country)
            .cloned()
            .ok_or_else(|| {
                StoreError::NotFound(ArtifactKey::new(country.clone(), ArtifactKind::Boundary).to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use storm_map_layer_models::LayerRow;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("storm_map_store_{name}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn country() -> CountryKey {
        CountryKey::new("Africa", "KEN")
    }

    fn table() -> LayerTable {
        let mut row = LayerRow::new(
            "8a2a1072b59ffff".to_string(),
            polygon![(x: 36.0, y: -1.0), (x: 36.1, y: -1.0), (x: 36.1, y: -0.9), (x: 36.0, y: -0.9)],
        );
        row.set("Likely: Temperature", 24.5);
        let mut table = LayerTable::from_rows(vec![row]);
        table.add_column("Likely: Temperature");
        table
    }

    #[test]
    fn fs_store_writes_and_reads_back() {
        let dir = temp_dir("roundtrip");
        let store = FsStore::new(&dir);
        let key = ArtifactKey::new(country(), ArtifactKind::Hazard);

        assert!(!store.exists(&key));
        store.put(&key, &table()).unwrap();
        assert!(store.exists(&key));
        assert!(dir.join("Africa/KEN/hazard.geojson").is_file());

        let read = store.get(&key).unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read.rows[0].get("Likely: Temperature"), Some(24.5));

        // No temporary files are left behind.
        let leftovers = std::fs::read_dir(dir.join("Africa/KEN"))
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn fs_store_never_overwrites() {
        let dir = temp_dir("overwrite");
        let store = FsStore::new(&dir);
        let key = ArtifactKey::new(country(), ArtifactKind::Population);
        let path = store.path(&key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "precious").unwrap();

        let err = store.put(&key, &table()).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "precious");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn persist_keeps_a_file_that_appeared_after_the_check() {
        let dir = temp_dir("race");
        std::fs::create_dir_all(&dir).unwrap();
        let dest = dir.join("hazard.geojson");
        let tmp = temp_sibling(&dest);
        std::fs::write(&tmp, "new").unwrap();
        std::fs::write(&dest, "first writer").unwrap();

        assert!(!persist_no_clobber(&tmp, &dest).unwrap());
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "first writer");
        assert!(!tmp.exists());

        let other = dir.join("population.geojson");
        let tmp = temp_sibling(&other);
        std::fs::write(&tmp, "fresh").unwrap();
        assert!(persist_no_clobber(&tmp, &other).unwrap());
        assert_eq!(std::fs::read_to_string(&other).unwrap(), "fresh");
        assert!(!tmp.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn temp_names_are_unique_within_a_process() {
        let dest = Path::new("Africa/KEN/hazard.geojson");
        assert_ne!(temp_sibling(dest), temp_sibling(dest));
    }

    #[test]
    fn fs_store_reads_boundary_input() {
        let dir = temp_dir("boundary");
        let store = FsStore::new(&dir);
        let key = ArtifactKey::new(country(), ArtifactKind::Boundary);

        assert!(!store.exists(&key));
        assert!(matches!(store.boundary(&country()), Err(StoreError::NotFound(_))));

        let path = store.path(&key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            r#"{"type": "Feature", "properties": {"shapeISO": "KEN"},
                "geometry": {"type": "Polygon", "coordinates": [[[36, -1], [37, -1], [37, 0], [36, 0], [36, -1]]]}}"#,
        )
        .unwrap();

        assert!(store.exists(&key));
        let boundary = store.boundary(&country()).unwrap();
        assert_eq!(boundary.parts().len(), 1);
        assert!(matches!(store.put(&key, &table()), Err(StoreError::ReadOnly(_))));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn memory_store_behaves_like_fs_store() {
        let store = MemoryStore::new();
        let key = ArtifactKey::new(country(), ArtifactKind::Grid { resolution: 4 });

        assert!(matches!(store.get(&key), Err(StoreError::NotFound(_))));
        store.put(&key, &table()).unwrap();
        assert!(store.exists(&key));
        assert!(matches!(store.put(&key, &table()), Err(StoreError::AlreadyExists(_))));
        assert_eq!(store.get(&key).unwrap(), table());

        let boundary_key = ArtifactKey::new(country(), ArtifactKind::Boundary);
        assert!(!store.exists(&boundary_key));
        store.insert_boundary(country(), Boundary::default()).unwrap();
        assert!(store.exists(&boundary_key));
        assert_eq!(store.keys(), vec![key]);
    }
}
