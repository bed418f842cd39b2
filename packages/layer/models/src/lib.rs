#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Layer attribute tables and shared definitions for the storm map pipeline.
//!
//! Every pipeline stage consumes and produces a [`LayerTable`]: one row per
//! H3 grid cell, carrying the cell polygon plus a set of named numeric
//! fields. Tables are persisted as standalone `GeoJSON` files and later
//! stages read them back by key, never by in-memory handoff.

pub mod fields;
pub mod progress;

use std::collections::BTreeMap;
use std::fmt;

use geo::{BoundingRect, Coord, Polygon, Rect};
use serde::{Deserialize, Serialize};

/// Identifies a country inside the data directory layout
/// (`{base_dir}/{continent}/{iso}`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CountryKey {
    /// Continent folder name (e.g. "Latin America and the Caribbean").
    pub continent: String,
    /// ISO 3166-1 alpha-3 code (e.g. "HTI").
    pub iso: String,
}

impl CountryKey {
    /// Creates a key, upper-casing the ISO code.
    #[must_use]
    pub fn new(continent: impl Into<String>, iso: impl Into<String>) -> Self {
        Self {
            continent: continent.into(),
            iso: iso.into().to_ascii_uppercase(),
        }
    }
}

impl fmt::Display for CountryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.continent, self.iso)
    }
}

/// One grid cell with its geometry and derived values.
///
/// A field missing from `values` is "unset" and is written as `null`. Stages
/// that follow the zero-default policy always insert a value.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerRow {
    /// H3 cell index as a hex string.
    pub cell_id: String,
    /// Cell polygon in EPSG:4326 (x = longitude, y = latitude).
    pub geometry: Polygon<f64>,
    /// Named numeric fields.
    pub values: BTreeMap<String, f64>,
}

impl LayerRow {
    /// Creates a row with no values.
    #[must_use]
    pub const fn new(cell_id: String, geometry: Polygon<f64>) -> Self {
        Self {
            cell_id,
            geometry,
            values: BTreeMap::new(),
        }
    }

    /// Returns a field value, or `None` when it is unset.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<f64> {
        self.values.get(field).copied()
    }

    /// Sets a field value.
    pub fn set(&mut self, field: &str, value: f64) {
        self.values.insert(field.to_string(), value);
    }
}

/// An ordered set of columns plus one row per grid cell.
///
/// `columns` is the schema used when writing: every listed column is
/// emitted for every row (as `null` when unset), in this order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerTable {
    /// Value column names, excluding the cell id and geometry.
    pub columns: Vec<String>,
    /// One row per grid cell.
    pub rows: Vec<LayerRow>,
}

impl LayerTable {
    /// Creates an empty table with no value columns.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Creates a table from rows, with no value columns.
    #[must_use]
    pub const fn from_rows(rows: Vec<LayerRow>) -> Self {
        Self {
            columns: Vec::new(),
            rows,
        }
    }

    /// Number of rows (grid cells).
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Registers a value column if not already present.
    pub fn add_column(&mut self, name: &str) {
        if !self.has_column(name) {
            self.columns.push(name.to_string());
        }
    }

    /// Whether `name` is a registered column.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Finds a row by cell id.
    #[must_use]
    pub fn row(&self, cell_id: &str) -> Option<&LayerRow> {
        self.rows.iter().find(|r| r.cell_id == cell_id)
    }

    /// Collects a column as a vector, one entry per row.
    #[must_use]
    pub fn column(&self, name: &str) -> Vec<Option<f64>> {
        self.rows.iter().map(|r| r.get(name)).collect()
    }

    /// Bounding box of every cell polygon, `None` for an empty table.
    #[must_use]
    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.rows
            .iter()
            .filter_map(|r| r.geometry.bounding_rect())
            .reduce(|a, b| {
                Rect::new(
                    Coord {
                        x: a.min().x.min(b.min().x),
                        y: a.min().y.min(b.min().y),
                    },
                    Coord {
                        x: a.max().x.max(b.max().x),
                        y: a.max().y.max(b.max().y),
                    },
                )
            })
    }

    /// Returns a copy keeping only the given columns, in the given order.
    ///
    /// Cell ids and geometry are always kept. Values of dropped columns are
    /// removed from every row.
    #[must_use]
    pub fn select(&self, columns: &[&str]) -> Self {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let values = columns
                    .iter()
                    .filter_map(|&c| row.get(c).map(|v| (c.to_string(), v)))
                    .collect();
                LayerRow {
                    cell_id: row.cell_id.clone(),
                    geometry: row.geometry.clone(),
                    values,
                }
            })
            .collect();

        Self {
            columns: columns.iter().map(ToString::to_string).collect(),
            rows,
        }
    }

    /// Returns a copy with all value columns removed, leaving only cell ids
    /// and geometry.
    #[must_use]
    pub fn cells_only(&self) -> Self {
        self.select(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn unit_square() -> Polygon<f64> {
        polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)]
    }

    #[test]
    fn country_key_uppercases_iso() {
        let key = CountryKey::new("Africa", "ken");
        assert_eq!(key.iso, "KEN");
        assert_eq!(key.to_string(), "Africa/KEN");
    }

    #[test]
    fn add_column_is_idempotent() {
        let mut table = LayerTable::new();
        table.add_column("a");
        table.add_column("a");
        table.add_column("b");
        assert_eq!(table.columns, vec!["a", "b"]);
        assert!(table.has_column("b"));
        assert!(!table.has_column("c"));
    }

    #[test]
    fn bounds_cover_every_cell() {
        let shifted = polygon![(x: 2.0, y: -1.0), (x: 3.0, y: -1.0), (x: 3.0, y: 0.5), (x: 2.0, y: 0.5)];
        let table = LayerTable::from_rows(vec![
            LayerRow::new("a".to_string(), unit_square()),
            LayerRow::new("b".to_string(), shifted),
        ]);

        let bounds = table.bounds().unwrap();
        assert_eq!(bounds.min(), Coord { x: 0.0, y: -1.0 });
        assert_eq!(bounds.max(), Coord { x: 3.0, y: 1.0 });
        assert!(LayerTable::new().bounds().is_none());
    }

    #[test]
    fn select_drops_other_values() {
        let mut row = LayerRow::new("8a".to_string(), unit_square());
        row.set("keep", 1.0);
        row.set("drop", 2.0);
        let mut table = LayerTable::from_rows(vec![row]);
        table.add_column("keep");
        table.add_column("drop");

        let selected = table.select(&["keep"]);
        assert_eq!(selected.columns, vec!["keep"]);
        assert_eq!(selected.rows[0].get("keep"), Some(1.0));
        assert_eq!(selected.rows[0].get("drop"), None);
        assert_eq!(selected.rows[0].cell_id, "8a");
    }

    #[test]
    fn unset_fields_read_as_none() {
        let row = LayerRow::new("8b".to_string(), unit_square());
        let table = LayerTable::from_rows(vec![row]);
        assert_eq!(table.column("missing"), vec![None]);
        assert!(table.row("8b").is_some());
        assert!(table.row("nope").is_none());
    }
}
