#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! H3 grid generation.
//!
//! Converts a boundary into the set of H3 cells that intersect it at a given
//! resolution. H3 resolutions run from 0 (coarsest, ~4.3M km² cells) to 15
//! (finest, ~1 m² cells): a higher number means smaller hexagons.
//!
//! Cells are found by flood fill: every ring vertex of the dissolved
//! boundary (plus one interior point per part) seeds the search, and
//! neighbors are explored only from cells that intersect the boundary. Cells
//! straddling the edge are kept, so the result over-covers rather than
//! under-covers.
//!
//! Cells crossing the antimeridian are not split; boundaries spanning ±180°
//! produce wrapped polygons for those cells.

use std::collections::{BTreeMap, HashSet, VecDeque};

use geo::{Coord, InteriorPoint, Intersects, LineString, MultiPolygon, Polygon};
use h3o::{CellIndex, LatLng, Resolution};
use storm_map_geometry::{Boundary, GeometryError};
use storm_map_layer_models::{LayerRow, LayerTable};
use thiserror::Error;

/// Errors that can occur while generating a grid.
#[derive(Debug, Error)]
pub enum GridError {
    /// Resolution is outside H3's 0-15 range.
    #[error("Invalid H3 resolution {0} (must be 0-15)")]
    InvalidResolution(u8),

    /// Boundary could not be dissolved.
    #[error("Boundary error: {0}")]
    Boundary(#[from] GeometryError),
}

/// Parses and validates a resolution number.
///
/// # Errors
///
/// Returns [`GridError::InvalidResolution`] if `resolution > 15`.
pub fn resolution(resolution: u8) -> Result<Resolution, GridError> {
    Resolution::try_from(resolution).map_err(|_| GridError::InvalidResolution(resolution))
}

/// Builds the H3 grid covering `boundary` at `resolution`.
///
/// Returns one row per cell with its hex index and polygon (x = longitude,
/// y = latitude) and no value columns. Rows are sorted by cell index. An
/// empty boundary yields an empty table.
///
/// # Errors
///
/// Returns [`GridError::InvalidResolution`] for resolutions above 15 (checked
/// before the boundary is looked at) and [`GridError::Boundary`] if the
/// boundary cannot be dissolved.
pub fn generate_grid(boundary: &Boundary, resolution: u8) -> Result<LayerTable, GridError> {
    let res = self::resolution(resolution)?;

    let dissolved = boundary.union()?;
    if dissolved.0.is_empty() {
        log::info!("Boundary is empty, grid has no cells");
        return Ok(LayerTable::new());
    }

    let cells = covering_cells(&dissolved, res);
    log::info!(
        "Generated {} H3 cells at resolution {resolution}",
        cells.len()
    );

    let rows = cells
        .into_iter()
        .map(|(cell, polygon)| LayerRow::new(cell.to_string(), polygon))
        .collect();

    Ok(LayerTable::from_rows(rows))
}

/// Flood-fills the cells intersecting `area`.
fn covering_cells(area: &MultiPolygon<f64>, res: Resolution) -> BTreeMap<CellIndex, Polygon<f64>> {
    let mut visited: HashSet<CellIndex> = HashSet::new();
    let mut queue: VecDeque<CellIndex> = VecDeque::new();

    for seed in seed_cells(area, res) {
        if visited.insert(seed) {
            queue.push_back(seed);
        }
    }

    let mut covering = BTreeMap::new();

    while let Some(cell) = queue.pop_front() {
        let polygon = cell_polygon(cell);
        if !polygon.intersects(area) {
            continue;
        }

        let neighbors: Vec<CellIndex> = cell.grid_disk(1);
        for neighbor in neighbors {
            if visited.insert(neighbor) {
                queue.push_back(neighbor);
            }
        }

        covering.insert(cell, polygon);
    }

    covering
}

/// Cells containing every ring vertex and one interior point per part.
fn seed_cells(area: &MultiPolygon<f64>, res: Resolution) -> Vec<CellIndex> {
    let mut seeds = Vec::new();

    for polygon in &area.0 {
        let rings = std::iter::once(polygon.exterior()).chain(polygon.interiors());
        for ring in rings {
            seeds.extend(ring.0.iter().filter_map(|c| coord_to_cell(*c, res)));
        }
        if let Some(point) = polygon.interior_point() {
            seeds.extend(coord_to_cell(point.0, res));
        }
    }

    seeds
}

fn coord_to_cell(coord: Coord<f64>, res: Resolution) -> Option<CellIndex> {
    LatLng::new(coord.y, coord.x).ok().map(|ll| ll.to_cell(res))
}

/// Polygon of an H3 cell in (longitude, latitude) order.
///
/// H3 reports vertices as (lat, lng); they are swapped here.
#[must_use]
pub fn cell_polygon(cell: CellIndex) -> Polygon<f64> {
    let ring: Vec<Coord<f64>> = cell
        .boundary()
        .iter()
        .map(|v| Coord {
            x: v.lng(),
            y: v.lat(),
        })
        .collect();
    Polygon::new(LineString::new(ring), Vec::new())
}
