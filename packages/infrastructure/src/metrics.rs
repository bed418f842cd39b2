//! Per-cell joins, densities, distances and road overlay.

use geo::{
    BooleanOps, BoundingRect, Centroid, Contains, LineString, MultiLineString, Point, Polygon, Rect,
};
use rstar::{AABB, RTree, RTreeObject};
use storm_map_geometry::planar::{Planar, length_km, per_km2};
use storm_map_layer_models::LayerTable;
use storm_map_layer_models::fields::{
    CELL_AREA_KM2, HOSPITAL_CAPACITY, HOSPITAL_COUNT, HOSPITAL_DENSITY, HOSPITAL_DISTANCE,
    INFRASTRUCTURE_EXPORT_FIELDS, MAIN_ROAD_DISTANCE, ROAD_DENSITY, ROAD_LENGTH_KM,
    SCHOOL_CAPACITY, SCHOOL_COUNT, SCHOOL_DENSITY, SCHOOL_DISTANCE,
};

use crate::{InfrastructureError, InfrastructureInputs, PointFeature, RoadSegment};

/// Kilometers per degree used for nearest-neighbor distances.
const KM_PER_DEGREE: f64 = 111.0;

/// Target number of sampled vertices per road line.
const ROAD_SAMPLES_PER_LINE: usize = 10;

/// Column names for one point layer.
struct PointColumns {
    count: &'static str,
    capacity: &'static str,
    density: &'static str,
    distance: &'static str,
}

const SCHOOLS: PointColumns = PointColumns {
    count: SCHOOL_COUNT,
    capacity: SCHOOL_CAPACITY,
    density: SCHOOL_DENSITY,
    distance: SCHOOL_DISTANCE,
};

const HOSPITALS: PointColumns = PointColumns {
    count: HOSPITAL_COUNT,
    capacity: HOSPITAL_CAPACITY,
    density: HOSPITAL_DENSITY,
    distance: HOSPITAL_DISTANCE,
};

/// A grid cell stored in the R-tree by row index.
struct CellEntry {
    row: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for CellEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// A projected road line stored in the R-tree.
struct RoadEntry {
    line: LineString<f64>,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for RoadEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

fn envelope_of<G>(geometry: &G) -> Option<AABB<[f64; 2]>>
where
    G: BoundingRect<f64, Output = Option<Rect<f64>>>,
{
    let rect = geometry.bounding_rect()?;
    Some(AABB::from_corners(
        [rect.min().x, rect.min().y],
        [rect.max().x, rect.max().y],
    ))
}

/// Computes every infrastructure indicator for a grid.
///
/// The result has the grid's cells and geometry plus counts, capacities,
/// area, densities, distances, road length and road density. Counts,
/// capacities, road length and densities default to 0. Distances are unset
/// when the corresponding layer has no features.
///
/// # Errors
///
/// Returns [`InfrastructureError::Geometry`] if a cell or road cannot be
/// projected.
pub fn compute_infra_metrics(
    grid: &LayerTable,
    inputs: &InfrastructureInputs,
) -> Result<LayerTable, InfrastructureError> {
    let planar = Planar::mercator()?;
    let mut table = grid.cells_only();

    for column in [
        SCHOOL_COUNT,
        SCHOOL_CAPACITY,
        HOSPITAL_COUNT,
        HOSPITAL_CAPACITY,
        CELL_AREA_KM2,
        SCHOOL_DENSITY,
        HOSPITAL_DENSITY,
        SCHOOL_DISTANCE,
        HOSPITAL_DISTANCE,
        ROAD_LENGTH_KM,
        ROAD_DENSITY,
        MAIN_ROAD_DISTANCE,
    ] {
        table.add_column(column);
    }

    if table.is_empty() {
        return Ok(table);
    }

    let areas: Vec<f64> = table
        .rows
        .iter()
        .map(|row| planar.area_km2(&row.geometry))
        .collect::<Result<_, _>>()?;
    let centroids: Vec<Option<Point<f64>>> = table.rows.iter().map(|r| r.geometry.centroid()).collect();

    let cells = RTree::bulk_load(
        table
            .rows
            .iter()
            .enumerate()
            .filter_map(|(row, r)| envelope_of(&r.geometry).map(|envelope| CellEntry { row, envelope }))
            .collect(),
    );

    for (layer, columns) in [(&inputs.schools, &SCHOOLS), (&inputs.hospitals, &HOSPITALS)] {
        let (counts, capacities) = join_points(&table, &cells, layer);
        let nearest = PointIndex::new(layer.iter().map(|p| p.point));

        for (i, row) in table.rows.iter_mut().enumerate() {
            row.set(columns.count, counts[i]);
            row.set(columns.capacity, capacities[i]);
            row.set(columns.density, per_km2(counts[i], areas[i]));
            if let Some(km) = centroids[i].and_then(|c| nearest.distance_km(c)) {
                row.set(columns.distance, km);
            }
        }
    }

    let lengths = road_lengths(&table, &planar, &inputs.roads)?;
    let road_vertices = PointIndex::new(inputs.roads.iter().flat_map(|r| sample_vertices(&r.line)));

    for (i, row) in table.rows.iter_mut().enumerate() {
        row.set(CELL_AREA_KM2, areas[i]);
        row.set(ROAD_LENGTH_KM, lengths[i]);
        row.set(ROAD_DENSITY, per_km2(lengths[i], areas[i]));
        if let Some(km) = centroids[i].and_then(|c| road_vertices.distance_km(c)) {
            row.set(MAIN_ROAD_DISTANCE, km);
        }
    }

    log::info!(
        "Computed infrastructure metrics for {} cells ({} schools, {} hospitals, {} roads)",
        table.len(),
        inputs.schools.len(),
        inputs.hospitals.len(),
        inputs.roads.len()
    );

    Ok(table)
}

/// Keeps only the exported columns.
#[must_use]
pub fn curated(table: &LayerTable) -> LayerTable {
    table.select(&INFRASTRUCTURE_EXPORT_FIELDS)
}

/// Count and capacity of points strictly inside each row's cell.
///
/// Points on a cell edge are not within either neighbor and are not
/// counted; a point is counted in at most one cell.
fn join_points(table: &LayerTable, cells: &RTree<CellEntry>, points: &[PointFeature]) -> (Vec<f64>, Vec<f64>) {
    let mut counts = vec![0.0; table.len()];
    let mut capacities = vec![0.0; table.len()];

    for feature in points {
        let query = AABB::from_point([feature.point.x(), feature.point.y()]);
        let hit = cells
            .locate_in_envelope_intersecting(&query)
            .find(|entry| table.rows[entry.row].geometry.contains(&feature.point));
        if let Some(entry) = hit {
            counts[entry.row] += 1.0;
            capacities[entry.row] += feature.capacity;
        }
    }

    (counts, capacities)
}

/// Road length in km inside each row's cell, by planar clipping.
fn road_lengths(
    table: &LayerTable,
    planar: &Planar,
    roads: &[RoadSegment],
) -> Result<Vec<f64>, InfrastructureError> {
    if roads.is_empty() {
        return Ok(vec![0.0; table.len()]);
    }

    let mut entries = Vec::with_capacity(roads.len());
    for road in roads {
        let line = planar.line(&road.line)?;
        if let Some(envelope) = envelope_of(&line) {
            entries.push(RoadEntry { line, envelope });
        }
    }
    let index = RTree::bulk_load(entries);

    table
        .rows
        .iter()
        .map(|row| -> Result<f64, InfrastructureError> {
            let cell: Polygon<f64> = planar.polygon(&row.geometry)?;
            let Some(envelope) = envelope_of(&cell) else {
                return Ok(0.0);
            };
            let candidates: Vec<LineString<f64>> = index
                .locate_in_envelope_intersecting(&envelope)
                .map(|entry| entry.line.clone())
                .collect();
            if candidates.is_empty() {
                return Ok(0.0);
            }
            let inside = cell.clip(&MultiLineString::new(candidates), false);
            Ok(length_km(&inside))
        })
        .collect()
}

/// Every `max(1, n / 10)`-th vertex of a line, starting with the first.
fn sample_vertices(line: &LineString<f64>) -> impl Iterator<Item = Point<f64>> + '_ {
    let stride = (line.0.len() / ROAD_SAMPLES_PER_LINE).max(1);
    line.0.iter().step_by(stride).map(|c| Point::from(*c))
}

/// Nearest-point lookup in degree space.
struct PointIndex {
    tree: RTree<[f64; 2]>,
}

impl PointIndex {
    fn new(points: impl Iterator<Item = Point<f64>>) -> Self {
        Self {
            tree: RTree::bulk_load(points.map(|p| [p.x(), p.y()]).collect()),
        }
    }

    /// Distance to the nearest point, degrees × 111 km. `None` when empty.
    fn distance_km(&self, from: Point<f64>) -> Option<f64> {
        let query = [from.x(), from.y()];
        self.tree.nearest_neighbor(&query).map(|nearest| {
            let dx = nearest[0] - query[0];
            let dy = nearest[1] - query[1];
            dx.hypot(dy) * KM_PER_DEGREE
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, polygon};
    use storm_map_layer_models::LayerRow;

    fn square(id: &str, x0: f64, y0: f64, size: f64) -> LayerRow {
        LayerRow::new(
            id.to_string(),
            polygon![
                (x: x0, y: y0),
                (x: x0 + size, y: y0),
                (x: x0 + size, y: y0 + size),
                (x: x0, y: y0 + size),
            ],
        )
    }

    /// Two 0.01° cells side by side at the equator, sharing the edge x = 0.01.
    fn grid() -> LayerTable {
        LayerTable::from_rows(vec![square("west", 0.0, 0.0, 0.01), square("east", 0.01, 0.0, 0.01)])
    }

    fn school(x: f64, y: f64, capacity: f64) -> PointFeature {
        PointFeature {
            point: Point::new(x, y),
            capacity,
        }
    }

    #[test]
    fn empty_inputs_default_to_zero() {
        let table = compute_infra_metrics(&grid(), &InfrastructureInputs::default()).unwrap();
        for row in &table.rows {
            assert_eq!(row.get(SCHOOL_COUNT), Some(0.0));
            assert_eq!(row.get(SCHOOL_CAPACITY), Some(0.0));
            assert_eq!(row.get(SCHOOL_DENSITY), Some(0.0));
            assert_eq!(row.get(HOSPITAL_COUNT), Some(0.0));
            assert_eq!(row.get(ROAD_LENGTH_KM), Some(0.0));
            assert_eq!(row.get(ROAD_DENSITY), Some(0.0));
            assert!(row.get(CELL_AREA_KM2).unwrap() > 1.0);
            assert_eq!(row.get(SCHOOL_DISTANCE), None);
            assert_eq!(row.get(MAIN_ROAD_DISTANCE), None);
        }
    }

    #[test]
    fn counts_and_capacity_are_joined() {
        let inputs = InfrastructureInputs {
            schools: vec![school(0.002, 0.005, 100.0), school(0.004, 0.005, 50.0), school(0.015, 0.005, 0.0)],
            ..InfrastructureInputs::default()
        };
        let table = compute_infra_metrics(&grid(), &inputs).unwrap();

        let west = table.row("west").unwrap();
        assert_eq!(west.get(SCHOOL_COUNT), Some(2.0));
        assert_eq!(west.get(SCHOOL_CAPACITY), Some(150.0));
        let area = west.get(CELL_AREA_KM2).unwrap();
        assert!((west.get(SCHOOL_DENSITY).unwrap() - 2.0 / area).abs() < 1e-12);

        let east = table.row("east").unwrap();
        assert_eq!(east.get(SCHOOL_COUNT), Some(1.0));
    }

    #[test]
    fn point_on_shared_edge_is_counted_at_most_once() {
        let inputs = InfrastructureInputs {
            schools: vec![school(0.01, 0.005, 10.0)],
            ..InfrastructureInputs::default()
        };
        let table = compute_infra_metrics(&grid(), &inputs).unwrap();
        let total: f64 = table.column(SCHOOL_COUNT).into_iter().flatten().sum();
        assert!(total <= 1.0);
    }

    #[test]
    fn nearest_distance_uses_degree_conversion() {
        // West centroid is (0.005, 0.005); the hospital is 0.003° north of it.
        let inputs = InfrastructureInputs {
            hospitals: vec![school(0.005, 0.008, 0.0)],
            ..InfrastructureInputs::default()
        };
        let table = compute_infra_metrics(&grid(), &inputs).unwrap();
        let distance = table.row("west").unwrap().get(HOSPITAL_DISTANCE).unwrap();
        assert!((distance - 0.003 * 111.0).abs() < 1e-9, "distance = {distance}");
    }

    #[test]
    fn road_length_is_clipped_per_cell() {
        // Runs through the middle of the west cell only, and beyond it to the west.
        let inputs = InfrastructureInputs {
            roads: vec![RoadSegment {
                line: line_string![(x: -0.01, y: 0.005), (x: 0.0075, y: 0.005)],
                class: Some("primary".to_string()),
            }],
            ..InfrastructureInputs::default()
        };
        let table = compute_infra_metrics(&grid(), &inputs).unwrap();

        let west = table.row("west").unwrap();
        let length = west.get(ROAD_LENGTH_KM).unwrap();
        // 0.0075° of longitude at the equator in Mercator meters.
        let expected = 0.0075 * 6_378_137.0_f64 * std::f64::consts::PI / 180.0 / 1000.0;
        assert!((length - expected).abs() < 1e-3, "length = {length}");
        assert!(west.get(ROAD_DENSITY).unwrap() > 0.0);

        let east = table.row("east").unwrap();
        assert_eq!(east.get(ROAD_LENGTH_KM), Some(0.0));
        assert!(east.get(MAIN_ROAD_DISTANCE).is_some());
    }

    #[test]
    fn samples_every_tenth_vertex() {
        let line = LineString::from((0..25).map(|i| (f64::from(i), 0.0)).collect::<Vec<_>>());
        let xs: Vec<f64> = sample_vertices(&line).map(|p| p.x()).collect();
        assert_eq!(xs, vec![0.0, 2.0, 4.0, 6.0, 8.0, 10.0, 12.0, 14.0, 16.0, 18.0, 20.0, 22.0, 24.0]);

        let short = line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)];
        assert_eq!(sample_vertices(&short).count(), 2);
    }

    #[test]
    fn curated_keeps_export_columns() {
        let table = compute_infra_metrics(&grid(), &InfrastructureInputs::default()).unwrap();
        let curated = curated(&table);
        assert_eq!(curated.columns, INFRASTRUCTURE_EXPORT_FIELDS.to_vec());
        assert!(curated.rows[0].get(SCHOOL_COUNT).is_none());
        assert_eq!(curated.len(), 2);
    }

    #[test]
    fn empty_grid_gives_empty_table() {
        let table = compute_infra_metrics(&LayerTable::new(), &InfrastructureInputs::default()).unwrap();
        assert!(table.is_empty());
        assert!(table.has_column(ROAD_DENSITY));
    }
}
