//! Per-cell child population densities, min-max normalized.

use storm_map_geometry::planar::{Planar, per_km2};
use storm_map_layer_models::LayerTable;
use storm_map_layer_models::fields::POPULATION_FIELDS;

use crate::{AgeProportions, DemographicTable, PopulationError, ZonalSource};

/// Builds the population layer for a grid.
///
/// The demographic lookup happens first, so a missing (iso, year) row fails
/// before any raster work. Output rows keep the grid's cells and geometry
/// and carry only the three normalized density columns.
///
/// # Errors
///
/// Returns [`PopulationError::MissingDemographics`] if the table has no row
/// for `iso`/`year`, and [`PopulationError::Geometry`] if a cell cannot be
/// projected for its area.
pub fn standardize_child_population(
    grid: &LayerTable,
    demographics: &DemographicTable,
    raster: &dyn ZonalSource,
    iso: &str,
    year: u16,
) -> Result<LayerTable, PopulationError> {
    let proportions = demographics.proportions(iso, year)?;
    log::info!(
        "Age shares for {iso} {year}: <5 {:.4}, <10 {:.4}, <15 {:.4}",
        proportions.under_5,
        proportions.under_10,
        proportions.under_15
    );

    let planar = Planar::mercator()?;
    densify(grid, proportions, raster, &planar)
}

/// Same as [`standardize_child_population`] with proportions already
/// resolved.
///
/// # Errors
///
/// Returns [`PopulationError::Geometry`] if a cell cannot be projected.
pub fn densify(
    grid: &LayerTable,
    proportions: AgeProportions,
    raster: &dyn ZonalSource,
    planar: &Planar,
) -> Result<LayerTable, PopulationError> {
    let shares = proportions.as_array();

    // One column per age group, one entry per row.
    let mut densities: [Vec<f64>; 3] = Default::default();
    for row in &grid.rows {
        let total = raster.zonal_sum(&row.geometry);
        let area = planar.area_km2(&row.geometry)?;
        for (column, share) in densities.iter_mut().zip(shares) {
            column.push(per_km2(total * share, area));
        }
    }

    let mut table = grid.cells_only();
    for field in POPULATION_FIELDS {
        table.add_column(field);
    }

    for (field, column) in POPULATION_FIELDS.iter().zip(&densities) {
        let normalized = min_max_normalize(column);
        for (row, value) in table.rows.iter_mut().zip(normalized) {
            row.set(field, value);
        }
    }

    log::info!("Computed child densities for {} cells", table.len());
    Ok(table)
}

/// Rescales values to `[0, 1]`: the minimum maps to 0 and the maximum to 1.
/// When every value is equal the result is all zeros.
#[must_use]
pub fn min_max_normalize(values: &[f64]) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    if !(range > 0.0 && range.is_finite()) {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - min) / range).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{BoundingRect, Polygon, polygon};
    use storm_map_layer_models::LayerRow;
    use storm_map_layer_models::fields::{DENSITY_U5_NORMALIZED, DENSITY_U15_NORMALIZED};

    /// Returns 10 × (index of the cell), where cells are laid out one
    /// longitude step apart starting at 0.
    struct StepRaster {
        step: f64,
    }

    impl ZonalSource for StepRaster {
        fn zonal_sum(&self, polygon: &Polygon<f64>) -> f64 {
            let min_x = polygon.bounding_rect().map_or(0.0, |r| r.min().x);
            10.0 * (min_x / self.step).round()
        }
    }

    /// Four equal cells along the equator, roughly 1 km × 1 km.
    fn grid() -> (LayerTable, f64) {
        let step = 1.0 / 111.319_49;
        let rows = (0..4)
            .map(|i| {
                let x0 = f64::from(i) * step;
                LayerRow::new(
                    format!("cell{i}"),
                    polygon![(x: x0, y: 0.0), (x: x0 + step, y: 0.0), (x: x0 + step, y: step), (x: x0, y: step)],
                )
            })
            .collect();
        (LayerTable::from_rows(rows), step)
    }

    fn proportions() -> AgeProportions {
        AgeProportions {
            under_5: 0.12,
            under_10: 0.23,
            under_15: 0.33,
        }
    }

    #[test]
    fn scenario_sums_normalize_to_thirds() {
        let (grid, step) = grid();
        let planar = Planar::mercator().unwrap();
        let table = densify(&grid, proportions(), &StepRaster { step }, &planar).unwrap();

        assert_eq!(table.columns, POPULATION_FIELDS.to_vec());
        let expected = [0.0, 1.0 / 3.0, 2.0 / 3.0, 1.0];
        for field in POPULATION_FIELDS {
            for (value, want) in table.column(field).into_iter().zip(expected) {
                let value = value.unwrap();
                assert!((value - want).abs() < 1e-9, "{field}: {value} != {want}");
            }
        }
    }

    #[test]
    fn output_has_only_normalized_columns() {
        let (mut grid, step) = grid();
        grid.add_column("pop_total");
        for row in &mut grid.rows {
            row.set("pop_total", 5.0);
        }
        let planar = Planar::mercator().unwrap();
        let table = densify(&grid, proportions(), &StepRaster { step }, &planar).unwrap();
        for row in &table.rows {
            assert_eq!(row.values.len(), 3);
            assert!(row.get("pop_total").is_none());
        }
    }

    #[test]
    fn uniform_population_normalizes_to_zero() {
        struct Flat;
        impl ZonalSource for Flat {
            fn zonal_sum(&self, _polygon: &Polygon<f64>) -> f64 {
                42.0
            }
        }
        let (grid, _) = grid();
        let planar = Planar::mercator().unwrap();
        let table = densify(&grid, proportions(), &Flat, &planar).unwrap();
        assert!(table
            .column(DENSITY_U5_NORMALIZED)
            .into_iter()
            .all(|v| v == Some(0.0)));
    }

    #[test]
    fn normalization_bounds() {
        let values = [3.5, -1.0, 7.25, 0.0, 7.25];
        let normalized = min_max_normalize(&values);
        assert!(normalized.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!((normalized[1]).abs() < f64::EPSILON);
        assert!((normalized[2] - 1.0).abs() < f64::EPSILON);
        assert!(min_max_normalize(&[]).is_empty());
        assert_eq!(min_max_normalize(&[2.0, 2.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn missing_demographics_fail_before_sampling() {
        let table = DemographicTable::default();
        let (grid, step) = grid();
        let err = standardize_child_population(&grid, &table, &StepRaster { step }, "HTI", 2020)
            .unwrap_err();
        assert!(matches!(err, PopulationError::MissingDemographics { .. }));
    }

    #[test]
    fn empty_grid_gives_empty_table_with_columns() {
        let planar = Planar::mercator().unwrap();
        let table = densify(&LayerTable::new(), proportions(), &StepRaster { step: 1.0 }, &planar)
            .unwrap();
        assert!(table.is_empty());
        assert!(table.has_column(DENSITY_U15_NORMALIZED));
    }
}
