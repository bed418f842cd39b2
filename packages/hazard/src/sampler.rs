//! Concurrent per-cell forecast sampling.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::StreamExt as _;
use futures::stream;
use geo::Centroid;
use storm_map_layer_models::LayerTable;
use storm_map_layer_models::fields::hazard_fields;
use storm_map_layer_models::progress::ProgressCallback;

use crate::{ForecastSource, HazardBands, HazardError};

/// Samples the forecast at every cell centroid.
///
/// At most `concurrency` requests are in flight. Each cell succeeds or
/// fails on its own; the map holds one entry per row of `grid`.
pub async fn sample_cells(
    grid: &LayerTable,
    source: &dyn ForecastSource,
    concurrency: usize,
    progress: Arc<dyn ProgressCallback>,
) -> BTreeMap<String, Result<HazardBands, HazardError>> {
    progress.set_total(grid.len() as u64);

    let requests: Vec<_> = grid
        .rows
        .iter()
        .map(|row| {
            let progress = Arc::clone(&progress);
            async move {
                let result = match row.geometry.centroid() {
                    Some(center) => source
                        .hourly(center.y(), center.x())
                        .await
                        .and_then(|series| HazardBands::from_series(&series)),
                    None => Err(HazardError::NoCentroid {
                        cell_id: row.cell_id.clone(),
                    }),
                };
                progress.inc(1);
                (row.cell_id.clone(), result)
            }
        })
        .collect();

    let results: Vec<(String, Result<HazardBands, HazardError>)> = stream::iter(requests)
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    results.into_iter().collect()
}

/// Builds the hazard layer for a grid.
///
/// The output has the grid's cells and geometry plus the nine
/// `"{scenario}: {variable}"` columns. Cells whose forecast failed keep
/// those columns unset.
pub async fn sample_hazards(
    grid: &LayerTable,
    source: &dyn ForecastSource,
    concurrency: usize,
    progress: Arc<dyn ProgressCallback>,
) -> LayerTable {
    let mut table = grid.cells_only();
    for field in hazard_fields() {
        table.add_column(&field);
    }

    if table.is_empty() {
        return table;
    }

    log::info!(
        "Sampling forecasts for {} cells (concurrency={concurrency})...",
        table.len()
    );

    let mut results = sample_cells(grid, source, concurrency, Arc::clone(&progress)).await;

    let mut failed = 0_usize;
    for row in &mut table.rows {
        match results.remove(&row.cell_id) {
            Some(Ok(bands)) => bands.write_to(row),
            Some(Err(e)) => {
                failed += 1;
                log::warn!("Hazard sampling failed for cell {}: {e}", row.cell_id);
            }
            None => failed += 1,
        }
    }

    if failed > 0 {
        log::warn!("{failed} of {} cells have no hazard values", table.len());
    }
    progress.finish(format!("Sampled {} cells", table.len() - failed));

    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use geo::polygon;
    use storm_map_layer_models::LayerRow;
    use storm_map_layer_models::progress::null_progress;

    use crate::HourlySeries;

    /// Returns a flat series everywhere except west of `fail_west_of`.
    struct MockSource {
        fail_west_of: f64,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ForecastSource for MockSource {
        async fn hourly(&self, _lat: f64, lng: f64) -> Result<HourlySeries, HazardError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if lng < self.fail_west_of {
                return Err(HazardError::Status { status: 503 });
            }
            Ok(HourlySeries {
                precipitation: vec![1.0; 10],
                wind_speed: vec![20.0; 3],
                temperature: vec![30.0; 3],
            })
        }
    }

    fn cell(id: &str, x0: f64) -> LayerRow {
        LayerRow::new(
            id.to_string(),
            polygon![(x: x0, y: 0.0), (x: x0 + 1.0, y: 0.0), (x: x0 + 1.0, y: 1.0), (x: x0, y: 1.0)],
        )
    }

    fn grid() -> LayerTable {
        LayerTable::from_rows(vec![cell("a", -10.0), cell("b", 0.0), cell("c", 10.0)])
    }

    #[tokio::test]
    async fn writes_all_nine_columns() {
        let source = MockSource {
            fail_west_of: -180.0,
            calls: AtomicUsize::new(0),
        };
        let table = sample_hazards(&grid(), &source, 2, null_progress()).await;

        assert_eq!(table.len(), 3);
        assert_eq!(table.columns.len(), 9);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        for row in &table.rows {
            assert_eq!(row.get("Likely: Precipitation"), Some(10.0));
            assert_eq!(row.get("Best Case: Precipitation"), Some(8.0));
            assert_eq!(row.get("Worst Case: Wind Speed"), Some(23.0));
        }
    }

    #[tokio::test]
    async fn failed_cells_are_left_unset() {
        let source = MockSource {
            fail_west_of: 0.0,
            calls: AtomicUsize::new(0),
        };
        let table = sample_hazards(&grid(), &source, 4, null_progress()).await;

        assert_eq!(table.len(), 3);
        let failed = table.row("a").unwrap();
        assert!(failed.values.is_empty());
        assert_eq!(table.row("b").unwrap().values.len(), 9);
        assert_eq!(table.row("c").unwrap().values.len(), 9);
        // Rows keep grid order.
        let ids: Vec<&str> = table.rows.iter().map(|r| r.cell_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn empty_grid_makes_no_requests() {
        let source = MockSource {
            fail_west_of: -180.0,
            calls: AtomicUsize::new(0),
        };
        let table = sample_hazards(&LayerTable::new(), &source, 4, null_progress()).await;
        assert!(table.is_empty());
        assert_eq!(table.columns.len(), 9);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn per_cell_results_are_keyed_by_id() {
        let source = MockSource {
            fail_west_of: 5.0,
            calls: AtomicUsize::new(0),
        };
        let results = sample_cells(&grid(), &source, 1, null_progress()).await;
        assert_eq!(results.len(), 3);
        assert!(results["a"].is_err());
        assert!(results["b"].is_err());
        assert!(results["c"].is_ok());
    }
}
