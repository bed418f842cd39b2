//! Administrative boundary polygons.

use geo::{BooleanOps, MultiPolygon, Polygon};

use crate::GeometryError;

/// The polygon parts of a country/region boundary, in EPSG:4326.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Boundary {
    parts: Vec<Polygon<f64>>,
}

impl Boundary {
    /// Creates a boundary from polygon parts.
    #[must_use]
    pub const fn new(parts: Vec<Polygon<f64>>) -> Self {
        Self { parts }
    }

    /// Creates a boundary from a multipolygon.
    #[must_use]
    pub fn from_multi_polygon(multi: MultiPolygon<f64>) -> Self {
        Self { parts: multi.0 }
    }

    /// The polygon parts as read.
    #[must_use]
    pub fn parts(&self) -> &[Polygon<f64>] {
        &self.parts
    }

    /// Whether the boundary has no area-bearing parts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.iter().all(|p| p.exterior().0.len() < 4)
    }

    /// Dissolves all parts into one multipolygon.
    ///
    /// Degenerate rings (fewer than four coordinates) are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::InvalidGeometry`] if any coordinate is not
    /// finite or lies outside the valid longitude/latitude range.
    pub fn union(&self) -> Result<MultiPolygon<f64>, GeometryError> {
        let mut merged = MultiPolygon::new(Vec::new());

        for (i, part) in self.parts.iter().enumerate() {
            if part.exterior().0.len() < 4 {
                log::debug!("Skipping degenerate boundary part {i}");
                continue;
            }
            validate_coords(part, i)?;
            merged = merged.union(part);
        }

        Ok(merged)
    }
}

fn validate_coords(polygon: &Polygon<f64>, part: usize) -> Result<(), GeometryError> {
    let rings = std::iter::once(polygon.exterior()).chain(polygon.interiors());
    for ring in rings {
        for c in &ring.0 {
            let valid = c.x.is_finite()
                && c.y.is_finite()
                && (-180.0..=180.0).contains(&c.x)
                && (-90.0..=90.0).contains(&c.y);
            if !valid {
                return Err(GeometryError::InvalidGeometry {
                    message: format!(
                        "boundary part {part} has coordinate ({}, {}) outside EPSG:4326",
                        c.x, c.y
                    ),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Area, polygon};

    #[test]
    fn union_merges_overlapping_parts() {
        let a = polygon![(x: 0.0, y: 0.0), (x: 2.0, y: 0.0), (x: 2.0, y: 2.0), (x: 0.0, y: 2.0)];
        let b = polygon![(x: 1.0, y: 0.0), (x: 3.0, y: 0.0), (x: 3.0, y: 2.0), (x: 1.0, y: 2.0)];
        let merged = Boundary::new(vec![a, b]).union().unwrap();
        assert_eq!(merged.0.len(), 1);
        assert!((merged.unsigned_area() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn empty_boundary_unions_to_nothing() {
        let boundary = Boundary::default();
        assert!(boundary.is_empty());
        assert!(boundary.union().unwrap().0.is_empty());
    }

    #[test]
    fn rejects_projected_coordinates() {
        let projected = polygon![
            (x: 500_000.0, y: 0.0),
            (x: 600_000.0, y: 0.0),
            (x: 600_000.0, y: 100_000.0),
        ];
        let err = Boundary::new(vec![projected]).union().unwrap_err();
        assert!(matches!(err, GeometryError::InvalidGeometry { .. }));
    }
}
