//! Point and road inputs read from `GeoJSON`.

use geo::{Centroid, Geometry, LineString, Point};
use serde_json::Value;
use storm_map_geometry::io::{InputFeature, read_features};

use crate::{InfrastructureConfig, InfrastructureError};

/// OSM property holding the road class.
const HIGHWAY_PROPERTY: &str = "highway";

/// A school or hospital location with its capacity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointFeature {
    pub point: Point<f64>,
    /// Persons; 0 when the source has no value.
    pub capacity: f64,
}

/// A road line with its OSM `highway` class, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct RoadSegment {
    pub line: LineString<f64>,
    pub class: Option<String>,
}

/// Everything the infrastructure stage reads.
#[derive(Debug, Clone, Default)]
pub struct InfrastructureInputs {
    pub schools: Vec<PointFeature>,
    pub hospitals: Vec<PointFeature>,
    /// Main roads only (already filtered by class).
    pub roads: Vec<RoadSegment>,
}

impl InfrastructureInputs {
    /// Reads and filters the configured input files.
    ///
    /// # Errors
    ///
    /// Returns [`InfrastructureError::Geometry`] if a file cannot be read,
    /// parsed or reprojected.
    pub fn load(config: &InfrastructureConfig) -> Result<Self, InfrastructureError> {
        let schools = points_from_features(read_features(&config.schools)?, &config.capacity_field);
        let hospitals =
            points_from_features(read_features(&config.hospitals)?, &config.capacity_field);
        let all_roads = roads_from_features(read_features(&config.roads)?);
        let total_roads = all_roads.len();
        let roads = filter_main_roads(all_roads, &config.main_road_classes);

        log::info!(
            "Loaded {} schools, {} hospitals, {} of {total_roads} road lines",
            schools.len(),
            hospitals.len(),
            roads.len()
        );

        Ok(Self {
            schools,
            hospitals,
            roads,
        })
    }
}

/// Converts features to points.
///
/// Multi-points contribute every member; areal or linear features (e.g.
/// building footprints) contribute their centroid.
#[must_use]
pub fn points_from_features(features: Vec<InputFeature>, capacity_field: &str) -> Vec<PointFeature> {
    let mut points = Vec::with_capacity(features.len());
    for feature in features {
        let capacity = capacity(feature.properties.get(capacity_field));
        match feature.geometry {
            Geometry::Point(point) => points.push(PointFeature { point, capacity }),
            Geometry::MultiPoint(multi) => {
                points.extend(multi.0.into_iter().map(|point| PointFeature { point, capacity }));
            }
            other => {
                if let Some(point) = other.centroid() {
                    points.push(PointFeature { point, capacity });
                }
            }
        }
    }
    points
}

/// Reads a capacity value: numbers, numeric strings, or 0.
fn capacity(value: Option<&Value>) -> f64 {
    let capacity = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    };
    if capacity.is_finite() { capacity.max(0.0) } else { 0.0 }
}

/// Converts line and multi-line features to road segments.
#[must_use]
pub fn roads_from_features(features: Vec<InputFeature>) -> Vec<RoadSegment> {
    let mut roads = Vec::new();
    for feature in features {
        let class = feature
            .properties
            .get(HIGHWAY_PROPERTY)
            .and_then(Value::as_str)
            .map(str::to_string);
        match feature.geometry {
            Geometry::LineString(line) => roads.push(RoadSegment { line, class }),
            Geometry::MultiLineString(multi) => {
                roads.extend(multi.0.into_iter().map(|line| RoadSegment {
                    line,
                    class: class.clone(),
                }));
            }
            Geometry::Line(line) => roads.push(RoadSegment {
                line: line.into(),
                class,
            }),
            _ => {}
        }
    }
    roads
}

/// Keeps roads whose class is one of `classes`.
///
/// Roads without a class are kept: the input is assumed to be pre-filtered
/// when it carries no `highway` tag. An empty `classes` keeps everything.
#[must_use]
pub fn filter_main_roads(roads: Vec<RoadSegment>, classes: &[String]) -> Vec<RoadSegment> {
    if classes.is_empty() {
        return roads;
    }
    roads
        .into_iter()
        .filter(|road| {
            road.class
                .as_deref()
                .is_none_or(|class| classes.iter().any(|c| c == class))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use storm_map_geometry::io::parse_features;

    #[test]
    fn capacity_accepts_numbers_and_strings() {
        let features = parse_features(
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "properties": {"capacity:persons": 120},
                 "geometry": {"type": "Point", "coordinates": [-72.3, 18.5]}},
                {"type": "Feature", "properties": {"capacity:persons": " 45 "},
                 "geometry": {"type": "Point", "coordinates": [-72.2, 18.5]}},
                {"type": "Feature", "properties": {"name": "no capacity"},
                 "geometry": {"type": "Point", "coordinates": [-72.1, 18.5]}},
                {"type": "Feature", "properties": {"capacity:persons": "unknown"},
                 "geometry": {"type": "Point", "coordinates": [-72.0, 18.5]}}
            ]}"#,
        )
        .unwrap();
        let points = points_from_features(features, "capacity:persons");
        let capacities: Vec<f64> = points.iter().map(|p| p.capacity).collect();
        assert_eq!(capacities, vec![120.0, 45.0, 0.0, 0.0]);
    }

    #[test]
    fn footprints_become_centroids() {
        let features = parse_features(
            r#"{"type": "Feature", "properties": {},
                "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [2, 0], [2, 2], [0, 2], [0, 0]]]}}"#,
        )
        .unwrap();
        let points = points_from_features(features, "capacity:persons");
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].point, Point::new(1.0, 1.0));
    }

    #[test]
    fn road_class_filter() {
        let features = parse_features(
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "properties": {"highway": "primary"},
                 "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 0]]}},
                {"type": "Feature", "properties": {"highway": "residential"},
                 "geometry": {"type": "LineString", "coordinates": [[0, 1], [1, 1]]}},
                {"type": "Feature", "properties": {},
                 "geometry": {"type": "MultiLineString", "coordinates": [[[0, 2], [1, 2]], [[0, 3], [1, 3]]]}}
            ]}"#,
        )
        .unwrap();
        let roads = roads_from_features(features);
        assert_eq!(roads.len(), 4);

        let classes = InfrastructureConfig::default().main_road_classes;
        let main = filter_main_roads(roads.clone(), &classes);
        assert_eq!(main.len(), 3);
        assert!(main.iter().all(|r| r.class.as_deref() != Some("residential")));

        assert_eq!(filter_main_roads(roads, &[]).len(), 4);
    }
}
