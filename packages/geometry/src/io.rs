//! `GeoJSON` readers and writers.
//!
//! Inputs may declare a legacy `crs` member; everything returned from this
//! module is in EPSG:4326. Layer files are always written in EPSG:4326
//! without a `crs` member.

use std::path::Path;

use geo::{Geometry, Polygon};
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject, JsonValue};
use storm_map_layer_models::fields::H3_ID;
use storm_map_layer_models::{LayerRow, LayerTable};

use crate::crs::{Crs, Projector};
use crate::{Boundary, GeometryError};

/// A feature converted to `geo` types, with its raw properties.
#[derive(Debug, Clone)]
pub struct InputFeature {
    /// Geometry in EPSG:4326.
    pub geometry: Geometry<f64>,
    /// Feature properties (empty if absent).
    pub properties: JsonObject,
}

/// Reads every feature with a geometry from a `GeoJSON` file, reprojected
/// to EPSG:4326.
///
/// Accepts a `FeatureCollection`, a single `Feature`, or a bare geometry.
///
/// # Errors
///
/// Returns [`GeometryError`] if the file cannot be read or parsed, the CRS
/// is unsupported, or reprojection fails.
pub fn read_features(path: &Path) -> Result<Vec<InputFeature>, GeometryError> {
    let text = std::fs::read_to_string(path)?;
    parse_features(&text)
}

/// Parses `GeoJSON` text into [`InputFeature`]s in EPSG:4326.
///
/// # Errors
///
/// See [`read_features`].
pub fn parse_features(text: &str) -> Result<Vec<InputFeature>, GeometryError> {
    let geojson: GeoJson = text.parse()?;

    let (features, crs) = match geojson {
        GeoJson::FeatureCollection(fc) => {
            let crs = declared_crs(fc.foreign_members.as_ref())?;
            (fc.features, crs)
        }
        GeoJson::Feature(f) => {
            let crs = declared_crs(f.foreign_members.as_ref())?;
            (vec![f], crs)
        }
        GeoJson::Geometry(g) => (vec![Feature::from(g)], Crs::Wgs84),
    };

    let projector = if crs == Crs::Wgs84 {
        None
    } else {
        log::info!("Reprojecting input from {crs:?} to EPSG:4326");
        Some(Projector::new(crs, Crs::Wgs84)?)
    };

    let mut out = Vec::with_capacity(features.len());
    for feature in features {
        let Some(geometry) = feature.geometry else {
            continue;
        };
        let geometry: Geometry<f64> = geometry.try_into()?;
        let geometry = match &projector {
            Some(p) => p.geometry(&geometry)?,
            None => geometry,
        };
        out.push(InputFeature {
            geometry,
            properties: feature.properties.unwrap_or_default(),
        });
    }

    Ok(out)
}

/// Reads the `crs` foreign member, defaulting to EPSG:4326.
fn declared_crs(foreign: Option<&JsonObject>) -> Result<Crs, GeometryError> {
    let Some(name) = foreign
        .and_then(|m| m.get("crs"))
        .and_then(|crs| crs.get("properties"))
        .and_then(|props| props.get("name"))
        .and_then(JsonValue::as_str)
    else {
        return Ok(Crs::Wgs84);
    };
    Crs::from_name(name)
}

/// Reads a boundary file, keeping polygon and multipolygon parts.
///
/// Non-areal geometries are ignored.
///
/// # Errors
///
/// See [`read_features`].
pub fn read_boundary(path: &Path) -> Result<Boundary, GeometryError> {
    let features = read_features(path)?;
    Ok(boundary_from_features(features))
}

/// Collects the areal parts of a feature list into a [`Boundary`].
#[must_use]
pub fn boundary_from_features(features: Vec<InputFeature>) -> Boundary {
    let mut parts = Vec::new();
    for feature in features {
        collect_polygons(feature.geometry, &mut parts);
    }
    Boundary::new(parts)
}

fn collect_polygons(geometry: Geometry<f64>, parts: &mut Vec<Polygon<f64>>) {
    match geometry {
        Geometry::Polygon(p) => parts.push(p),
        Geometry::MultiPolygon(mp) => parts.extend(mp.0),
        Geometry::GeometryCollection(gc) => {
            for g in gc.0 {
                collect_polygons(g, parts);
            }
        }
        Geometry::Rect(r) => parts.push(r.to_polygon()),
        _ => {}
    }
}

/// Reads a layer table written by [`write_layer`].
///
/// Columns are every non-`h3_id` property seen, in first-seen order.
/// `null` values are left unset. Features without a polygon geometry or
/// without an `h3_id` are skipped.
///
/// # Errors
///
/// See [`read_features`].
pub fn read_layer(path: &Path) -> Result<LayerTable, GeometryError> {
    let text = std::fs::read_to_string(path)?;
    parse_layer(&text)
}

/// Parses layer `GeoJSON` text.
///
/// # Errors
///
/// See [`read_features`].
pub fn parse_layer(text: &str) -> Result<LayerTable, GeometryError> {
    let mut table = LayerTable::new();

    for feature in parse_features(text)? {
        let Some(cell_id) = feature
            .properties
            .get(H3_ID)
            .and_then(JsonValue::as_str)
            .map(ToString::to_string)
        else {
            log::warn!("Skipping layer feature without {H3_ID}");
            continue;
        };

        let geometry = match feature.geometry {
            Geometry::Polygon(p) => p,
            Geometry::MultiPolygon(mut mp) if mp.0.len() == 1 => mp.0.remove(0),
            _ => {
                log::warn!("Skipping layer feature {cell_id}: geometry is not a polygon");
                continue;
            }
        };

        let mut row = LayerRow::new(cell_id, geometry);
        for (key, value) in &feature.properties {
            if key == H3_ID {
                continue;
            }
            match value {
                JsonValue::Number(n) => {
                    table.add_column(key);
                    if let Some(v) = n.as_f64() {
                        row.set(key, v);
                    }
                }
                JsonValue::Null => table.add_column(key),
                _ => {}
            }
        }
        table.rows.push(row);
    }

    Ok(table)
}

/// Converts a layer table into a `GeoJSON` feature collection.
///
/// Every column is emitted for every row; unset and non-finite values become
/// `null`.
#[must_use]
pub fn layer_to_geojson(table: &LayerTable) -> FeatureCollection {
    let features = table
        .rows
        .iter()
        .map(|row| {
            let mut properties = JsonObject::new();
            properties.insert(H3_ID.to_string(), JsonValue::from(row.cell_id.clone()));
            for column in &table.columns {
                let value = row
                    .get(column)
                    .and_then(serde_json::Number::from_f64)
                    .map_or(JsonValue::Null, JsonValue::Number);
                properties.insert(column.clone(), value);
            }

            Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(&row.geometry))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// Serializes a layer table to a `GeoJSON` string.
#[must_use]
pub fn layer_to_string(table: &LayerTable) -> String {
    GeoJson::from(layer_to_geojson(table)).to_string()
}

/// Writes a layer table directly to `path`.
///
/// Existing files are truncated. Callers that must not replace a file
/// write to a temporary path and link it into place.
///
/// # Errors
///
/// Returns [`GeometryError::Io`] if the file cannot be written.
pub fn write_layer(path: &Path, table: &LayerTable) -> Result<(), GeometryError> {
    std::fs::write(path, layer_to_string(table))?;
    Ok(())
}
