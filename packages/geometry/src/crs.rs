//! Coordinate reference systems and `proj4rs` reprojection.
//!
//! Only a handful of CRSs show up in the inputs: plain WGS84 (the `GeoJSON`
//! default), web Mercator exports, and UTM zones from national mapping
//! agencies. Anything else is rejected rather than guessed.

use geo::{Coord, MapCoords};
use proj4rs::{proj::Proj, transform::transform};

use crate::GeometryError;

/// A supported coordinate reference system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crs {
    /// EPSG:4326 / OGC CRS84, degrees.
    Wgs84,
    /// EPSG:3857 spherical Mercator, meters.
    WebMercator,
    /// WGS84 UTM zone (EPSG:326zz north, 327zz south), meters.
    Utm {
        /// Zone number, 1-60.
        zone: u8,
        /// Southern hemisphere variant.
        south: bool,
    },
}

impl Crs {
    /// Parses a `GeoJSON` legacy `crs.properties.name` value.
    ///
    /// Accepts `EPSG:n`, `urn:ogc:def:crs:EPSG::n` and
    /// `urn:ogc:def:crs:OGC:1.3:CRS84`.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::UnsupportedCrs`] for anything else.
    pub fn from_name(name: &str) -> Result<Self, GeometryError> {
        let trimmed = name.trim();
        if trimmed.ends_with("CRS84") {
            return Ok(Self::Wgs84);
        }

        let code = trimmed
            .rsplit(':')
            .next()
            .and_then(|c| c.parse::<u32>().ok())
            .ok_or_else(|| GeometryError::UnsupportedCrs(trimmed.to_string()))?;

        Self::from_epsg(code)
    }

    /// Maps an EPSG code to a supported CRS.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::UnsupportedCrs`] if the code is not handled.
    pub fn from_epsg(code: u32) -> Result<Self, GeometryError> {
        match code {
            4326 => Ok(Self::Wgs84),
            3857 | 900_913 => Ok(Self::WebMercator),
            32601..=32660 | 32701..=32760 => {
                #[allow(clippy::cast_possible_truncation)]
                let zone = (code % 100) as u8;
                Ok(Self::Utm {
                    zone,
                    south: code > 32700,
                })
            }
            _ => Err(GeometryError::UnsupportedCrs(format!("EPSG:{code}"))),
        }
    }

    /// Whether coordinates are angular (degrees).
    #[must_use]
    pub const fn is_geographic(self) -> bool {
        matches!(self, Self::Wgs84)
    }

    /// PROJ.4 definition string.
    #[must_use]
    pub fn proj4(self) -> String {
        match self {
            Self::Wgs84 => "+proj=longlat +datum=WGS84 +no_defs +type=crs".to_string(),
            Self::WebMercator => "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 \
                                  +x_0=0 +y_0=0 +k=1 +units=m +no_defs +type=crs"
                .to_string(),
            Self::Utm { zone, south } => {
                let south = if south { " +south" } else { "" };
                format!("+proj=utm +zone={zone}{south} +datum=WGS84 +units=m +no_defs +type=crs")
            }
        }
    }
}

/// A reusable transform between two CRSs.
pub struct Projector {
    from: Proj,
    to: Proj,
    from_geographic: bool,
    to_geographic: bool,
}

impl Projector {
    /// Builds a projector from `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::Projection`] if either definition is rejected.
    pub fn new(from: Crs, to: Crs) -> Result<Self, GeometryError> {
        Ok(Self {
            from: build_proj(from)?,
            to: build_proj(to)?,
            from_geographic: from.is_geographic(),
            to_geographic: to.is_geographic(),
        })
    }

    /// Transforms one coordinate. Geographic coordinates are in degrees on
    /// both ends.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::Projection`] if the transform fails.
    pub fn coord(&self, coord: Coord<f64>) -> Result<Coord<f64>, GeometryError> {
        let mut point = if self.from_geographic {
            (coord.x.to_radians(), coord.y.to_radians(), 0.0)
        } else {
            (coord.x, coord.y, 0.0)
        };

        transform(&self.from, &self.to, &mut point).map_err(|e| GeometryError::Projection {
            message: format!("({}, {}): {e}", coord.x, coord.y),
        })?;

        Ok(if self.to_geographic {
            Coord {
                x: point.0.to_degrees(),
                y: point.1.to_degrees(),
            }
        } else {
            Coord {
                x: point.0,
                y: point.1,
            }
        })
    }

    /// Transforms every coordinate of a geometry.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::Projection`] on the first failing coordinate.
    pub fn geometry<G>(&self, geometry: &G) -> Result<G::Output, GeometryError>
    where
        G: MapCoords<f64, f64>,
    {
        geometry.try_map_coords(|c| self.coord(c))
    }
}

fn build_proj(crs: Crs) -> Result<Proj, GeometryError> {
    let definition = crs.proj4();
    Proj::from_proj_string(&definition).map_err(|e| GeometryError::Projection {
        message: format!("failed to build PROJ.4 definition {definition}: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_crs_names() {
        assert_eq!(Crs::from_name("EPSG:4326").unwrap(), Crs::Wgs84);
        assert_eq!(
            Crs::from_name("urn:ogc:def:crs:OGC:1.3:CRS84").unwrap(),
            Crs::Wgs84
        );
        assert_eq!(
            Crs::from_name("urn:ogc:def:crs:EPSG::3857").unwrap(),
            Crs::WebMercator
        );
        assert_eq!(
            Crs::from_name("EPSG:32718").unwrap(),
            Crs::Utm {
                zone: 18,
                south: true
            }
        );
        assert!(Crs::from_name("EPSG:2154").is_err());
        assert!(Crs::from_name("garbage").is_err());
    }

    #[test]
    fn mercator_roundtrip_is_stable() {
        let forward = Projector::new(Crs::Wgs84, Crs::WebMercator).unwrap();
        let back = Projector::new(Crs::WebMercator, Crs::Wgs84).unwrap();

        let original = Coord { x: -72.3, y: 18.5 };
        let projected = forward.coord(original).unwrap();
        assert!(projected.x < -8_000_000.0 && projected.x > -8_100_000.0);

        let restored = back.coord(projected).unwrap();
        assert!((restored.x - original.x).abs() < 1e-6);
        assert!((restored.y - original.y).abs() < 1e-6);
    }

    #[test]
    fn origin_maps_to_origin() {
        let forward = Projector::new(Crs::Wgs84, Crs::WebMercator).unwrap();
        let projected = forward.coord(Coord { x: 0.0, y: 0.0 }).unwrap();
        assert!(projected.x.abs() < 1e-6);
        assert!(projected.y.abs() < 1e-6);
    }
}
