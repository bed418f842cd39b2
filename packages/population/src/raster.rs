//! Single-band georeferenced raster with all-touched zonal sums.
//!
//! Files are read through [`GeoRaster::read_window`], which decodes only the
//! strips or tiles overlapping a bounding box and keeps the file's own
//! sample type in memory. Global mosaics stay usable that way.

use std::io::{BufReader, Read, Seek};
use std::ops::Range;
use std::path::Path;

use geo::{BoundingRect, Coord, Intersects, Polygon, Rect};
use tiff::ColorType;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;

use crate::PopulationError;

/// Per-chunk decoding budget.
const CHUNK_LIMIT: usize = 1024 * 1024 * 1024;

/// Anything that can sum values under a polygon.
pub trait ZonalSource {
    /// Sum of valid values over every pixel the polygon touches. Returns
    /// `0.0` when nothing valid is touched.
    fn zonal_sum(&self, polygon: &Polygon<f64>) -> f64;
}

/// North-up raster in EPSG:4326.
///
/// Row 0 is the northern edge; pixel `(col, row)` covers
/// `[origin_x + col·pw, origin_x + (col+1)·pw] × [origin_y − (row+1)·ph, origin_y − row·ph]`.
#[derive(Debug)]
pub struct GeoRaster {
    width: usize,
    height: usize,
    origin_x: f64,
    origin_y: f64,
    pixel_width: f64,
    pixel_height: f64,
    nodata: Option<f64>,
    data: DecodingResult,
}

/// Column and row ranges of a read or a query.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PixelWindow {
    cols: Range<usize>,
    rows: Range<usize>,
}

impl PixelWindow {
    fn width(&self) -> usize {
        self.cols.len()
    }

    fn height(&self) -> usize {
        self.rows.len()
    }
}

/// Where a decoded chunk sits in the full image.
struct ChunkPlacement {
    x: usize,
    y: usize,
    width: usize,
    height: usize,
}

impl GeoRaster {
    /// A raster with no pixels. Every zonal sum over it is zero.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            width: 0,
            height: 0,
            origin_x: 0.0,
            origin_y: 0.0,
            pixel_width: 1.0,
            pixel_height: 1.0,
            nodata: None,
            data: DecodingResult::F64(Vec::new()),
        }
    }

    /// Loads the part of a `GeoTIFF`'s first band that overlaps `bbox`.
    ///
    /// Only the strips or tiles intersecting the box are decoded. A box
    /// that misses the image yields an empty raster.
    ///
    /// # Errors
    ///
    /// Returns [`PopulationError::Tiff`] if decoding fails and
    /// [`PopulationError::InvalidRaster`] if the image is not single-band
    /// or the georeferencing tags are missing.
    pub fn read_window(path: &Path, bbox: Rect<f64>) -> Result<Self, PopulationError> {
        let file = std::fs::File::open(path)?;
        let mut limits = Limits::default();
        limits.decoding_buffer_size = CHUNK_LIMIT;
        limits.intermediate_buffer_size = CHUNK_LIMIT;
        limits.ifd_value_size = CHUNK_LIMIT;
        let mut decoder = Decoder::new(BufReader::new(file))?.with_limits(limits);

        match decoder.colortype()? {
            ColorType::Gray(_) => {}
            other => {
                return Err(PopulationError::InvalidRaster {
                    message: format!("{} is {other:?}, expected a single band", path.display()),
                });
            }
        }

        let (width, height) = decoder.dimensions()?;
        let (width, height) = (width as usize, height as usize);

        let (origin, pixel_size) = georeference(&mut decoder, path)?;
        let nodata = decoder
            .get_tag_ascii_string(Tag::GdalNodata)
            .ok()
            .and_then(|s| s.trim().trim_end_matches('\0').parse::<f64>().ok());

        let Some(window) = pixel_window(origin, pixel_size, (width, height), bbox) else {
            log::info!("Raster {} does not overlap {bbox:?}", path.display());
            return Ok(Self::empty());
        };

        let data = read_samples(&mut decoder, width, &window)?;

        #[allow(clippy::cast_precision_loss)]
        let (origin_x, origin_y) = (
            origin.0 + window.cols.start as f64 * pixel_size.0,
            origin.1 - window.rows.start as f64 * pixel_size.1,
        );

        log::info!(
            "Loaded raster {} window cols {:?} rows {:?} of {width}x{height} (pixel {:.6}x{:.6}, nodata {nodata:?})",
            path.display(),
            window.cols,
            window.rows,
            pixel_size.0,
            pixel_size.1,
        );

        Ok(Self {
            width: window.width(),
            height: window.height(),
            origin_x,
            origin_y,
            pixel_width: pixel_size.0,
            pixel_height: pixel_size.1,
            nodata,
            data,
        })
    }

    /// Value at a pixel, `None` if out of range or no-data.
    #[must_use]
    pub fn value(&self, col: usize, row: usize) -> Option<f64> {
        if col >= self.width || row >= self.height {
            return None;
        }
        let value = sample(&self.data, row * self.width + col);
        if value.is_nan() || self.nodata.is_some_and(|nd| value == nd) {
            return None;
        }
        Some(value)
    }

    fn pixel_rect(&self, col: usize, row: usize) -> Rect<f64> {
        #[allow(clippy::cast_precision_loss)]
        let (c, r) = (col as f64, row as f64);
        Rect::new(
            Coord {
                x: self.origin_x + c * self.pixel_width,
                y: self.origin_y - (r + 1.0) * self.pixel_height,
            },
            Coord {
                x: self.origin_x + (c + 1.0) * self.pixel_width,
                y: self.origin_y - r * self.pixel_height,
            },
        )
    }
}

impl ZonalSource for GeoRaster {
    fn zonal_sum(&self, polygon: &Polygon<f64>) -> f64 {
        let Some(bbox) = polygon.bounding_rect() else {
            return 0.0;
        };
        let Some(window) = pixel_window(
            (self.origin_x, self.origin_y),
            (self.pixel_width, self.pixel_height),
            (self.width, self.height),
            bbox,
        ) else {
            return 0.0;
        };

        let mut sum = 0.0;
        for row in window.rows {
            for col in window.cols.clone() {
                let Some(value) = self.value(col, row) else {
                    continue;
                };
                if polygon.intersects(&self.pixel_rect(col, row)) {
                    sum += value;
                }
            }
        }
        sum
    }
}

fn check_pixel_size(pixel_size: (f64, f64)) -> Result<(), PopulationError> {
    if pixel_size.0 > 0.0 && pixel_size.1 > 0.0 {
        Ok(())
    } else {
        Err(PopulationError::InvalidRaster {
            message: format!("non-positive pixel size {pixel_size:?}"),
        })
    }
}

/// Origin (north-west corner) and pixel size from the `GeoTIFF` tags.
fn georeference<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    path: &Path,
) -> Result<((f64, f64), (f64, f64)), PopulationError> {
    let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag);
    let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag);
    match (tiepoint, scale) {
        (Ok(tie), Ok(scale)) if tie.len() >= 6 && scale.len() >= 2 => {
            // Tie point maps raster (i, j) to model (x, y).
            let origin = (tie[3] - tie[0] * scale[0], tie[4] + tie[1] * scale[1]);
            let pixel_size = (scale[0], scale[1]);
            check_pixel_size(pixel_size)?;
            Ok((origin, pixel_size))
        }
        _ => Err(PopulationError::InvalidRaster {
            message: format!("{} has no GeoTIFF tie point/pixel scale", path.display()),
        }),
    }
}

/// Column/row ranges overlapping a bounding box, clamped to the raster.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn pixel_window(
    origin: (f64, f64),
    pixel_size: (f64, f64),
    (width, height): (usize, usize),
    bbox: Rect<f64>,
) -> Option<PixelWindow> {
    let clamp = |v: f64, max: usize| v.clamp(0.0, max as f64) as usize;

    let col_start = clamp(((bbox.min().x - origin.0) / pixel_size.0).floor(), width);
    let col_end = clamp(((bbox.max().x - origin.0) / pixel_size.0).floor() + 1.0, width);
    let row_start = clamp(((origin.1 - bbox.max().y) / pixel_size.1).floor(), height);
    let row_end = clamp(((origin.1 - bbox.min().y) / pixel_size.1).floor() + 1.0, height);

    (col_start < col_end && row_start < row_end).then_some(PixelWindow {
        cols: col_start..col_end,
        rows: row_start..row_end,
    })
}

/// Decodes every chunk overlapping `window` and stitches the overlap into
/// one row-major buffer of the file's sample type.
fn read_samples<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    image_width: usize,
    window: &PixelWindow,
) -> Result<DecodingResult, PopulationError> {
    let (chunk_width, chunk_height) = decoder.chunk_dimensions();
    let (chunk_width, chunk_height) = (chunk_width as usize, chunk_height as usize);
    if chunk_width == 0 || chunk_height == 0 {
        return Err(PopulationError::InvalidRaster {
            message: "zero-sized strips or tiles".to_string(),
        });
    }
    let chunks_across = image_width.div_ceil(chunk_width);
    let len = window.width() * window.height();

    let mut out: Option<DecodingResult> = None;
    for chunk_row in window.rows.start / chunk_height..=(window.rows.end - 1) / chunk_height {
        for chunk_col in window.cols.start / chunk_width..=(window.cols.end - 1) / chunk_width {
            let index = u32::try_from(chunk_row * chunks_across + chunk_col).map_err(|_| {
                PopulationError::InvalidRaster {
                    message: format!("chunk ({chunk_col}, {chunk_row}) out of range"),
                }
            })?;
            let (data_width, data_height) = decoder.chunk_data_dimensions(index);
            let chunk = decoder.read_chunk(index)?;
            let placement = ChunkPlacement {
                x: chunk_col * chunk_width,
                y: chunk_row * chunk_height,
                width: data_width as usize,
                height: data_height as usize,
            };
            let out = out.get_or_insert_with(|| zeroed_like(&chunk, len));
            copy_chunk(out, &chunk, &placement, window)?;
        }
    }

    Ok(out.unwrap_or(DecodingResult::F64(Vec::new())))
}

fn copy_block<T: Copy>(dst: &mut [T], src: &[T], chunk: &ChunkPlacement, window: &PixelWindow) {
    let cols = window.cols.start.max(chunk.x)..window.cols.end.min(chunk.x + chunk.width);
    if cols.is_empty() {
        return;
    }
    for row in window.rows.start.max(chunk.y)..window.rows.end.min(chunk.y + chunk.height) {
        let src_start = (row - chunk.y) * chunk.width + (cols.start - chunk.x);
        let dst_start = (row - window.rows.start) * window.width() + (cols.start - window.cols.start);
        dst[dst_start..dst_start + cols.len()].copy_from_slice(&src[src_start..src_start + cols.len()]);
    }
}

fn copy_chunk(
    dst: &mut DecodingResult,
    src: &DecodingResult,
    chunk: &ChunkPlacement,
    window: &PixelWindow,
) -> Result<(), PopulationError> {
    match (dst, src) {
        (DecodingResult::U8(d), DecodingResult::U8(s)) => copy_block(d, s, chunk, window),
        (DecodingResult::U16(d), DecodingResult::U16(s)) => copy_block(d, s, chunk, window),
        (DecodingResult::U32(d), DecodingResult::U32(s)) => copy_block(d, s, chunk, window),
        (DecodingResult::U64(d), DecodingResult::U64(s)) => copy_block(d, s, chunk, window),
        (DecodingResult::F32(d), DecodingResult::F32(s)) => copy_block(d, s, chunk, window),
        (DecodingResult::F64(d), DecodingResult::F64(s)) => copy_block(d, s, chunk, window),
        (DecodingResult::I8(d), DecodingResult::I8(s)) => copy_block(d, s, chunk, window),
        (DecodingResult::I16(d), DecodingResult::I16(s)) => copy_block(d, s, chunk, window),
        (DecodingResult::I32(d), DecodingResult::I32(s)) => copy_block(d, s, chunk, window),
        (DecodingResult::I64(d), DecodingResult::I64(s)) => copy_block(d, s, chunk, window),
        _ => {
            return Err(PopulationError::InvalidRaster {
                message: "chunks decode to different sample types".to_string(),
            });
        }
    }
    Ok(())
}

fn zeroed_like(like: &DecodingResult, len: usize) -> DecodingResult {
    match like {
        DecodingResult::U8(_) => DecodingResult::U8(vec![0; len]),
        DecodingResult::U16(_) => DecodingResult::U16(vec![0; len]),
        DecodingResult::U32(_) => DecodingResult::U32(vec![0; len]),
        DecodingResult::U64(_) => DecodingResult::U64(vec![0; len]),
        DecodingResult::F32(_) => DecodingResult::F32(vec![0.0; len]),
        DecodingResult::F64(_) => DecodingResult::F64(vec![0.0; len]),
        DecodingResult::I8(_) => DecodingResult::I8(vec![0; len]),
        DecodingResult::I16(_) => DecodingResult::I16(vec![0; len]),
        DecodingResult::I32(_) => DecodingResult::I32(vec![0; len]),
        DecodingResult::I64(_) => DecodingResult::I64(vec![0; len]),
    }
}

#[allow(clippy::cast_precision_loss, clippy::cast_lossless)]
fn sample(data: &DecodingResult, index: usize) -> f64 {
    match data {
        DecodingResult::U8(d) => f64::from(d[index]),
        DecodingResult::U16(d) => f64::from(d[index]),
        DecodingResult::U32(d) => f64::from(d[index]),
        DecodingResult::U64(d) => d[index] as f64,
        DecodingResult::F32(d) => f64::from(d[index]),
        DecodingResult::F64(d) => d[index],
        DecodingResult::I8(d) => f64::from(d[index]),
        DecodingResult::I16(d) => f64::from(d[index]),
        DecodingResult::I32(d) => f64::from(d[index]),
        DecodingResult::I64(d) => d[index] as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use std::path::PathBuf;
    use tiff::encoder::{TiffEncoder, colortype::Gray32Float};

    /// 4x2 raster of 1° pixels from (0, 2) down to (4, 0):
    ///
    /// ```text
    /// row 0:  1  2  3  4
    /// row 1:  5  nd 7  8
    /// ```
    fn raster() -> GeoRaster {
        GeoRaster {
            width: 4,
            height: 2,
            origin_x: 0.0,
            origin_y: 2.0,
            pixel_width: 1.0,
            pixel_height: 1.0,
            nodata: Some(-99.0),
            data: DecodingResult::F64(vec![1.0, 2.0, 3.0, 4.0, 5.0, -99.0, 7.0, 8.0]),
        }
    }

    /// Writes a one-row-per-strip f32 `GeoTIFF` with 1° pixels whose
    /// north-west corner is `origin`.
    fn write_geotiff(name: &str, width: u32, height: u32, origin: (f64, f64), values: &[f32]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("storm_map_raster_{name}_{}.tif", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        let mut tiff = TiffEncoder::new(&mut file).unwrap();
        let mut image = tiff.new_image::<Gray32Float>(width, height).unwrap();
        image
            .encoder()
            .write_tag(Tag::ModelPixelScaleTag, &[1.0_f64, 1.0, 0.0][..])
            .unwrap();
        image
            .encoder()
            .write_tag(Tag::ModelTiepointTag, &[0.0_f64, 0.0, 0.0, origin.0, origin.1, 0.0][..])
            .unwrap();
        image.encoder().write_tag(Tag::GdalNodata, "-99").unwrap();
        image.rows_per_strip(1).unwrap();
        image.write_data(values).unwrap();
        path
    }

    fn unit_square(x: f64, y: f64) -> Polygon<f64> {
        polygon![
            (x: x + 0.2, y: y + 0.2),
            (x: x + 0.8, y: y + 0.2),
            (x: x + 0.8, y: y + 0.8),
            (x: x + 0.2, y: y + 0.8),
        ]
    }

    #[test]
    fn pixel_fully_inside_is_counted() {
        let p = polygon![(x: 0.2, y: 1.2), (x: 0.8, y: 1.2), (x: 0.8, y: 1.8), (x: 0.2, y: 1.8)];
        assert!((raster().zonal_sum(&p) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn all_touched_pixels_are_counted() {
        // Spans columns 0-2 of row 0 without covering any pixel center of
        // columns 0 or 2.
        let p = polygon![(x: 0.9, y: 1.4), (x: 2.1, y: 1.4), (x: 2.1, y: 1.6), (x: 0.9, y: 1.6)];
        assert!((raster().zonal_sum(&p) - 6.0).abs() < 1e-12);
    }

    #[test]
    fn nodata_is_skipped() {
        let p = polygon![(x: 1.2, y: 0.2), (x: 1.8, y: 0.2), (x: 1.8, y: 0.8), (x: 1.2, y: 0.8)];
        assert!(raster().zonal_sum(&p).abs() < f64::EPSILON);
    }

    #[test]
    fn outside_the_raster_sums_to_zero() {
        let p = polygon![(x: 10.0, y: 10.0), (x: 11.0, y: 10.0), (x: 11.0, y: 11.0), (x: 10.0, y: 11.0)];
        assert!(raster().zonal_sum(&p).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_non_positive_pixel_size() {
        let err = check_pixel_size((1.0, -1.0)).unwrap_err();
        assert!(matches!(err, PopulationError::InvalidRaster { .. }));
    }

    #[test]
    fn empty_raster_sums_to_zero() {
        assert!(GeoRaster::empty().zonal_sum(&unit_square(0.0, 0.0)).abs() < f64::EPSILON);
    }

    #[test]
    fn geotiff_is_georeferenced_and_skips_nodata() {
        // Same layout as `raster()`, shifted to a (10, 20) north-west corner.
        let path = write_geotiff(
            "full",
            4,
            2,
            (10.0, 20.0),
            &[1.0, 2.0, 3.0, 4.0, 5.0, -99.0, 7.0, 8.0],
        );

        let bbox = Rect::new(Coord { x: -180.0, y: -90.0 }, Coord { x: 180.0, y: 90.0 });
        let raster = GeoRaster::read_window(&path, bbox).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!((raster.width, raster.height), (4, 2));
        assert!((raster.zonal_sum(&unit_square(10.0, 19.0)) - 1.0).abs() < 1e-12);
        assert!((raster.zonal_sum(&unit_square(13.0, 18.0)) - 8.0).abs() < 1e-12);
        assert!(raster.zonal_sum(&unit_square(11.0, 18.0)).abs() < f64::EPSILON);
        assert_eq!(raster.value(1, 1), None);
    }

    #[test]
    fn window_reads_only_the_overlap() {
        // 4x4 grid of 1° pixels from (0, 4), valued 10·row + col.
        #[allow(clippy::cast_precision_loss)]
        let values: Vec<f32> = (0..16).map(|i| (10 * (i / 4) + i % 4) as f32).collect();
        let path = write_geotiff("window", 4, 4, (0.0, 4.0), &values);

        let bbox = Rect::new(Coord { x: 1.2, y: 1.2 }, Coord { x: 2.8, y: 2.8 });
        let raster = GeoRaster::read_window(&path, bbox).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!((raster.width, raster.height), (2, 2));
        assert!(matches!(raster.data, DecodingResult::F32(_)));
        // Window pixel (0, 0) is image pixel (col 1, row 1).
        assert_eq!(raster.value(0, 0), Some(11.0));
        assert_eq!(raster.value(1, 1), Some(22.0));
        assert!((raster.zonal_sum(&unit_square(2.0, 1.0)) - 22.0).abs() < 1e-12);
        assert!(raster.zonal_sum(&unit_square(0.0, 3.0)).abs() < f64::EPSILON);
    }

    #[test]
    fn window_outside_the_image_is_empty() {
        let path = write_geotiff("miss", 2, 2, (0.0, 2.0), &[1.0, 2.0, 3.0, 4.0]);

        let bbox = Rect::new(Coord { x: 50.0, y: 50.0 }, Coord { x: 51.0, y: 51.0 });
        let raster = GeoRaster::read_window(&path, bbox).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!((raster.width, raster.height), (0, 0));
    }
}
