//! Per-country age-band proportions from a World Population Prospects table.
//!
//! The table is the "Estimates" sheet exported to CSV: one row per
//! (country, year) with a `Year` column, an `ISO3 Alpha-code` column and one
//! column per 5-year age band (`0-4`, `5-9`, ..., `100+`; `0 a 4` style
//! headers are accepted too). Band values may use spaces as thousands
//! separators and `...` for missing data.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use crate::PopulationError;

const YEAR_COLUMN: &str = "Year";
const ISO_COLUMN: &str = "ISO3 Alpha-code";

/// Shares of the total population below 5, 10 and 15 years old.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgeProportions {
    pub under_5: f64,
    pub under_10: f64,
    pub under_15: f64,
}

impl AgeProportions {
    /// The three shares in output column order.
    #[must_use]
    pub const fn as_array(&self) -> [f64; 3] {
        [self.under_5, self.under_10, self.under_15]
    }
}

/// Lower and (inclusive) upper age of a band column. `100+` has no upper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AgeBand {
    lower: u16,
    upper: Option<u16>,
}

impl AgeBand {
    fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        if let Some(lower) = header.strip_suffix('+') {
            return Some(Self {
                lower: lower.trim().parse().ok()?,
                upper: None,
            });
        }
        let (lower, upper) = header
            .split_once('-')
            .or_else(|| header.split_once(" a "))?;
        Some(Self {
            lower: lower.trim().parse().ok()?,
            upper: Some(upper.trim().parse().ok()?),
        })
    }
}

/// Lookup of [`AgeProportions`] by ISO code and year.
#[derive(Debug, Clone, Default)]
pub struct DemographicTable {
    rows: BTreeMap<(String, u16), AgeProportions>,
}

impl DemographicTable {
    /// Loads a table from a CSV file.
    ///
    /// # Errors
    ///
    /// Returns [`PopulationError::Csv`] if the file cannot be read and
    /// [`PopulationError::InvalidDemographics`] if required columns are
    /// missing.
    pub fn from_path(path: &Path) -> Result<Self, PopulationError> {
        let file = std::fs::File::open(path)?;
        let table = Self::from_reader(file)?;
        log::info!(
            "Loaded {} demographic rows from {}",
            table.len(),
            path.display()
        );
        Ok(table)
    }

    /// Parses a table from any CSV source.
    ///
    /// Rows with an unparseable year, ISO code or band value are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`PopulationError::InvalidDemographics`] if the header lacks
    /// the year, ISO or `0-4`/`5-9`/`10-14` columns.
    pub fn from_reader(reader: impl Read) -> Result<Self, PopulationError> {
        let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let headers = csv_reader.headers()?.clone();

        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| PopulationError::InvalidDemographics {
                    message: format!("missing column \"{name}\""),
                })
        };
        let year_idx = column(YEAR_COLUMN)?;
        let iso_idx = column(ISO_COLUMN)?;

        let bands: Vec<(usize, AgeBand)> = headers
            .iter()
            .enumerate()
            .filter_map(|(i, h)| AgeBand::parse(h).map(|band| (i, band)))
            .collect();

        let band_idx = |lower: u16, upper: u16| {
            bands
                .iter()
                .find(|(_, b)| b.lower == lower && b.upper == Some(upper))
                .map(|(i, _)| *i)
                .ok_or_else(|| PopulationError::InvalidDemographics {
                    message: format!("missing age band {lower}-{upper}"),
                })
        };
        let under_5_idx = band_idx(0, 4)?;
        let under_10_idx = band_idx(5, 9)?;
        let under_15_idx = band_idx(10, 14)?;

        let mut rows = BTreeMap::new();

        for result in csv_reader.records() {
            let record = match result {
                Ok(r) => r,
                Err(e) => {
                    log::trace!("  skipping malformed row: {e}");
                    continue;
                }
            };

            let Some(year) = record.get(year_idx).and_then(parse_year) else {
                continue;
            };
            let Some(iso) = record
                .get(iso_idx)
                .map(str::trim)
                .filter(|s| !s.is_empty())
            else {
                continue;
            };

            let value = |i: usize| record.get(i).and_then(parse_count);
            let Some(total) = bands
                .iter()
                .map(|(i, _)| value(*i))
                .sum::<Option<f64>>()
            else {
                log::trace!("  skipping {iso} {year}: unparseable band value");
                continue;
            };
            if total <= 0.0 {
                continue;
            }

            let (Some(a), Some(b), Some(c)) =
                (value(under_5_idx), value(under_10_idx), value(under_15_idx))
            else {
                continue;
            };

            rows.insert(
                (iso.to_ascii_uppercase(), year),
                AgeProportions {
                    under_5: a / total,
                    under_10: (a + b) / total,
                    under_15: (a + b + c) / total,
                },
            );
        }

        Ok(Self { rows })
    }

    /// Number of (country, year) rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Proportions for a country and year.
    ///
    /// # Errors
    ///
    /// Returns [`PopulationError::MissingDemographics`] if there is no row.
    pub fn proportions(&self, iso: &str, year: u16) -> Result<AgeProportions, PopulationError> {
        self.rows
            .get(&(iso.to_ascii_uppercase(), year))
            .copied()
            .ok_or_else(|| PopulationError::MissingDemographics {
                iso: iso.to_string(),
                year,
            })
    }
}

/// Accepts `2020` and `2020.0`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_year(s: &str) -> Option<u16> {
    let s = s.trim();
    s.parse::<u16>().ok().or_else(|| {
        let value: f64 = s.parse().ok()?;
        if value.fract() == 0.0 && (0.0..=f64::from(u16::MAX)).contains(&value) {
            Some(value as u16)
        } else {
            None
        }
    })
}

/// Parses `"1 234.5"`; `...` and empty cells count as zero.
fn parse_count(s: &str) -> Option<f64> {
    let cleaned: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() || cleaned == "..." {
        return Some(0.0);
    }
    cleaned.parse().ok().filter(|v: &f64| v.is_finite())
}
