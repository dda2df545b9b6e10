#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Input loading and output export for the device risk pipeline.
//!
//! Reads the flagged device list and the customer onboarding/usage export
//! (both CSV), validates the export's schema before any row is parsed,
//! and narrows it to rows whose device was flagged. The [`export`] module
//! writes the per-customer results and the location heatmap.

pub mod export;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::ByteRecord;
use device_risk_models::DeviceRecord;
use thiserror::Error;

/// Device identifier column.
pub const COL_DEVICE_ID: &str = "DEVICE_ID";
/// Customer identifier column.
pub const COL_CIF: &str = "CIF";
/// Latitude column.
pub const COL_LATITUDE: &str = "LATITUDE";
/// Longitude column.
pub const COL_LONGITUDE: &str = "LONGITUDE";
/// Creation timestamp column.
pub const COL_CREATED_TIME: &str = "CREATED_TIME";
/// Optional pre-resolved region column.
pub const COL_REGION: &str = "REGION";

/// Columns the onboarding export must carry, checked in this order.
pub const REQUIRED_COLUMNS: &[&str] = &[
    COL_DEVICE_ID,
    COL_CIF,
    COL_LATITUDE,
    COL_LONGITUDE,
    COL_CREATED_TIME,
];

/// Datetime layouts accepted for `CREATED_TIME`, tried in order after
/// RFC 3339.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// Date-only layouts accepted for `CREATED_TIME`.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d"];

/// Errors from reading or validating input files.
#[derive(Debug, Error)]
pub enum IngestError {
    /// A required column is absent from the onboarding export.
    #[error("Missing required column: {column} (in {})", path.display())]
    MissingColumn {
        /// The missing column name.
        column: &'static str,
        /// File that was being validated.
        path: PathBuf,
    },

    /// The file has no header row or no data at all.
    #[error("Input file {} is empty", path.display())]
    EmptyInput {
        /// The empty file.
        path: PathBuf,
    },

    /// CSV reading failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// File I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A validated onboarding export.
#[derive(Debug, Clone, Default)]
pub struct Onboarding {
    /// Parsed rows, in file order.
    pub records: Vec<DeviceRecord>,
    /// Whether the export already carried a `REGION` column.
    pub has_region_column: bool,
    /// Rows dropped because the customer identifier was blank.
    pub skipped_rows: usize,
    /// Rows whose `CREATED_TIME` could not be parsed (kept, timestamp
    /// treated as missing).
    pub unparseable_timestamps: usize,
}

/// Loads the flagged device identifiers from the first column of a CSV
/// file (the header row is skipped). Blank cells are ignored.
///
/// # Errors
///
/// Returns [`IngestError`] if the file cannot be read or parsed.
pub fn load_flagged_devices(path: &Path) -> Result<BTreeSet<String>, IngestError> {
    log::info!("Loading flagged devices from {}", path.display());

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)?;

    if reader.byte_headers()?.is_empty() {
        return Err(IngestError::EmptyInput {
            path: path.to_path_buf(),
        });
    }

    let mut devices = BTreeSet::new();
    for result in reader.byte_records() {
        if let Some(id) = text_cell(&result?, 0) {
            devices.insert(id);
        }
    }

    log::info!("Loaded {} flagged device IDs", devices.len());
    Ok(devices)
}

/// Loads and validates the onboarding/usage export.
///
/// All [`REQUIRED_COLUMNS`] are checked (case-insensitively) before any
/// row is parsed; the first missing one is reported. Unparseable
/// coordinates and timestamps become `None` rather than failing the load.
///
/// # Errors
///
/// Returns [`IngestError::MissingColumn`] if the schema is incomplete, or
/// another [`IngestError`] if the file cannot be read.
pub fn load_onboarding(path: &Path) -> Result<Onboarding, IngestError> {
    log::info!("Loading onboarding export from {}", path.display());

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)?;

    let columns: BTreeMap<String, usize> = reader
        .byte_headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| (String::from_utf8_lossy(h).trim().to_ascii_uppercase(), i))
        .collect();

    if columns.is_empty() {
        return Err(IngestError::EmptyInput {
            path: path.to_path_buf(),
        });
    }

    let index = |column: &'static str| {
        columns
            .get(column)
            .copied()
            .ok_or_else(|| IngestError::MissingColumn {
                column,
                path: path.to_path_buf(),
            })
    };
    for &column in REQUIRED_COLUMNS {
        index(column)?;
    }
    let device_idx = index(COL_DEVICE_ID)?;
    let cif_idx = index(COL_CIF)?;
    let lat_idx = index(COL_LATITUDE)?;
    let lon_idx = index(COL_LONGITUDE)?;
    let created_idx = index(COL_CREATED_TIME)?;
    let region_idx = columns.get(COL_REGION).copied();

    let mut onboarding = Onboarding {
        has_region_column: region_idx.is_some(),
        ..Onboarding::default()
    };

    for result in reader.byte_records() {
        let row = result?;
        let cell = |i: usize| text_cell(&row, i);

        let Some(cif) = cell(cif_idx) else {
            onboarding.skipped_rows += 1;
            continue;
        };

        let created_at = match cell(created_idx) {
            Some(raw) => {
                let parsed = parse_timestamp(&raw);
                if parsed.is_none() {
                    log::debug!("Unparseable {COL_CREATED_TIME} {raw:?} for CIF {cif}");
                    onboarding.unparseable_timestamps += 1;
                }
                parsed
            }
            None => None,
        };

        onboarding.records.push(DeviceRecord {
            device_id: cell(device_idx),
            cif,
            latitude: cell(lat_idx).as_deref().and_then(parse_coordinate),
            longitude: cell(lon_idx).as_deref().and_then(parse_coordinate),
            created_at,
            region: region_idx.and_then(cell),
        });
    }

    if onboarding.skipped_rows > 0 {
        log::warn!(
            "Skipped {} rows with a blank {COL_CIF}",
            onboarding.skipped_rows
        );
    }
    if onboarding.unparseable_timestamps > 0 {
        log::warn!(
            "{} rows have an unparseable {COL_CREATED_TIME}; treated as missing",
            onboarding.unparseable_timestamps
        );
    }
    log::info!("Loaded {} onboarding rows", onboarding.records.len());

    Ok(onboarding)
}

/// Keeps only records whose device identifier is in `flagged`.
#[must_use]
pub fn filter_by_devices(records: Vec<DeviceRecord>, flagged: &BTreeSet<String>) -> Vec<DeviceRecord> {
    let matched: Vec<DeviceRecord> = records
        .into_iter()
        .filter(|r| r.device_id.as_ref().is_some_and(|id| flagged.contains(id)))
        .collect();

    let customers = matched
        .iter()
        .map(|r| r.cif.as_str())
        .collect::<BTreeSet<_>>()
        .len();
    log::info!(
        "Matched {} onboarding rows on flagged {COL_DEVICE_ID}, {customers} distinct CIFs",
        matched.len()
    );

    matched
}

/// Parses a `CREATED_TIME` cell. Returns `None` for anything that is not
/// a recognised date or datetime.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Decodes one cell, trimmed, with blank cells as `None`.
///
/// Rows are read as raw bytes so an export in a legacy encoding still
/// loads; invalid UTF-8 sequences become U+FFFD instead of failing the row.
fn text_cell(row: &ByteRecord, index: usize) -> Option<String> {
    let raw = row.get(index)?;
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn parse_coordinate(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}
