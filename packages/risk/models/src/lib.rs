#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared data types for the device risk pipeline.
//!
//! Defines the rounded coordinate identity used by the region cache, the
//! calendar month period used for activity and cohort calculations, the
//! per-row [`DeviceRecord`], and the per-customer [`RiskResult`] along with
//! the aggregate shapes produced from it.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike as _, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum_macros::{AsRefStr, Display, EnumString};

/// Sentinel region for coordinates that could not be resolved.
///
/// Cached and reported like any other region name.
pub const UNKNOWN_REGION: &str = "Unknown";

/// Number of decimal places kept when rounding coordinates into a
/// [`CoordinateKey`].
pub const COORDINATE_PRECISION: u32 = 5;

const COORDINATE_SCALE: f64 = 100_000.0;

/// A latitude/longitude pair rounded to [`COORDINATE_PRECISION`] decimal
/// places.
///
/// Stored as integer units of `1e-5` degrees so equality and hashing are
/// exact and stable across runs. Serializes as the string `"lat,lon"` so it
/// can be used as a JSON object key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CoordinateKey {
    lat_units: i64,
    lon_units: i64,
}

impl CoordinateKey {
    /// Rounds a raw coordinate (half away from zero) into a key.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_degrees(latitude: f64, longitude: f64) -> Self {
        Self {
            lat_units: (latitude * COORDINATE_SCALE).round() as i64,
            lon_units: (longitude * COORDINATE_SCALE).round() as i64,
        }
    }

    /// Rounded latitude in degrees.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn latitude(self) -> f64 {
        self.lat_units as f64 / COORDINATE_SCALE
    }

    /// Rounded longitude in degrees.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn longitude(self) -> f64 {
        self.lon_units as f64 / COORDINATE_SCALE
    }
}

impl fmt::Display for CoordinateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5},{:.5}", self.latitude(), self.longitude())
    }
}

/// Error returned when a string is not a valid `"lat,lon"` coordinate key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidCoordinateKeyError {
    /// The rejected input.
    pub input: String,
}

impl fmt::Display for InvalidCoordinateKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid coordinate key {:?}: expected \"lat,lon\"", self.input)
    }
}

impl std::error::Error for InvalidCoordinateKeyError {}

impl FromStr for CoordinateKey {
    type Err = InvalidCoordinateKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || InvalidCoordinateKeyError {
            input: s.to_string(),
        };
        let (lat, lon) = s.split_once(',').ok_or_else(err)?;
        let lat = lat.trim().parse::<f64>().map_err(|_| err())?;
        let lon = lon.trim().parse::<f64>().map_err(|_| err())?;
        if !lat.is_finite() || !lon.is_finite() {
            return Err(err());
        }
        Ok(Self::from_degrees(lat, lon))
    }
}

impl Serialize for CoordinateKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CoordinateKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A calendar year-month period (e.g. `2024-03`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    /// Calendar year.
    pub year: i32,
    /// Month of year, 1-12.
    pub month: u32,
}

impl YearMonth {
    /// Returns the period containing the given timestamp.
    #[must_use]
    pub fn of(timestamp: &NaiveDateTime) -> Self {
        Self {
            year: timestamp.year(),
            month: timestamp.month(),
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| format!("invalid year-month {s:?}"))?;
        let year = year
            .parse::<i32>()
            .map_err(|e| format!("invalid year in {s:?}: {e}"))?;
        let month = month
            .parse::<u32>()
            .map_err(|e| format!("invalid month in {s:?}: {e}"))?;
        if !(1..=12).contains(&month) {
            return Err(format!("month out of range in {s:?}"));
        }
        Ok(Self { year, month })
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for YearMonth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One validated row of the onboarding/usage export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Device identifier, `None` when the cell was blank.
    pub device_id: Option<String>,
    /// Customer identifier (CIF), the grouping key for classification.
    pub cif: String,
    /// Latitude in degrees, `None` when missing or unparseable.
    pub latitude: Option<f64>,
    /// Longitude in degrees, `None` when missing or unparseable.
    pub longitude: Option<f64>,
    /// Creation timestamp, `None` when missing or unparseable.
    pub created_at: Option<NaiveDateTime>,
    /// Resolved region name. `None` until resolution runs.
    pub region: Option<String>,
}

impl DeviceRecord {
    /// The calendar month of [`Self::created_at`], if known.
    #[must_use]
    pub fn period(&self) -> Option<YearMonth> {
        self.created_at.as_ref().map(YearMonth::of)
    }
}

/// Risk tier assigned to a customer.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum RiskLabel {
    /// Single month, single device.
    Transient,
    /// Multiple months on a single device.
    Persistent,
    /// Multiple devices within a single month.
    #[serde(rename = "Multi-device")]
    #[strum(serialize = "Multi-device")]
    MultiDevice,
    /// Multiple months across multiple devices.
    Critical,
}

impl RiskLabel {
    /// Returns the integer risk score (1-3) carried by this tier.
    #[must_use]
    pub const fn score(self) -> u8 {
        match self {
            Self::Transient => 1,
            Self::Persistent | Self::MultiDevice => 2,
            Self::Critical => 3,
        }
    }

    /// All tiers in ascending severity order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Transient,
            Self::Persistent,
            Self::MultiDevice,
            Self::Critical,
        ]
    }
}

/// Classification outcome for a single customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskResult {
    /// Customer identifier.
    pub cif: String,
    /// Integer risk score, 1-3.
    pub score: u8,
    /// Risk tier.
    pub label: RiskLabel,
    /// Most frequent region across the customer's records.
    pub region: String,
    /// Month of the customer's earliest valid creation timestamp.
    pub cohort: Option<YearMonth>,
    /// Distinct active months.
    pub months: usize,
    /// Distinct device identifiers.
    pub devices: usize,
}

/// Customer counts by risk tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactSummary {
    /// Distinct customers classified.
    pub total: usize,
    /// Customers labelled [`RiskLabel::Transient`].
    pub transient_count: usize,
    /// Customers with any other label.
    pub non_transient_count: usize,
    /// `transient_count / total` as a percentage (0-100).
    pub transient_pct: f64,
    /// `non_transient_count / total` as a percentage (0-100).
    pub non_transient_pct: f64,
    /// Count per tier, in [`RiskLabel::all`] order.
    pub by_label: Vec<(RiskLabel, usize)>,
}

/// Risk score aggregate for a single region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionStat {
    /// Region name.
    pub region: String,
    /// Customers whose dominant region this is.
    pub customers: usize,
    /// Sum of risk scores.
    pub total_score: u64,
    /// Mean risk score per customer.
    pub mean_score: f64,
}

/// Mean risk score for an onboarding cohort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortStat {
    /// Cohort month, `None` for customers without any valid timestamp.
    pub cohort: Option<YearMonth>,
    /// Customers in the cohort.
    pub customers: usize,
    /// Mean risk score across the cohort.
    pub mean_score: f64,
}
