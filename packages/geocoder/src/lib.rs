#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Reverse geocoding of device coordinates into region names.
//!
//! Coordinates are rounded into a [`CoordinateKey`] and looked up in a
//! persistent [`cache::RegionCache`] first. Misses go to a
//! [`ReverseGeocoder`] provider (the public Nominatim instance by
//! default, configured via TOML in `services/`) paced by a fixed
//! inter-call delay. Every outcome, including failures, is written back
//! to the cache so a coordinate is only ever looked up once.
//!
//! [`CoordinateKey`]: device_risk_models::CoordinateKey

pub mod cache;
pub mod nominatim;
pub mod progress;
pub mod resolver;
pub mod service_registry;

use std::collections::BTreeMap;

use thiserror::Error;

/// Address components consulted for a region label, in preference order.
/// The first one present wins.
pub const REGION_FIELD_PREFERENCE: &[&str] = &["city", "town", "county", "state", "country"];

/// Address structure returned by a reverse geocoding provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReverseAddress {
    /// Address component name (e.g. `"city"`, `"state"`) to value.
    pub components: BTreeMap<String, String>,
}

impl ReverseAddress {
    /// Picks the region label using [`REGION_FIELD_PREFERENCE`].
    ///
    /// Blank values are treated as absent.
    #[must_use]
    pub fn region_label(&self) -> Option<&str> {
        REGION_FIELD_PREFERENCE.iter().find_map(|field| {
            self.components
                .get(*field)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        })
    }
}

/// Errors from reverse geocoding providers.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// HTTP request failed (including timeouts).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider answered with a non-success status.
    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimited,
}

/// Why a coordinate could not be turned into a region.
///
/// Never surfaced to callers of the resolver; kept so failures can be
/// logged and counted instead of silently discarded.
#[derive(Debug, Error)]
pub enum ResolutionFailure {
    /// The provider call itself failed.
    #[error("provider error: {0}")]
    Provider(#[from] GeocodeError),

    /// The provider returned no result for the coordinate.
    #[error("empty response")]
    EmptyResponse,

    /// The provider returned an address without any usable region field.
    #[error("no region fields in address")]
    NoRegionFields,
}

/// A reverse geocoding backend.
#[async_trait::async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// Looks up the address at the given raw (unrounded) coordinate.
    ///
    /// Returns `Ok(None)` when the provider has no result for the point.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if the request or response parsing fails.
    async fn reverse(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<ReverseAddress>, GeocodeError>;
}

#[async_trait::async_trait]
impl<T: ReverseGeocoder + ?Sized> ReverseGeocoder for std::sync::Arc<T> {
    async fn reverse(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<ReverseAddress>, GeocodeError> {
        (**self).reverse(latitude, longitude).await
    }
}
