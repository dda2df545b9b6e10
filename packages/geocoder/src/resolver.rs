//! Cache-fronted, rate-limited region resolution.
//!
//! [`RegionResolver`] owns the [`RegionCache`] for the duration of a run.
//! For each coordinate it either short-circuits (no location captured),
//! answers from the cache, or performs exactly one provider call followed
//! by the mandatory pacing delay. Provider outcomes, failures included,
//! are cached before the next record is touched.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use device_risk_models::{CoordinateKey, DeviceRecord, UNKNOWN_REGION};

use crate::cache::RegionCache;
use crate::progress::ProgressCallback;
use crate::{ResolutionFailure, ReverseGeocoder};

/// Default pause after each provider call (public Nominatim allows one
/// request per second).
pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);

/// How a single coordinate was resolved.
#[derive(Debug)]
pub enum Resolution {
    /// Latitude or longitude was missing or exactly zero.
    NoLocation,
    /// Answered from the cache without a provider call.
    Cached(String),
    /// Looked up via the provider and cached.
    Resolved(String),
    /// Provider lookup failed; [`UNKNOWN_REGION`] was cached.
    Failed(ResolutionFailure),
}

impl Resolution {
    /// The region this outcome maps to.
    #[must_use]
    pub fn region(&self) -> &str {
        match self {
            Self::Cached(region) | Self::Resolved(region) => region,
            Self::NoLocation | Self::Failed(_) => UNKNOWN_REGION,
        }
    }
}

/// Counters from a [`RegionResolver::resolve_all`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveStats {
    /// Records whose region was filled in during this pass.
    pub resolved: u64,
    /// Records skipped because they already carried a region.
    pub already_set: u64,
    /// Records without a usable coordinate.
    pub no_location: u64,
    /// Records answered from the cache.
    pub cache_hits: u64,
    /// Provider calls that produced a region.
    pub lookups: u64,
    /// Provider calls that failed and were cached as unknown.
    pub failures: u64,
    /// Whether the pass stopped early because cancellation was requested.
    pub cancelled: bool,
}

/// Resolves coordinates to region names through a cache and a provider.
pub struct RegionResolver<G> {
    geocoder: G,
    cache: RegionCache,
    delay: Duration,
}

impl<G: ReverseGeocoder> RegionResolver<G> {
    /// Creates a resolver that owns `cache` and paces provider calls by
    /// `delay`.
    pub const fn new(geocoder: G, cache: RegionCache, delay: Duration) -> Self {
        Self {
            geocoder,
            cache,
            delay,
        }
    }

    /// The cache as it currently stands.
    pub const fn cache(&self) -> &RegionCache {
        &self.cache
    }

    /// Gives the cache back, typically to persist it.
    pub fn into_cache(self) -> RegionCache {
        self.cache
    }

    /// Resolves a coordinate to a region name. Never fails: every failure
    /// degrades to [`UNKNOWN_REGION`].
    pub async fn resolve(&mut self, latitude: Option<f64>, longitude: Option<f64>) -> String {
        self.resolve_detailed(latitude, longitude)
            .await
            .region()
            .to_string()
    }

    /// Resolves a coordinate, reporting how the answer was obtained.
    #[allow(clippy::float_cmp)]
    pub async fn resolve_detailed(
        &mut self,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Resolution {
        let (Some(lat), Some(lon)) = (latitude, longitude) else {
            return Resolution::NoLocation;
        };
        if lat == 0.0 || lon == 0.0 || !lat.is_finite() || !lon.is_finite() {
            return Resolution::NoLocation;
        }

        let key = CoordinateKey::from_degrees(lat, lon);
        if let Some(region) = self.cache.get(&key) {
            return Resolution::Cached(region.to_string());
        }

        let outcome = self.geocoder.reverse(lat, lon).await;
        tokio::time::sleep(self.delay).await;

        let outcome = match outcome {
            Ok(Some(address)) => address
                .region_label()
                .map(str::to_string)
                .ok_or(ResolutionFailure::NoRegionFields),
            Ok(None) => Err(ResolutionFailure::EmptyResponse),
            Err(e) => Err(ResolutionFailure::Provider(e)),
        };

        match outcome {
            Ok(region) => Resolution::Resolved(self.cache.put(key, region).to_string()),
            Err(failure) => {
                log::debug!("Region lookup for {key} failed: {failure}");
                self.cache.put(key, UNKNOWN_REGION.to_string());
                Resolution::Failed(failure)
            }
        }
    }

    /// Fills in the region of every record that does not have one yet, in
    /// input order.
    ///
    /// `cancel` is checked before each record; once set, the pass stops
    /// and [`ResolveStats::cancelled`] is reported. Every record finished
    /// before that point is fully resolved and its outcome is cached.
    pub async fn resolve_all(
        &mut self,
        records: &mut [DeviceRecord],
        cancel: &AtomicBool,
        progress: &Arc<dyn ProgressCallback>,
    ) -> ResolveStats {
        let mut stats = ResolveStats::default();
        progress.set_total(records.len() as u64);

        for record in records.iter_mut() {
            if cancel.load(Ordering::SeqCst) {
                log::warn!("Region resolution cancelled, stopping before the next record");
                stats.cancelled = true;
                break;
            }

            if record.region.is_some() {
                stats.already_set += 1;
                progress.inc(1);
                continue;
            }

            let resolution = self
                .resolve_detailed(record.latitude, record.longitude)
                .await;
            match &resolution {
                Resolution::NoLocation => stats.no_location += 1,
                Resolution::Cached(_) => stats.cache_hits += 1,
                Resolution::Resolved(_) => stats.lookups += 1,
                Resolution::Failed(failure) => {
                    stats.failures += 1;
                    if matches!(
                        failure,
                        ResolutionFailure::Provider(crate::GeocodeError::RateLimited)
                    ) {
                        log::warn!("Rate limited by geocoding provider; cached as {UNKNOWN_REGION}");
                    }
                }
            }
            record.region = Some(resolution.region().to_string());
            stats.resolved += 1;
            progress.inc(1);
        }

        progress.finish(format!(
            "{} regions ({} cached, {} looked up, {} failed, {} without location)",
            stats.resolved, stats.cache_hits, stats.lookups, stats.failures, stats.no_location
        ));

        stats
    }
}
