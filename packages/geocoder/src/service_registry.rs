//! Compile-time registry of reverse geocoding service configurations.
//!
//! Each provider is defined in a TOML file under `services/`. The
//! registry embeds these at compile time and exposes them via
//! [`all_services`], [`enabled_services`] and [`default_service`].

use std::time::Duration;

use serde::Deserialize;

/// A reverse geocoding service configuration loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct GeocodingService {
    /// Unique identifier (e.g., `"nominatim"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Whether this service may be used by the pipeline.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Selection order, lower values are preferred.
    pub priority: u32,
    /// Provider-specific configuration.
    pub provider: ProviderConfig,
}

/// Provider-specific configuration, tagged by `type` in TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Nominatim / `OpenStreetMap` reverse endpoint.
    Nominatim {
        /// Reverse endpoint URL (e.g., `"https://nominatim.openstreetmap.org/reverse"`).
        base_url: String,
        /// `User-Agent` header sent with every request. Required by the
        /// public instance's usage policy.
        user_agent: String,
        /// Preferred language for address components (`accept-language`).
        language: String,
        /// Per-request timeout in seconds.
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
        /// Delay applied after every request, in milliseconds.
        rate_limit_ms: u64,
        /// Optional detail level (3 = country ... 18 = building).
        #[serde(default)]
        zoom: Option<u8>,
    },
}

const fn default_true() -> bool {
    true
}

const fn default_timeout_secs() -> u64 {
    10
}

impl GeocodingService {
    /// Returns the provider's endpoint URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        match &self.provider {
            ProviderConfig::Nominatim { base_url, .. } => base_url,
        }
    }

    /// Returns the mandatory pause after each provider call.
    #[must_use]
    pub const fn rate_limit(&self) -> Duration {
        match &self.provider {
            ProviderConfig::Nominatim { rate_limit_ms, .. } => Duration::from_millis(*rate_limit_ms),
        }
    }
}

// ── Compile-time embedded TOML files ────────────────────────────────

const SERVICE_TOMLS: &[(&str, &str)] = &[("nominatim", include_str!("../services/nominatim.toml"))];

#[cfg(test)]
const EXPECTED_SERVICE_COUNT: usize = 1;

/// Returns all geocoding service configurations (enabled and disabled).
///
/// # Panics
///
/// Panics if any TOML config is malformed (the configs are embedded, so
/// this is caught by the registry tests).
#[must_use]
pub fn all_services() -> Vec<GeocodingService> {
    SERVICE_TOMLS
        .iter()
        .map(|(name, toml_str)| {
            toml::de::from_str(toml_str)
                .unwrap_or_else(|e| panic!("Failed to parse geocoding service '{name}': {e}"))
        })
        .collect()
}

/// Returns only enabled services, sorted by priority (ascending).
#[must_use]
pub fn enabled_services() -> Vec<GeocodingService> {
    let mut services: Vec<GeocodingService> =
        all_services().into_iter().filter(|s| s.enabled).collect();
    services.sort_by_key(|s| s.priority);
    services
}

/// Returns the highest-priority enabled service, if any.
#[must_use]
pub fn default_service() -> Option<GeocodingService> {
    enabled_services().into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn loads_all_services() {
        assert_eq!(all_services().len(), EXPECTED_SERVICE_COUNT);
    }

    #[test]
    fn service_ids_are_unique() {
        let mut seen = BTreeSet::new();
        for svc in &all_services() {
            assert!(seen.insert(svc.id.clone()), "Duplicate service ID: {}", svc.id);
        }
    }

    #[test]
    fn all_services_have_required_fields() {
        for svc in &all_services() {
            assert!(!svc.id.is_empty(), "Service has empty id");
            assert!(!svc.name.is_empty(), "Service {} has empty name", svc.id);
            assert!(!svc.base_url().is_empty(), "Service {} has empty base_url", svc.id);
        }
    }

    #[test]
    fn nominatim_defaults_match_public_usage_policy() {
        let svc = default_service().unwrap();
        assert_eq!(svc.id, "nominatim");
        assert_eq!(svc.rate_limit(), Duration::from_secs(1));
        let ProviderConfig::Nominatim {
            language,
            timeout_secs,
            user_agent,
            ..
        } = &svc.provider;
        assert_eq!(language, "id");
        assert_eq!(*timeout_secs, 10);
        assert!(!user_agent.is_empty());
    }
}
