//! Nominatim / OpenStreetMap reverse geocoder client.
//!
//! The public instance allows at most **1 request per second** and
//! requires an identifying `User-Agent`. Pacing is the caller's job (see
//! [`crate::resolver::RegionResolver`]); this client only issues single
//! requests with a bounded timeout.
//!
//! See <https://nominatim.org/release-docs/develop/api/Reverse/>

use std::time::Duration;

use crate::service_registry::{GeocodingService, ProviderConfig};
use crate::{GeocodeError, ReverseAddress, ReverseGeocoder};

/// Reverse geocoding client for a Nominatim instance.
#[derive(Debug, Clone)]
pub struct NominatimClient {
    client: reqwest::Client,
    base_url: String,
    language: String,
    zoom: Option<u8>,
}

impl NominatimClient {
    /// Builds a client with its own HTTP connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Http`] if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        user_agent: &str,
        language: &str,
        timeout: Duration,
        zoom: Option<u8>,
    ) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            language: language.to_string(),
            zoom,
        })
    }

    /// Builds a client from a registry entry, optionally overriding the
    /// endpoint URL and language.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Http`] if the HTTP client cannot be built.
    pub fn from_service(
        service: &GeocodingService,
        base_url_override: Option<&str>,
        language_override: Option<&str>,
    ) -> Result<Self, GeocodeError> {
        let ProviderConfig::Nominatim {
            base_url,
            user_agent,
            language,
            timeout_secs,
            zoom,
            ..
        } = &service.provider;

        Self::new(
            base_url_override.unwrap_or(base_url),
            user_agent,
            language_override.unwrap_or(language),
            Duration::from_secs(*timeout_secs),
            *zoom,
        )
    }
}

#[async_trait::async_trait]
impl ReverseGeocoder for NominatimClient {
    async fn reverse(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<ReverseAddress>, GeocodeError> {
        let lat = latitude.to_string();
        let lon = longitude.to_string();
        let mut params = vec![
            ("lat", lat),
            ("lon", lon),
            ("format", "jsonv2".to_string()),
            ("addressdetails", "1".to_string()),
            ("accept-language", self.language.clone()),
        ];
        if let Some(zoom) = self.zoom {
            params.push(("zoom", zoom.to_string()));
        }

        let resp = self.client.get(&self.base_url).query(&params).send().await?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GeocodeError::RateLimited);
        }
        if !status.is_success() {
            return Err(GeocodeError::Status(status.as_u16()));
        }

        let body: serde_json::Value = resp.json().await?;
        parse_reverse_response(&body)
    }
}

/// Parses a Nominatim `jsonv2` reverse response.
///
/// Nominatim answers "nothing here" (e.g. open sea) with an object
/// carrying an `error` field; that maps to `Ok(None)`, as does a result
/// without an `address` object.
fn parse_reverse_response(body: &serde_json::Value) -> Result<Option<ReverseAddress>, GeocodeError> {
    let obj = body.as_object().ok_or_else(|| GeocodeError::Parse {
        message: "Nominatim reverse response is not an object".to_string(),
    })?;

    if let Some(err) = obj.get("error") {
        log::debug!("Nominatim reverse: {err}");
        return Ok(None);
    }

    let Some(address) = obj.get("address").and_then(serde_json::Value::as_object) else {
        return Ok(None);
    };

    let components = address
        .iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
        .collect();

    Ok(Some(ReverseAddress { components }))
}
