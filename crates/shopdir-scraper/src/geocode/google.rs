use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{GeocodeProvider, LatLng};
use crate::error::{GeocodeProviderError, SetupError};
use crate::pacing::RequestPacer;

const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com";

/// Google Maps Geocoding API, paced to a requests-per-second limit.
pub struct GoogleGeocoder {
    client: Client,
    base_url: String,
    api_key: String,
    pacer: RequestPacer,
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: Location,
}

#[derive(Debug, Deserialize)]
struct Location {
    lat: f64,
    lng: f64,
}

impl GoogleGeocoder {
    /// # Errors
    ///
    /// Returns [`SetupError::Http`] if the HTTP client cannot be built.
    pub fn new(api_key: &str, requests_per_second: u32, timeout_secs: u64) -> Result<Self, SetupError> {
        Self::with_base_url(api_key, requests_per_second, timeout_secs, DEFAULT_BASE_URL)
    }

    /// Like [`GoogleGeocoder::new`] against another host, for tests.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::Http`] if the HTTP client cannot be built.
    pub fn with_base_url(
        api_key: &str,
        requests_per_second: u32,
        timeout_secs: u64,
        base_url: &str,
    ) -> Result<Self, SetupError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            pacer: RequestPacer::per_second(requests_per_second),
        })
    }
}

#[async_trait]
impl GeocodeProvider for GoogleGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<LatLng>, GeocodeProviderError> {
        self.pacer.wait().await;
        let url = format!("{}/maps/api/geocode/json", self.base_url);
        let body: GeocodeResponse = self
            .client
            .get(&url)
            .query(&[
                ("address", address),
                ("key", self.api_key.as_str()),
                ("language", "ja"),
                ("region", "jp"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match body.status.as_str() {
            "OK" => Ok(body.results.first().map(|r| LatLng {
                latitude: r.geometry.location.lat,
                longitude: r.geometry.location.lng,
            })),
            "ZERO_RESULTS" => Ok(None),
            _ => Err(GeocodeProviderError::Status {
                message: body.error_message.unwrap_or_default(),
                status: body.status,
            }),
        }
    }
}
