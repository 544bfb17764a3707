//! Nominatim reverse geocoding client
//!
//! Looks up a street address for coordinates via the OpenStreetMap
//! Nominatim `/reverse` endpoint. Any failure degrades to the plain
//! coordinate string, so callers never see an error.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use super::{coordinate_label, Geocoder};

/// Public Nominatim instance
const DEFAULT_NOMINATIM_BASE_URL: &str = "https://nominatim.openstreetmap.org";

/// Nominatim rejects requests without an identifying User-Agent
const DEFAULT_USER_AGENT: &str = "AngazaSafety/1.0";

/// Default timeout for geocoding requests in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Street-level detail
const ZOOM_LEVEL: &str = "18";

/// Response from the reverse endpoint
#[derive(Debug, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    display_name: Option<String>,
}

/// Error types for geocoding requests
#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    #[error("Invalid base URL: {0}")]
    InvalidUrl(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    #[error("Server error ({status})")]
    ServerError { status: u16 },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("No address for coordinates")]
    NoAddress,
}

/// HTTP reverse geocoder backed by Nominatim
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl Default for NominatimGeocoder {
    fn default() -> Self {
        Self::new()
    }
}

impl NominatimGeocoder {
    /// Create a geocoder for the public Nominatim instance
    pub fn new() -> Self {
        Self::with_config(DEFAULT_NOMINATIM_BASE_URL, DEFAULT_TIMEOUT_SECS)
    }

    /// Create a geocoder for a custom instance
    ///
    /// # Arguments
    ///
    /// * `base_url` - Server base URL (e.g., "https://nominatim.example.org")
    /// * `timeout_secs` - Request timeout in seconds
    pub fn with_config(base_url: &str, timeout_secs: u64) -> Self {
        let timeout = Duration::from_secs(timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to configure geocoding client, using defaults: {}", e);
                reqwest::Client::new()
            });

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout,
        }
    }

    /// Get the configured timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Build the reverse lookup URL for coordinates
    fn reverse_url(&self, latitude: f64, longitude: f64) -> Result<Url, GeocodeError> {
        Url::parse_with_params(
            &format!("{}/reverse", self.base_url),
            &[
                ("format", "json".to_string()),
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
                ("zoom", ZOOM_LEVEL.to_string()),
                ("addressdetails", "1".to_string()),
            ],
        )
        .map_err(|e| GeocodeError::InvalidUrl(e.to_string()))
    }

    /// Look up an address, surfacing failures
    pub async fn lookup(&self, latitude: f64, longitude: f64) -> Result<String, GeocodeError> {
        let url = self.reverse_url(latitude, longitude)?;

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                GeocodeError::Timeout(self.timeout.as_secs())
            } else {
                GeocodeError::ConnectionFailed(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(GeocodeError::ServerError {
                status: response.status().as_u16(),
            });
        }

        let body: ReverseResponse = response
            .json()
            .await
            .map_err(|e| GeocodeError::ParseError(e.to_string()))?;

        parse_display_name(body)
    }
}

fn parse_display_name(body: ReverseResponse) -> Result<String, GeocodeError> {
    body.display_name
        .filter(|name| !name.trim().is_empty())
        .ok_or(GeocodeError::NoAddress)
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn reverse_geocode(&self, latitude: f64, longitude: f64) -> String {
        match self.lookup(latitude, longitude).await {
            Ok(address) => address,
            Err(e) => {
                tracing::warn!("Reverse geocoding failed, using coordinates: {}", e);
                coordinate_label(latitude, longitude)
            }
        }
    }
}
