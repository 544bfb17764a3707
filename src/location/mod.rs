//! Location acquisition
//!
//! The device location service and the reverse geocoder are collaborators
//! supplied by the host. This module defines their contracts and the two
//! ways the app resolves "where am I":
//!
//! - [`resolve`] for the alert flow, where a provider failure is an error
//! - [`resolve_for_display`] for the idle screen, which falls back to a fixed
//!   default position instead

pub mod nominatim;

pub use nominatim::NominatimGeocoder;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Latitude shown when no fix is available on the idle screen
pub const FALLBACK_LATITUDE: f64 = -1.2921;

/// Longitude shown when no fix is available on the idle screen
pub const FALLBACK_LONGITUDE: f64 = 36.8219;

/// Address shown when no fix is available on the idle screen
pub const FALLBACK_ADDRESS: &str = "Location unavailable";

/// Upper bound on a single location request
pub const DEFAULT_LOCATION_TIMEOUT: Duration = Duration::from_secs(15);

/// A position fix from the device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy in metres, if reported
    pub accuracy: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// A position with a human-readable address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    pub address: String,
}

impl ResolvedLocation {
    /// The fixed position used when the idle screen has no fix
    pub fn fallback() -> Self {
        Self {
            latitude: FALLBACK_LATITUDE,
            longitude: FALLBACK_LONGITUDE,
            accuracy: None,
            address: FALLBACK_ADDRESS.to_string(),
        }
    }

    /// Address if known, otherwise the coordinates
    pub fn display_label(&self) -> String {
        if self.address.trim().is_empty() {
            coordinate_label(self.latitude, self.longitude)
        } else {
            self.address.clone()
        }
    }
}

/// Location errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LocationError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Location request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Location unavailable: {0}")]
    Unavailable(String),
}

/// Device location service
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Requests a fresh high-accuracy fix
    async fn current_location(&self) -> Result<LocationFix, LocationError>;
}

/// Coordinate to address lookup
///
/// Implementations never fail: on any error they return
/// [`coordinate_label`] for the input.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn reverse_geocode(&self, latitude: f64, longitude: f64) -> String;
}

/// Geocoder that always answers with the coordinates
#[derive(Debug, Clone, Copy, Default)]
pub struct CoordinateGeocoder;

#[async_trait]
impl Geocoder for CoordinateGeocoder {
    async fn reverse_geocode(&self, latitude: f64, longitude: f64) -> String {
        coordinate_label(latitude, longitude)
    }
}

/// Formats coordinates as `"lat, lon"` with six decimals
pub fn coordinate_label(latitude: f64, longitude: f64) -> String {
    format!("{:.6}, {:.6}", latitude, longitude)
}

/// Resolves the current location and address for the alert flow
pub async fn resolve(
    provider: &dyn LocationProvider,
    geocoder: &dyn Geocoder,
    timeout: Duration,
) -> Result<ResolvedLocation, LocationError> {
    let fix = tokio::time::timeout(timeout, provider.current_location())
        .await
        .map_err(|_| LocationError::Timeout(timeout))??;

    let address = geocoder.reverse_geocode(fix.latitude, fix.longitude).await;

    tracing::debug!(
        "Resolved location (accuracy={:?}m) to '{}'",
        fix.accuracy,
        address
    );

    Ok(ResolvedLocation {
        latitude: fix.latitude,
        longitude: fix.longitude,
        accuracy: fix.accuracy,
        address,
    })
}

/// Resolves the location for display, falling back to the default position
pub async fn resolve_for_display(
    provider: &dyn LocationProvider,
    geocoder: &dyn Geocoder,
    timeout: Duration,
) -> ResolvedLocation {
    match resolve(provider, geocoder, timeout).await {
        Ok(location) => location,
        Err(e) => {
            tracing::warn!("Location unavailable for display, using fallback: {}", e);
            ResolvedLocation::fallback()
        }
    }
}
