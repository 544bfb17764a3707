//! In-memory device services
//!
//! Scripted stand-ins for the host shell's audio, SMS, location and
//! permission services. Each records the calls it receives so tests can
//! assert on them.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{
    AudioCapture, DispatchError, NotificationDispatcher, Permission, PermissionChecker,
    RecordingError,
};
use crate::location::{Geocoder, LocationError, LocationFix, LocationProvider};

// =============================================================================
// Audio
// =============================================================================

/// Audio capture that "records" to a fixed path
#[derive(Debug)]
pub struct ScriptedAudioCapture {
    path: String,
    start_error: Option<RecordingError>,
    started: Mutex<bool>,
    start_calls: AtomicUsize,
    stop_calls: AtomicUsize,
}

impl ScriptedAudioCapture {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            start_error: None,
            started: Mutex::new(false),
            start_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
        }
    }

    /// A capture whose `start` always fails with `error`
    pub fn failing_start(error: RecordingError) -> Self {
        Self {
            start_error: Some(error),
            ..Self::new("")
        }
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioCapture for ScriptedAudioCapture {
    async fn start(&self) -> Result<(), RecordingError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.start_error {
            return Err(err.clone());
        }
        *self.started.lock() = true;
        Ok(())
    }

    async fn stop(&self) -> Result<String, RecordingError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        let mut started = self.started.lock();
        if !*started {
            return Err(RecordingError::NotStarted);
        }
        *started = false;
        Ok(self.path.clone())
    }
}

// =============================================================================
// SMS
// =============================================================================

/// A message handed to [`RecordingDispatcher`]
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub recipients: Vec<String>,
    pub body: String,
}

/// Dispatcher that keeps every message instead of sending it
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    error: Option<DispatchError>,
    sent: Mutex<Vec<SentMessage>>,
    attempts: AtomicUsize,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A dispatcher whose every send fails with `error`
    pub fn failing(error: DispatchError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    /// Successfully sent messages, oldest first
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    /// Number of `send` calls, including failed ones
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn send(&self, recipients: &[String], body: &str) -> Result<(), DispatchError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        self.sent.lock().push(SentMessage {
            recipients: recipients.to_vec(),
            body: body.to_string(),
        });
        Ok(())
    }
}

// =============================================================================
// Location
// =============================================================================

/// Provider that always reports the same position
#[derive(Debug, Clone)]
pub struct FixedLocationProvider {
    latitude: f64,
    longitude: f64,
    accuracy: Option<f64>,
    delay: Option<Duration>,
}

impl FixedLocationProvider {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy: None,
            delay: None,
        }
    }

    pub fn with_accuracy(mut self, metres: f64) -> Self {
        self.accuracy = Some(metres);
        self
    }

    /// Delays every answer by `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl LocationProvider for FixedLocationProvider {
    async fn current_location(&self) -> Result<LocationFix, LocationError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(LocationFix {
            latitude: self.latitude,
            longitude: self.longitude,
            accuracy: self.accuracy,
            timestamp: Utc::now(),
        })
    }
}

/// Provider that always fails
#[derive(Debug, Clone)]
pub struct FailingLocationProvider {
    error: LocationError,
}

impl FailingLocationProvider {
    pub fn new(error: LocationError) -> Self {
        Self { error }
    }
}

#[async_trait]
impl LocationProvider for FailingLocationProvider {
    async fn current_location(&self) -> Result<LocationFix, LocationError> {
        Err(self.error.clone())
    }
}

/// Geocoder that answers every lookup with the same address
#[derive(Debug, Clone)]
pub struct StaticGeocoder {
    address: String,
}

impl StaticGeocoder {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

#[async_trait]
impl Geocoder for StaticGeocoder {
    async fn reverse_geocode(&self, _latitude: f64, _longitude: f64) -> String {
        self.address.clone()
    }
}

// =============================================================================
// Permissions
// =============================================================================

/// Fixed permission state
#[derive(Debug, Clone, Default)]
pub struct StaticPermissions {
    denied: HashSet<Permission>,
}

impl StaticPermissions {
    pub fn granting_all() -> Self {
        Self::default()
    }

    pub fn denying(denied: &[Permission]) -> Self {
        Self {
            denied: denied.iter().copied().collect(),
        }
    }
}

#[async_trait]
impl PermissionChecker for StaticPermissions {
    async fn is_granted(&self, permission: Permission) -> bool {
        !self.denied.contains(&permission)
    }
}
