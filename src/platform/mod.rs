//! Device services the host shell provides
//!
//! Audio capture, SMS dispatch and OS permissions are reached through these
//! traits. The mobile shell implements them over the platform SDKs; tests
//! and host-less runs use [`memory`].

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Audio capture errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordingError {
    #[error("Microphone permission denied")]
    PermissionDenied,

    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Recording was never started")]
    NotStarted,

    #[error("Failed to save recording: {0}")]
    SaveFailed(String),
}

/// SMS dispatch errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    #[error("SMS is not available on this device")]
    Unavailable,

    #[error("SMS permission denied")]
    PermissionDenied,

    #[error("Failed to send message: {0}")]
    SendFailed(String),
}

/// A required OS permission that was not granted
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Permissions not granted: {}", join_permissions(.missing))]
pub struct PermissionError {
    pub missing: Vec<Permission>,
}

fn join_permissions(missing: &[Permission]) -> String {
    missing
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// OS permissions the app relies on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Permission {
    RecordAudio,
    FineLocation,
    CoarseLocation,
    SendSms,
}

impl Permission {
    /// Every permission, in the order the shell requests them
    pub const ALL: [Permission; 4] = [
        Permission::RecordAudio,
        Permission::FineLocation,
        Permission::CoarseLocation,
        Permission::SendSms,
    ];
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Permission::RecordAudio => "record audio",
            Permission::FineLocation => "fine location",
            Permission::CoarseLocation => "coarse location",
            Permission::SendSms => "send SMS",
        };
        f.write_str(name)
    }
}

/// Microphone recording
///
/// `stop` must fail with [`RecordingError::NotStarted`] if `start` never
/// succeeded.
#[async_trait]
pub trait AudioCapture: Send + Sync {
    async fn start(&self) -> Result<(), RecordingError>;

    /// Stops recording and returns where the clip was saved
    async fn stop(&self) -> Result<String, RecordingError>;
}

/// Text message channel
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send(&self, recipients: &[String], body: &str) -> Result<(), DispatchError>;
}

/// OS permission state
#[async_trait]
pub trait PermissionChecker: Send + Sync {
    async fn is_granted(&self, permission: Permission) -> bool;
}

/// Lists the permissions from `required` that are not granted
pub async fn missing_permissions(
    checker: &dyn PermissionChecker,
    required: &[Permission],
) -> Vec<Permission> {
    let mut missing = Vec::new();
    for &permission in required {
        if !checker.is_granted(permission).await {
            missing.push(permission);
        }
    }
    missing
}

/// Fails if any of `required` is not granted
pub async fn ensure_granted(
    checker: &dyn PermissionChecker,
    required: &[Permission],
) -> Result<(), PermissionError> {
    let missing = missing_permissions(checker, required).await;
    if missing.is_empty() {
        Ok(())
    } else {
        Err(PermissionError { missing })
    }
}
