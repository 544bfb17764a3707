//! Emergency alert pipeline
//!
//! Records audio, locates the device, notifies every emergency contact by
//! SMS and logs the alert. See [`AlertOrchestrator`].

pub mod message;
pub mod orchestrator;
pub mod state;

pub use orchestrator::{AlertOrchestrator, AlertOutcome, AlertServices};
pub use state::{AlertProgress, AlertState, FailureChoice, FailurePrompt, TriggerSource};

use crate::location::LocationError;
use crate::platform::{DispatchError, PermissionError, RecordingError};
use crate::store::StoreError;

/// Terminal failure of one alert run
///
/// The display text is shown to the user as the failure reason.
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("Recording failed: {0}")]
    Recording(#[from] RecordingError),

    #[error("Could not determine location: {0}")]
    Location(#[from] LocationError),

    #[error("No emergency contacts configured. Please add contacts first.")]
    NoContacts,

    #[error("Failed to send SMS: {0}")]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Permission(#[from] PermissionError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("An emergency alert is already in progress")]
    AlreadyRunning,
}
