//! Alert pipeline state and user-facing prompts

use serde::{Deserialize, Serialize};

use super::AlertError;

/// Observable phase of the alert pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    /// No alert running
    #[default]
    Idle,
    /// Capturing the audio clip
    Recording,
    /// Locating, loading contacts and sending
    Processing,
}

impl AlertState {
    /// Returns a user-friendly description of the state
    pub fn description(&self) -> &'static str {
        match self {
            AlertState::Idle => "Ready",
            AlertState::Recording => "Recording your emergency message...",
            AlertState::Processing => "Sending alert...",
        }
    }

    pub fn is_busy(&self) -> bool {
        !matches!(self, AlertState::Idle)
    }
}

/// What started an alert run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSource {
    /// The SOS button
    #[default]
    Manual,
    /// A dormancy event, confirmed or auto-triggered
    Dormancy,
    /// Quick-settings tile, widget or deep link
    External,
}

/// Emitted on every state change
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertProgress {
    pub state: AlertState,
    pub trigger: TriggerSource,
    pub description: String,
    /// Set when the run ended in failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AlertProgress {
    pub(crate) fn new(state: AlertState, trigger: TriggerSource) -> Self {
        Self {
            state,
            trigger,
            description: state.description().to_string(),
            error: None,
        }
    }

    pub(crate) fn failed(trigger: TriggerSource, error: &AlertError) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(AlertState::Idle, trigger)
        }
    }
}

/// The user's answer to a failed run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureChoice {
    /// Re-run the whole pipeline
    Retry,
    /// Return to idle
    Cancel,
}

/// Shown after a failed run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailurePrompt {
    pub title: String,
    pub reason: String,
    pub choices: [FailureChoice; 2],
    pub trigger: TriggerSource,
}

impl FailurePrompt {
    pub fn from_error(error: &AlertError, trigger: TriggerSource) -> Self {
        Self {
            title: "Error".to_string(),
            reason: error.to_string(),
            choices: [FailureChoice::Retry, FailureChoice::Cancel],
            trigger,
        }
    }
}
