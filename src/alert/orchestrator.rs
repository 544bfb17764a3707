//! Alert orchestrator
//!
//! Runs the emergency pipeline end to end:
//!
//! 1. Recording: start audio capture, wait the configured duration, stop
//! 2. Processing: resolve location, load contacts, send one SMS to all
//! 3. Log the alert to history
//!
//! Only one run may be active at a time, whatever triggered it. A failed
//! run is terminal; retrying starts again from step 1.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use super::message::{render_emergency_sms, render_test_sms, EMERGENCY_MESSAGE};
use super::state::{AlertProgress, AlertState, FailureChoice, TriggerSource};
use super::AlertError;
use crate::clock::Clock;
use crate::config::SettingsStore;
use crate::location::{self, Geocoder, LocationProvider, DEFAULT_LOCATION_TIMEOUT};
use crate::platform::{
    ensure_granted, AudioCapture, NotificationDispatcher, Permission, PermissionChecker,
};
use crate::store::{AlertRecord, ContactStore, EmergencyContact, HistoryStore};

/// Buffered progress events per subscriber
const PROGRESS_CHANNEL_CAPACITY: usize = 32;

/// Device services the pipeline drives
#[derive(Clone)]
pub struct AlertServices {
    pub audio: Arc<dyn AudioCapture>,
    pub location: Arc<dyn LocationProvider>,
    pub geocoder: Arc<dyn Geocoder>,
    pub dispatcher: Arc<dyn NotificationDispatcher>,
    /// Consulted before each step when present
    pub permissions: Option<Arc<dyn PermissionChecker>>,
}

/// Result of a successful run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertOutcome {
    pub record: AlertRecord,
    /// False if the SMS went out but the history write failed
    pub record_saved: bool,
}

impl AlertOutcome {
    pub fn contacts_notified(&self) -> usize {
        self.record.contacts_notified
    }
}

/// Resets the in-flight flag and state when a run ends, however it ends
struct RunGuard<'a> {
    orchestrator: &'a AlertOrchestrator,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *self.orchestrator.state.lock() = AlertState::Idle;
        self.orchestrator.running.store(false, Ordering::SeqCst);
    }
}

/// Runs the emergency pipeline
pub struct AlertOrchestrator {
    services: AlertServices,
    contacts: Arc<ContactStore>,
    history: Arc<HistoryStore>,
    settings: Arc<SettingsStore>,
    clock: Arc<dyn Clock>,
    location_timeout: Duration,
    running: AtomicBool,
    state: Mutex<AlertState>,
    progress: broadcast::Sender<AlertProgress>,
}

impl AlertOrchestrator {
    pub fn new(
        services: AlertServices,
        contacts: Arc<ContactStore>,
        history: Arc<HistoryStore>,
        settings: Arc<SettingsStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (progress, _) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);
        Self {
            services,
            contacts,
            history,
            settings,
            clock,
            location_timeout: DEFAULT_LOCATION_TIMEOUT,
            running: AtomicBool::new(false),
            state: Mutex::new(AlertState::Idle),
            progress,
        }
    }

    /// Overrides the upper bound on a location request
    pub fn with_location_timeout(mut self, timeout: Duration) -> Self {
        self.location_timeout = timeout;
        self
    }

    pub fn state(&self) -> AlertState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Receives every state change from now on
    pub fn subscribe(&self) -> broadcast::Receiver<AlertProgress> {
        self.progress.subscribe()
    }

    /// Runs the full pipeline
    ///
    /// Fails immediately with [`AlertError::AlreadyRunning`] if another run
    /// is in flight. Requests are never queued.
    pub async fn trigger(&self, source: TriggerSource) -> Result<AlertOutcome, AlertError> {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("Alert: already running, rejecting {:?} trigger", source);
            return Err(AlertError::AlreadyRunning);
        }
        let _guard = RunGuard { orchestrator: self };

        tracing::info!("Alert: triggered ({:?})", source);

        match self.run_pipeline(source).await {
            Ok(outcome) => {
                self.emit(AlertProgress::new(AlertState::Idle, source));
                tracing::info!(
                    "Alert: complete, {} contact(s) notified",
                    outcome.contacts_notified()
                );
                Ok(outcome)
            }
            Err(e) => {
                tracing::error!("Alert: failed: {}", e);
                self.emit(AlertProgress::failed(source, &e));
                Err(e)
            }
        }
    }

    /// Re-runs the whole pipeline after a failure
    pub async fn retry(&self, source: TriggerSource) -> Result<AlertOutcome, AlertError> {
        tracing::info!("Alert: retry requested");
        self.trigger(source).await
    }

    /// Acts on the user's answer to a failure prompt
    ///
    /// `Cancel` leaves the pipeline idle and returns `Ok(None)`.
    pub async fn resolve_failure(
        &self,
        choice: FailureChoice,
        source: TriggerSource,
    ) -> Result<Option<AlertOutcome>, AlertError> {
        match choice {
            FailureChoice::Retry => self.retry(source).await.map(Some),
            FailureChoice::Cancel => {
                tracing::info!("Alert: failure dismissed");
                Ok(None)
            }
        }
    }

    /// Sends a test SMS to one contact
    ///
    /// Uses the display location (with fallback), writes no history and
    /// does not take the in-flight guard.
    pub async fn send_test_message(&self, contact: &EmergencyContact) -> Result<(), AlertError> {
        self.require(&[Permission::SendSms]).await?;

        let location = location::resolve_for_display(
            self.services.location.as_ref(),
            self.services.geocoder.as_ref(),
            self.location_timeout,
        )
        .await;

        let body = render_test_sms(contact, &location);
        self.services
            .dispatcher
            .send(std::slice::from_ref(&contact.phone), &body)
            .await?;

        tracing::info!("Test message sent");
        Ok(())
    }

    async fn run_pipeline(&self, source: TriggerSource) -> Result<AlertOutcome, AlertError> {
        let settings = self.settings.get();

        // Recording
        self.set_state(AlertState::Recording, source);
        self.require(&[Permission::RecordAudio]).await?;
        self.services.audio.start().await?;

        let duration = settings.recording_duration();
        tracing::info!("Alert: recording for {}s", duration.as_secs());
        tokio::time::sleep(duration).await;

        let audio_path = self.services.audio.stop().await?;
        tracing::info!("Alert: recording saved");

        // Processing
        self.set_state(AlertState::Processing, source);
        self.require(&[Permission::FineLocation]).await?;
        let location = location::resolve(
            self.services.location.as_ref(),
            self.services.geocoder.as_ref(),
            self.location_timeout,
        )
        .await?;

        let contacts = self.contacts.list()?;
        if contacts.is_empty() {
            return Err(AlertError::NoContacts);
        }
        let recipients: Vec<String> = contacts.into_iter().map(|c| c.phone).collect();

        let sent_at = self.clock.now();
        let body = render_emergency_sms(EMERGENCY_MESSAGE, &location, sent_at);

        self.require(&[Permission::SendSms]).await?;
        self.services.dispatcher.send(&recipients, &body).await?;
        tracing::info!("Alert: SMS sent to {} contact(s)", recipients.len());

        let record = AlertRecord::sent(
            sent_at,
            EMERGENCY_MESSAGE,
            audio_path,
            location,
            recipients.len(),
            source,
        );

        // The SMS is out; a history failure must not turn this into an error
        let record_saved = match self.history.prepend(record.clone()) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Alert: failed to save history record: {}", e);
                false
            }
        };

        Ok(AlertOutcome {
            record,
            record_saved,
        })
    }

    async fn require(&self, permissions: &[Permission]) -> Result<(), AlertError> {
        if let Some(checker) = &self.services.permissions {
            ensure_granted(checker.as_ref(), permissions).await?;
        }
        Ok(())
    }

    fn set_state(&self, state: AlertState, source: TriggerSource) {
        *self.state.lock() = state;
        tracing::debug!("Alert: state -> {:?}", state);
        self.emit(AlertProgress::new(state, source));
    }

    fn emit(&self, progress: AlertProgress) {
        // No subscribers is fine
        let _ = self.progress.send(progress);
    }
}
