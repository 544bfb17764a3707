//! Application core
//!
//! [`SafetyApp`] owns the settings, stores, dormancy monitor and alert
//! orchestrator, and turns dormancy events into either a prompt or an
//! automatic alert. The host shell drives it and listens for [`AppEvent`]s.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use url::Url;

use crate::alert::{
    AlertError, AlertOrchestrator, AlertOutcome, AlertServices, FailurePrompt, TriggerSource,
};
use crate::clock::Clock;
use crate::config::{AppIdentity, ConfigError, SettingChange, Settings, SettingsStore};
use crate::dormancy::{DormancyEvent, DormancyService, MonitorConfig, SampleFeed};
use crate::location::{self, ResolvedLocation, DEFAULT_LOCATION_TIMEOUT};
use crate::platform::{ensure_granted, Permission, PermissionError};
use crate::store::{ContactStore, EmergencyContact, HistoryStore, KeyValueStore, StoreError};

/// Deep link opened by the quick-settings tile and home-screen widget
pub const SOS_DEEP_LINK: &str = "angaza://sos";

/// Buffered app events per subscriber
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Asks the user whether they are okay
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DormancyPrompt {
    pub title: String,
    pub message: String,
    pub event: DormancyEvent,
}

impl DormancyPrompt {
    pub fn from_event(event: DormancyEvent) -> Self {
        Self {
            title: "Dormancy Alert".to_string(),
            message: format!(
                "No movement detected for {} minutes. Are you okay?",
                event.minutes()
            ),
            event,
        }
    }
}

/// The user's answer to a [`DormancyPrompt`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DormancyResponse {
    /// "I'm OK": dismiss
    ImOk,
    /// "Send SOS": run the alert
    SendSos,
}

/// Notifications for the host shell
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum AppEvent {
    DormancyPrompt(DormancyPrompt),
    AlertSent(AlertOutcome),
    AlertFailed(FailurePrompt),
}

/// The assembled application
pub struct SafetyApp {
    store: Arc<dyn KeyValueStore>,
    settings: Arc<SettingsStore>,
    contacts: Arc<ContactStore>,
    history: Arc<HistoryStore>,
    services: AlertServices,
    orchestrator: Arc<AlertOrchestrator>,
    dormancy: DormancyService,
    events: broadcast::Sender<AppEvent>,
    responder: Mutex<Option<JoinHandle<()>>>,
}

impl SafetyApp {
    /// Loads settings from `store` and wires the components together
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        services: AlertServices,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let settings = Arc::new(SettingsStore::load(store.clone())?);
        let contacts = Arc::new(ContactStore::new(store.clone()));
        let history = Arc::new(HistoryStore::new(store.clone()));

        let orchestrator = Arc::new(AlertOrchestrator::new(
            services.clone(),
            contacts.clone(),
            history.clone(),
            settings.clone(),
            clock.clone(),
        ));

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        tracing::info!("Angaza core ready");

        Ok(Self {
            store,
            settings,
            contacts,
            history,
            services,
            orchestrator,
            dormancy: DormancyService::new(clock),
            events,
            responder: Mutex::new(None),
        })
    }

    pub fn settings(&self) -> Settings {
        self.settings.get()
    }

    /// Persists one settings change
    ///
    /// A new dormancy threshold applies from the next monitoring start.
    pub fn update_setting(&self, change: SettingChange) -> Result<Settings, ConfigError> {
        self.settings.apply(change)
    }

    pub fn identity(&self) -> AppIdentity {
        self.settings.get().identity()
    }

    pub fn contacts(&self) -> &ContactStore {
        &self.contacts
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn orchestrator(&self) -> &Arc<AlertOrchestrator> {
        &self.orchestrator
    }

    /// Receives prompts and alert results from now on
    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.events.subscribe()
    }

    // -------------------------------------------------------------------------
    // Dormancy
    // -------------------------------------------------------------------------

    /// Starts dormancy monitoring. Returns false if already monitoring.
    pub fn start_monitoring(&self) -> bool {
        // Held across start and spawn so a concurrent stop sees both or neither
        let mut responder = self.responder.lock();

        let events = self.dormancy.subscribe();
        let config = MonitorConfig::from_settings(&self.settings.get());
        if !self.dormancy.start(config) {
            return false;
        }

        let task = tokio::spawn(respond_to_dormancy(
            events,
            self.settings.clone(),
            self.orchestrator.clone(),
            self.events.clone(),
        ));
        if let Some(previous) = responder.replace(task) {
            previous.abort();
        }
        true
    }

    /// Stops dormancy monitoring. A running alert is not affected.
    pub fn stop_monitoring(&self) -> bool {
        let mut responder = self.responder.lock();
        let stopped = self.dormancy.stop();
        if let Some(task) = responder.take() {
            task.abort();
        }
        stopped
    }

    pub fn is_monitoring(&self) -> bool {
        self.dormancy.is_active()
    }

    /// Where the shell should push sensor readings, while monitoring
    pub fn sample_feed(&self) -> Option<SampleFeed> {
        self.dormancy.sample_feed()
    }

    /// Acts on the user's answer to a dormancy prompt
    pub async fn respond_to_prompt(
        &self,
        response: DormancyResponse,
    ) -> Result<Option<AlertOutcome>, AlertError> {
        match response {
            DormancyResponse::ImOk => {
                tracing::info!("User confirmed they are okay");
                Ok(None)
            }
            DormancyResponse::SendSos => self
                .orchestrator
                .trigger(TriggerSource::Dormancy)
                .await
                .map(Some),
        }
    }

    // -------------------------------------------------------------------------
    // Alerts
    // -------------------------------------------------------------------------

    /// Runs the alert pipeline from the SOS button
    pub async fn trigger_sos(&self) -> Result<AlertOutcome, AlertError> {
        self.orchestrator.trigger(TriggerSource::Manual).await
    }

    /// Handles a tile, widget or deep-link activation
    ///
    /// Starts a background alert for `angaza://sos` and returns its handle;
    /// any other URI is ignored.
    pub fn handle_external_trigger(
        &self,
        uri: &str,
    ) -> Option<JoinHandle<Result<AlertOutcome, AlertError>>> {
        if !is_sos_link(uri) {
            tracing::debug!("Ignoring external trigger: {}", uri);
            return None;
        }

        tracing::info!("External SOS trigger received");
        Some(spawn_alert(
            self.orchestrator.clone(),
            self.events.clone(),
            TriggerSource::External,
        ))
    }

    pub async fn send_test_message(&self, contact: &EmergencyContact) -> Result<(), AlertError> {
        self.orchestrator.send_test_message(contact).await
    }

    // -------------------------------------------------------------------------
    // Device
    // -------------------------------------------------------------------------

    /// Reports every permission the app needs but does not have
    ///
    /// Informational only; each step checks again when it runs.
    pub async fn check_permissions(&self) -> Result<(), PermissionError> {
        let Some(checker) = &self.services.permissions else {
            return Ok(());
        };

        let result = ensure_granted(checker.as_ref(), &Permission::ALL).await;
        if let Err(e) = &result {
            tracing::warn!("{}", e);
        }
        result
    }

    /// Location for the idle screen, with the default fallback
    pub async fn current_location_for_display(&self) -> ResolvedLocation {
        location::resolve_for_display(
            self.services.location.as_ref(),
            self.services.geocoder.as_ref(),
            DEFAULT_LOCATION_TIMEOUT,
        )
        .await
    }

    /// Stops monitoring and erases everything stored on the device
    pub fn clear_all_data(&self) -> Result<(), StoreError> {
        self.stop_monitoring();
        self.store.clear()?;
        self.settings.reset_cache();
        tracing::info!("All app data cleared");
        Ok(())
    }
}

impl Drop for SafetyApp {
    fn drop(&mut self) {
        if let Some(responder) = self.responder.lock().take() {
            responder.abort();
        }
    }
}

fn is_sos_link(uri: &str) -> bool {
    let Ok(url) = Url::parse(uri.trim()) else {
        return false;
    };

    url.scheme() == "angaza"
        && url.host_str() == Some("sos")
        && matches!(url.path(), "" | "/")
}

/// Runs an alert in its own task and reports the result as an [`AppEvent`]
fn spawn_alert(
    orchestrator: Arc<AlertOrchestrator>,
    events: broadcast::Sender<AppEvent>,
    source: TriggerSource,
) -> JoinHandle<Result<AlertOutcome, AlertError>> {
    tokio::spawn(async move {
        let result = orchestrator.trigger(source).await;
        match &result {
            Ok(outcome) => {
                let _ = events.send(AppEvent::AlertSent(outcome.clone()));
            }
            Err(AlertError::AlreadyRunning) => {
                tracing::debug!("Alert already running, {:?} trigger dropped", source);
            }
            Err(e) => {
                let _ = events.send(AppEvent::AlertFailed(FailurePrompt::from_error(e, source)));
            }
        }
        result
    })
}

/// Turns dormancy events into prompts or automatic alerts
async fn respond_to_dormancy(
    mut dormancy_events: broadcast::Receiver<DormancyEvent>,
    settings: Arc<SettingsStore>,
    orchestrator: Arc<AlertOrchestrator>,
    events: broadcast::Sender<AppEvent>,
) {
    // Movement instant of the episode that last auto-triggered; the
    // evaluator keeps reporting the same episode until movement is seen
    let mut triggered_episode: Option<DateTime<Utc>> = None;

    loop {
        let event = match dormancy_events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Dormancy responder lagged, skipped {} event(s)", skipped);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        if settings.get().auto_trigger {
            if triggered_episode == Some(event.last_movement_at) {
                tracing::debug!("Dormancy episode already auto-triggered, ignoring");
                continue;
            }
            if orchestrator.is_running() {
                tracing::debug!("Dormancy event while alert running, ignoring");
                continue;
            }
            triggered_episode = Some(event.last_movement_at);
            tracing::warn!("Auto-triggering alert after {} minutes of dormancy", event.minutes());
            // Detached so stopping monitoring cannot cancel the run
            drop(spawn_alert(
                orchestrator.clone(),
                events.clone(),
                TriggerSource::Dormancy,
            ));
        } else {
            let _ = events.send(AppEvent::DormancyPrompt(DormancyPrompt::from_event(event)));
        }
    }
}
