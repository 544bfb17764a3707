//! Alert pipeline integration tests.
//!
//! Runs the full record -> locate -> notify -> log sequence against
//! in-memory device services with Tokio's paused clock, so the 30 second
//! recording wait completes instantly.

use std::sync::Arc;
use std::time::Duration;

use angaza_lib::alert::{AlertError, AlertServices, AlertState, TriggerSource};
use angaza_lib::app::{AppEvent, SafetyApp};
use angaza_lib::clock::SystemClock;
use angaza_lib::location::{LocationError, LocationProvider};
use angaza_lib::platform::memory::{
    FailingLocationProvider, FixedLocationProvider, RecordingDispatcher, ScriptedAudioCapture,
    StaticGeocoder,
};
use angaza_lib::store::{AlertStatus, MemoryStore, NewContact};

struct Fixture {
    app: SafetyApp,
    audio: Arc<ScriptedAudioCapture>,
    dispatcher: Arc<RecordingDispatcher>,
}

fn fixture_with_location(location: Arc<dyn LocationProvider>) -> Fixture {
    let audio = Arc::new(ScriptedAudioCapture::new("/data/audio/incident.m4a"));
    let dispatcher = Arc::new(RecordingDispatcher::new());

    let services = AlertServices {
        audio: audio.clone(),
        location,
        geocoder: Arc::new(StaticGeocoder::new("Nairobi, Kenya")),
        dispatcher: dispatcher.clone(),
        permissions: None,
    };

    let app = SafetyApp::new(Arc::new(MemoryStore::new()), services, Arc::new(SystemClock))
        .expect("Failed to build app");

    Fixture {
        app,
        audio,
        dispatcher,
    }
}

fn fixture() -> Fixture {
    fixture_with_location(Arc::new(FixedLocationProvider::new(-1.29, 36.82)))
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_single_contact_nairobi_scenario() {
    let f = fixture();
    f.app
        .contacts()
        .add(NewContact::new("Jane", "+15551234567"))
        .unwrap();

    let outcome = f.app.trigger_sos().await.unwrap();

    assert_eq!(outcome.contacts_notified(), 1);
    assert!(outcome.record_saved);

    let sent = f.dispatcher.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipients, vec!["+15551234567"]);
    assert!(sent[0].body.contains("EMERGENCY"));
    assert!(sent[0].body.contains("Nairobi, Kenya"));

    let history = f.app.history().list().unwrap();
    assert_eq!(history.len(), 1);
    let record = &history[0];
    assert_eq!(record.location.address, "Nairobi, Kenya");
    assert_eq!(record.location.latitude, -1.29);
    assert_eq!(record.location.longitude, 36.82);
    assert_eq!(record.contacts_notified, 1);
    assert_eq!(record.status, AlertStatus::Sent);
    assert_eq!(record.audio_path, "/data/audio/incident.m4a");
    assert_eq!(record.trigger, TriggerSource::Manual);
}

#[tokio::test(start_paused = true)]
async fn test_contacts_notified_matches_recipients() {
    let f = fixture();
    for (name, phone) in [("A", "+1"), ("B", "+2"), ("C", "+3")] {
        f.app.contacts().add(NewContact::new(name, phone)).unwrap();
    }

    let outcome = f.app.trigger_sos().await.unwrap();

    let sent = f.dispatcher.sent();
    assert_eq!(sent[0].recipients, vec!["+1", "+2", "+3"]);
    assert_eq!(outcome.contacts_notified(), sent[0].recipients.len());
    assert_eq!(f.app.history().len().unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_no_contacts_fails_without_sending() {
    let f = fixture();
    let before = f.app.history().len().unwrap();

    let err = f.app.trigger_sos().await.unwrap_err();

    assert!(matches!(err, AlertError::NoContacts));
    assert_eq!(f.dispatcher.attempts(), 0);
    assert_eq!(f.app.history().len().unwrap(), before);
    assert_eq!(f.app.orchestrator().state(), AlertState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_location_failure_fails_alert() {
    let f = fixture_with_location(Arc::new(FailingLocationProvider::new(
        LocationError::PermissionDenied,
    )));
    f.app.contacts().add(NewContact::new("Jane", "1")).unwrap();

    let err = f.app.trigger_sos().await.unwrap_err();

    assert!(matches!(
        err,
        AlertError::Location(LocationError::PermissionDenied)
    ));
    assert_eq!(f.dispatcher.attempts(), 0);
    assert!(f.app.history().is_empty().unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_slow_location_times_out() {
    let f = fixture_with_location(Arc::new(
        FixedLocationProvider::new(-1.29, 36.82).with_delay(Duration::from_secs(60)),
    ));
    f.app.contacts().add(NewContact::new("Jane", "1")).unwrap();

    let err = f.app.trigger_sos().await.unwrap_err();
    assert!(matches!(err, AlertError::Location(LocationError::Timeout(_))));
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_concurrent_triggers_run_once() {
    let f = fixture();
    f.app.contacts().add(NewContact::new("Jane", "1")).unwrap();

    let orchestrator = f.app.orchestrator();
    let (manual, dormancy) = tokio::join!(
        orchestrator.trigger(TriggerSource::Manual),
        orchestrator.trigger(TriggerSource::Dormancy),
    );

    assert!(manual.is_ok());
    assert!(matches!(dormancy, Err(AlertError::AlreadyRunning)));
    assert_eq!(f.audio.start_calls(), 1);
    assert_eq!(f.dispatcher.sent().len(), 1);
    assert_eq!(f.app.history().len().unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_guard_released_after_run() {
    let f = fixture();
    f.app.contacts().add(NewContact::new("Jane", "1")).unwrap();

    f.app.trigger_sos().await.unwrap();
    f.app.trigger_sos().await.unwrap();

    assert_eq!(f.app.history().len().unwrap(), 2);
    assert!(!f.app.orchestrator().is_running());
}

// =============================================================================
// External trigger
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_deep_link_runs_alert_in_background() {
    let f = fixture();
    f.app.contacts().add(NewContact::new("Jane", "1")).unwrap();
    let mut events = f.app.subscribe();

    let handle = f
        .app
        .handle_external_trigger("angaza://sos")
        .expect("SOS link should start an alert");
    let outcome = handle.await.unwrap().unwrap();

    assert_eq!(outcome.record.trigger, TriggerSource::External);
    assert!(matches!(events.try_recv().unwrap(), AppEvent::AlertSent(_)));
}

#[tokio::test(start_paused = true)]
async fn test_deep_link_failure_offers_retry() {
    let f = fixture();
    let mut events = f.app.subscribe();

    let handle = f.app.handle_external_trigger("angaza://sos").unwrap();
    assert!(handle.await.unwrap().is_err());

    match events.try_recv().unwrap() {
        AppEvent::AlertFailed(prompt) => {
            assert!(prompt.reason.contains("No emergency contacts"));
            assert_eq!(prompt.trigger, TriggerSource::External);
        }
        other => panic!("unexpected event: {:?}", other),
    }
}
