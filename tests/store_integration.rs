//! Store integration tests.
//!
//! Exercises contacts, history and settings against a file-backed SQLite
//! store in a temporary directory, including reopening the database.

use std::sync::Arc;

use angaza_lib::alert::TriggerSource;
use angaza_lib::config::{SettingChange, SettingsStore, SETTINGS_KEY};
use angaza_lib::location::ResolvedLocation;
use angaza_lib::store::{
    AlertRecord, ContactStore, HistoryStore, KeyValueStore, NewContact, SqliteStore,
    CONTACTS_KEY,
};
use chrono::Utc;
use tempfile::TempDir;

fn open(dir: &TempDir) -> Arc<dyn KeyValueStore> {
    Arc::new(
        SqliteStore::open(dir.path().join("data").join("angaza.db"))
            .expect("Failed to open store"),
    )
}

// =============================================================================
// Contacts
// =============================================================================

#[test]
fn test_contact_round_trip_survives_reopen() {
    let dir = TempDir::new().unwrap();

    let added = {
        let contacts = ContactStore::new(open(&dir));
        contacts
            .add(NewContact::new("Jane", "+15551234567").with_relation("Sister"))
            .unwrap()
    };

    let contacts = ContactStore::new(open(&dir));
    let listed = contacts.list().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, added.id);
    assert_eq!(listed[0].name, "Jane");
    assert_eq!(listed[0].phone, "+15551234567");
    assert_eq!(listed[0].relation.as_deref(), Some("Sister"));
}

#[test]
fn test_contacts_are_stored_under_legacy_key() {
    let dir = TempDir::new().unwrap();
    let kv = open(&dir);

    ContactStore::new(kv.clone())
        .add(NewContact::new("Jane", "+15551234567"))
        .unwrap();

    let raw = kv.get(CONTACTS_KEY).unwrap().unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json[0]["name"], "Jane");
    assert!(json[0].get("relation").is_none());
}

// =============================================================================
// History
// =============================================================================

#[test]
fn test_history_order_survives_reopen() {
    let dir = TempDir::new().unwrap();

    {
        let history = HistoryStore::new(open(&dir));
        for message in ["first", "second", "third"] {
            history
                .prepend(AlertRecord::sent(
                    Utc::now(),
                    message,
                    "/audio.m4a",
                    ResolvedLocation::fallback(),
                    1,
                    TriggerSource::Manual,
                ))
                .unwrap();
        }
    }

    let history = HistoryStore::new(open(&dir));
    let messages: Vec<String> = history
        .list()
        .unwrap()
        .into_iter()
        .map(|r| r.message)
        .collect();
    assert_eq!(messages, vec!["third", "second", "first"]);
}

// =============================================================================
// Settings
// =============================================================================

#[test]
fn test_legacy_settings_are_migrated_on_disk() {
    let dir = TempDir::new().unwrap();
    open(&dir)
        .set(
            SETTINGS_KEY,
            r#"{"stealthMode":true,"autoTrigger":true,"dormancyTime":"25","recordingDuration":"10"}"#,
        )
        .unwrap();

    let settings = SettingsStore::load(open(&dir)).unwrap().get();
    assert!(settings.auto_trigger);
    assert_eq!(settings.dormancy_threshold_minutes, 25);
    assert_eq!(settings.recording_duration_seconds, 10);

    let raw = open(&dir).get(SETTINGS_KEY).unwrap().unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["version"], 1);
    assert_eq!(json["dormancyThresholdMinutes"], 25);
}

#[test]
fn test_each_setting_change_is_persisted() {
    let dir = TempDir::new().unwrap();

    let settings = SettingsStore::load(open(&dir)).unwrap();
    settings.apply(SettingChange::AutoTrigger(true)).unwrap();
    settings.apply(SettingChange::StealthMode(false)).unwrap();

    let reloaded = SettingsStore::load(open(&dir)).unwrap().get();
    assert!(reloaded.auto_trigger);
    assert!(!reloaded.stealth_mode);
    assert_eq!(reloaded.identity().name, "Angaza SOS");
}

#[test]
fn test_clear_removes_everything() {
    let dir = TempDir::new().unwrap();
    let kv = open(&dir);

    ContactStore::new(kv.clone())
        .add(NewContact::new("Jane", "1"))
        .unwrap();
    SettingsStore::load(kv.clone())
        .unwrap()
        .apply(SettingChange::AutoTrigger(true))
        .unwrap();

    kv.clear().unwrap();

    assert!(kv.keys_with_prefix("").unwrap().is_empty());
    assert!(!SettingsStore::load(kv).unwrap().get().auto_trigger);
}
