//! Settings management for Angaza
//!
//! Provides persistent app settings with schema versioning and migrations.
//! Settings are stored as one JSON object under the `appSettings` key and
//! cached in memory; every change is written through immediately.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::store::{JsonStoreExt, KeyValueStore, StoreError};

/// Current settings schema version
const CURRENT_VERSION: u32 = 1;

/// Key holding the settings object
pub const SETTINGS_KEY: &str = "appSettings";

/// Settings error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("Unknown settings version: {0}")]
    UnknownVersion(u32),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What to do while the user stays dormant after the first event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum RepeatPolicy {
    /// Raise an event on every check while dormant
    #[default]
    RepeatEveryCheck,
    /// Raise one event per dormant stretch; movement re-arms it
    OncePerEpisode,
}

/// User-facing app settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Schema version for migrations
    pub version: u32,
    /// Present the app under an innocuous name and icon
    pub stealth_mode: bool,
    /// Run the alert without asking when dormancy is detected
    pub auto_trigger: bool,
    /// Minutes without movement before dormancy is raised
    pub dormancy_threshold_minutes: u32,
    /// Length of the audio clip recorded per alert
    pub recording_duration_seconds: u32,
    /// Dormancy re-emit behaviour
    pub dormancy_repeat: RepeatPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            stealth_mode: true,
            auto_trigger: false,
            dormancy_threshold_minutes: 15,
            recording_duration_seconds: 30,
            dormancy_repeat: RepeatPolicy::default(),
        }
    }
}

/// A single settings field change, as made from the settings screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum SettingChange {
    StealthMode(bool),
    AutoTrigger(bool),
    DormancyThresholdMinutes(u32),
    RecordingDurationSeconds(u32),
    DormancyRepeat(RepeatPolicy),
}

/// Icon the launcher shows for the app
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AppIcon {
    Neutral,
    Emergency,
}

/// How the app presents itself on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AppIdentity {
    pub name: &'static str,
    pub icon: AppIcon,
}

impl Settings {
    /// Checks field ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dormancy_threshold_minutes < 1 {
            return Err(ConfigError::InvalidValue {
                field: "dormancyThresholdMinutes",
                reason: "must be at least 1 minute".to_string(),
            });
        }
        if self.recording_duration_seconds < 1 {
            return Err(ConfigError::InvalidValue {
                field: "recordingDurationSeconds",
                reason: "must be at least 1 second".to_string(),
            });
        }
        Ok(())
    }

    /// Applies one field change without validating
    pub fn apply(&mut self, change: SettingChange) {
        match change {
            SettingChange::StealthMode(v) => self.stealth_mode = v,
            SettingChange::AutoTrigger(v) => self.auto_trigger = v,
            SettingChange::DormancyThresholdMinutes(v) => self.dormancy_threshold_minutes = v,
            SettingChange::RecordingDurationSeconds(v) => self.recording_duration_seconds = v,
            SettingChange::DormancyRepeat(v) => self.dormancy_repeat = v,
        }
    }

    pub fn dormancy_threshold(&self) -> Duration {
        Duration::from_secs(u64::from(self.dormancy_threshold_minutes) * 60)
    }

    pub fn recording_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.recording_duration_seconds))
    }

    /// The name and icon the launcher should show
    pub fn identity(&self) -> AppIdentity {
        if self.stealth_mode {
            AppIdentity {
                name: "Weather",
                icon: AppIcon::Neutral,
            }
        } else {
            AppIdentity {
                name: "Angaza SOS",
                icon: AppIcon::Emergency,
            }
        }
    }
}

// =============================================================================
// Migration
// =============================================================================

/// Migrates a stored settings object to the current schema
///
/// Returns the settings and whether anything changed.
fn migrate_settings(mut value: Value) -> Result<(Settings, bool), ConfigError> {
    if !value.is_object() {
        tracing::warn!("Stored settings are not an object, using defaults");
        return Ok((Settings::default(), true));
    }

    let original_version = stored_version(&value);
    let mut version = original_version;

    while version < CURRENT_VERSION {
        value = apply_migration(value, version)?;
        version = stored_version(&value);
    }

    let settings: Settings = match serde_json::from_value(value) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!("Failed to parse settings, using defaults: {}", e);
            return Ok((Settings::default(), true));
        }
    };

    if version != original_version {
        tracing::info!(
            "Migrated settings from version {} to {}",
            original_version,
            version
        );
    }

    Ok((settings, version != original_version))
}

fn stored_version(value: &Value) -> u32 {
    value
        .get("version")
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(0)
}

/// Apply a single migration step
fn apply_migration(value: Value, version: u32) -> Result<Value, ConfigError> {
    match version {
        // Version 0 -> 1: legacy field names and string-typed numbers
        0 => {
            let mut object = match value {
                Value::Object(object) => object,
                _ => Map::new(),
            };

            rename_field(&mut object, "dormancyTime", "dormancyThresholdMinutes");
            rename_field(&mut object, "recordingDuration", "recordingDurationSeconds");
            coerce_positive_number(&mut object, "dormancyThresholdMinutes");
            coerce_positive_number(&mut object, "recordingDurationSeconds");
            coerce_bool(&mut object, "stealthMode");
            coerce_bool(&mut object, "autoTrigger");

            object.insert("version".to_string(), Value::from(1));
            Ok(Value::Object(object))
        }
        v => Err(ConfigError::UnknownVersion(v)),
    }
}

fn rename_field(object: &mut Map<String, Value>, from: &str, to: &str) {
    if let Some(old) = object.remove(from) {
        object.entry(to.to_string()).or_insert(old);
    }
}

/// Turns "15" into 15; drops values that are not positive integers
fn coerce_positive_number(object: &mut Map<String, Value>, field: &str) {
    let parsed = match object.get(field) {
        None => return,
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        Some(_) => None,
    };

    match parsed.filter(|&n| n >= 1).and_then(|n| u32::try_from(n).ok()) {
        Some(n) => {
            object.insert(field.to_string(), Value::from(n));
        }
        None => {
            tracing::warn!("Discarding invalid legacy value for {}", field);
            object.remove(field);
        }
    }
}

fn coerce_bool(object: &mut Map<String, Value>, field: &str) {
    let parsed = match object.get(field) {
        None | Some(Value::Bool(_)) => return,
        Some(Value::String(s)) => s.trim().parse::<bool>().ok(),
        Some(_) => None,
    };

    match parsed {
        Some(b) => {
            object.insert(field.to_string(), Value::Bool(b));
        }
        None => {
            object.remove(field);
        }
    }
}

// =============================================================================
// Store
// =============================================================================

/// Cached, write-through access to the persisted settings
pub struct SettingsStore {
    store: Arc<dyn KeyValueStore>,
    cache: RwLock<Settings>,
}

impl SettingsStore {
    /// Loads settings, migrating and rewriting older schemas
    pub fn load(store: Arc<dyn KeyValueStore>) -> Result<Self, ConfigError> {
        let settings = match store.get(SETTINGS_KEY)? {
            None => {
                tracing::info!("No stored settings, using defaults");
                Settings::default()
            }
            Some(raw) => {
                let value = serde_json::from_str::<Value>(&raw).unwrap_or_else(|e| {
                    tracing::warn!("Stored settings are not valid JSON: {}", e);
                    Value::Null
                });
                let (settings, migrated) = migrate_settings(value)?;
                if migrated {
                    store.set_json(SETTINGS_KEY, &settings)?;
                }
                settings
            }
        };

        tracing::info!(
            "Settings loaded: stealth={}, auto_trigger={}, threshold={}min, recording={}s",
            settings.stealth_mode,
            settings.auto_trigger,
            settings.dormancy_threshold_minutes,
            settings.recording_duration_seconds
        );

        Ok(Self {
            store,
            cache: RwLock::new(settings),
        })
    }

    /// Current settings
    pub fn get(&self) -> Settings {
        self.cache.read().clone()
    }

    /// Validates and persists one field change
    ///
    /// The cache is only updated once the write succeeds.
    pub fn apply(&self, change: SettingChange) -> Result<Settings, ConfigError> {
        let mut cache = self.cache.write();
        let mut updated = cache.clone();
        updated.apply(change);
        updated.version = CURRENT_VERSION;
        updated.validate()?;

        self.store.set_json(SETTINGS_KEY, &updated)?;
        *cache = updated.clone();

        tracing::info!("Setting changed: {:?}", change);
        Ok(updated)
    }

    /// Restores and persists the defaults
    pub fn reset(&self) -> Result<Settings, ConfigError> {
        let defaults = Settings::default();
        self.store.set_json(SETTINGS_KEY, &defaults)?;
        *self.cache.write() = defaults.clone();
        Ok(defaults)
    }

    /// Drops cached values after the backing store was wiped
    pub fn reset_cache(&self) {
        *self.cache.write() = Settings::default();
    }
}
