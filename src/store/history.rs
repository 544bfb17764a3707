//! Alert history
//!
//! One JSON array under `sosHistory`, newest record first. Records are
//! written once per completed alert and never edited.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::{JsonStoreExt, KeyValueStore, StoreError};
use crate::alert::TriggerSource;
use crate::location::ResolvedLocation;

/// Key holding the alert history
pub const HISTORY_KEY: &str = "sosHistory";

/// Outcome of a recorded alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Sent,
}

/// A completed alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    #[serde(deserialize_with = "super::legacy_id")]
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub audio_path: String,
    pub location: ResolvedLocation,
    pub status: AlertStatus,
    pub contacts_notified: usize,
    #[serde(default)]
    pub trigger: TriggerSource,
}

impl AlertRecord {
    /// Builds a sent record with a fresh time-ordered id
    pub fn sent(
        timestamp: DateTime<Utc>,
        message: impl Into<String>,
        audio_path: impl Into<String>,
        location: ResolvedLocation,
        contacts_notified: usize,
        trigger: TriggerSource,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            timestamp,
            message: message.into(),
            audio_path: audio_path.into(),
            location,
            status: AlertStatus::Sent,
            contacts_notified,
            trigger,
        }
    }
}

/// The persisted alert log
pub struct HistoryStore {
    store: Arc<dyn KeyValueStore>,
    write_lock: Mutex<()>,
}

impl HistoryStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// All records, newest first
    pub fn list(&self) -> Result<Vec<AlertRecord>, StoreError> {
        Ok(self
            .store
            .get_json::<Vec<AlertRecord>>(HISTORY_KEY)?
            .unwrap_or_default())
    }

    /// Adds `record` at the front of the log
    pub fn prepend(&self, record: AlertRecord) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let mut records = self.list()?;
        records.insert(0, record);
        self.store.set_json(HISTORY_KEY, &records)?;

        tracing::info!("Saved alert to history, total alerts: {}", records.len());
        Ok(())
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.list()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// The most recent record, if any
    pub fn latest(&self) -> Result<Option<AlertRecord>, StoreError> {
        Ok(self.list()?.into_iter().next())
    }
}
