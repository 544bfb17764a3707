//! Incident transcripts
//!
//! The transcription job writes one record per incident under
//! `incidents/{incidentId}`. Writes merge into the existing record so a
//! redelivered upload overwrites the transcript fields and nothing else.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{JsonStoreExt, KeyValueStore, StoreError};

const INCIDENT_KEY_PREFIX: &str = "incidents/";

fn incident_key(incident_id: &str) -> String {
    format!("{}{}", INCIDENT_KEY_PREFIX, incident_id)
}

/// Transcript state for one incident
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentTranscript {
    pub incident_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcribed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_source: Option<String>,
}

/// Incident records keyed by incident id
pub struct IncidentStore {
    store: Arc<dyn KeyValueStore>,
}

impl IncidentStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn get(&self, incident_id: &str) -> Result<Option<IncidentTranscript>, StoreError> {
        self.store.get_json(&incident_key(incident_id))
    }

    /// Records a successful transcription, clearing any earlier error
    pub fn record_transcript(
        &self,
        incident_id: &str,
        user_id: &str,
        transcript: &str,
        source: &str,
        at: DateTime<Utc>,
    ) -> Result<IncidentTranscript, StoreError> {
        self.merge(incident_id, user_id, |record| {
            record.transcript = Some(transcript.to_string());
            record.transcript_error = None;
            record.transcribed_at = Some(at);
            record.transcript_source = Some(source.to_string());
        })
    }

    /// Records a failed transcription; an earlier transcript is kept
    pub fn record_error(
        &self,
        incident_id: &str,
        user_id: &str,
        error: &str,
    ) -> Result<IncidentTranscript, StoreError> {
        self.merge(incident_id, user_id, |record| {
            record.transcript_error = Some(error.to_string());
        })
    }

    /// Ids of every stored incident
    pub fn incident_ids(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .store
            .keys_with_prefix(INCIDENT_KEY_PREFIX)?
            .into_iter()
            .map(|key| key[INCIDENT_KEY_PREFIX.len()..].to_string())
            .collect())
    }

    fn merge(
        &self,
        incident_id: &str,
        user_id: &str,
        update: impl FnOnce(&mut IncidentTranscript),
    ) -> Result<IncidentTranscript, StoreError> {
        let key = incident_key(incident_id);
        let mut record = self
            .store
            .get_json::<IncidentTranscript>(&key)?
            .unwrap_or_else(|| IncidentTranscript {
                incident_id: incident_id.to_string(),
                ..IncidentTranscript::default()
            });

        record.user_id = Some(user_id.to_string());
        update(&mut record);
        self.store.set_json(&key, &record)?;

        tracing::debug!("Updated incident {}", incident_id);
        Ok(record)
    }
}
