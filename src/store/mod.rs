//! Local persistence for Angaza.
//!
//! Everything the app keeps on the device lives in one key/value store whose
//! values are JSON documents, matching the keys the mobile shell has always
//! used (`emergencyContacts`, `sosHistory`, `appSettings`). The default
//! backend is SQLite at `~/.angaza/angaza.db`.

pub mod contacts;
pub mod history;
pub mod incidents;
pub mod kv;
pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};

pub use contacts::{ContactStore, EmergencyContact, NewContact, CONTACTS_KEY};
pub use history::{AlertRecord, AlertStatus, HistoryStore, HISTORY_KEY};
pub use incidents::{IncidentStore, IncidentTranscript};
pub use kv::{JsonStoreExt, KeyValueStore, MemoryStore, SqliteStore};

/// Store error types.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to create data directory: {0}")]
    DirectoryCreation(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Failed to decode value for '{key}': {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode value for '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid contact: {0}")]
    InvalidContact(String),
}

/// Reads a record id stored either as a string or, by older installs, as a
/// millisecond timestamp number.
pub(crate) fn legacy_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Int(n) => n.to_string(),
        Id::Float(n) => n.to_string(),
    })
}

/// Returns the Angaza data directory (~/.angaza).
pub fn data_directory() -> Result<PathBuf, StoreError> {
    let home = dirs::home_dir().ok_or_else(|| {
        StoreError::DirectoryCreation(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not find home directory",
        ))
    })?;

    Ok(home.join(".angaza"))
}

/// Returns the path to the database file (~/.angaza/angaza.db).
pub fn default_database_path() -> Result<PathBuf, StoreError> {
    Ok(data_directory()?.join("angaza.db"))
}

/// Ensures the parent directory of `path` exists.
fn ensure_parent_directory(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
            tracing::info!("Created data directory at {:?}", parent);
        }
    }
    Ok(())
}
