//! Emergency contact storage
//!
//! Contacts are kept as one ordered JSON array under `emergencyContacts`.
//! There is no edit operation; a contact is added once and deleted.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::{JsonStoreExt, KeyValueStore, StoreError};

/// Key holding the contact list
pub const CONTACTS_KEY: &str = "emergencyContacts";

/// A person to notify in an emergency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyContact {
    /// Older installs stored millisecond timestamps here
    #[serde(deserialize_with = "super::legacy_id")]
    pub id: String,
    pub name: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
}

/// Contact details as entered by the user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewContact {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub relation: Option<String>,
}

impl NewContact {
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            relation: None,
        }
    }

    pub fn with_relation(mut self, relation: impl Into<String>) -> Self {
        self.relation = Some(relation.into());
        self
    }
}

/// The persisted contact list
pub struct ContactStore {
    store: Arc<dyn KeyValueStore>,
    write_lock: Mutex<()>,
}

impl ContactStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// All contacts in insertion order
    pub fn list(&self) -> Result<Vec<EmergencyContact>, StoreError> {
        Ok(self
            .store
            .get_json::<Vec<EmergencyContact>>(CONTACTS_KEY)?
            .unwrap_or_default())
    }

    /// Validates and appends a contact, returning the stored record
    pub fn add(&self, contact: NewContact) -> Result<EmergencyContact, StoreError> {
        let name = contact.name.trim();
        let phone = contact.phone.trim();

        if name.is_empty() {
            return Err(StoreError::InvalidContact(
                "Name cannot be empty".to_string(),
            ));
        }
        if phone.is_empty() {
            return Err(StoreError::InvalidContact(
                "Phone number cannot be empty".to_string(),
            ));
        }

        let relation = contact
            .relation
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        let record = EmergencyContact {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            phone: phone.to_string(),
            relation,
        };

        let _guard = self.write_lock.lock();
        let mut contacts = self.list()?;
        contacts.push(record.clone());
        self.store.set_json(CONTACTS_KEY, &contacts)?;

        tracing::info!("Added emergency contact, total contacts: {}", contacts.len());
        Ok(record)
    }

    /// Deletes the contact with `id`. Returns whether it existed.
    pub fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock();
        let mut contacts = self.list()?;
        let before = contacts.len();
        contacts.retain(|c| c.id != id);

        if contacts.len() == before {
            return Ok(false);
        }

        self.store.set_json(CONTACTS_KEY, &contacts)?;
        tracing::info!("Removed emergency contact, total contacts: {}", contacts.len());
        Ok(true)
    }

    /// Phone numbers of every contact, in list order
    pub fn phone_numbers(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.list()?.into_iter().map(|c| c.phone).collect())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.list()?.is_empty())
    }
}
