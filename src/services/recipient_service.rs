use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::OrganizationScoped;

/// A person receiving home care, owned by one organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CareRecipient {
    pub id: i64,
    pub name: String,
    pub organization_id: i64,
    #[serde(default)]
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrganizationScoped for CareRecipient {
    fn organization_id(&self) -> Option<i64> {
        Some(self.organization_id)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientChanges {
    pub name: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RecipientError {
    #[error("Recipient store is unavailable")]
    Poisoned,
}

struct Inner {
    next_id: i64,
    rows: BTreeMap<i64, CareRecipient>,
}

/// In-memory recipient table.
pub struct RecipientStore {
    inner: Mutex<Inner>,
}

impl Default for RecipientStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecipientStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 1,
                rows: BTreeMap::new(),
            }),
        }
    }

    /// Store pre-populated with sample recipients for organizations 1 and 2.
    pub fn seeded() -> Self {
        let store = Self::new();
        for (name, organization_id) in [
            ("Margaret Hill", 1),
            ("Arthur Bennett", 1),
            ("Olive Turner", 1),
            ("Harold Price", 2),
        ] {
            // A fresh store cannot be poisoned
            let _ = store.insert(name, organization_id, None);
        }
        store
    }

    pub fn list(&self) -> Result<Vec<CareRecipient>, RecipientError> {
        let inner = self.inner.lock().map_err(|_| RecipientError::Poisoned)?;
        Ok(inner.rows.values().cloned().collect())
    }

    pub fn get(&self, id: i64) -> Result<Option<CareRecipient>, RecipientError> {
        let inner = self.inner.lock().map_err(|_| RecipientError::Poisoned)?;
        Ok(inner.rows.get(&id).cloned())
    }

    pub fn insert(
        &self,
        name: &str,
        organization_id: i64,
        address: Option<String>,
    ) -> Result<CareRecipient, RecipientError> {
        let mut inner = self.inner.lock().map_err(|_| RecipientError::Poisoned)?;
        let id = inner.next_id;
        inner.next_id += 1;

        let now = Utc::now();
        let recipient = CareRecipient {
            id,
            name: name.to_string(),
            organization_id,
            address,
            created_at: now,
            updated_at: now,
        };
        inner.rows.insert(id, recipient.clone());
        Ok(recipient)
    }

    pub fn update(
        &self,
        id: i64,
        changes: RecipientChanges,
    ) -> Result<Option<CareRecipient>, RecipientError> {
        let mut inner = self.inner.lock().map_err(|_| RecipientError::Poisoned)?;
        let Some(row) = inner.rows.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = changes.name {
            row.name = name;
        }
        if changes.address.is_some() {
            row.address = changes.address;
        }
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }

    pub fn remove(&self, id: i64) -> Result<Option<CareRecipient>, RecipientError> {
        let mut inner = self.inner.lock().map_err(|_| RecipientError::Poisoned)?;
        Ok(inner.rows.remove(&id))
    }
}
