// src/accounts.rs - Account directory backing login and identity refresh
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::auth::claims::AccessPayload;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("failed to read accounts file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid accounts file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("account directory unavailable: {0}")]
    Unavailable(String),

    #[error("password hashing failed: {0}")]
    Hash(String),
}

/// Administrative user able to sign in to the back office.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub display_name: String,
    /// Argon2id hash in PHC string format (`$argon2id$v=19$...`).
    pub password: String,
    #[serde(default)]
    pub role_ids: Vec<i64>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub organization_id: Option<i64>,
    #[serde(default)]
    pub is_super_admin: bool,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Account {
    /// Account with a freshly hashed password.
    pub fn new(id: i64, username: &str, password: &str) -> Result<Self, DirectoryError> {
        Ok(Self::with_password_hash(id, username, hash_password(password)?))
    }

    /// Account from an already hashed password, as stored in the accounts file.
    pub fn with_password_hash(id: i64, username: &str, password_hash: String) -> Self {
        Self {
            id,
            username: username.to_string(),
            display_name: username.to_string(),
            password: password_hash,
            role_ids: Vec::new(),
            permissions: Vec::new(),
            organization_id: None,
            is_super_admin: false,
            active: true,
        }
    }

    pub fn with_display_name(mut self, display_name: &str) -> Self {
        self.display_name = display_name.to_string();
        self
    }

    pub fn with_roles(mut self, role_ids: &[i64]) -> Self {
        self.role_ids = role_ids.to_vec();
        self
    }

    pub fn with_permissions(mut self, permissions: &[&str]) -> Self {
        self.permissions = permissions.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn in_organization(mut self, organization_id: i64) -> Self {
        self.organization_id = Some(organization_id);
        self
    }

    pub fn super_admin(mut self) -> Self {
        self.is_super_admin = true;
        self
    }

    pub fn verify_password(&self, candidate: &str) -> bool {
        let parsed = match PasswordHash::new(&self.password) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Account {} has an unreadable password hash: {}", self.id, e);
                return false;
            }
        };
        Argon2::default()
            .verify_password(candidate.as_bytes(), &parsed)
            .is_ok()
    }

    /// Claims snapshot embedded in access tokens.
    pub fn access_payload(&self) -> AccessPayload {
        AccessPayload {
            sub: self.id.to_string(),
            role_ids: self.role_ids.clone(),
            permissions: self.permissions.clone(),
            organization_id: self.organization_id,
            is_super_admin: self.is_super_admin,
        }
    }

    /// Public profile returned by login, refresh and `me`.
    pub fn user_info(&self) -> Value {
        let mut permissions = self.permissions.clone();
        permissions.sort();
        json!({
            "id": self.id,
            "username": self.username,
            "displayName": self.display_name,
            "organizationId": self.organization_id,
            "isSuperAdmin": self.is_super_admin,
            "roles": self.role_ids,
            "permissions": permissions,
        })
    }
}

/// Argon2id with default parameters and a random 16-byte salt, in PHC format.
pub fn hash_password(password: &str) -> Result<String, DirectoryError> {
    let salt = SaltString::encode_b64(uuid::Uuid::new_v4().as_bytes())
        .map_err(|e| DirectoryError::Hash(e.to_string()))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| DirectoryError::Hash(e.to_string()))
}

#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, DirectoryError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Account>, DirectoryError>;
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryDirectory {
    accounts: HashMap<i64, Account>,
}

impl InMemoryDirectory {
    pub fn new(accounts: impl IntoIterator<Item = Account>) -> Self {
        Self {
            accounts: accounts.into_iter().map(|a| (a.id, a)).collect(),
        }
    }

    /// Load a JSON array of accounts.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DirectoryError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let content = fs::read_to_string(path).map_err(|source| DirectoryError::Io {
            path: display.clone(),
            source,
        })?;
        let accounts: Vec<Account> =
            serde_json::from_str(&content).map_err(|source| DirectoryError::Parse {
                path: display,
                source,
            })?;
        Ok(Self::new(accounts))
    }

    /// Development accounts: one super-admin and two organization-scoped users.
    pub fn seeded() -> Result<Self, DirectoryError> {
        Ok(Self::new([
            Account::new(1, "admin", "admin123")?
                .with_display_name("Administrator")
                .with_roles(&[1])
                .super_admin(),
            Account::new(2, "coordinator", "coordinator123")?
                .with_display_name("Care Coordinator")
                .with_roles(&[2])
                .with_permissions(&["recipient:read", "recipient:create", "recipient:update"])
                .in_organization(1),
            Account::new(3, "viewer", "viewer123")?
                .with_display_name("Read-only Viewer")
                .with_roles(&[3])
                .with_permissions(&["recipient:read"])
                .in_organization(2),
        ]))
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[async_trait]
impl AccountDirectory for InMemoryDirectory {
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, DirectoryError> {
        Ok(self
            .accounts
            .values()
            .find(|a| a.username.eq_ignore_ascii_case(username))
            .cloned())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Account>, DirectoryError> {
        let Ok(id) = id.parse::<i64>() else {
            return Ok(None);
        };
        Ok(self.accounts.get(&id).cloned())
    }
}
