//! Revoked refresh tokens and the per-subject session registry.
//!
//! Both in-memory implementations live for the process only and are not
//! shared across instances.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};

#[async_trait]
pub trait RevocationStore: Send + Sync {
    async fn is_revoked(&self, token: &str) -> bool;

    /// Record `token` as revoked until `expires_at` (unix seconds).
    /// Returns `false` if it was already revoked.
    async fn revoke(&self, token: &str, expires_at: i64) -> bool;
}

/// Revocation list keyed by token digest so raw tokens are never retained.
#[derive(Debug, Default)]
pub struct InMemoryRevocationList {
    entries: Mutex<HashMap<String, i64>>,
}

impl InMemoryRevocationList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn digest(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

#[async_trait]
impl RevocationStore for InMemoryRevocationList {
    async fn is_revoked(&self, token: &str) -> bool {
        let key = digest(token);
        match self.entries.lock() {
            Ok(entries) => entries.contains_key(&key),
            // A poisoned list must not let revoked tokens through
            Err(_) => true,
        }
    }

    async fn revoke(&self, token: &str, expires_at: i64) -> bool {
        let key = digest(token);
        let now = Utc::now().timestamp();
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };

        // Entries past their natural expiry can no longer verify anyway.
        entries.retain(|_, exp| *exp > now);
        entries.insert(key, expires_at).is_none()
    }
}

/// Tracks the current refresh session per subject.
#[async_trait]
pub trait SessionRegistry: Send + Sync {
    async fn current(&self, subject: &str) -> Option<String>;

    async fn activate(&self, subject: &str, session_id: &str);

    /// End the subject's session if `session_id` is the current one.
    /// Passing `None` ends whatever session is current.
    ///
    /// An ended subject keeps an empty marker, so no outstanding refresh
    /// token for it matches until the next login activates a new session.
    async fn end(&self, subject: &str, session_id: Option<&str>) -> bool;
}

#[derive(Debug, Default)]
pub struct InMemorySessionRegistry {
    sessions: Mutex<HashMap<String, String>>,
}

impl InMemorySessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRegistry for InMemorySessionRegistry {
    async fn current(&self, subject: &str) -> Option<String> {
        self.sessions
            .lock()
            .ok()
            .and_then(|sessions| sessions.get(subject).cloned())
    }

    async fn activate(&self, subject: &str, session_id: &str) {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.insert(subject.to_string(), session_id.to_string());
        }
    }

    async fn end(&self, subject: &str, session_id: Option<&str>) -> bool {
        let Ok(mut sessions) = self.sessions.lock() else {
            return false;
        };
        match (sessions.get(subject), session_id) {
            (Some(current), _) if current.is_empty() => false,
            (Some(current), Some(sid)) if current != sid => false,
            (Some(_), _) => {
                sessions.insert(subject.to_string(), String::new());
                true
            }
            (None, _) => false,
        }
    }
}
