use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which half of the token pair a JWT belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenUse {
    Access,
    Refresh,
}

/// Registered claims stamped by the codec on every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredClaims {
    pub iss: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    pub typ: TokenUse,
}

impl RegisteredClaims {
    pub fn new(issuer: &str, audience: &str, token_use: TokenUse, ttl_secs: i64) -> Self {
        let now = Utc::now().timestamp();
        Self {
            iss: issuer.to_string(),
            aud: audience.to_string(),
            exp: now + ttl_secs,
            iat: now,
            typ: token_use,
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    /// Tokens are unusable at and after `exp`.
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.exp
    }
}

/// Identity and authorization snapshot carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessPayload {
    pub sub: String,
    #[serde(default)]
    pub role_ids: Vec<i64>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub organization_id: Option<i64>,
    #[serde(default)]
    pub is_super_admin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    #[serde(flatten)]
    pub payload: AccessPayload,
    #[serde(flatten)]
    pub registered: RegisteredClaims,
}

/// Refresh tokens carry only the subject and the rotating session id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshPayload {
    pub sub: String,
    pub sid: String,
}

impl RefreshPayload {
    /// Payload for a brand-new session with a freshly minted session id.
    pub fn new_session(sub: impl Into<String>) -> Self {
        Self {
            sub: sub.into(),
            sid: new_session_id(),
        }
    }

    /// Payload for the same subject under a new session id.
    pub fn rotate(&self) -> Self {
        Self::new_session(self.sub.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    #[serde(flatten)]
    pub payload: RefreshPayload,
    #[serde(flatten)]
    pub registered: RegisteredClaims,
}

/// Opaque random session identifier.
pub fn new_session_id() -> String {
    Uuid::new_v4().simple().to_string()
}
