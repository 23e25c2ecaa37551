use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::accounts::{Account, AccountDirectory, DirectoryError};
use crate::auth::{
    RefreshPayload, RevocationStore, SessionRegistry, TokenCodec, TokenError, UserContext,
};
use crate::error::{ApiError, DomainError};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Account is disabled")]
    AccountDisabled,
    #[error("Refresh token expired")]
    RefreshExpired,
    #[error("Invalid refresh token")]
    RefreshInvalid,
    #[error("Refresh token has been revoked")]
    RefreshRevoked,
    #[error("Session has been superseded; sign in again")]
    SessionSuperseded,
    #[error("Account directory error: {0}")]
    Directory(#[from] DirectoryError),
    #[error("Token error: {0}")]
    Token(TokenError),
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Directory(e) => {
                tracing::error!("Account directory failure: {}", e);
                ApiError::service_unavailable("Authentication service temporarily unavailable")
            }
            SessionError::Token(e) => e.into(),
            SessionError::RefreshExpired => DomainError::unauthorized("Refresh token expired")
                .with_data(json!({ "reason": "token_expired" }))
                .into(),
            other => DomainError::unauthorized(other.to_string()).into(),
        }
    }
}

/// Token triple returned by login and refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub user_info: Value,
}

/// Login, refresh rotation, revocation and identity lookups.
pub struct SessionService {
    codec: TokenCodec,
    directory: Arc<dyn AccountDirectory>,
    revocations: Arc<dyn RevocationStore>,
    sessions: Arc<dyn SessionRegistry>,
    reject_superseded: bool,
}

impl SessionService {
    pub fn new(
        codec: TokenCodec,
        directory: Arc<dyn AccountDirectory>,
        revocations: Arc<dyn RevocationStore>,
        sessions: Arc<dyn SessionRegistry>,
    ) -> Self {
        Self {
            codec,
            directory,
            revocations,
            sessions,
            reject_superseded: true,
        }
    }

    pub fn reject_superseded(mut self, reject: bool) -> Self {
        self.reject_superseded = reject;
        self
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<SessionTokens, SessionError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(SessionError::InvalidCredentials);
        }

        let account = self
            .directory
            .find_by_username(username)
            .await?
            .filter(|account| account.verify_password(password))
            .ok_or_else(|| {
                tracing::warn!("Failed login attempt for '{}'", username);
                SessionError::InvalidCredentials
            })?;
        if !account.active {
            tracing::warn!("Login attempt for disabled account {}", account.id);
            return Err(SessionError::AccountDisabled);
        }

        let tokens = self
            .issue(&account, RefreshPayload::new_session(account.id.to_string()))
            .await?;
        tracing::info!("Account {} signed in", account.id);
        Ok(tokens)
    }

    /// Exchange a refresh token for a fresh triple under a new session id.
    pub async fn refresh(&self, refresh_token: &str) -> Result<SessionTokens, SessionError> {
        let claims = self.codec.verify_refresh(refresh_token).map_err(|e| {
            tracing::warn!("Refresh rejected: {}", e);
            match e {
                TokenError::Expired => SessionError::RefreshExpired,
                _ => SessionError::RefreshInvalid,
            }
        })?;
        let subject = claims.payload.sub.as_str();

        if self.revocations.is_revoked(refresh_token).await {
            tracing::warn!("Revoked refresh token presented for subject {}", subject);
            if self.reject_superseded {
                let live = self.sessions.current(subject).await;
                if live.is_some_and(|sid| !sid.is_empty() && sid != claims.payload.sid) {
                    // Replay of a rotated-out token ends the live session
                    self.sessions.end(subject, None).await;
                }
            }
            return Err(SessionError::RefreshRevoked);
        }

        if self.reject_superseded {
            if let Some(current) = self.sessions.current(subject).await {
                if current != claims.payload.sid {
                    // Reuse of a rotated-out token: end the live session too.
                    tracing::warn!("Superseded refresh token reused for subject {}", subject);
                    self.sessions.end(subject, None).await;
                    return Err(SessionError::SessionSuperseded);
                }
            }
        }

        let account = match self.directory.find_by_id(subject).await? {
            Some(account) if account.active => account,
            _ => {
                self.sessions.end(subject, None).await;
                return Err(SessionError::AccountDisabled);
            }
        };

        let tokens = self.issue(&account, claims.payload.rotate()).await?;
        self.revocations
            .revoke(refresh_token, claims.registered.exp)
            .await;
        tracing::debug!("Rotated refresh session for subject {}", subject);
        Ok(tokens)
    }

    /// Revoke a refresh token. Succeeds for unknown, expired or already revoked tokens.
    pub async fn revoke(&self, refresh_token: &str) {
        match self.codec.verify_refresh(refresh_token) {
            Ok(claims) => {
                self.revocations
                    .revoke(refresh_token, claims.registered.exp)
                    .await;
                self.sessions
                    .end(&claims.payload.sub, Some(&claims.payload.sid))
                    .await;
                tracing::info!("Refresh session revoked for subject {}", claims.payload.sub);
            }
            Err(_) => {
                let expires_at = Utc::now().timestamp() + self.codec.settings().refresh_ttl_secs;
                self.revocations.revoke(refresh_token, expires_at).await;
            }
        }
    }

    /// Current profile of the authenticated caller.
    pub async fn me(&self, ctx: &UserContext) -> Result<Value, SessionError> {
        match self.directory.find_by_id(&ctx.user_id).await? {
            Some(account) if account.active => Ok(account.user_info()),
            _ => Err(SessionError::AccountDisabled),
        }
    }

    async fn issue(
        &self,
        account: &Account,
        refresh: RefreshPayload,
    ) -> Result<SessionTokens, SessionError> {
        let access_token = self
            .codec
            .sign_access(&account.access_payload())
            .map_err(SessionError::Token)?;
        let refresh_token = self.codec.sign_refresh(&refresh).map_err(SessionError::Token)?;

        self.sessions.activate(&refresh.sub, &refresh.sid).await;

        Ok(SessionTokens {
            access_token,
            refresh_token,
            user_info: account.user_info(),
        })
    }
}
