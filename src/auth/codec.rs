//! Signing and verification of the access/refresh token pair.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use super::claims::{
    AccessClaims, AccessPayload, RefreshClaims, RefreshPayload, RegisteredClaims, TokenUse,
};
use crate::config::{ConfigError, SecurityConfig};

const ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,

    #[error("token invalid: {0}")]
    Invalid(InvalidToken),

    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// Why a token that is not merely expired was rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidToken {
    #[error("malformed token")]
    Malformed,

    #[error("signature mismatch")]
    Signature,

    #[error("claims rejected: {0}")]
    Claims(String),

    #[error("{0}")]
    Other(String),
}

impl TokenError {
    pub fn is_expired(&self) -> bool {
        matches!(self, TokenError::Expired)
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_)
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::MissingAlgorithm => TokenError::Invalid(InvalidToken::Malformed),
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                TokenError::Invalid(InvalidToken::Signature)
            }
            ErrorKind::InvalidIssuer => TokenError::Invalid(InvalidToken::Claims("issuer".into())),
            ErrorKind::InvalidAudience => {
                TokenError::Invalid(InvalidToken::Claims("audience".into()))
            }
            ErrorKind::InvalidSubject => {
                TokenError::Invalid(InvalidToken::Claims("subject".into()))
            }
            ErrorKind::ImmatureSignature => {
                TokenError::Invalid(InvalidToken::Claims("not yet valid".into()))
            }
            ErrorKind::MissingRequiredClaim(claim) => {
                TokenError::Invalid(InvalidToken::Claims(format!("missing {}", claim)))
            }
            _ => TokenError::Invalid(InvalidToken::Other(err.to_string())),
        }
    }
}

/// Secrets, identifiers and lifetimes used by [`TokenCodec`].
#[derive(Clone)]
pub struct TokenSettings {
    pub access_secret: String,
    pub refresh_secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
}

impl TokenSettings {
    pub fn new(access_secret: impl Into<String>, refresh_secret: impl Into<String>) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            issuer: "homecare-admin".to_string(),
            audience: "homecare-admin-web".to_string(),
            access_ttl_secs: 30 * 60,
            refresh_ttl_secs: 7 * 24 * 60 * 60,
        }
    }

    pub fn from_config(security: &SecurityConfig) -> Result<Self, ConfigError> {
        let access_secret = security.access_secret()?;
        let refresh_secret = match security.refresh_secret() {
            Some(secret) => secret,
            None => {
                tracing::warn!("JWT_REFRESH_SECRET not set; refresh tokens share the access secret");
                access_secret
            }
        };

        if security.access_ttl_secs <= 0 || security.refresh_ttl_secs <= 0 {
            return Err(ConfigError::Invalid {
                name: "JWT_ACCESS_TTL_SECS/JWT_REFRESH_TTL_SECS",
                reason: "lifetimes must be positive".to_string(),
            });
        }
        if security.access_ttl_secs >= security.refresh_ttl_secs {
            return Err(ConfigError::Invalid {
                name: "JWT_ACCESS_TTL_SECS",
                reason: "access tokens must expire before refresh tokens".to_string(),
            });
        }

        let settings = Self {
            access_secret: access_secret.to_string(),
            refresh_secret: refresh_secret.to_string(),
            issuer: security.issuer.clone(),
            audience: security.audience.clone(),
            access_ttl_secs: security.access_ttl_secs,
            refresh_ttl_secs: security.refresh_ttl_secs,
        };
        if settings.access_secret.len() < 32 {
            tracing::warn!("JWT access secret is shorter than recommended (32 bytes)");
        }
        Ok(settings)
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = audience.into();
        self
    }

    pub fn with_access_ttl(mut self, secs: i64) -> Self {
        self.access_ttl_secs = secs;
        self
    }

    pub fn with_refresh_ttl(mut self, secs: i64) -> Self {
        self.refresh_ttl_secs = secs;
        self
    }
}

impl fmt::Debug for TokenSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSettings")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .finish_non_exhaustive()
    }
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

trait Stamped {
    fn registered(&self) -> &RegisteredClaims;
}

impl Stamped for AccessClaims {
    fn registered(&self) -> &RegisteredClaims {
        &self.registered
    }
}

impl Stamped for RefreshClaims {
    fn registered(&self) -> &RegisteredClaims {
        &self.registered
    }
}

/// Signs and verifies access and refresh tokens.
///
/// Both halves share issuer and audience but are keyed separately, so a leak
/// of one secret does not let an attacker mint the other kind of token.
#[derive(Clone)]
pub struct TokenCodec {
    settings: Arc<TokenSettings>,
    access_keys: Arc<KeyPair>,
    refresh_keys: Arc<KeyPair>,
    validation: Arc<Validation>,
}

impl TokenCodec {
    pub fn new(settings: TokenSettings) -> Self {
        let mut validation = Validation::new(ALGORITHM);
        validation.set_issuer(&[&settings.issuer]);
        validation.set_audience(&[&settings.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.leeway = 0;

        Self {
            access_keys: Arc::new(KeyPair::from_secret(&settings.access_secret)),
            refresh_keys: Arc::new(KeyPair::from_secret(&settings.refresh_secret)),
            settings: Arc::new(settings),
            validation: Arc::new(validation),
        }
    }

    pub fn settings(&self) -> &TokenSettings {
        &self.settings
    }

    pub fn sign_access(&self, payload: &AccessPayload) -> Result<String, TokenError> {
        let claims = AccessClaims {
            payload: payload.clone(),
            registered: self.stamp(TokenUse::Access, self.settings.access_ttl_secs),
        };
        self.sign(&claims, &self.access_keys)
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        self.verify(token, &self.access_keys, TokenUse::Access)
    }

    pub fn sign_refresh(&self, payload: &RefreshPayload) -> Result<String, TokenError> {
        let claims = RefreshClaims {
            payload: payload.clone(),
            registered: self.stamp(TokenUse::Refresh, self.settings.refresh_ttl_secs),
        };
        self.sign(&claims, &self.refresh_keys)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        self.verify(token, &self.refresh_keys, TokenUse::Refresh)
    }

    /// Sign arbitrary access claims. Used to forge edge cases in tests.
    pub fn sign_access_claims(&self, claims: &AccessClaims) -> Result<String, TokenError> {
        self.sign(claims, &self.access_keys)
    }

    pub fn sign_refresh_claims(&self, claims: &RefreshClaims) -> Result<String, TokenError> {
        self.sign(claims, &self.refresh_keys)
    }

    fn stamp(&self, token_use: TokenUse, ttl_secs: i64) -> RegisteredClaims {
        RegisteredClaims::new(&self.settings.issuer, &self.settings.audience, token_use, ttl_secs)
    }

    fn sign<C: Serialize>(&self, claims: &C, keys: &KeyPair) -> Result<String, TokenError> {
        encode(&Header::new(ALGORITHM), claims, &keys.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    fn verify<C>(&self, token: &str, keys: &KeyPair, expected: TokenUse) -> Result<C, TokenError>
    where
        C: DeserializeOwned + Stamped,
    {
        let data = decode::<C>(token, &keys.decoding, &self.validation)?;
        let registered = data.claims.registered();

        if registered.typ != expected {
            return Err(TokenError::Invalid(InvalidToken::Claims("token use".into())));
        }
        // jsonwebtoken accepts a token during its final second; we do not.
        if registered.is_expired_at(Utc::now().timestamp()) {
            return Err(TokenError::Expired);
        }

        Ok(data.claims)
    }
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::new(TokenSettings::new(
            "access-secret-key-that-is-long-enough-for-tests",
            "refresh-secret-key-that-is-long-enough-for-tests",
        ))
    }

    fn payload() -> AccessPayload {
        AccessPayload {
            sub: "17".to_string(),
            role_ids: vec![2, 5],
            permissions: vec!["recipient:read".to_string()],
            organization_id: Some(3),
            is_super_admin: false,
        }
    }

    #[test]
    fn access_round_trip_preserves_fields() {
        let codec = codec();
        let token = codec.sign_access(&payload()).unwrap();
        let claims = codec.verify_access(&token).unwrap();

        assert_eq!(claims.payload, payload());
        assert_eq!(claims.registered.iss, "homecare-admin");
        assert_eq!(claims.registered.aud, "homecare-admin-web");
        assert_eq!(claims.registered.exp - claims.registered.iat, 1800);
    }

    #[test]
    fn refresh_round_trip_preserves_session() {
        let codec = codec();
        let token = codec
            .sign_refresh(&RefreshPayload {
                sub: "1".into(),
                sid: "s1".into(),
            })
            .unwrap();
        let claims = codec.verify_refresh(&token).unwrap();
        assert_eq!(claims.payload.sid, "s1");
        assert_eq!(claims.registered.exp - claims.registered.iat, 7 * 24 * 3600);
    }

    #[test]
    fn expired_tokens_are_classified() {
        let codec = TokenCodec::new(
            TokenSettings::new("access-secret-for-expiry", "refresh-secret-for-expiry")
                .with_access_ttl(-10),
        );
        let token = codec.sign_access(&payload()).unwrap();
        assert_eq!(codec.verify_access(&token), Err(TokenError::Expired));
    }

    #[test]
    fn token_expiring_now_is_rejected() {
        let codec = codec();
        let mut claims = AccessClaims {
            payload: payload(),
            registered: RegisteredClaims::new(
                "homecare-admin",
                "homecare-admin-web",
                TokenUse::Access,
                0,
            ),
        };
        claims.registered.exp = Utc::now().timestamp();
        let token = codec.sign_access_claims(&claims).unwrap();
        assert_eq!(codec.verify_access(&token), Err(TokenError::Expired));
    }

    #[test]
    fn garbage_is_malformed() {
        assert_eq!(
            codec().verify_access("not-a-token"),
            Err(TokenError::Invalid(InvalidToken::Malformed))
        );
    }

    #[test]
    fn wrong_secret_fails_signature() {
        let other = TokenCodec::new(TokenSettings::new("another-access-secret", "another-refresh"));
        let token = other.sign_access(&payload()).unwrap();
        assert_eq!(
            codec().verify_access(&token),
            Err(TokenError::Invalid(InvalidToken::Signature))
        );
    }

    #[test]
    fn wrong_audience_is_claims_invalid() {
        let other = TokenCodec::new(
            TokenSettings::new(
                "access-secret-key-that-is-long-enough-for-tests",
                "refresh-secret-key-that-is-long-enough-for-tests",
            )
            .with_audience("someone-else"),
        );
        let token = other.sign_access(&payload()).unwrap();
        assert!(matches!(
            codec().verify_access(&token),
            Err(TokenError::Invalid(InvalidToken::Claims(_)))
        ));
    }

    #[test]
    fn refresh_token_never_verifies_as_access_token() {
        let shared = TokenCodec::new(TokenSettings::new("one-shared-secret", "one-shared-secret"));
        let refresh = shared
            .sign_refresh(&RefreshPayload::new_session("1"))
            .unwrap();
        assert_eq!(
            shared.verify_access(&refresh),
            Err(TokenError::Invalid(InvalidToken::Claims("token use".into())))
        );
    }

    #[test]
    fn settings_require_an_access_secret() {
        let security = crate::config::AppConfig::development().security;
        assert_eq!(
            TokenSettings::from_config(&security).unwrap_err(),
            ConfigError::Missing("JWT_ACCESS_SECRET")
        );
    }

    #[test]
    fn settings_fall_back_to_access_secret() {
        let mut security = crate::config::AppConfig::development().security;
        security.access_secret = Some("configured-access-secret".into());
        let settings = TokenSettings::from_config(&security).unwrap();
        assert_eq!(settings.refresh_secret, "configured-access-secret");
    }
}
