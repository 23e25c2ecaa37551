use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::codec::{TokenCodec, TokenError};
use super::context::UserContext;
use crate::accounts::AccountDirectory;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{0}")]
    Token(#[from] TokenError),

    #[error("account {0} is unknown or disabled")]
    AccountDisabled(String),

    #[error("identity resolution unavailable: {0}")]
    Unavailable(String),
}

/// Turns a bearer credential into a [`UserContext`].
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<UserContext, ResolveError>;
}

/// Resolves identity from the access-token claims alone, optionally
/// confirming the account is still active.
pub struct TokenIdentityResolver {
    codec: TokenCodec,
    directory: Option<Arc<dyn AccountDirectory>>,
}

impl TokenIdentityResolver {
    pub fn new(codec: TokenCodec) -> Self {
        Self {
            codec,
            directory: None,
        }
    }

    pub fn with_directory(mut self, directory: Arc<dyn AccountDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }
}

#[async_trait]
impl IdentityResolver for TokenIdentityResolver {
    async fn resolve(&self, token: &str) -> Result<UserContext, ResolveError> {
        let claims = self.codec.verify_access(token)?;

        if let Some(directory) = &self.directory {
            let account = directory
                .find_by_id(&claims.payload.sub)
                .await
                .map_err(|e| ResolveError::Unavailable(e.to_string()))?;
            if !account.map(|a| a.active).unwrap_or(false) {
                return Err(ResolveError::AccountDisabled(claims.payload.sub));
            }
        }

        Ok(UserContext::from_claims(claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{Account, DirectoryError, InMemoryDirectory};
    use crate::auth::codec::TokenSettings;

    fn codec() -> TokenCodec {
        TokenCodec::new(TokenSettings::new("resolver-access-secret", "resolver-refresh-secret"))
    }

    #[tokio::test]
    async fn resolves_context_from_token() {
        let codec = codec();
        let account = Account::new(2, "c", "p")
            .unwrap()
            .with_permissions(&["recipient:read"])
            .in_organization(1);
        let token = codec.sign_access(&account.access_payload()).unwrap();

        let resolver = TokenIdentityResolver::new(codec);
        let ctx = resolver.resolve(&token).await.unwrap();
        assert_eq!(ctx.user_id, "2");
        assert_eq!(ctx.organization_id, Some(1));
        assert!(ctx.permissions.contains("recipient:read"));
    }

    #[tokio::test]
    async fn disabled_account_is_rejected() {
        let codec = codec();
        let mut account = Account::new(7, "gone", "p").unwrap();
        account.active = false;
        let token = codec.sign_access(&account.access_payload()).unwrap();

        let resolver = TokenIdentityResolver::new(codec)
            .with_directory(Arc::new(InMemoryDirectory::new([account])));
        assert!(matches!(
            resolver.resolve(&token).await,
            Err(ResolveError::AccountDisabled(_))
        ));
    }

    struct BrokenDirectory;

    #[async_trait]
    impl AccountDirectory for BrokenDirectory {
        async fn find_by_username(&self, _: &str) -> Result<Option<Account>, DirectoryError> {
            Err(DirectoryError::Unavailable("down".into()))
        }

        async fn find_by_id(&self, _: &str) -> Result<Option<Account>, DirectoryError> {
            Err(DirectoryError::Unavailable("down".into()))
        }
    }

    #[tokio::test]
    async fn directory_failure_is_unavailable() {
        let codec = codec();
        let token = codec
            .sign_access(&Account::new(1, "a", "p").unwrap().access_payload())
            .unwrap();
        let resolver = TokenIdentityResolver::new(codec).with_directory(Arc::new(BrokenDirectory));
        assert!(matches!(
            resolver.resolve(&token).await,
            Err(ResolveError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn bad_token_is_token_error() {
        let resolver = TokenIdentityResolver::new(codec());
        assert!(matches!(
            resolver.resolve("garbage").await,
            Err(ResolveError::Token(_))
        ));
    }
}
