//! Client-side request engine used by the `homecare` CLI and integration tests.

pub mod engine;
pub mod error;
pub mod refresh;
pub mod store;

pub use engine::{
    ApiClient, ApiClientBuilder, ClientSettings, Download, LoggingHooks, RequestOptions,
    SessionHooks,
};
pub use error::ClientError;
pub use refresh::{RefreshCoordinator, RefreshFailure, RefreshOutcome};
pub use store::{FileTokenStore, MemoryTokenStore, StoreError, StoredTokens, TokenStore};
