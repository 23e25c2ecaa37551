//! Client-side persistence of the token pair.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("token file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("token file is corrupt: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("token store lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user_info: Option<Value>,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

impl StoredTokens {
    fn new(access_token: &str, refresh_token: &str, user_info: Option<Value>) -> Self {
        Self {
            access_token: Some(access_token.to_string()),
            refresh_token: Some(refresh_token.to_string()),
            user_info,
            saved_at: Some(Utc::now()),
        }
    }
}

pub trait TokenStore: Send + Sync {
    fn access_token(&self) -> Option<String>;

    fn refresh_token(&self) -> Option<String>;

    fn user_info(&self) -> Option<Value>;

    /// Replace both tokens. `user_info` of `None` keeps the previous profile.
    fn save(
        &self,
        access_token: &str,
        refresh_token: &str,
        user_info: Option<Value>,
    ) -> Result<(), StoreError>;

    fn clear(&self) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<StoredTokens>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(access_token: &str, refresh_token: &str) -> Self {
        Self {
            tokens: RwLock::new(StoredTokens::new(access_token, refresh_token, None)),
        }
    }

    fn snapshot(&self) -> StoredTokens {
        self.tokens.read().map(|t| t.clone()).unwrap_or_default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn access_token(&self) -> Option<String> {
        self.snapshot().access_token
    }

    fn refresh_token(&self) -> Option<String> {
        self.snapshot().refresh_token
    }

    fn user_info(&self) -> Option<Value> {
        self.snapshot().user_info
    }

    fn save(
        &self,
        access_token: &str,
        refresh_token: &str,
        user_info: Option<Value>,
    ) -> Result<(), StoreError> {
        let mut tokens = self.tokens.write().map_err(|_| StoreError::Poisoned)?;
        let user_info = user_info.or_else(|| tokens.user_info.take());
        *tokens = StoredTokens::new(access_token, refresh_token, user_info);
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut tokens = self.tokens.write().map_err(|_| StoreError::Poisoned)?;
        *tokens = StoredTokens::default();
        Ok(())
    }
}

/// JSON file store with an in-memory cache. Owner-only permissions on unix.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    cache: RwLock<StoredTokens>,
}

impl FileTokenStore {
    pub const FILE_NAME: &'static str = "tokens.json";

    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let tokens = if path.exists() {
            serde_json::from_str(&fs::read_to_string(&path)?)?
        } else {
            StoredTokens::default()
        };
        Ok(Self {
            path,
            cache: RwLock::new(tokens),
        })
    }

    pub fn in_dir(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open(dir.as_ref().join(Self::FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn saved_at(&self) -> Option<DateTime<Utc>> {
        self.snapshot().saved_at
    }

    fn snapshot(&self) -> StoredTokens {
        self.cache.read().map(|t| t.clone()).unwrap_or_default()
    }

    fn persist(&self, tokens: &StoredTokens) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(tokens)?;

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path)?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn access_token(&self) -> Option<String> {
        self.snapshot().access_token
    }

    fn refresh_token(&self) -> Option<String> {
        self.snapshot().refresh_token
    }

    fn user_info(&self) -> Option<Value> {
        self.snapshot().user_info
    }

    fn save(
        &self,
        access_token: &str,
        refresh_token: &str,
        user_info: Option<Value>,
    ) -> Result<(), StoreError> {
        let mut cache = self.cache.write().map_err(|_| StoreError::Poisoned)?;
        let user_info = user_info.or_else(|| cache.user_info.clone());
        let tokens = StoredTokens::new(access_token, refresh_token, user_info);
        self.persist(&tokens)?;
        *cache = tokens;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut cache = self.cache.write().map_err(|_| StoreError::Poisoned)?;
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        *cache = StoredTokens::default();
        Ok(())
    }
}
