use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub gate: GateConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub max_request_size_bytes: usize,
    pub accounts_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(skip_serializing)]
    pub access_secret: Option<String>,
    #[serde(skip_serializing)]
    pub refresh_secret: Option<String>,
    pub issuer: String,
    pub audience: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
    pub cors_origins: Vec<String>,
    pub reject_superseded_refresh: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    pub public_paths: Vec<String>,
    pub protected_prefix: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required configuration value {0} is not set")]
    Missing(&'static str),

    #[error("configuration value {name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl SecurityConfig {
    /// Access-token signing secret. Never defaulted.
    pub fn access_secret(&self) -> Result<&str, ConfigError> {
        match self.access_secret.as_deref() {
            Some(secret) if !secret.trim().is_empty() => Ok(secret),
            _ => Err(ConfigError::Missing("JWT_ACCESS_SECRET")),
        }
    }

    /// Refresh-token signing secret, or `None` when only the access secret is configured.
    pub fn refresh_secret(&self) -> Option<&str> {
        self.refresh_secret
            .as_deref()
            .filter(|secret| !secret.trim().is_empty())
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // API overrides
        if let Ok(v) = env::var("HOMECARE_API_PORT").or_else(|_| env::var("PORT")) {
            self.api.port = parse_or_keep("HOMECARE_API_PORT", &v, self.api.port);
        }
        if let Ok(v) = env::var("API_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes =
                parse_or_keep("API_MAX_REQUEST_SIZE_BYTES", &v, self.api.max_request_size_bytes);
        }
        if let Ok(v) = env::var("HOMECARE_ACCOUNTS_FILE") {
            self.api.accounts_file = Some(v);
        }

        // Security overrides
        if let Ok(v) = env::var("JWT_ACCESS_SECRET") {
            self.security.access_secret = Some(v);
        }
        if let Ok(v) = env::var("JWT_REFRESH_SECRET") {
            self.security.refresh_secret = Some(v);
        }
        if let Ok(v) = env::var("JWT_ISSUER") {
            self.security.issuer = v;
        }
        if let Ok(v) = env::var("JWT_AUDIENCE") {
            self.security.audience = v;
        }
        if let Ok(v) = env::var("JWT_ACCESS_TTL_SECS") {
            self.security.access_ttl_secs =
                parse_ttl_or_keep("JWT_ACCESS_TTL_SECS", &v, self.security.access_ttl_secs);
        }
        if let Ok(v) = env::var("JWT_REFRESH_TTL_SECS") {
            self.security.refresh_ttl_secs =
                parse_ttl_or_keep("JWT_REFRESH_TTL_SECS", &v, self.security.refresh_ttl_secs);
        }
        if let Ok(v) = env::var("CORS_ALLOWED_ORIGINS") {
            self.security.cors_origins = split_list(&v);
        }
        if let Ok(v) = env::var("AUTH_REJECT_SUPERSEDED_REFRESH") {
            self.security.reject_superseded_refresh = parse_flag_or_keep(
                "AUTH_REJECT_SUPERSEDED_REFRESH",
                &v,
                self.security.reject_superseded_refresh,
            );
        }

        // Gate overrides
        if let Ok(v) = env::var("AUTH_PUBLIC_PATHS") {
            self.gate.public_paths = split_list(&v);
        }
        if let Ok(v) = env::var("AUTH_PROTECTED_PREFIX") {
            self.gate.protected_prefix = v;
        }

        self
    }

    fn base(environment: Environment) -> Self {
        Self {
            environment,
            api: ApiConfig {
                port: 3000,
                max_request_size_bytes: 2 * 1024 * 1024, // 2MB
                accounts_file: None,
            },
            security: SecurityConfig {
                access_secret: None,
                refresh_secret: None,
                issuer: "homecare-admin".to_string(),
                audience: "homecare-admin-web".to_string(),
                access_ttl_secs: 30 * 60,
                refresh_ttl_secs: 7 * 24 * 60 * 60,
                cors_origins: Vec::new(),
                reject_superseded_refresh: true,
            },
            gate: GateConfig {
                public_paths: vec![
                    "/api/auth/login".to_string(),
                    "/api/auth/refresh".to_string(),
                    "/api/auth/revoke".to_string(),
                ],
                protected_prefix: "/api".to_string(),
            },
        }
    }

    pub fn development() -> Self {
        let mut config = Self::base(Environment::Development);
        config.api.max_request_size_bytes = 10 * 1024 * 1024; // 10MB
        config.security.cors_origins = vec![
            "http://localhost:3000".to_string(),
            "http://localhost:5173".to_string(),
        ];
        config
    }

    pub fn staging() -> Self {
        let mut config = Self::base(Environment::Staging);
        config.api.max_request_size_bytes = 5 * 1024 * 1024; // 5MB
        config.security.cors_origins = vec!["https://staging.homecare.example.com".to_string()];
        config
    }

    pub fn production() -> Self {
        let mut config = Self::base(Environment::Production);
        config.security.access_ttl_secs = 15 * 60;
        config.security.cors_origins = vec!["https://admin.homecare.example.com".to_string()];
        config
    }
}

fn parse_or_keep<T>(name: &str, raw: &str, current: T) -> T
where
    T: FromStr + Display,
{
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!("Ignoring malformed {}={:?}; keeping {}", name, raw, current);
            current
        }
    }
}

/// Lifetimes must be positive; anything else keeps the current value.
fn parse_ttl_or_keep(name: &str, raw: &str, current: i64) -> i64 {
    let value = parse_or_keep(name, raw, current);
    if value > 0 {
        value
    } else {
        tracing::warn!("Ignoring non-positive {}={}; keeping {}", name, value, current);
        current
    }
}

fn parse_flag_or_keep(name: &str, raw: &str, current: bool) -> bool {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => {
            tracing::warn!("Ignoring malformed {}={:?}; keeping {}", name, raw, current);
            current
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
