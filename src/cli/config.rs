use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::FileTokenStore;

pub const DEFAULT_API_URL: &str = "http://localhost:3000";

/// Non-secret state remembered between invocations. Tokens live in their own
/// file behind [`FileTokenStore`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CliProfile {
    pub api_url: Option<String>,
    pub username: Option<String>,
    pub logged_in_at: Option<DateTime<Utc>>,
}

impl CliProfile {
    pub fn signed_in(api_url: &str, username: &str) -> Self {
        Self {
            api_url: Some(api_url.to_string()),
            username: Some(username.to_string()),
            logged_in_at: Some(Utc::now()),
        }
    }
}

pub fn get_config_dir() -> anyhow::Result<PathBuf> {
    let config_dir = if let Ok(custom_dir) = std::env::var("HOMECARE_CLI_CONFIG_DIR") {
        PathBuf::from(custom_dir)
    } else {
        let home = std::env::var("HOME")
            .map_err(|_| anyhow::anyhow!("HOME environment variable not set"))?;
        PathBuf::from(home).join(".config").join("homecare").join("cli")
    };

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

pub fn token_store() -> anyhow::Result<FileTokenStore> {
    Ok(FileTokenStore::in_dir(get_config_dir()?)?)
}

pub fn load_profile() -> anyhow::Result<CliProfile> {
    let profile_file = get_config_dir()?.join("profile.json");

    if !profile_file.exists() {
        return Ok(CliProfile::default());
    }

    let content = fs::read_to_string(profile_file)?;
    let profile: CliProfile = serde_json::from_str(&content)?;
    Ok(profile)
}

pub fn save_profile(profile: &CliProfile) -> anyhow::Result<()> {
    let profile_file = get_config_dir()?.join("profile.json");

    let content = serde_json::to_string_pretty(profile)?;
    fs::write(profile_file, content)?;
    Ok(())
}

/// `--url` / `HOMECARE_API_URL`, then the last URL signed in to, then the default.
pub fn resolve_api_url(flag: Option<&str>, profile: &CliProfile) -> String {
    flag.map(str::to_string)
        .or_else(|| profile.api_url.clone())
        .unwrap_or_else(|| DEFAULT_API_URL.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_precedence() {
        let profile = CliProfile::signed_in("http://remembered:3000", "admin");
        assert_eq!(
            resolve_api_url(Some("http://flag:1"), &profile),
            "http://flag:1"
        );
        assert_eq!(resolve_api_url(None, &profile), "http://remembered:3000");
        assert_eq!(
            resolve_api_url(None, &CliProfile::default()),
            DEFAULT_API_URL
        );
    }

    #[test]
    fn profile_round_trips_through_json() {
        let profile = CliProfile::signed_in("http://localhost:3000", "coordinator");
        let text = serde_json::to_string(&profile).unwrap();
        assert_eq!(serde_json::from_str::<CliProfile>(&text).unwrap(), profile);
    }
}
