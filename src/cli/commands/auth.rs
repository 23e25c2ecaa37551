use std::io::{self, BufRead, Write};

use anyhow::Context;
use clap::Subcommand;
use serde_json::json;

use crate::accounts;
use crate::cli::config::{self, CliProfile};
use crate::cli::utils::{output_data, output_success};
use crate::cli::Session;
use crate::client::TokenStore;

#[derive(Subcommand)]
pub enum AuthCommands {
    #[command(about = "Login to server")]
    Login {
        #[arg(help = "Username")]
        username: String,
        #[arg(
            long,
            env = "HOMECARE_PASSWORD",
            hide_env_values = true,
            help = "Password (will prompt if not provided)"
        )]
        password: Option<String>,
    },

    #[command(about = "Revoke the stored session and forget its tokens")]
    Logout,

    #[command(about = "Show current authentication status")]
    Status,

    #[command(about = "Refresh authentication token")]
    Refresh,

    #[command(about = "Show current user information")]
    Whoami,

    #[command(about = "Print an Argon2id hash for an accounts file entry")]
    HashPassword {
        #[arg(
            long,
            env = "HOMECARE_PASSWORD",
            hide_env_values = true,
            help = "Password (will prompt if not provided)"
        )]
        password: Option<String>,
    },
}

pub async fn handle(cmd: AuthCommands, session: &Session) -> anyhow::Result<()> {
    let output = &session.output;
    let client = &session.client;

    match cmd {
        AuthCommands::Login { username, password } => {
            let password = match password {
                Some(password) => password,
                None => prompt_password()?,
            };
            let user_info = client.login(&username, &password).await?;

            let base_url = client.base_url().as_str().trim_end_matches('/').to_string();
            config::save_profile(&CliProfile::signed_in(&base_url, &username))?;

            output_success(
                output,
                &format!("Logged in as {} at {}", username, base_url),
                Some(json!({ "userInfo": user_info })),
            )
        }
        AuthCommands::Logout => {
            client.logout().await?;
            let profile = CliProfile {
                username: None,
                logged_in_at: None,
                ..config::load_profile()?
            };
            config::save_profile(&profile)?;
            output_success(output, "Logged out", None)
        }
        AuthCommands::Status => {
            let profile = config::load_profile()?;
            let store = client.store();
            let authenticated = store.access_token().is_some();

            let message = match (&profile.username, authenticated) {
                (Some(username), true) => format!("Authenticated as {}", username),
                (None, true) => "Authenticated".to_string(),
                (_, false) => "Not authenticated".to_string(),
            };
            output_success(
                output,
                &message,
                Some(json!({
                    "authenticated": authenticated,
                    "hasRefreshToken": store.refresh_token().is_some(),
                    "username": profile.username,
                    "apiUrl": client.base_url().as_str(),
                    "loggedInAt": profile.logged_in_at,
                })),
            )
        }
        AuthCommands::Refresh => {
            client.refresh_session().await?;
            output_success(output, "Access token refreshed", None)
        }
        AuthCommands::Whoami => {
            let envelope = client.me().await?;
            output_data(output, &envelope.data.unwrap_or_default())
        }
        AuthCommands::HashPassword { password } => {
            let password = match password {
                Some(password) => password,
                None => prompt_password()?,
            };
            let hash = accounts::hash_password(&password)?;
            output_success(output, &hash, Some(json!({ "passwordHash": hash })))
        }
    }
}

fn prompt_password() -> anyhow::Result<String> {
    eprint!("Password: ");
    io::stderr().flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read password from stdin")?;

    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        anyhow::bail!("password is required");
    }
    Ok(password)
}
