pub mod commands;
pub mod config;
pub mod utils;

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::client::{ApiClient, ClientError, TokenStore};

#[derive(Parser)]
#[command(name = "homecare")]
#[command(about = "Homecare CLI - Command-line client for the home-care admin API")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[arg(
        long,
        global = true,
        env = "HOMECARE_API_URL",
        help = "API base URL (defaults to the last URL used, then http://localhost:3000)"
    )]
    pub url: Option<String>,

    #[arg(long, global = true, default_value_t = 30, help = "Request timeout in seconds")]
    pub timeout: u64,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Authentication and token management")]
    Auth {
        #[command(subcommand)]
        cmd: commands::auth::AuthCommands,
    },

    #[command(about = "Authenticated requests against the API")]
    Request {
        #[command(subcommand)]
        cmd: commands::request::RequestCommands,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

/// Everything a command handler needs: output format and a client bound to
/// the persisted token store.
pub struct Session {
    pub output: OutputFormat,
    pub client: ApiClient,
}

impl Session {
    pub fn open(cli: &Cli) -> anyhow::Result<Self> {
        let profile = config::load_profile()?;
        let base_url = config::resolve_api_url(cli.url.as_deref(), &profile);
        let store: Arc<dyn TokenStore> = Arc::new(config::token_store()?);

        let client = ApiClient::builder(base_url, store)
            .timeout(Duration::from_secs(cli.timeout.max(1)))
            .build()?;

        Ok(Self {
            output: OutputFormat::from_cli(cli),
            client,
        })
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let session = Session::open(&cli)?;

    let result = match cli.command {
        Commands::Auth { cmd } => commands::auth::handle(cmd, &session).await,
        Commands::Request { cmd } => commands::request::handle(cmd, &session).await,
    };

    // Text mode leaves the message to the binary's stderr report
    if let (Err(e), OutputFormat::Json) = (&result, session.output) {
        let code = e.downcast_ref::<ClientError>().map(ClientError::code);
        utils::output_error(&session.output, &e.to_string(), code)?;
    }
    result
}
