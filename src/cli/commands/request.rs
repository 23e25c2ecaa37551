use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::Context;
use clap::Subcommand;
use serde_json::{json, Value};

use crate::cli::utils::{output_data, output_success};
use crate::cli::Session;

#[derive(Subcommand)]
pub enum RequestCommands {
    #[command(about = "GET a path; --data is sent as query parameters")]
    Get {
        #[arg(help = "API path, e.g. /api/recipients")]
        path: String,
        #[arg(long, help = "JSON object of query parameters, or - for stdin")]
        data: Option<String>,
    },

    #[command(about = "POST a JSON body")]
    Post {
        #[arg(help = "API path")]
        path: String,
        #[arg(long, help = "JSON body, or - for stdin")]
        data: Option<String>,
    },

    #[command(about = "PUT a JSON body")]
    Put {
        #[arg(help = "API path")]
        path: String,
        #[arg(long, help = "JSON body, or - for stdin")]
        data: Option<String>,
    },

    #[command(about = "DELETE a path")]
    Delete {
        #[arg(help = "API path")]
        path: String,
    },

    #[command(about = "Download a binary resource to a file")]
    Download {
        #[arg(help = "API path, e.g. /api/reports/recipients.csv")]
        path: String,
        #[arg(long, short, help = "Output file path")]
        output: PathBuf,
    },
}

pub async fn handle(cmd: RequestCommands, session: &Session) -> anyhow::Result<()> {
    let output = &session.output;
    let client = &session.client;

    let envelope = match cmd {
        RequestCommands::Get { path, data } => client.get(&path, parse_data(data)?).await?,
        RequestCommands::Post { path, data } => {
            client
                .post(&path, parse_data(data)?.unwrap_or_else(|| json!({})))
                .await?
        }
        RequestCommands::Put { path, data } => {
            client
                .put(&path, parse_data(data)?.unwrap_or_else(|| json!({})))
                .await?
        }
        RequestCommands::Delete { path } => client.delete(&path).await?,
        RequestCommands::Download { path, output: file } => {
            let download = client.download(&path, None).await?;
            fs::write(&file, &download.bytes)
                .with_context(|| format!("failed to write {}", file.display()))?;
            return output_success(
                output,
                &format!("Saved {} bytes to {}", download.bytes.len(), file.display()),
                Some(json!({
                    "path": file.display().to_string(),
                    "bytes": download.bytes.len(),
                    "contentType": download.content_type,
                    "filename": download.filename,
                })),
            );
        }
    };

    output_data(output, &envelope.data.unwrap_or(Value::Null))
}

fn parse_data(data: Option<String>) -> anyhow::Result<Option<Value>> {
    let raw = match data.as_deref() {
        None => return Ok(None),
        Some("-") => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read request body from stdin")?;
            buffer
        }
        Some(text) => text.to_string(),
    };
    let value = serde_json::from_str(&raw).context("--data must be valid JSON")?;
    Ok(Some(value))
}
