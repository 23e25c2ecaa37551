use anyhow::Context;
use tracing_subscriber::EnvFilter;

use homecare_admin::app::{app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up JWT secrets, APP_ENV, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    // Initialize configuration (this loads the config singleton)
    let config = homecare_admin::config::config();
    tracing::info!("Starting homecare-admin in {:?} mode", config.environment);

    // Missing secrets fail here rather than on the first request
    let state = AppState::from_config(config)?;

    let bind_addr = format!("0.0.0.0:{}", config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("homecare-admin listening on http://{}", bind_addr);

    axum::serve(listener, app(state))
        .await
        .context("server error")?;
    Ok(())
}
