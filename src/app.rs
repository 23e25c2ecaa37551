use std::sync::Arc;

use anyhow::Context;
use axum::{
    http::StatusCode,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::accounts::{AccountDirectory, InMemoryDirectory};
use crate::auth::{
    InMemoryRevocationList, InMemorySessionRegistry, TokenCodec, TokenIdentityResolver,
    TokenSettings,
};
use crate::config::{AppConfig, ConfigError};
use crate::envelope::Envelope;
use crate::handlers::{protected, public};
use crate::middleware::{cors_layer, edge_gate, EdgeGate};
use crate::pipeline::Pipeline;
use crate::services::{RecipientStore, SessionService};

/// Everything the router needs, wired once at start-up.
#[derive(Clone)]
pub struct AppState {
    pub codec: TokenCodec,
    pub pipeline: Pipeline,
    pub sessions: Arc<SessionService>,
    pub recipients: Arc<RecipientStore>,
    pub gate: Arc<EdgeGate>,
    pub cors: CorsLayer,
}

impl AppState {
    pub fn new(
        config: &AppConfig,
        directory: Arc<dyn AccountDirectory>,
        recipients: Arc<RecipientStore>,
    ) -> Result<Self, ConfigError> {
        let codec = TokenCodec::new(TokenSettings::from_config(&config.security)?);

        let resolver = TokenIdentityResolver::new(codec.clone()).with_directory(directory.clone());
        let pipeline = Pipeline::new(Arc::new(resolver))
            .with_max_body_bytes(config.api.max_request_size_bytes);

        let sessions = SessionService::new(
            codec.clone(),
            directory,
            Arc::new(InMemoryRevocationList::new()),
            Arc::new(InMemorySessionRegistry::new()),
        )
        .reject_superseded(config.security.reject_superseded_refresh);

        let gate = EdgeGate::from_config(codec.clone(), config);

        Ok(Self {
            codec,
            pipeline,
            sessions: Arc::new(sessions),
            recipients,
            gate: Arc::new(gate),
            cors: cors_layer(config),
        })
    }

    /// Load accounts from `HOMECARE_ACCOUNTS_FILE`, or the development seed
    /// outside production.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let directory = match &config.api.accounts_file {
            Some(path) => InMemoryDirectory::from_file(path)
                .with_context(|| format!("loading accounts from {}", path))?,
            None if config.environment.is_production() => {
                return Err(ConfigError::Missing("HOMECARE_ACCOUNTS_FILE").into());
            }
            None => {
                tracing::warn!("HOMECARE_ACCOUNTS_FILE not set; using development accounts");
                InMemoryDirectory::seeded().context("hashing development account passwords")?
            }
        };
        tracing::info!("Loaded {} accounts", directory.len());

        let recipients = if config.environment.is_production() {
            RecipientStore::new()
        } else {
            RecipientStore::seeded()
        };

        Ok(Self::new(config, Arc::new(directory), Arc::new(recipients))?)
    }
}

pub fn app(state: AppState) -> Router {
    let pipeline = &state.pipeline;

    Router::new()
        // Public
        .route("/health", get(public::health::health))
        .route(
            "/api/auth/login",
            public::auth::login::endpoint(pipeline, state.sessions.clone()).into_route(),
        )
        .route(
            "/api/auth/refresh",
            public::auth::refresh::endpoint(pipeline, state.sessions.clone()).into_route(),
        )
        .route(
            "/api/auth/revoke",
            public::auth::revoke::endpoint(pipeline, state.sessions.clone()).into_route(),
        )
        // Protected
        .route(
            "/api/auth/me",
            protected::session::endpoint(pipeline, state.sessions.clone()).into_route(),
        )
        .route(
            "/api/recipients",
            protected::recipients::collection_endpoint(pipeline, state.recipients.clone())
                .into_route(),
        )
        .route(
            "/api/recipients/:id",
            protected::recipients::record_endpoint(pipeline, state.recipients.clone())
                .into_route(),
        )
        .route(
            "/api/reports/recipients.csv",
            protected::reports::recipients_csv_endpoint(pipeline, state.recipients.clone())
                .into_route(),
        )
        .fallback(not_found)
        // Global middleware
        .layer(from_fn_with_state(state.gate.clone(), edge_gate))
        .layer(state.cors.clone())
        .layer(TraceLayer::new_for_http())
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Envelope::<()>::error(404, "Route not found"),
    )
}
