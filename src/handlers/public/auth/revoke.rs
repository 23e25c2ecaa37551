// handlers/public/auth/revoke.rs - POST /api/auth/revoke handler
use std::sync::Arc;

use axum::http::Method;
use serde_json::{json, Value};

use super::RefreshTokenRequest;
use crate::pipeline::{Action, ActionRequest, Actions, Endpoint, HandlerOptions, Pipeline};
use crate::services::SessionService;

pub fn endpoint(pipeline: &Pipeline, sessions: Arc<SessionService>) -> Endpoint {
    pipeline.build(
        Actions::by_method([(
            Method::POST,
            Action::plain(move |req, _ctx| revoke_post(sessions.clone(), req)),
        )]),
        HandlerOptions::new().public(),
    )
}

/// POST /api/auth/revoke - Sign out by revoking a refresh token. Idempotent.
pub async fn revoke_post(sessions: Arc<SessionService>, req: ActionRequest) -> anyhow::Result<Value> {
    let body: RefreshTokenRequest = req.json()?;
    sessions.revoke(&body.refresh_token).await;
    Ok(json!({ "revoked": true }))
}
