// handlers/protected/session.rs - GET /api/auth/me handler
use std::sync::Arc;

use axum::http::Method;
use serde_json::Value;

use crate::auth::UserContext;
use crate::error::ApiError;
use crate::pipeline::{require_context, Action, Actions, Endpoint, HandlerOptions, Pipeline};
use crate::services::SessionService;

/// Registered for GET only; any other verb is answered with 405.
pub fn endpoint(pipeline: &Pipeline, sessions: Arc<SessionService>) -> Endpoint {
    pipeline.build(
        Actions::by_method([(
            Method::GET,
            Action::plain(move |_req, ctx| me_get(sessions.clone(), ctx)),
        )]),
        HandlerOptions::new(),
    )
}

/// GET /api/auth/me - Profile of the authenticated caller
pub async fn me_get(sessions: Arc<SessionService>, ctx: Option<UserContext>) -> anyhow::Result<Value> {
    let ctx = require_context(ctx)?;
    Ok(sessions.me(&ctx).await.map_err(ApiError::from)?)
}
