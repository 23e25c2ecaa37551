// handlers/public/auth/refresh.rs - POST /api/auth/refresh handler
use std::sync::Arc;

use axum::http::Method;
use serde_json::Value;

use super::RefreshTokenRequest;
use crate::error::ApiError;
use crate::pipeline::{Action, ActionRequest, Actions, Endpoint, HandlerOptions, Pipeline};
use crate::services::SessionService;

pub fn endpoint(pipeline: &Pipeline, sessions: Arc<SessionService>) -> Endpoint {
    pipeline.build(
        Actions::by_method([(
            Method::POST,
            Action::plain(move |req, _ctx| refresh_post(sessions.clone(), req)),
        )]),
        HandlerOptions::new().public(),
    )
}

/// POST /api/auth/refresh - Rotate a refresh token
///
/// Every successful exchange mints a new session id and revokes the
/// presented token. Invalid, expired, revoked or superseded tokens yield a
/// domain error with code 401.
pub async fn refresh_post(
    sessions: Arc<SessionService>,
    req: ActionRequest,
) -> anyhow::Result<Value> {
    let body: RefreshTokenRequest = req.json()?;
    let tokens = sessions
        .refresh(&body.refresh_token)
        .await
        .map_err(ApiError::from)?;
    Ok(serde_json::to_value(tokens)?)
}
