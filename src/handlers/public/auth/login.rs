// handlers/public/auth/login.rs - POST /api/auth/login handler
use std::sync::Arc;

use axum::http::Method;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::pipeline::{Action, ActionRequest, Actions, Endpoint, HandlerOptions, Pipeline};
use crate::services::SessionService;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

pub fn endpoint(pipeline: &Pipeline, sessions: Arc<SessionService>) -> Endpoint {
    pipeline.build(
        Actions::by_method([(
            Method::POST,
            Action::plain(move |req, _ctx| login_post(sessions.clone(), req)),
        )]),
        HandlerOptions::new().public(),
    )
}

/// POST /api/auth/login - Exchange credentials for a token triple
///
/// Input: `{"username": "...", "password": "..."}`
///
/// Output: `{"accessToken", "refreshToken", "userInfo"}`. Bad credentials
/// come back as a domain error with code 401.
pub async fn login_post(sessions: Arc<SessionService>, req: ActionRequest) -> anyhow::Result<Value> {
    let body: LoginRequest = req.json()?;
    let tokens = sessions
        .login(&body.username, &body.password)
        .await
        .map_err(ApiError::from)?;
    Ok(serde_json::to_value(tokens)?)
}
