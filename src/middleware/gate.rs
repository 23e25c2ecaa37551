use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::auth::{bearer_token, InvalidToken, TokenCodec, TokenError};
use crate::config::AppConfig;
use crate::error::{ApiError, AuthFailure};

/// Path-pattern authorization in front of the routed application. CORS
/// headers are added by the outer [`super::cors_layer`].
///
/// The gate only verifies the bearer credential; it does not inject identity.
/// Endpoints resolve their own context through the pipeline.
pub struct EdgeGate {
    codec: TokenCodec,
    public_paths: Vec<String>,
    protected_prefix: String,
}

impl EdgeGate {
    pub fn new(codec: TokenCodec) -> Self {
        Self {
            codec,
            public_paths: Vec::new(),
            protected_prefix: "/api".to_string(),
        }
    }

    pub fn from_config(codec: TokenCodec, config: &AppConfig) -> Self {
        Self::new(codec)
            .with_public_paths(config.gate.public_paths.clone())
            .with_protected_prefix(&config.gate.protected_prefix)
    }

    /// Blank entries and root wildcards (`*`, `/*`) are dropped: they would
    /// switch the credential check off for every path.
    pub fn with_public_paths(mut self, paths: Vec<String>) -> Self {
        self.public_paths = paths
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| {
                let keep = !p.is_empty() && p != "*" && p != "/*";
                if !keep {
                    tracing::warn!("Ignoring public path pattern {:?}", p);
                }
                keep
            })
            .collect();
        self
    }

    pub fn with_protected_prefix(mut self, prefix: &str) -> Self {
        self.protected_prefix = prefix.trim_end_matches('/').to_string();
        self
    }

    /// Exact, segment-prefix (`/a` covers `/a/b`) or trailing-`*` match.
    /// A bare `/` matches only the root.
    pub fn is_public(&self, path: &str) -> bool {
        self.public_paths.iter().any(|pattern| {
            if let Some(prefix) = pattern.strip_suffix('*') {
                return path.starts_with(prefix);
            }
            let pattern = pattern.trim_end_matches('/');
            if pattern.is_empty() {
                return path == "/";
            }
            path == pattern
                || path
                    .strip_prefix(pattern)
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    pub fn is_protected(&self, path: &str) -> bool {
        let prefix = &self.protected_prefix;
        prefix.is_empty()
            || path == prefix
            || path
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }

    fn check_credential(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .ok_or_else(ApiError::missing_credential)?;

        self.codec.verify_access(token).map(|_| ()).map_err(|e| {
            tracing::warn!("Edge gate rejected credential: {}", e);
            classify(&e)
        })
    }
}

/// Distinct client-facing messages per failure class, without internal detail.
fn classify(err: &TokenError) -> ApiError {
    match err {
        TokenError::Expired => {
            ApiError::unauthenticated("Access token expired", AuthFailure::Expired)
        }
        TokenError::Invalid(InvalidToken::Malformed) => {
            ApiError::unauthenticated("Malformed access token", AuthFailure::Invalid)
        }
        TokenError::Invalid(InvalidToken::Claims(_)) => ApiError::unauthenticated(
            "Access token is not valid for this service",
            AuthFailure::Invalid,
        ),
        _ => ApiError::unauthenticated("Invalid access token", AuthFailure::Invalid),
    }
}

pub async fn edge_gate(State(gate): State<Arc<EdgeGate>>, req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();

    if gate.is_public(&path) {
        next.run(req).await
    } else if req.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else if !gate.is_protected(&path) {
        next.run(req).await
    } else {
        match gate.check_credential(req.headers()) {
            Ok(()) => next.run(req).await,
            Err(err) => err.into_response(),
        }
    }
}
