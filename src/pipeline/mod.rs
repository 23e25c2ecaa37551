//! Uniform request handling for resource endpoints.
//!
//! Every invocation runs the same fixed steps: path parameters, then
//! authentication, then the permission check, then verb dispatch, then the
//! action itself. A failing step never reaches the action.

pub mod action;
pub mod request;

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::{
    body::to_bytes,
    extract::{FromRequestParts, RawPathParams, Request},
    http::{header, request::Parts},
    response::{IntoResponse, Response},
    routing::{any, MethodRouter},
};
use futures::FutureExt;

pub use action::{Action, ActionFuture, ActionOutput, Actions};
pub use request::{ActionRequest, PathParams};

use crate::auth::{authorize, bearer_token, AuthzError, IdentityResolver, UserContext};
use crate::error::{ApiError, DomainError};
use request::parse_identifier;

/// Declarative per-endpoint options.
#[derive(Debug, Clone)]
pub struct HandlerOptions {
    pub permission: Option<String>,
    pub require_auth: bool,
    pub has_params: bool,
    pub param_name: String,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self {
            permission: None,
            require_auth: true,
            has_params: false,
            param_name: "id".to_string(),
        }
    }
}

impl HandlerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn permission(mut self, permission: impl Into<String>) -> Self {
        self.permission = Some(permission.into());
        self
    }

    pub fn public(mut self) -> Self {
        self.require_auth = false;
        self
    }

    pub fn with_params(mut self) -> Self {
        self.has_params = true;
        self
    }

    pub fn param_name(mut self, name: impl Into<String>) -> Self {
        self.param_name = name.into();
        self.has_params = true;
        self
    }
}

/// Builds [`Endpoint`]s sharing one identity resolver.
#[derive(Clone)]
pub struct Pipeline {
    resolver: Arc<dyn IdentityResolver>,
    max_body_bytes: usize,
}

impl Pipeline {
    pub fn new(resolver: Arc<dyn IdentityResolver>) -> Self {
        Self {
            resolver,
            max_body_bytes: 2 * 1024 * 1024,
        }
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn build(&self, actions: impl Into<Actions>, mut options: HandlerOptions) -> Endpoint {
        let actions = actions.into();
        if actions.any_takes_params() {
            options.has_params = true;
        }

        Endpoint {
            inner: Arc::new(EndpointInner {
                actions,
                options,
                resolver: self.resolver.clone(),
                max_body_bytes: self.max_body_bytes,
            }),
        }
    }
}

struct EndpointInner {
    actions: Actions,
    options: HandlerOptions,
    resolver: Arc<dyn IdentityResolver>,
    max_body_bytes: usize,
}

/// A built endpoint; mount it with [`Endpoint::into_route`].
#[derive(Clone)]
pub struct Endpoint {
    inner: Arc<EndpointInner>,
}

impl Endpoint {
    pub fn options(&self) -> &HandlerOptions {
        &self.inner.options
    }

    pub fn into_route<S>(self) -> MethodRouter<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        any(move |req: Request| {
            let endpoint = self.clone();
            async move { endpoint.handle(req).await }
        })
    }

    pub async fn handle(&self, req: Request) -> Response {
        match self.run(req).await {
            Ok(output) => output.into_response(),
            Err(err) => err.into_response(),
        }
    }

    async fn run(&self, req: Request) -> Result<ActionOutput, ApiError> {
        let inner = &self.inner;
        let (mut parts, body) = req.into_parts();

        // 1. Path parameters
        let params = if inner.options.has_params {
            Some(self.path_params(&mut parts).await?)
        } else {
            None
        };

        // 2. Authentication
        let context = if inner.options.require_auth {
            Some(self.authenticate(&parts).await?)
        } else {
            None
        };

        // 3. Permission
        if let Some(permission) = &inner.options.permission {
            match &context {
                Some(ctx) => authorize(ctx, permission)?,
                None => return Err(AuthzError::MissingPermission(permission.clone()).into()),
            }
        }

        // 4. Dispatch
        let action = inner.actions.resolve(&parts.method).ok_or_else(|| {
            tracing::debug!("No action registered for {} {}", parts.method, parts.uri.path());
            ApiError::method_not_allowed(inner.actions.allowed_methods())
        })?;

        let body = to_bytes(body, inner.max_body_bytes)
            .await
            .map_err(|_| ApiError::validation_error("Request body too large or unreadable", None))?;

        let request = ActionRequest {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
        };

        // 5. Invoke
        let path = request.uri.path().to_string();
        let invocation = AssertUnwindSafe(action.call(request, params, context)).catch_unwind();
        match invocation.await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(err)) => Err(normalize(err, &path)),
            Err(_) => {
                tracing::error!("Action for {} panicked", path);
                Err(ApiError::internal_server_error("Internal server error"))
            }
        }
    }

    async fn path_params(&self, parts: &mut Parts) -> Result<PathParams, ApiError> {
        let name = &self.inner.options.param_name;
        let values: HashMap<String, String> = match RawPathParams::from_request_parts(parts, &()).await
        {
            Ok(raw) => raw
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            Err(_) => HashMap::new(),
        };

        match parse_identifier(values.get(name).map(String::as_str)) {
            Some(id) => Ok(PathParams { id, values }),
            None => {
                tracing::debug!("Rejected path parameter '{}' for {}", name, parts.uri.path());
                Err(ApiError::field_error(name, "must be a positive integer"))
            }
        }
    }

    async fn authenticate(&self, parts: &Parts) -> Result<UserContext, ApiError> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .ok_or_else(ApiError::missing_credential)?;

        self.inner.resolver.resolve(token).await.map_err(|e| {
            tracing::warn!("Authentication failed for {}: {}", parts.uri.path(), e);
            ApiError::from(e)
        })
    }
}

/// Map whatever an action raised onto the error taxonomy.
fn normalize(err: anyhow::Error, path: &str) -> ApiError {
    let err = match err.downcast::<ApiError>() {
        Ok(api) => return api,
        Err(err) => err,
    };
    let err = match err.downcast::<DomainError>() {
        Ok(domain) => return ApiError::Domain(domain),
        Err(err) => err,
    };
    match err.downcast::<AuthzError>() {
        Ok(authz) => authz.into(),
        Err(err) => {
            tracing::error!("Unhandled error in action for {}: {:#}", path, err);
            ApiError::internal_server_error("Internal server error")
        }
    }
}

/// Unwrap the caller context of an authenticated endpoint.
pub fn require_context(ctx: Option<UserContext>) -> Result<UserContext, ApiError> {
    ctx.ok_or_else(ApiError::missing_credential)
}
