use std::future::Future;
use std::sync::Arc;

use axum::{
    http::Method,
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use serde_json::Value;

use super::request::{ActionRequest, PathParams};
use crate::auth::UserContext;
use crate::envelope::Envelope;

pub type ActionFuture = BoxFuture<'static, anyhow::Result<ActionOutput>>;

type PlainFn = dyn Fn(ActionRequest, Option<UserContext>) -> ActionFuture + Send + Sync;
type WithParamsFn =
    dyn Fn(ActionRequest, PathParams, Option<UserContext>) -> ActionFuture + Send + Sync;

/// What an action hands back to the pipeline.
pub enum ActionOutput {
    /// Plain data, wrapped as `{code: 200, data}`.
    Json(Value),
    /// Pre-built envelope, sent unchanged.
    Envelope(Envelope),
    /// Escape hatch for non-JSON responses such as downloads.
    Response(Response),
}

impl From<Value> for ActionOutput {
    fn from(value: Value) -> Self {
        ActionOutput::Json(value)
    }
}

impl From<Envelope> for ActionOutput {
    fn from(envelope: Envelope) -> Self {
        ActionOutput::Envelope(envelope)
    }
}

impl From<Response> for ActionOutput {
    fn from(response: Response) -> Self {
        ActionOutput::Response(response)
    }
}

impl IntoResponse for ActionOutput {
    fn into_response(self) -> Response {
        match self {
            ActionOutput::Json(value) => Envelope::success(value).into_response(),
            ActionOutput::Envelope(envelope) => envelope.into_response(),
            ActionOutput::Response(response) => response,
        }
    }
}

/// A resource action with its declared shape.
#[derive(Clone)]
pub enum Action {
    Plain(Arc<PlainFn>),
    WithParams(Arc<WithParamsFn>),
}

impl Action {
    pub fn plain<F, Fut, O>(f: F) -> Self
    where
        F: Fn(ActionRequest, Option<UserContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
        O: Into<ActionOutput>,
    {
        Action::Plain(Arc::new(move |req: ActionRequest, ctx: Option<UserContext>| -> ActionFuture {
            let fut = f(req, ctx);
            Box::pin(async move { fut.await.map(Into::into) })
        }))
    }

    pub fn with_params<F, Fut, O>(f: F) -> Self
    where
        F: Fn(ActionRequest, PathParams, Option<UserContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
        O: Into<ActionOutput>,
    {
        Action::WithParams(Arc::new(
            move |req: ActionRequest, params: PathParams, ctx: Option<UserContext>| -> ActionFuture {
                let fut = f(req, params, ctx);
                Box::pin(async move { fut.await.map(Into::into) })
            },
        ))
    }

    pub fn takes_params(&self) -> bool {
        matches!(self, Action::WithParams(_))
    }

    pub(crate) fn call(
        &self,
        req: ActionRequest,
        params: Option<PathParams>,
        ctx: Option<UserContext>,
    ) -> ActionFuture {
        match (self, params) {
            (Action::Plain(f), _) => f(req, ctx),
            (Action::WithParams(f), Some(params)) => f(req, params, ctx),
            (Action::WithParams(_), None) => Box::pin(async {
                Err(anyhow::anyhow!("parameterized action invoked without path parameters"))
            }),
        }
    }
}

/// One action for every verb, or one per verb.
#[derive(Clone)]
pub enum Actions {
    Single(Action),
    ByMethod(Vec<(Method, Action)>),
}

impl Actions {
    pub fn by_method(actions: impl IntoIterator<Item = (Method, Action)>) -> Self {
        Actions::ByMethod(actions.into_iter().collect())
    }

    pub(crate) fn resolve(&self, method: &Method) -> Option<&Action> {
        match self {
            Actions::Single(action) => Some(action),
            Actions::ByMethod(actions) => actions
                .iter()
                .find(|(registered, _)| registered == method)
                .map(|(_, action)| action),
        }
    }

    /// Verbs advertised in `Allow` when dispatch fails.
    pub fn allowed_methods(&self) -> Vec<Method> {
        match self {
            Actions::Single(_) => Vec::new(),
            Actions::ByMethod(actions) => actions.iter().map(|(m, _)| m.clone()).collect(),
        }
    }

    pub(crate) fn any_takes_params(&self) -> bool {
        match self {
            Actions::Single(action) => action.takes_params(),
            Actions::ByMethod(actions) => actions.iter().any(|(_, a)| a.takes_params()),
        }
    }
}

impl From<Action> for Actions {
    fn from(action: Action) -> Self {
        Actions::Single(action)
    }
}
