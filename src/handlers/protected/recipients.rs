// handlers/protected/recipients.rs - /api/recipients[/:id] handlers
//
// Organization scoping is applied before any row is returned or mutated; a
// recipient outside the caller's organization is indistinguishable from a
// missing one.
use std::sync::Arc;

use axum::http::Method;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::{authorize, filter_one, filter_rows, require_organization_access, UserContext};
use crate::envelope::Paginated;
use crate::error::{ApiError, DomainError};
use crate::pipeline::{
    require_context, Action, ActionRequest, Actions, Endpoint, HandlerOptions, PathParams,
    Pipeline,
};
use crate::services::{CareRecipient, RecipientChanges, RecipientStore};

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRecipient {
    pub name: String,
    pub organization_id: Option<i64>,
    pub address: Option<String>,
}

/// `/api/recipients`: GET list, POST create.
pub fn collection_endpoint(pipeline: &Pipeline, store: Arc<RecipientStore>) -> Endpoint {
    let list_store = store.clone();
    pipeline.build(
        Actions::by_method([
            (
                Method::GET,
                Action::plain(move |req, ctx| list_get(list_store.clone(), req, ctx)),
            ),
            (
                Method::POST,
                Action::plain(move |req, ctx| create_post(store.clone(), req, ctx)),
            ),
        ]),
        HandlerOptions::new().permission("recipient:read"),
    )
}

/// `/api/recipients/:id`: GET, PUT, DELETE.
pub fn record_endpoint(pipeline: &Pipeline, store: Arc<RecipientStore>) -> Endpoint {
    let get_store = store.clone();
    let put_store = store.clone();
    pipeline.build(
        Actions::by_method([
            (
                Method::GET,
                Action::with_params(move |_req, params, ctx| {
                    record_get(get_store.clone(), params, ctx)
                }),
            ),
            (
                Method::PUT,
                Action::with_params(move |req, params, ctx| {
                    record_put(put_store.clone(), req, params, ctx)
                }),
            ),
            (
                Method::DELETE,
                Action::with_params(move |_req, params, ctx| {
                    record_delete(store.clone(), params, ctx)
                }),
            ),
        ]),
        HandlerOptions::new().permission("recipient:read").with_params(),
    )
}

/// GET /api/recipients - Paginated, organization-filtered list
pub async fn list_get(
    store: Arc<RecipientStore>,
    req: ActionRequest,
    ctx: Option<UserContext>,
) -> anyhow::Result<Value> {
    let ctx = require_context(ctx)?;
    let query: ListQuery = req.query()?;
    let page = query.page.unwrap_or(1).max(1);
    let page_size = query
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let mut rows = filter_rows(&ctx, store.list()?);
    if let Some(search) = query.search.as_deref().map(str::to_lowercase) {
        rows.retain(|r| r.name.to_lowercase().contains(&search));
    }

    Ok(serde_json::to_value(Paginated::from_rows(rows, page, page_size))?)
}

/// POST /api/recipients - Create a recipient in the caller's organization
pub async fn create_post(
    store: Arc<RecipientStore>,
    req: ActionRequest,
    ctx: Option<UserContext>,
) -> anyhow::Result<Value> {
    let ctx = require_context(ctx)?;
    authorize(&ctx, "recipient:create")?;

    let body: NewRecipient = req.json()?;
    let name = body.name.trim();
    if name.is_empty() {
        return Err(ApiError::field_error("name", "must not be empty").into());
    }

    let organization_id = match (body.organization_id, ctx.scoped_organization()) {
        (Some(requested), _) => requested,
        (None, Some(own)) => own,
        (None, None) => {
            return Err(ApiError::field_error("organizationId", "is required").into());
        }
    };
    require_organization_access(&ctx, organization_id)?;

    let recipient = store.insert(name, organization_id, body.address)?;
    tracing::info!(
        "User {} created recipient {} in organization {}",
        ctx.user_id,
        recipient.id,
        organization_id
    );
    Ok(serde_json::to_value(recipient)?)
}

/// GET /api/recipients/:id
pub async fn record_get(
    store: Arc<RecipientStore>,
    params: PathParams,
    ctx: Option<UserContext>,
) -> anyhow::Result<Value> {
    let ctx = require_context(ctx)?;
    let recipient = scoped_recipient(&store, &ctx, params.id)?;
    Ok(serde_json::to_value(recipient)?)
}

/// PUT /api/recipients/:id - Update name and address
pub async fn record_put(
    store: Arc<RecipientStore>,
    req: ActionRequest,
    params: PathParams,
    ctx: Option<UserContext>,
) -> anyhow::Result<Value> {
    let ctx = require_context(ctx)?;
    authorize(&ctx, "recipient:update")?;

    let changes: RecipientChanges = req.json()?;
    if changes.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ApiError::field_error("name", "must not be empty").into());
    }

    scoped_recipient(&store, &ctx, params.id)?;
    let updated = store.update(params.id, changes)?.ok_or_else(not_found)?;
    Ok(serde_json::to_value(updated)?)
}

/// DELETE /api/recipients/:id
pub async fn record_delete(
    store: Arc<RecipientStore>,
    params: PathParams,
    ctx: Option<UserContext>,
) -> anyhow::Result<Value> {
    let ctx = require_context(ctx)?;
    authorize(&ctx, "recipient:delete")?;

    scoped_recipient(&store, &ctx, params.id)?;
    store.remove(params.id)?.ok_or_else(not_found)?;
    tracing::info!("User {} deleted recipient {}", ctx.user_id, params.id);
    Ok(json!({ "id": params.id, "deleted": true }))
}

fn scoped_recipient(
    store: &RecipientStore,
    ctx: &UserContext,
    id: i64,
) -> anyhow::Result<CareRecipient> {
    let row = store.get(id)?.and_then(|row| filter_one(ctx, row));
    Ok(row.ok_or_else(not_found)?)
}

fn not_found() -> DomainError {
    DomainError::not_found("Care recipient not found")
}
