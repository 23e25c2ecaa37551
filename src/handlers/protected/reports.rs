// handlers/protected/reports.rs - GET /api/reports/recipients.csv handler
use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    response::{IntoResponse, Response},
};

use crate::auth::{filter_rows, UserContext};
use crate::pipeline::{require_context, Action, Actions, Endpoint, HandlerOptions, Pipeline};
use crate::services::RecipientStore;

pub fn recipients_csv_endpoint(pipeline: &Pipeline, store: Arc<RecipientStore>) -> Endpoint {
    pipeline.build(
        Actions::by_method([(
            Method::GET,
            Action::plain(move |_req, ctx| recipients_csv(store.clone(), ctx)),
        )]),
        HandlerOptions::new().permission("recipient:read"),
    )
}

/// GET /api/reports/recipients.csv - Organization-scoped CSV export
///
/// Returns raw bytes rather than an envelope.
pub async fn recipients_csv(
    store: Arc<RecipientStore>,
    ctx: Option<UserContext>,
) -> anyhow::Result<Response> {
    let ctx = require_context(ctx)?;
    let rows = filter_rows(&ctx, store.list()?);

    let mut csv = String::from("id,name,organizationId,address\n");
    for row in rows {
        csv.push_str(&format!(
            "{},{},{},{}\n",
            row.id,
            escape(&row.name),
            row.organization_id,
            escape(row.address.as_deref().unwrap_or(""))
        ));
    }

    let mut response = csv.into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/csv; charset=utf-8"),
    );
    response.headers_mut().insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static("attachment; filename=\"recipients.csv\""),
    );
    Ok(response)
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
