use std::time::Duration;

use axum::http::{header, request::Parts, HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowCredentials, AllowOrigin, Any, CorsLayer};

use crate::config::AppConfig;

const MAX_AGE: Duration = Duration::from_secs(86_400);

/// CORS for the whole router: any origin outside production, the configured
/// allowlist in production. Credentials are only allowed for an echoed origin.
pub fn cors_layer(config: &AppConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static("x-requested-with"),
        ])
        .max_age(MAX_AGE);

    if !config.environment.is_production() {
        return layer.allow_origin(Any);
    }

    let origins = &config.security.cors_origins;
    if origins.iter().any(|o| o == "*") {
        tracing::warn!("CORS allowlist contains '*'; credentials disabled");
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Skipping invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    let credentialed = allowed.clone();
    layer
        .allow_origin(AllowOrigin::list(allowed))
        .allow_credentials(AllowCredentials::predicate(
            move |origin: &HeaderValue, _: &Parts| credentialed.contains(origin),
        ))
}
