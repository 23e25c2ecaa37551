mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use serde_json::json;

use common::{expired_access_token, login, request, send, test_app, test_config};
use homecare_admin::accounts::InMemoryDirectory;
use homecare_admin::app::{app, AppState};
use homecare_admin::auth::{AccessPayload, TokenCodec, TokenSettings};
use homecare_admin::config::AppConfig;
use homecare_admin::services::RecipientStore;

#[tokio::test]
async fn preflight_short_circuits_with_cors_headers() {
    let (_state, router) = test_app();
    let req = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/recipients")
        .header(header::ORIGIN, "http://localhost:5173")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();

    let res = send(&router, req).await;
    assert!(res.status.is_success());
    assert!(res.raw.is_empty());
    assert_eq!(res.headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert!(res.headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).is_none());
    assert!(res.headers[header::ACCESS_CONTROL_ALLOW_METHODS]
        .to_str()
        .unwrap()
        .contains("DELETE"));
}

#[tokio::test]
async fn credential_failures_share_a_status_but_not_a_message() {
    let (state, router) = test_app();

    let missing = send(&router, request(Method::GET, "/api/recipients", None, None)).await;
    let expired = send(
        &router,
        request(Method::GET, "/api/recipients", Some(&expired_access_token(&state)), None),
    )
    .await;
    let malformed = send(&router, request(Method::GET, "/api/recipients", Some("not-a-jwt"), None)).await;

    let foreign = TokenCodec::new(TokenSettings::new(
        "some-other-service-access-secret",
        "some-other-service-refresh-secret",
    ))
    .sign_access(&AccessPayload {
        sub: "1".into(),
        role_ids: vec![],
        permissions: vec!["*".into()],
        organization_id: None,
        is_super_admin: true,
    })
    .unwrap();
    let forged = send(&router, request(Method::GET, "/api/recipients", Some(&foreign), None)).await;

    for res in [&missing, &expired, &malformed, &forged] {
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
        assert_eq!(res.code(), 401);
        // CORS headers ride along on rejections too
        assert!(res.headers.contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    assert_eq!(missing.body["data"]["reason"], "missing_credential");
    assert_eq!(expired.body["data"]["reason"], "token_expired");
    assert_eq!(malformed.body["data"]["reason"], "invalid_credential");
    assert_eq!(forged.body["data"]["reason"], "invalid_credential");

    let messages = [missing.message(), expired.message(), malformed.message(), forged.message()];
    assert!(messages[1].to_lowercase().contains("expired"));
    for (i, a) in messages.iter().enumerate() {
        for b in &messages[i + 1..] {
            assert_ne!(a, b);
        }
    }
    // No internal detail leaks out
    assert!(!forged.message().contains("Signature"));
}

#[tokio::test]
async fn public_and_unprotected_paths_skip_the_gate() {
    let (_state, router) = test_app();

    let res = send(&router, request(Method::GET, "/health", None, None)).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["status"], "ok");

    // Public exchange is reached without a credential; the failure is the action's
    let res = send(
        &router,
        request(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({"username": "admin", "password": "wrong"})),
        ),
    )
    .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.code(), 401);
    assert_eq!(res.message(), "Invalid username or password");
}

#[tokio::test]
async fn valid_credential_passes_through() {
    let (_state, router) = test_app();
    let tokens = login(&router, "coordinator", "coordinator123").await;

    let res = send(&router, request(Method::GET, "/api/auth/me", Some(&tokens.access), None)).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["username"], "coordinator");
    assert_eq!(res.body["data"]["organizationId"], 1);
}

#[tokio::test]
async fn root_public_path_does_not_open_the_api() {
    let mut config = test_config();
    config.gate.public_paths = vec!["/".into(), " ".into(), "/*".into()];
    let router = app(common::test_state_with(&config));

    let res = send(&router, request(Method::GET, "/api/recipients", None, None)).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["data"]["reason"], "missing_credential");
}

fn production_config() -> AppConfig {
    let mut config = AppConfig::production();
    let test = test_config();
    config.security.access_secret = test.security.access_secret;
    config.security.refresh_secret = test.security.refresh_secret;
    config.security.cors_origins = vec!["https://admin.homecare.example.com".to_string()];
    config
}

#[tokio::test]
async fn production_cors_honours_the_allowlist() {
    let config = production_config();
    let state = AppState::new(
        &config,
        Arc::new(InMemoryDirectory::seeded().unwrap()),
        Arc::new(RecipientStore::new()),
    )
    .unwrap();
    let router = app(state);

    let preflight = |origin: &'static str| {
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/recipients")
            .header(header::ORIGIN, origin)
            .body(Body::empty())
            .unwrap()
    };

    let allowed = send(&router, preflight("https://admin.homecare.example.com")).await;
    assert_eq!(
        allowed.headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://admin.homecare.example.com"
    );
    assert_eq!(allowed.headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    assert!(allowed.headers[header::VARY]
        .to_str()
        .unwrap()
        .contains("origin"));

    let refused = send(&router, preflight("https://evil.example.net")).await;
    assert!(refused.status.is_success());
    assert!(refused.headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    assert!(refused.headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).is_none());
}
