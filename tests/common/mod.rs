#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use homecare_admin::accounts::InMemoryDirectory;
use homecare_admin::app::{app, AppState};
use homecare_admin::auth::claims::RegisteredClaims;
use homecare_admin::auth::{AccessClaims, AccessPayload, TokenUse};
use homecare_admin::config::AppConfig;
use homecare_admin::services::RecipientStore;

pub const ACCESS_SECRET: &str = "integration-access-secret-0123456789abcdef";
pub const REFRESH_SECRET: &str = "integration-refresh-secret-0123456789abcdef";

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::development();
    config.security.access_secret = Some(ACCESS_SECRET.to_string());
    config.security.refresh_secret = Some(REFRESH_SECRET.to_string());
    config
}

pub fn test_state_with(config: &AppConfig) -> AppState {
    AppState::new(
        config,
        Arc::new(InMemoryDirectory::seeded().unwrap()),
        Arc::new(RecipientStore::seeded()),
    )
    .expect("test state")
}

pub fn test_state() -> AppState {
    test_state_with(&test_config())
}

pub fn test_app() -> (AppState, Router) {
    let state = test_state();
    let router = app(state.clone());
    (state, router)
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
    pub raw: Vec<u8>,
}

impl TestResponse {
    /// Envelope code; pipeline failures mirror the HTTP status, domain errors do not.
    pub fn code(&self) -> u64 {
        self.body["code"].as_u64().unwrap_or_default()
    }

    pub fn message(&self) -> &str {
        self.body["message"].as_str().unwrap_or_default()
    }
}

pub async fn send(router: &Router, req: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(req).await.expect("router response");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body");
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    TestResponse {
        status,
        headers,
        body,
        raw: bytes.to_vec(),
    }
}

pub fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub struct Tokens {
    pub access: String,
    pub refresh: String,
    pub user_info: Value,
}

pub async fn login(router: &Router, username: &str, password: &str) -> Tokens {
    let res = send(
        router,
        request(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "username": username, "password": password })),
        ),
    )
    .await;
    assert_eq!(res.code(), 200, "login failed: {}", res.body);
    let data = &res.body["data"];
    Tokens {
        access: data["accessToken"].as_str().unwrap().to_string(),
        refresh: data["refreshToken"].as_str().unwrap().to_string(),
        user_info: data["userInfo"].clone(),
    }
}

/// Access token for the seeded super-admin that expired a minute ago.
pub fn expired_access_token(state: &AppState) -> String {
    let settings = state.codec.settings();
    let claims = AccessClaims {
        payload: AccessPayload {
            sub: "1".to_string(),
            role_ids: vec![1],
            permissions: vec!["*".to_string()],
            organization_id: None,
            is_super_admin: true,
        },
        registered: RegisteredClaims::new(
            &settings.issuer,
            &settings.audience,
            TokenUse::Access,
            -60,
        ),
    };
    state.codec.sign_access_claims(&claims).unwrap()
}

/// Serve `router` on an ephemeral local port; returns the base URL.
pub async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}
