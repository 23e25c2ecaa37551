mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderMap};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use common::{spawn_server, test_state};
use homecare_admin::app::app;
use homecare_admin::client::{
    ApiClient, ClientError, ClientSettings, FileTokenStore, MemoryTokenStore, SessionHooks,
    TokenStore,
};

#[derive(Default)]
struct WarningHooks {
    warnings: AtomicUsize,
}

impl SessionHooks for WarningHooks {
    fn on_timeout_warning(&self, _path: &str, _remaining: Duration) {
        self.warnings.fetch_add(1, Ordering::SeqCst);
    }
}

async fn slow() -> Json<Value> {
    tokio::time::sleep(Duration::from_millis(600)).await;
    Json(json!({"code": 200, "message": "success"}))
}

async fn quick() -> Json<Value> {
    Json(json!({"code": 200, "message": "success", "data": [1, 2, 3]}))
}

async fn timing_server() -> String {
    let router = Router::new()
        .route("/slow", get(slow))
        .route("/quick", get(quick));
    spawn_server(router).await
}

fn settings(timeout_ms: u64, warn_ms: u64) -> ClientSettings {
    ClientSettings {
        timeout: Duration::from_millis(timeout_ms),
        warn_before: Some(Duration::from_millis(warn_ms)),
        ..ClientSettings::default()
    }
}

#[tokio::test]
async fn slow_response_times_out_after_a_warning() {
    let base_url = timing_server().await;
    let hooks = Arc::new(WarningHooks::default());
    let client = ApiClient::builder(base_url, Arc::new(MemoryTokenStore::new()))
        .settings(settings(200, 100))
        .hooks(hooks.clone())
        .build()
        .unwrap();

    let err = client.get("/slow", None).await.unwrap_err();
    assert!(matches!(err, ClientError::Timeout(d) if d == Duration::from_millis(200)));
    assert_eq!(err.code(), "TIMEOUT");
    assert_eq!(hooks.warnings.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn warning_timer_is_released_when_the_request_finishes() {
    let base_url = timing_server().await;
    let hooks = Arc::new(WarningHooks::default());
    let client = ApiClient::builder(base_url, Arc::new(MemoryTokenStore::new()))
        .settings(settings(400, 200))
        .hooks(hooks.clone())
        .build()
        .unwrap();

    let envelope = client.get("/quick", None).await.unwrap();
    assert_eq!(envelope.data.unwrap(), json!([1, 2, 3]));

    // Past the point where a leaked timer would have fired
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(hooks.warnings.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = ApiClient::new(format!("http://{}", addr), Arc::new(MemoryTokenStore::new())).unwrap();
    let err = client.get("/health", None).await.unwrap_err();
    assert!(matches!(err, ClientError::Network(_)), "unexpected error: {:?}", err);
    assert_eq!(err.code(), "NETWORK_ERROR");
}

#[tokio::test]
async fn bad_base_url_is_rejected_up_front() {
    let result = ApiClient::new("not a url", Arc::new(MemoryTokenStore::new()));
    assert!(matches!(result, Err(ClientError::InvalidRequest(_))));
}

#[tokio::test]
async fn downloads_distinguish_binary_from_envelopes() {
    let base_url = spawn_server(app(test_state())).await;
    let store = Arc::new(MemoryTokenStore::new());
    let client = ApiClient::new(base_url, store.clone()).unwrap();
    client.login("coordinator", "coordinator123").await.unwrap();

    let download = client.download("/api/reports/recipients.csv", None).await.unwrap();
    assert!(download.content_type.starts_with("text/csv"));
    assert_eq!(download.filename.as_deref(), Some("recipients.csv"));
    let text = String::from_utf8(download.bytes.to_vec()).unwrap();
    assert!(text.contains("Margaret Hill"));
    assert!(!text.contains("Harold Price"));

    let err = client.download("/api/auth/me", None).await.unwrap_err();
    match err {
        ClientError::NotBinary { content_type, envelope } => {
            assert!(content_type.starts_with("application/json"));
            assert_eq!(envelope.unwrap().data.unwrap()["username"], "coordinator");
        }
        other => panic!("expected NotBinary, got {:?}", other),
    }
}

#[tokio::test]
async fn business_failures_carry_code_message_and_data() {
    let base_url = spawn_server(app(test_state())).await;
    let client = ApiClient::new(base_url, Arc::new(MemoryTokenStore::new())).unwrap();
    client.login("viewer", "viewer123").await.unwrap();

    let err = client.get("/api/recipients/1", None).await.unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.to_string(), "Care recipient not found");

    let err = client
        .post("/api/recipients", json!({"name": "Edith Moore"}))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(403));

    let err = client.put("/api/recipients/4", json!({"name": ""})).await.unwrap_err();
    assert_eq!(err.status(), Some(403));

    // Query parameters travel on the URL for reads
    let page = client
        .get("/api/recipients", Some(json!({"search": "harold", "pageSize": 5})))
        .await
        .unwrap();
    let data = page.data.unwrap();
    assert_eq!(data["pageSize"], 5);
    assert_eq!(data["contents"][0]["name"], "Harold Price");
}

#[tokio::test]
async fn bad_login_leaves_the_store_alone() {
    let base_url = spawn_server(app(test_state())).await;
    let store = Arc::new(MemoryTokenStore::with_tokens("a", "r"));
    let client = ApiClient::new(base_url, store.clone()).unwrap();

    let err = client.login("admin", "wrong").await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert_eq!(store.access_token().as_deref(), Some("a"));
}

#[tokio::test]
async fn file_store_session_survives_a_new_client() {
    let base_url = spawn_server(app(test_state())).await;
    let dir = tempfile::tempdir().unwrap();

    let client = ApiClient::new(base_url.clone(), Arc::new(FileTokenStore::in_dir(dir.path()).unwrap())).unwrap();
    let user_info = client.login("admin", "admin123").await.unwrap();
    assert_eq!(user_info["username"], "admin");

    // A second process picks the tokens up from disk
    let reopened = ApiClient::new(base_url, Arc::new(FileTokenStore::in_dir(dir.path()).unwrap())).unwrap();
    let me = reopened.me().await.unwrap();
    assert_eq!(me.data.unwrap()["isSuperAdmin"], true);

    reopened.logout().await.unwrap();
    assert!(reopened.store().refresh_token().is_none());
    assert!(!dir.path().join(FileTokenStore::FILE_NAME).exists());
}

async fn echo_credentials(headers: HeaderMap) -> Json<Value> {
    Json(json!({
        "code": 200,
        "message": "success",
        "data": {"authorization": headers.contains_key(header::AUTHORIZATION)}
    }))
}

#[tokio::test]
async fn stored_token_is_not_sent_to_other_origins() {
    let echo = Router::new().route("/echo", get(echo_credentials));
    let api_url = spawn_server(echo.clone()).await;
    let foreign_url = spawn_server(echo).await;

    let store = Arc::new(MemoryTokenStore::with_tokens("access-token", "refresh-token"));
    let client = ApiClient::new(api_url, store).unwrap();

    let own = client.get("/echo", None).await.unwrap();
    assert_eq!(own.data.unwrap()["authorization"], true);

    let foreign = client
        .get(&format!("{}/echo", foreign_url), None)
        .await
        .unwrap();
    assert_eq!(foreign.data.unwrap()["authorization"], false);
}
