use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use reqwest::{header, Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use url::Url;

use super::error::ClientError;
use super::refresh::{RefreshCoordinator, RefreshFailure, RefreshOutcome};
use super::store::TokenStore;
use crate::envelope::Envelope;

const LOGIN_PATH: &str = "/api/auth/login";
const REVOKE_PATH: &str = "/api/auth/revoke";
const ME_PATH: &str = "/api/auth/me";

/// Callbacks for session events the engine cannot resolve on its own.
pub trait SessionHooks: Send + Sync {
    /// Fired `remaining` before a request's timeout elapses.
    fn on_timeout_warning(&self, _path: &str, _remaining: Duration) {}

    /// Stored tokens were cleared; the user has to sign in again.
    fn on_reauthenticate(&self, _error: &ClientError) {}
}

#[derive(Debug, Default)]
pub struct LoggingHooks;

impl SessionHooks for LoggingHooks {
    fn on_timeout_warning(&self, path: &str, remaining: Duration) {
        tracing::warn!("Request to {} will time out in {:?}", path, remaining);
    }

    fn on_reauthenticate(&self, error: &ClientError) {
        tracing::warn!("Session ended, sign in again: {}", error);
    }
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub timeout: Duration,
    /// Lead time of the timeout warning. `None` disables it.
    pub warn_before: Option<Duration>,
    pub refresh_path: String,
    pub user_agent: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            warn_before: Some(Duration::from_secs(5)),
            refresh_path: "/api/auth/refresh".to_string(),
            user_agent: format!("homecare/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Per-call options for [`ApiClient::request`].
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub timeout: Option<Duration>,
    pub skip_auth: bool,
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Send without a bearer token and never attempt a refresh.
    pub fn without_auth(mut self) -> Self {
        self.skip_auth = true;
        self
    }
}

/// Binary payload returned by [`ApiClient::download`].
#[derive(Debug, Clone)]
pub struct Download {
    pub bytes: Bytes,
    pub content_type: String,
    pub filename: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssuedTokens {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    user_info: Option<Value>,
}

struct RawResponse {
    status: StatusCode,
    content_type: String,
    disposition: Option<String>,
    body: Bytes,
}

impl RawResponse {
    fn is_json(&self) -> bool {
        self.content_type.starts_with("application/json")
    }

    fn envelope(&self) -> Option<Envelope> {
        serde_json::from_slice(&self.body).ok()
    }
}

enum Attempt<T> {
    Done(T),
    Unauthorized(ClientError),
}

type Decoder<T> = fn(RawResponse) -> Result<Attempt<T>, ClientError>;

/// Unauthorized is checked at both layers: HTTP 401, and an HTTP success
/// whose envelope carries code 401.
fn decode_envelope(raw: RawResponse) -> Result<Attempt<Envelope>, ClientError> {
    let envelope = raw.envelope();

    if raw.status == StatusCode::UNAUTHORIZED {
        let envelope = envelope.unwrap_or_else(|| Envelope::error(401, "Unauthorized"));
        return Ok(Attempt::Unauthorized(ClientError::Http {
            code: 401,
            message: envelope.message,
            data: envelope.data,
        }));
    }

    match envelope {
        Some(envelope) if envelope.code == 401 => {
            Ok(Attempt::Unauthorized(ClientError::from_envelope(envelope)))
        }
        Some(envelope) if raw.status.is_success() && envelope.is_success() => {
            Ok(Attempt::Done(envelope))
        }
        Some(envelope) => Err(ClientError::from_envelope(envelope)),
        None => Err(ClientError::Http {
            code: raw.status.as_u16(),
            message: format!("Unexpected response body (HTTP {})", raw.status),
            data: None,
        }),
    }
}

fn decode_binary(raw: RawResponse) -> Result<Attempt<Download>, ClientError> {
    if raw.status == StatusCode::UNAUTHORIZED || raw.is_json() {
        let content_type = raw.content_type.clone();
        return match decode_envelope(raw)? {
            Attempt::Done(envelope) => Err(ClientError::NotBinary {
                content_type,
                envelope: Some(envelope),
            }),
            Attempt::Unauthorized(error) => Ok(Attempt::Unauthorized(error)),
        };
    }

    if !raw.status.is_success() {
        return Err(ClientError::Http {
            code: raw.status.as_u16(),
            message: format!("Download failed (HTTP {})", raw.status),
            data: None,
        });
    }

    let filename = raw.disposition.as_deref().and_then(attachment_filename);
    Ok(Attempt::Done(Download {
        bytes: raw.body,
        content_type: raw.content_type,
        filename,
    }))
}

fn attachment_filename(disposition: &str) -> Option<String> {
    disposition
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))
        .map(|name| name.trim_matches('"').to_string())
        .filter(|name| !name.is_empty())
}

fn is_read(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD
}

fn append_query(url: &mut Url, params: &Value) -> Result<(), ClientError> {
    let Value::Object(fields) = params else {
        return Err(ClientError::InvalidRequest(
            "query parameters must be a JSON object".to_string(),
        ));
    };
    if fields.is_empty() {
        return Ok(());
    }

    let mut pairs = url.query_pairs_mut();
    for (key, value) in fields {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    pairs.append_pair(key, &query_value(item));
                }
            }
            other => {
                pairs.append_pair(key, &query_value(other));
            }
        }
    }
    Ok(())
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Aborts the pending timeout warning on every exit path.
struct WarningGuard(Option<JoinHandle<()>>);

impl Drop for WarningGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

struct ClientInner {
    http: reqwest::Client,
    base_url: Url,
    settings: ClientSettings,
    store: Arc<dyn TokenStore>,
    hooks: Arc<dyn SessionHooks>,
    refresh: RefreshCoordinator,
}

/// Envelope-aware HTTP client that survives access-token expiry.
///
/// Cheap to clone; clones share the token store and the refresh coordinator,
/// so concurrent requests that all hit an expired token trigger one refresh
/// exchange between them.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

pub struct ApiClientBuilder {
    base_url: String,
    store: Arc<dyn TokenStore>,
    settings: ClientSettings,
    hooks: Arc<dyn SessionHooks>,
}

impl ApiClientBuilder {
    pub fn settings(mut self, settings: ClientSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.settings.timeout = timeout;
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn SessionHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn build(self) -> Result<ApiClient, ClientError> {
        let base_url = Url::parse(&self.base_url).map_err(|e| {
            ClientError::InvalidRequest(format!("invalid base URL {}: {}", self.base_url, e))
        })?;
        let http = reqwest::Client::builder()
            .user_agent(self.settings.user_agent.clone())
            .build()?;

        Ok(ApiClient {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                settings: self.settings,
                store: self.store,
                hooks: self.hooks,
                refresh: RefreshCoordinator::new(),
            }),
        })
    }
}

impl ApiClient {
    pub fn builder(base_url: impl Into<String>, store: Arc<dyn TokenStore>) -> ApiClientBuilder {
        ApiClientBuilder {
            base_url: base_url.into(),
            store,
            settings: ClientSettings::default(),
            hooks: Arc::new(LoggingHooks),
        }
    }

    pub fn new(base_url: impl Into<String>, store: Arc<dyn TokenStore>) -> Result<Self, ClientError> {
        Self::builder(base_url, store).build()
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.inner.store
    }

    pub async fn request(
        &self,
        path: &str,
        options: RequestOptions,
        body: Option<Value>,
    ) -> Result<Envelope, ClientError> {
        self.dispatch(path, &options, body.as_ref(), decode_envelope)
            .await
    }

    pub async fn get(&self, path: &str, query: Option<Value>) -> Result<Envelope, ClientError> {
        self.request(path, RequestOptions::new(Method::GET), query)
            .await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Envelope, ClientError> {
        self.request(path, RequestOptions::new(Method::POST), Some(body))
            .await
    }

    pub async fn put(&self, path: &str, body: Value) -> Result<Envelope, ClientError> {
        self.request(path, RequestOptions::new(Method::PUT), Some(body))
            .await
    }

    pub async fn patch(&self, path: &str, body: Value) -> Result<Envelope, ClientError> {
        self.request(path, RequestOptions::new(Method::PATCH), Some(body))
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<Envelope, ClientError> {
        self.request(path, RequestOptions::new(Method::DELETE), None)
            .await
    }

    /// GET a binary resource. A JSON answer is reported as [`ClientError::NotBinary`].
    pub async fn download(&self, path: &str, query: Option<Value>) -> Result<Download, ClientError> {
        let options = RequestOptions::new(Method::GET);
        self.dispatch(path, &options, query.as_ref(), decode_binary)
            .await
    }

    /// Exchange credentials for a token pair and store it. Returns `userInfo`.
    pub async fn login(&self, username: &str, password: &str) -> Result<Value, ClientError> {
        let envelope = self
            .request(
                LOGIN_PATH,
                RequestOptions::new(Method::POST).without_auth(),
                Some(json!({ "username": username, "password": password })),
            )
            .await?;
        let tokens = issued_tokens(envelope)?;
        let user_info = tokens.user_info.clone().unwrap_or(Value::Null);
        self.inner
            .store
            .save(&tokens.access_token, &tokens.refresh_token, tokens.user_info)
            .map_err(|e| ClientError::Store(e.to_string()))?;
        Ok(user_info)
    }

    /// Revoke the stored refresh token, then forget both tokens.
    pub async fn logout(&self) -> Result<(), ClientError> {
        if let Some(refresh_token) = self.inner.store.refresh_token() {
            let revoked = self
                .request(
                    REVOKE_PATH,
                    RequestOptions::new(Method::POST).without_auth(),
                    Some(json!({ "refreshToken": refresh_token })),
                )
                .await;
            if let Err(e) = revoked {
                tracing::warn!("Could not revoke refresh token: {}", e);
            }
        }
        self.inner
            .store
            .clear()
            .map_err(|e| ClientError::Store(e.to_string()))
    }

    pub async fn me(&self) -> Result<Envelope, ClientError> {
        self.get(ME_PATH, None).await
    }

    /// Force a refresh exchange, joining one already in flight.
    pub async fn refresh_session(&self) -> Result<(), ClientError> {
        self.coordinated_refresh()
            .await
            .map(|_| ())
            .map_err(|failure| ClientError::Http {
                code: 401,
                message: failure.to_string(),
                data: Some(json!({ "reason": "refresh_failed" })),
            })
    }

    async fn dispatch<T>(
        &self,
        path: &str,
        options: &RequestOptions,
        body: Option<&Value>,
        decode: Decoder<T>,
    ) -> Result<T, ClientError> {
        let sent = if options.skip_auth {
            None
        } else {
            self.inner.store.access_token()
        };

        let error = match decode(self.send(path, options, body, sent.as_deref()).await?)? {
            Attempt::Done(value) => return Ok(value),
            Attempt::Unauthorized(error) => error,
        };

        if options.skip_auth {
            return Err(error);
        }
        if !error.is_token_expired() {
            self.reauthenticate(&error);
            return Err(error);
        }

        let token = match self.recover_token(sent.as_deref()).await {
            Ok(token) => token,
            Err(failure) => {
                tracing::warn!("Token refresh failed: {}", failure);
                self.reauthenticate(&error);
                return Err(error);
            }
        };

        // Exactly one retry
        match decode(self.send(path, options, body, Some(&token)).await?)? {
            Attempt::Done(value) => Ok(value),
            Attempt::Unauthorized(error) => {
                self.reauthenticate(&error);
                Err(error)
            }
        }
    }

    async fn recover_token(&self, sent: Option<&str>) -> RefreshOutcome {
        if let Some(current) = self.inner.store.access_token() {
            if Some(current.as_str()) != sent {
                tracing::debug!("Access token already rotated, retrying without refresh");
                return Ok(current);
            }
        }
        self.coordinated_refresh().await
    }

    async fn coordinated_refresh(&self) -> RefreshOutcome {
        let client = self.clone();
        self.inner
            .refresh
            .run(move || async move {
                let outcome = client.exchange_refresh_token().await;
                // A rejected pair is forgotten before any waiter wakes
                if outcome.is_err() {
                    if let Err(e) = client.inner.store.clear() {
                        tracing::error!("Failed to clear stored tokens: {}", e);
                    }
                }
                outcome
            })
            .await
    }

    async fn exchange_refresh_token(&self) -> RefreshOutcome {
        let refresh_token = self
            .inner
            .store
            .refresh_token()
            .ok_or(RefreshFailure::NoRefreshToken)?;

        tracing::debug!("Exchanging refresh token");
        let options = RequestOptions::new(Method::POST).without_auth();
        let body = json!({ "refreshToken": refresh_token });
        let raw = self
            .send(&self.inner.settings.refresh_path, &options, Some(&body), None)
            .await
            .map_err(|e| RefreshFailure::Transport(e.to_string()))?;

        let envelope = match decode_envelope(raw) {
            Ok(Attempt::Done(envelope)) => envelope,
            Ok(Attempt::Unauthorized(e)) | Err(e) => {
                return Err(RefreshFailure::Rejected(e.to_string()))
            }
        };
        let tokens = issued_tokens(envelope).map_err(|e| RefreshFailure::Rejected(e.to_string()))?;

        self.inner
            .store
            .save(&tokens.access_token, &tokens.refresh_token, tokens.user_info)
            .map_err(|e| RefreshFailure::Store(e.to_string()))?;
        tracing::info!("Access token refreshed");
        Ok(tokens.access_token)
    }

    fn reauthenticate(&self, error: &ClientError) {
        if let Err(e) = self.inner.store.clear() {
            tracing::error!("Failed to clear stored tokens: {}", e);
        }
        self.inner.hooks.on_reauthenticate(error);
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        let absolute = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!(
                "{}/{}",
                self.inner.base_url.as_str().trim_end_matches('/'),
                path.trim_start_matches('/')
            )
        };
        Url::parse(&absolute)
            .map_err(|e| ClientError::InvalidRequest(format!("invalid URL {}: {}", absolute, e)))
    }

    fn is_api_origin(&self, url: &Url) -> bool {
        url.origin() == self.inner.base_url.origin()
    }

    fn arm_warning(&self, path: &str, timeout: Duration) -> WarningGuard {
        let handle = self
            .inner
            .settings
            .warn_before
            .filter(|lead| *lead < timeout)
            .map(|lead| {
                let hooks = Arc::clone(&self.inner.hooks);
                let path = path.to_string();
                tokio::spawn(async move {
                    tokio::time::sleep(timeout - lead).await;
                    hooks.on_timeout_warning(&path, lead);
                })
            });
        WarningGuard(handle)
    }

    async fn send(
        &self,
        path: &str,
        options: &RequestOptions,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<RawResponse, ClientError> {
        let mut url = self.url(path)?;
        let reads = is_read(&options.method);
        if let (true, Some(params)) = (reads, body) {
            append_query(&mut url, params)?;
        }

        // The stored credential only ever travels to the configured API origin
        let token = token.filter(|_| {
            let same_origin = self.is_api_origin(&url);
            if !same_origin {
                tracing::debug!(
                    "Not sending credentials to foreign origin {}",
                    url.origin().ascii_serialization()
                );
            }
            same_origin
        });

        let mut builder = self.inner.http.request(options.method.clone(), url);
        for (name, value) in &options.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let (false, Some(body)) = (reads, body) {
            builder = builder.json(body);
        }

        let timeout = options.timeout.unwrap_or(self.inner.settings.timeout);
        let _warning = self.arm_warning(path, timeout);

        let exchange = async move {
            let response = builder.send().await?;
            let status = response.status();
            let content_type = header_string(response.headers(), header::CONTENT_TYPE)
                .unwrap_or_default();
            let disposition = header_string(response.headers(), header::CONTENT_DISPOSITION);
            let body = response.bytes().await?;
            Ok::<_, ClientError>(RawResponse {
                status,
                content_type,
                disposition,
                body,
            })
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => {
                if let Ok(raw) = &result {
                    tracing::debug!("{} {} -> {}", options.method, path, raw.status);
                }
                result
            }
            Err(_) => {
                tracing::warn!("{} {} timed out after {:?}", options.method, path, timeout);
                Err(ClientError::Timeout(timeout))
            }
        }
    }
}

fn header_string(headers: &header::HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn issued_tokens(envelope: Envelope) -> Result<IssuedTokens, ClientError> {
    envelope
        .into_data::<IssuedTokens>()
        .ok()
        .flatten()
        .ok_or_else(|| ClientError::Http {
            code: 502,
            message: "Token response did not carry a token pair".to_string(),
            data: None,
        })
}
