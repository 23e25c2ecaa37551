use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};

/// Envelope code signalling success. Any other code is a domain error.
pub const SUCCESS_CODE: u16 = 200;

/// Uniform `{code, message, data}` wrapper around every response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T = Value> {
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// Create a successful envelope carrying `data`
    pub fn success(data: T) -> Self {
        Self {
            code: SUCCESS_CODE,
            message: "success".to_string(),
            data: Some(data),
        }
    }

    /// Create an error envelope without data
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: T) -> Self {
        self.data = Some(data);
        self
    }

    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }
}

impl Envelope<Value> {
    /// Decode the untyped payload into `T`.
    pub fn into_data<T: DeserializeOwned>(self) -> Result<Option<T>, serde_json::Error> {
        match self.data {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value).map(Some),
        }
    }
}

/// Envelopes are always sent with 200 OK; use [`crate::error::ApiError`] for
/// failures that need a transport-level status.
impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        match serde_json::to_value(&self) {
            Ok(body) => (StatusCode::OK, Json(body)).into_response(),
            Err(e) => {
                tracing::error!("Failed to serialize response envelope: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "code": 500,
                        "message": "Failed to serialize response data"
                    })),
                )
                    .into_response()
            }
        }
    }
}

/// Paginated payload carried in `Envelope::data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub contents: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub total_pages: u32,
}

impl<T> Paginated<T> {
    pub fn new(contents: Vec<T>, page: u32, page_size: u32, total: u64) -> Self {
        let total_pages = if page_size == 0 {
            0
        } else {
            total.div_ceil(u64::from(page_size)) as u32
        };

        Self {
            contents,
            page,
            page_size,
            total,
            total_pages,
        }
    }

    /// Slice one page out of an already-filtered row set. Pages are 1-indexed.
    pub fn from_rows(rows: Vec<T>, page: u32, page_size: u32) -> Self {
        let page = page.max(1);
        let total = rows.len() as u64;
        let skip = (page as usize - 1).saturating_mul(page_size as usize);
        let contents = rows.into_iter().skip(skip).take(page_size as usize).collect();
        Self::new(contents, page, page_size, total)
    }
}
