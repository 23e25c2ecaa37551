use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::Query,
    http::{HeaderMap, Method, Uri},
};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// Inbound request as seen by a resource action.
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ActionRequest {
    /// Decode the JSON body. An empty body is a validation error.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        if self.body.is_empty() {
            return Err(ApiError::validation_error("Request body is required", None));
        }
        serde_json::from_slice(&self.body)
            .map_err(|e| ApiError::validation_error(format!("Invalid JSON body: {}", e), None))
    }

    /// Decode the query string.
    pub fn query<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        Query::<T>::try_from_uri(&self.uri)
            .map(|Query(q)| q)
            .map_err(|e| ApiError::validation_error(format!("Invalid query string: {}", e), None))
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }
}

/// Path parameters of a parameterized endpoint. `id` is always a positive integer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathParams {
    pub id: i64,
    pub values: HashMap<String, String>,
}

impl PathParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

/// Parse an identifier segment. Only positive integers are accepted.
pub(crate) fn parse_identifier(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|id| *id > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn request(uri: &str, body: &'static [u8]) -> ActionRequest {
        ActionRequest {
            method: Method::GET,
            uri: uri.parse().unwrap(),
            headers: HeaderMap::new(),
            body: Bytes::from_static(body),
        }
    }

    #[derive(Debug, Deserialize)]
    struct Paging {
        page: u32,
    }

    #[test]
    fn identifiers_must_be_positive_integers() {
        assert_eq!(parse_identifier(Some("12")), Some(12));
        assert_eq!(parse_identifier(Some("0")), None);
        assert_eq!(parse_identifier(Some("-3")), None);
        assert_eq!(parse_identifier(Some("abc")), None);
        assert_eq!(parse_identifier(None), None);
    }

    #[test]
    fn query_and_body_decoding() {
        let req = request("/api/recipients?page=2", b"{\"page\": 4}");
        assert_eq!(req.query::<Paging>().unwrap().page, 2);
        assert_eq!(req.json::<Paging>().unwrap().page, 4);

        let bad = request("/api/recipients?page=x", b"");
        assert!(matches!(bad.query::<Paging>(), Err(ApiError::ValidationError { .. })));
        assert!(matches!(bad.json::<Paging>(), Err(ApiError::ValidationError { .. })));
    }
}
