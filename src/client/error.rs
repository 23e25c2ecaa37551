use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::envelope::Envelope;

/// Every failure the client engine can surface. Transport errors never escape raw.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("{message}")]
    Http {
        code: u16,
        message: String,
        data: Option<Value>,
    },

    #[error("expected binary content but received {content_type}")]
    NotBinary {
        content_type: String,
        envelope: Option<Envelope>,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("token store error: {0}")]
    Store(String),
}

impl ClientError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ClientError::Network(_) => "NETWORK_ERROR",
            ClientError::Timeout(_) => "TIMEOUT",
            ClientError::Http { .. } => "HTTP_ERROR",
            ClientError::NotBinary { .. } => "NOT_BINARY",
            ClientError::InvalidRequest(_) => "INVALID_REQUEST",
            ClientError::Store(_) => "STORE_ERROR",
        }
    }

    /// Envelope or HTTP status code, when the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Http { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            ClientError::Http { data, .. } => data.as_ref(),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// An unauthorized answer caused by an expired (rather than bad) credential.
    pub fn is_token_expired(&self) -> bool {
        match self {
            ClientError::Http {
                code: 401,
                message,
                data,
            } => {
                let reason = data
                    .as_ref()
                    .and_then(|d| d.get("reason"))
                    .and_then(Value::as_str);
                reason == Some("token_expired") || message.to_lowercase().contains("expired")
            }
            _ => false,
        }
    }

    pub(crate) fn from_envelope(envelope: Envelope) -> Self {
        ClientError::Http {
            code: envelope.code,
            message: envelope.message,
            data: envelope.data,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            ClientError::InvalidRequest(err.to_string())
        } else {
            ClientError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn unauthorized(message: &str, data: Option<Value>) -> ClientError {
        ClientError::Http {
            code: 401,
            message: message.to_string(),
            data,
        }
    }

    #[test]
    fn expiry_markers() {
        assert!(unauthorized("nope", Some(json!({"reason": "token_expired"}))).is_token_expired());
        assert!(unauthorized("Access token Expired", None).is_token_expired());
        assert!(!unauthorized("Invalid access token", None).is_token_expired());
        assert!(!ClientError::Http {
            code: 400,
            message: "expired coupon".into(),
            data: None
        }
        .is_token_expired());
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(ClientError::Timeout(Duration::from_secs(1)).code(), "TIMEOUT");
        assert_eq!(ClientError::Network("x".into()).code(), "NETWORK_ERROR");
        assert_eq!(unauthorized("x", None).code(), "HTTP_ERROR");
        assert_eq!(unauthorized("x", None).status(), Some(401));
    }
}
