// HTTP API Error Types
use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use thiserror::Error;

use crate::auth::{AuthzError, ResolveError, TokenError};

/// Coarse reason attached to authentication failures so clients can tell an
/// expired credential (worth refreshing) from a bad one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    Missing,
    Expired,
    Invalid,
}

impl AuthFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthFailure::Missing => "missing_credential",
            AuthFailure::Expired => "token_expired",
            AuthFailure::Invalid => "invalid_credential",
        }
    }
}

/// Business failure raised by a resource action. Delivered with HTTP 200 and
/// the domain code in the envelope.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{message}")]
pub struct DomainError {
    pub code: u16,
    pub message: String,
    pub data: Option<Value>,
}

impl DomainError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(401, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(403, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(409, message)
    }
}

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug, Error)]
pub enum ApiError {
    // 400 Bad Request
    #[error("{message}")]
    ValidationError {
        message: String,
        field_errors: Option<HashMap<String, String>>,
    },

    // 401 Unauthorized
    #[error("{message}")]
    Unauthenticated { message: String, reason: AuthFailure },

    // 403 Forbidden
    #[error("{0}")]
    Forbidden(String),

    // 405 Method Not Allowed
    #[error("Method not allowed")]
    MethodNotAllowed { allowed: Vec<Method> },

    // Action-supplied code, HTTP 200
    #[error(transparent)]
    Domain(#[from] DomainError),

    // 500 Internal Server Error
    #[error("{0}")]
    InternalServerError(String),

    // 503 Service Unavailable
    #[error("{0}")]
    ServiceUnavailable(String),
}

impl ApiError {
    /// HTTP status on the wire
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::ValidationError { .. } => 400,
            ApiError::Unauthenticated { .. } => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::MethodNotAllowed { .. } => 405,
            ApiError::Domain(_) => 200,
            ApiError::InternalServerError(_) => 500,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Code carried in the response envelope
    pub fn envelope_code(&self) -> u16 {
        match self {
            ApiError::Domain(err) => err.code,
            _ => self.status_code(),
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Get error code for logs and client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::ValidationError { .. } => "VALIDATION_ERROR",
            ApiError::Unauthenticated { .. } => "UNAUTHENTICATED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::MethodNotAllowed { .. } => "METHOD_NOT_ALLOWED",
            ApiError::Domain(_) => "DOMAIN_ERROR",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    /// Convert to envelope body
    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "code": self.envelope_code(),
            "message": self.message(),
        });

        let data = match self {
            ApiError::ValidationError {
                field_errors: Some(field_errors),
                ..
            } => Some(json!({ "fieldErrors": field_errors })),
            ApiError::Unauthenticated { reason, .. } => Some(json!({ "reason": reason.as_str() })),
            ApiError::MethodNotAllowed { allowed } => Some(json!({
                "allowed": allowed.iter().map(Method::as_str).collect::<Vec<_>>()
            })),
            ApiError::Domain(err) => err.data.clone(),
            _ => None,
        };
        if let Some(data) = data {
            body["data"] = data;
        }

        body
    }
}

// Static constructor methods
impl ApiError {
    pub fn validation_error(
        message: impl Into<String>,
        field_errors: Option<HashMap<String, String>>,
    ) -> Self {
        ApiError::ValidationError {
            message: message.into(),
            field_errors,
        }
    }

    pub fn field_error(field: &str, message: impl Into<String>) -> Self {
        let mut field_errors = HashMap::new();
        field_errors.insert(field.to_string(), message.into());
        ApiError::validation_error("Invalid request parameters", Some(field_errors))
    }

    pub fn unauthenticated(message: impl Into<String>, reason: AuthFailure) -> Self {
        ApiError::Unauthenticated {
            message: message.into(),
            reason,
        }
    }

    pub fn missing_credential() -> Self {
        ApiError::unauthenticated("Authentication required", AuthFailure::Missing)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn method_not_allowed(allowed: Vec<Method>) -> Self {
        ApiError::MethodNotAllowed { allowed }
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => {
                ApiError::unauthenticated("Access token expired", AuthFailure::Expired)
            }
            TokenError::Invalid(_) => {
                ApiError::unauthenticated("Invalid access token", AuthFailure::Invalid)
            }
            TokenError::Signing(msg) => {
                tracing::error!("Token signing failed: {}", msg);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
        }
    }
}

impl From<ResolveError> for ApiError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Token(token_err) => token_err.into(),
            ResolveError::AccountDisabled(_) => {
                ApiError::unauthenticated("Account is disabled", AuthFailure::Invalid)
            }
            ResolveError::Unavailable(msg) => {
                tracing::error!("Identity resolution unavailable: {}", msg);
                ApiError::service_unavailable("Authentication service temporarily unavailable")
            }
        }
    }
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        tracing::warn!("Authorization denied: {}", err);
        match err {
            AuthzError::OrganizationScope => {
                ApiError::forbidden("Resource is outside your organization")
            }
            _ => ApiError::forbidden("Insufficient permissions"),
        }
    }
}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(self.to_json())).into_response();

        if let ApiError::MethodNotAllowed { allowed } = &self {
            let allow = allowed
                .iter()
                .map(Method::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            if let Ok(value) = HeaderValue::from_str(&allow) {
                response.headers_mut().insert(header::ALLOW, value);
            }
        }

        response
    }
}
