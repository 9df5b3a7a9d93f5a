// Error handling module
// Defines the typed error surfaced by the gateway and the refresh errors of the token manager

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::auth::Scope;

/// Closed set of error kinds surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    ResourceNotFound,
    ConflictError,
    BusinessError,
    ServerError,
    ServiceUnavailable,
    TokenExpired,
    AuthenticationError,
    NetworkError,
    TimeoutError,
}

impl ErrorKind {
    /// Wire name of the kind, e.g. `RESOURCE_NOT_FOUND`
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ResourceNotFound => "RESOURCE_NOT_FOUND",
            ErrorKind::ConflictError => "CONFLICT_ERROR",
            ErrorKind::BusinessError => "BUSINESS_ERROR",
            ErrorKind::ServerError => "SERVER_ERROR",
            ErrorKind::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorKind::TokenExpired => "TOKEN_EXPIRED",
            ErrorKind::AuthenticationError => "AUTHENTICATION_ERROR",
            ErrorKind::NetworkError => "NETWORK_ERROR",
            ErrorKind::TimeoutError => "TIMEOUT_ERROR",
        }
    }

    /// Default user-facing message for this kind
    fn default_message(&self) -> &'static str {
        match self {
            ErrorKind::ResourceNotFound => "The requested resource does not exist",
            ErrorKind::ConflictError => "Operation conflict",
            ErrorKind::BusinessError => "Operation failed",
            ErrorKind::ServerError => "Internal server error",
            ErrorKind::ServiceUnavailable => "Service temporarily unavailable",
            ErrorKind::TokenExpired => "Login has expired, please log in again",
            ErrorKind::AuthenticationError => "Authentication failed",
            ErrorKind::NetworkError => "Network connection failed",
            ErrorKind::TimeoutError => "Request timed out",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default message for well-known HTTP status codes
fn status_message(status: u16) -> Option<&'static str> {
    match status {
        400 => Some("Invalid request parameters"),
        401 => Some("Unauthorized"),
        403 => Some("Access denied"),
        404 => Some("Resource not found"),
        409 => Some("Resource conflict"),
        429 => Some("Too many requests"),
        500 => Some("Internal server error"),
        503 => Some("Service temporarily unavailable"),
        _ => None,
    }
}

/// Typed error returned by every gateway call that does not succeed
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct ApiError {
    /// HTTP status code, 0 for transport-level failures
    pub status: u16,

    /// Human-readable message suitable for direct display
    pub message: String,

    pub kind: ErrorKind,

    /// Raw error payload returned by the server, if any
    pub details: Option<Value>,
}

impl ApiError {
    pub fn new(status: u16, message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            status,
            message: message.into(),
            kind,
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn network() -> Self {
        Self::new(0, ErrorKind::NetworkError.default_message(), ErrorKind::NetworkError)
    }

    pub fn timeout() -> Self {
        Self::new(0, ErrorKind::TimeoutError.default_message(), ErrorKind::TimeoutError)
    }

    /// Message to show the user, falling back to a status or kind default
    pub fn user_message(&self) -> String {
        if !self.message.is_empty() {
            return self.message.clone();
        }
        if let Some(msg) = status_message(self.status) {
            return msg.to_string();
        }
        self.kind.default_message().to_string()
    }

    /// Transport failures the UI may offer to retry
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::NetworkError | ErrorKind::TimeoutError)
    }
}

/// Errors produced by a token refresh
///
/// `Clone` because a single refresh result is shared by every concurrent waiter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RefreshError {
    /// No stored credential pair to refresh from
    #[error("No refresh token available for {0} scope")]
    NoCredentials(Scope),

    /// The backend answered but refused the refresh
    #[error("Token refresh rejected for {scope} scope: {message}")]
    Rejected { scope: Scope, message: String },

    /// The refresh call never got a response
    #[error("Token refresh request failed for {scope} scope: {message}")]
    Transport { scope: Scope, message: String },

    /// The response could not be decoded
    #[error("Invalid token refresh response for {scope} scope: {message}")]
    InvalidResponse { scope: Scope, message: String },
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_messages() {
        let err = ApiError::new(404, "API endpoint not found: /api/x", ErrorKind::ResourceNotFound);
        assert_eq!(err.to_string(), "API endpoint not found: /api/x");
        assert_eq!(err.kind, ErrorKind::ResourceNotFound);
        assert!(err.details.is_none());

        let err = ApiError::new(409, "Name taken", ErrorKind::ConflictError)
            .with_details(json!({"error": "Name taken"}));
        assert_eq!(err.details, Some(json!({"error": "Name taken"})));
    }

    #[test]
    fn test_transport_errors() {
        let err = ApiError::network();
        assert_eq!(err.status, 0);
        assert_eq!(err.kind, ErrorKind::NetworkError);
        assert!(err.is_retryable());

        let err = ApiError::timeout();
        assert_eq!(err.status, 0);
        assert_eq!(err.kind, ErrorKind::TimeoutError);
        assert!(err.is_retryable());

        assert!(!ApiError::new(500, "boom", ErrorKind::ServerError).is_retryable());
    }

    #[test]
    fn test_user_message_fallbacks() {
        let err = ApiError::new(400, "", ErrorKind::BusinessError);
        assert_eq!(err.user_message(), "Invalid request parameters");

        let err = ApiError::new(0, "", ErrorKind::TimeoutError);
        assert_eq!(err.user_message(), "Request timed out");

        let err = ApiError::new(418, "teapot", ErrorKind::BusinessError);
        assert_eq!(err.user_message(), "teapot");
    }

    #[test]
    fn test_error_kind_wire_names() {
        assert_eq!(ErrorKind::ResourceNotFound.to_string(), "RESOURCE_NOT_FOUND");
        assert_eq!(
            serde_json::to_value(ErrorKind::ServiceUnavailable).unwrap(),
            json!("SERVICE_UNAVAILABLE")
        );
        let kind: ErrorKind = serde_json::from_value(json!("TOKEN_EXPIRED")).unwrap();
        assert_eq!(kind, ErrorKind::TokenExpired);
    }

    #[test]
    fn test_refresh_error_messages() {
        let err = RefreshError::NoCredentials(Scope::Admin);
        assert_eq!(err.to_string(), "No refresh token available for admin scope");

        let err = RefreshError::Rejected {
            scope: Scope::User,
            message: "refresh token revoked".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Token refresh rejected for user scope: refresh token revoked"
        );
    }
}
