// Response classification

use reqwest::{Response, StatusCode};
use serde_json::Value;

use crate::error::{ApiError, ErrorKind};

pub const TOO_MANY_REQUESTS_MESSAGE: &str = "Too many requests, please try again later";
pub const SERVER_ERROR_MESSAGE: &str = "Internal server error";
pub const SERVICE_UNAVAILABLE_MESSAGE: &str = "Service temporarily unavailable";
pub const CONFLICT_FALLBACK_MESSAGE: &str = "Operation conflict";
pub const BAD_REQUEST_FALLBACK_MESSAGE: &str = "Invalid request parameters";

const LOGIN_ENDPOINT: &str = "/api/auth/login";

/// Login calls have no session to refresh
pub fn is_login_endpoint(endpoint: &str) -> bool {
    endpoint.contains(LOGIN_ENDPOINT)
}

/// How the message of a failure is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMessage {
    Fixed(&'static str),

    /// "API endpoint not found: <endpoint>"
    EndpointNotFound,

    /// `error`/`message` from a JSON body, else the fallback
    FromBody(&'static str),

    /// "HTTP <status>: <reason>"
    StatusLine,
}

/// What the gateway does with a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Success,

    /// Handed to the caller untouched (401 from a login call)
    PassThrough,

    /// Refresh credentials and retry once
    Unauthorized,

    Failure(ErrorKind, FailureMessage),
}

/// Classify a response status for a given endpoint
pub fn classify(status: StatusCode, endpoint: &str) -> Classification {
    if status.is_success() {
        return Classification::Success;
    }

    match status.as_u16() {
        401 if is_login_endpoint(endpoint) => Classification::PassThrough,
        401 => Classification::Unauthorized,
        404 => Classification::Failure(
            ErrorKind::ResourceNotFound,
            FailureMessage::EndpointNotFound,
        ),
        409 => Classification::Failure(
            ErrorKind::ConflictError,
            FailureMessage::FromBody(CONFLICT_FALLBACK_MESSAGE),
        ),
        400 => Classification::Failure(
            ErrorKind::BusinessError,
            FailureMessage::FromBody(BAD_REQUEST_FALLBACK_MESSAGE),
        ),
        429 => Classification::Failure(
            ErrorKind::BusinessError,
            FailureMessage::Fixed(TOO_MANY_REQUESTS_MESSAGE),
        ),
        500 => Classification::Failure(
            ErrorKind::ServerError,
            FailureMessage::Fixed(SERVER_ERROR_MESSAGE),
        ),
        503 => Classification::Failure(
            ErrorKind::ServiceUnavailable,
            FailureMessage::Fixed(SERVICE_UNAVAILABLE_MESSAGE),
        ),
        _ => Classification::Failure(ErrorKind::BusinessError, FailureMessage::StatusLine),
    }
}

/// Extract the `error` or `message` field of a JSON error body
pub fn parse_error_body(body: &str) -> Option<(Option<String>, Value)> {
    let value: Value = serde_json::from_str(body).ok()?;
    let message = ["error", "message"]
        .iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_str))
        .find(|msg| !msg.is_empty())
        .map(str::to_string);
    Some((message, value))
}

/// Turn a failed response into an `ApiError`, consuming its body if needed
pub async fn into_api_error(
    response: Response,
    endpoint: &str,
    kind: ErrorKind,
    message: FailureMessage,
) -> ApiError {
    let status = response.status();

    match message {
        FailureMessage::Fixed(text) => ApiError::new(status.as_u16(), text, kind),
        FailureMessage::EndpointNotFound => ApiError::new(
            status.as_u16(),
            format!("API endpoint not found: {}", endpoint),
            kind,
        ),
        FailureMessage::StatusLine => ApiError::new(
            status.as_u16(),
            format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            ),
            kind,
        ),
        FailureMessage::FromBody(fallback) => {
            let body = response.text().await.unwrap_or_default();
            match parse_error_body(&body) {
                Some((message, details)) => ApiError::new(
                    status.as_u16(),
                    message.unwrap_or_else(|| fallback.to_string()),
                    kind,
                )
                .with_details(details),
                None => ApiError::new(status.as_u16(), fallback, kind),
            }
        }
    }
}
