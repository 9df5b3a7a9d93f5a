// Login and logout on top of the gateway

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::{AdminTokenPair, Credentials, Scope, TokenPair};
use crate::error::{ApiError, ErrorKind, Result};
use crate::gateway::{classify, Classification, Payload, RequestGateway, RequestOptions};

pub const LOGIN_ENDPOINT: &str = "/api/auth/login";
pub const LOGOUT_ENDPOINT: &str = "/api/auth/logout";

const LOGIN_FAILED_MESSAGE: &str = "Login failed";

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// Successful login answer
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub user: Value,
    pub tokens: Option<TokenPair>,
    pub admin_tokens: Option<AdminTokenPair>,
}

/// Log in and store the issued credentials
///
/// Admin credentials are stored only when the backend issued a complete pair.
pub async fn login(
    gateway: &RequestGateway,
    username: &str,
    password: &str,
) -> Result<LoginResponse> {
    let payload = Payload::json(&LoginRequest { username, password })
        .map_err(|e| ApiError::new(0, e.to_string(), ErrorKind::BusinessError))?;

    let response = gateway
        .post(LOGIN_ENDPOINT, payload, RequestOptions::new())
        .await?;
    let status = response.status();

    if classify(status, LOGIN_ENDPOINT) == Classification::PassThrough {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| {
                ["error", "message"]
                    .iter()
                    .find_map(|key| v.get(*key).and_then(Value::as_str).map(str::to_string))
            })
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| LOGIN_FAILED_MESSAGE.to_string());
        tracing::warn!(username = %username, "Login rejected: {}", message);
        return Err(ApiError::new(status.as_u16(), message, ErrorKind::AuthenticationError));
    }

    let data: LoginResponse = response.json().await.map_err(|e| {
        ApiError::new(
            status.as_u16(),
            format!("Invalid login response: {}", e),
            ErrorKind::BusinessError,
        )
    })?;

    if !data.success {
        let message = if data.message.is_empty() {
            LOGIN_FAILED_MESSAGE.to_string()
        } else {
            data.message.clone()
        };
        return Err(ApiError::new(status.as_u16(), message, ErrorKind::AuthenticationError));
    }

    let tokens = gateway.tokens();
    match data.tokens.clone().and_then(Credentials::from_pair) {
        Some(credentials) => {
            tokens.store_credentials(Scope::User, credentials).await;
        }
        None => tracing::warn!("Login response carried no user tokens"),
    }
    if let Some(credentials) = data.admin_tokens.clone().and_then(Credentials::from_admin_pair) {
        tokens.store_credentials(Scope::Admin, credentials).await;
    }

    tracing::info!(username = %username, "Logged in");
    Ok(data)
}

/// Log out; local credentials of both scopes are cleared whatever the backend says
pub async fn logout(gateway: &RequestGateway) {
    match gateway.post(LOGOUT_ENDPOINT, (), RequestOptions::new()).await {
        Ok(_) => tracing::info!("Logged out"),
        Err(e) => tracing::warn!("Backend logout failed, clearing local credentials anyway: {}", e),
    }
    gateway.tokens().clear_all().await;
}
