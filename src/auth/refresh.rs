// Token refresh and validation calls

use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;

use super::types::{
    AdminRefreshRequest, AdminRefreshResponse, AdminValidateRequest, Credentials,
    RefreshRequest, RefreshResponse, Scope, ValidateRequest, ValidateResponse,
};
use crate::error::RefreshError;

/// Refresh the credential pair of `scope` against the backend at `url`
pub async fn refresh_scope(
    client: &Client,
    url: &str,
    scope: Scope,
    creds: &Credentials,
) -> std::result::Result<Credentials, RefreshError> {
    match scope {
        Scope::User => refresh_user(client, url, creds).await,
        Scope::Admin => refresh_admin(client, url, creds).await,
    }
}

/// `POST /api/refresh-token`
pub async fn refresh_user(
    client: &Client,
    url: &str,
    creds: &Credentials,
) -> std::result::Result<Credentials, RefreshError> {
    tracing::info!("Refreshing user token...");

    let request = RefreshRequest {
        refresh_token: &creds.refresh_token,
    };
    let data: RefreshResponse = post_refresh(client, url, Scope::User, &request).await?;

    if !data.success {
        return Err(rejected(Scope::User, data.error.or(data.message)));
    }

    let tokens = data
        .tokens
        .and_then(Credentials::from_pair)
        .ok_or_else(|| RefreshError::InvalidResponse {
            scope: Scope::User,
            message: "response does not contain a complete token pair".to_string(),
        })?;

    tracing::info!(
        "User token refreshed, expires: {}",
        tokens.expires_at.to_rfc3339()
    );

    Ok(tokens)
}

/// `POST /api/refresh-admin-token`
pub async fn refresh_admin(
    client: &Client,
    url: &str,
    creds: &Credentials,
) -> std::result::Result<Credentials, RefreshError> {
    tracing::info!("Refreshing admin token...");

    let request = AdminRefreshRequest {
        admin_refresh_token: &creds.refresh_token,
    };
    let data: AdminRefreshResponse = post_refresh(client, url, Scope::Admin, &request).await?;

    if !data.success {
        return Err(rejected(Scope::Admin, data.error.or(data.message)));
    }

    let tokens = data
        .admin_tokens
        .and_then(Credentials::from_admin_pair)
        .ok_or_else(|| RefreshError::InvalidResponse {
            scope: Scope::Admin,
            message: "response does not contain a complete admin token pair".to_string(),
        })?;

    tracing::info!(
        "Admin token refreshed, expires: {}",
        tokens.expires_at.to_rfc3339()
    );

    Ok(tokens)
}

fn rejected(scope: Scope, message: Option<String>) -> RefreshError {
    RefreshError::Rejected {
        scope,
        message: message
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "token refresh failed".to_string()),
    }
}

/// Send a refresh body and decode the JSON answer regardless of status
async fn post_refresh<B, T>(
    client: &Client,
    url: &str,
    scope: Scope,
    body: &B,
) -> std::result::Result<T, RefreshError>
where
    B: serde::Serialize + ?Sized,
    T: DeserializeOwned,
{
    let response = client
        .post(url)
        .header("Content-Type", "application/json")
        .json(body)
        .send()
        .await
        .map_err(|e| RefreshError::Transport {
            scope,
            message: e.to_string(),
        })?;

    let status = response.status();
    let text = response.text().await.map_err(|e| RefreshError::Transport {
        scope,
        message: e.to_string(),
    })?;

    match serde_json::from_str::<T>(&text) {
        Ok(data) => Ok(data),
        Err(_) if !status.is_success() => {
            tracing::error!(
                scope = %scope,
                status = status.as_u16(),
                body = %text,
                "Token refresh failed"
            );
            Err(RefreshError::Rejected {
                scope,
                message: format!("HTTP {}", status.as_u16()),
            })
        }
        Err(e) => Err(RefreshError::InvalidResponse {
            scope,
            message: e.to_string(),
        }),
    }
}

/// Ask the backend whether an access token is still valid
pub async fn validate_scope(
    client: &Client,
    url: &str,
    scope: Scope,
    access_token: &str,
) -> Result<bool> {
    let builder = client
        .post(url)
        .header("Content-Type", "application/json");

    let builder = match scope {
        Scope::User => builder.json(&ValidateRequest { access_token }),
        Scope::Admin => builder.json(&AdminValidateRequest {
            admin_access_token: access_token,
        }),
    };

    let response = builder
        .send()
        .await
        .with_context(|| format!("Failed to send {} token validation request", scope))?;

    let data: ValidateResponse = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} token validation response", scope))?;

    Ok(data.success && data.valid)
}
