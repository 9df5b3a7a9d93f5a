// Authentication types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which credential set an operation applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Standard user session
    User,

    /// Administrator session
    Admin,
}

impl Scope {
    pub const ALL: [Scope; 2] = [Scope::User, Scope::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::User => "user",
            Scope::Admin => "admin",
        }
    }

    pub fn refresh_endpoint(&self) -> &'static str {
        match self {
            Scope::User => "/api/refresh-token",
            Scope::Admin => "/api/refresh-admin-token",
        }
    }

    pub fn validate_endpoint(&self) -> &'static str {
        match self {
            Scope::User => "/api/validate-token",
            Scope::Admin => "/api/validate-admin-token",
        }
    }

    /// Cookie names carrying (access, refresh) tokens for this scope
    pub fn cookie_names(&self) -> (&'static str, &'static str) {
        match self {
            Scope::User => ("access_token", "refresh_token"),
            Scope::Admin => ("admin_access_token", "admin_refresh_token"),
        }
    }

    /// Scope whose credentials an endpoint is authorized with
    pub fn for_endpoint(endpoint: &str) -> Scope {
        let path = endpoint
            .split_once("://")
            .and_then(|(_, rest)| rest.find('/').map(|i| &rest[i..]))
            .unwrap_or(endpoint);
        if path.trim_start_matches('/').starts_with("api/admin") {
            Scope::Admin
        } else {
            Scope::User
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Scope::User),
            "admin" => Ok(Scope::Admin),
            other => Err(format!("unknown scope '{}', expected 'user' or 'admin'", other)),
        }
    }
}

/// Credential pair for one scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credentials {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
        }
    }

    /// A pair with only one token set counts as absent
    pub fn is_complete(&self) -> bool {
        !self.access_token.is_empty() && !self.refresh_token.is_empty()
    }

    /// Complete pairs only
    pub fn into_complete(self) -> Option<Self> {
        self.is_complete().then_some(self)
    }

    /// True once `now` reaches `expires_at - skew`
    pub fn is_expired_at(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        now >= self.expires_at - skew
    }

    pub fn from_pair(pair: TokenPair) -> Option<Self> {
        Self::new(pair.access_token, pair.refresh_token, pair.expires_at).into_complete()
    }

    pub fn from_admin_pair(pair: AdminTokenPair) -> Option<Self> {
        Self::new(
            pair.admin_access_token,
            pair.admin_refresh_token,
            pair.admin_expires_at,
        )
        .into_complete()
    }

    pub fn to_pair(&self) -> TokenPair {
        TokenPair {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            expires_at: self.expires_at,
        }
    }

    pub fn to_admin_pair(&self) -> AdminTokenPair {
        AdminTokenPair {
            admin_access_token: self.access_token.clone(),
            admin_refresh_token: self.refresh_token.clone(),
            admin_expires_at: self.expires_at,
        }
    }

    /// Short token prefix for log lines
    pub fn access_token_preview(&self) -> &str {
        self.access_token
            .char_indices()
            .nth(8)
            .map_or(self.access_token.as_str(), |(end, _)| &self.access_token[..end])
    }
}

/// Is a (possibly absent) pair due for renewal
pub fn is_expired(pair: Option<&Credentials>, skew: Duration) -> bool {
    match pair {
        None => true,
        Some(creds) => creds.is_expired_at(Utc::now(), skew),
    }
}

/// Per-scope lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    NoCredentials,
    Valid,
    ExpiringSoon,
    Refreshing,
}

/// User token pair as sent by the backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenPair {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub expires_at: DateTime<Utc>,
}

/// Admin token pair as sent by the backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminTokenPair {
    #[serde(default)]
    pub admin_access_token: String,
    #[serde(default)]
    pub admin_refresh_token: String,
    #[serde(default)]
    pub admin_expires_at: DateTime<Utc>,
}

/// `POST /api/refresh-token` body
#[derive(Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

/// `POST /api/refresh-admin-token` body
#[derive(Serialize)]
pub struct AdminRefreshRequest<'a> {
    pub admin_refresh_token: &'a str,
}

/// User refresh response
#[derive(Debug, Deserialize)]
pub struct RefreshResponse {
    #[serde(default)]
    pub success: bool,
    pub message: Option<String>,
    pub error: Option<String>,
    pub tokens: Option<TokenPair>,
}

/// Admin refresh response
#[derive(Debug, Deserialize)]
pub struct AdminRefreshResponse {
    #[serde(default)]
    pub success: bool,
    pub message: Option<String>,
    pub error: Option<String>,
    pub admin_tokens: Option<AdminTokenPair>,
}

/// `POST /api/validate-token` body
#[derive(Serialize)]
pub struct ValidateRequest<'a> {
    pub access_token: &'a str,
}

/// `POST /api/validate-admin-token` body
#[derive(Serialize)]
pub struct AdminValidateRequest<'a> {
    pub admin_access_token: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ValidateResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub valid: bool,
}
