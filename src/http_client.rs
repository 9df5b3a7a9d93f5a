use anyhow::{Context, Result};
use reqwest::cookie::Jar;
use reqwest::{Client, Url};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{Credentials, Scope};

/// Shared HTTP client with a cookie jar
///
/// Every request made through this client sends the cookies held in the jar,
/// which is how the backend's cookie-carried tokens travel.
#[derive(Clone)]
pub struct HttpClient {
    /// Shared HTTP client with connection pooling
    client: Client,

    /// Cookie jar attached to `client`
    jar: Arc<Jar>,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, jar })
    }

    /// Get the underlying HTTP client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Write (or expire, when `value` is `None`) a cookie for `url`
    pub fn set_cookie(&self, url: &Url, name: &str, value: Option<&str>) {
        let cookie = match value {
            Some(value) => format!("{}={}; Path=/", name, value),
            None => format!("{}=; Max-Age=0; Path=/", name),
        };
        self.jar.add_cookie_str(&cookie, url);
    }

    /// Mirror a scope's credentials into the jar for `url`
    pub fn sync_credentials(&self, url: &Url, scope: Scope, credentials: Option<&Credentials>) {
        let (access_name, refresh_name) = scope.cookie_names();
        self.set_cookie(
            url,
            access_name,
            credentials.map(|c| c.access_token.as_str()),
        );
        self.set_cookie(
            url,
            refresh_name,
            credentials.map(|c| c.refresh_token.as_str()),
        );
    }

    /// `Cookie` header value that would be sent to `url`
    #[cfg(test)]
    fn cookie_header(&self, url: &Url) -> Option<String> {
        use reqwest::cookie::CookieStore;

        self.jar
            .cookies(url)
            .and_then(|value| value.to_str().ok().map(str::to_string))
    }
}
