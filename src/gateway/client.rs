use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{Method, Response, StatusCode, Url};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::classify::{self, Classification};
use super::request::{MultipartForm, Payload, RequestBody, RequestOptions};
use super::resolver::{BaseUrlResolver, FALLBACK_BASE_URL};
use crate::auth::{Scope, TokenManager};
use crate::error::{ApiError, ErrorKind, Result};
use crate::http_client::HttpClient;
use crate::url::BaseUrl;

/// Calls issued before initialization completes poll at this interval
const INIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Retries allowed after a 401 triggered a token refresh
const MAX_AUTH_RETRIES: u32 = 1;

const SESSION_EXPIRED_MESSAGE: &str = "Your login may have expired, but you can keep using the app";
const AUTHENTICATION_FAILED_MESSAGE: &str = "Authentication failed, but you can keep using the app";

/// Single entry point for every backend call
///
/// Resolves the base URL, sends the request with cookies, classifies the
/// response and, on a 401, refreshes credentials and retries once.
#[derive(Clone)]
pub struct RequestGateway {
    http: HttpClient,
    tokens: TokenManager,
    resolver: Arc<BaseUrlResolver>,
    base_url: BaseUrl,
    initialized: Arc<AtomicBool>,
}

impl RequestGateway {
    /// Create a gateway and start base URL initialization
    ///
    /// If the resolver cannot produce a URL right away, resolution is retried
    /// in the background; calls made meanwhile wait for it.
    pub fn new(
        http: HttpClient,
        tokens: TokenManager,
        resolver: BaseUrlResolver,
        base_url: BaseUrl,
    ) -> Self {
        let gateway = Self {
            http,
            tokens,
            resolver: Arc::new(resolver),
            base_url,
            initialized: Arc::new(AtomicBool::new(false)),
        };
        gateway.initialize();
        gateway
    }

    fn initialize(&self) {
        let resolved = self.resolver.resolve();
        if !resolved.is_empty() {
            self.base_url.set(resolved);
            self.initialized.store(true, Ordering::Release);
            tracing::debug!(base_url = %self.base_url.get(), "API gateway initialized");
            return;
        }

        tracing::warn!("API gateway base URL is empty, check the environment configuration");

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let resolver = Arc::clone(&self.resolver);
                let base_url = self.base_url.clone();
                let initialized = Arc::clone(&self.initialized);
                handle.spawn(async move {
                    resolver.resolve_with_retries(&base_url).await;
                    initialized.store(true, Ordering::Release);
                    tracing::debug!(base_url = %base_url.get(), "API gateway initialized");
                });
            }
            Err(_) => {
                tracing::warn!(
                    "No async runtime for deferred resolution, using default {}",
                    FALLBACK_BASE_URL
                );
                self.base_url.set(FALLBACK_BASE_URL);
                self.initialized.store(true, Ordering::Release);
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Wait until the base URL has been resolved
    pub async fn wait_until_initialized(&self) {
        while !self.is_initialized() {
            tokio::time::sleep(INIT_POLL_INTERVAL).await;
        }
    }

    /// Re-run resolution, e.g. after an environment switch
    pub fn update_base_url(&self) {
        let resolved = self.resolver.resolve();
        if !resolved.is_empty() && self.base_url.set(resolved) {
            tracing::info!(base_url = %self.base_url.get(), "API base URL updated");
        }
    }

    pub fn base_url(&self) -> String {
        self.base_url.get()
    }

    /// Full URL for an endpoint, also used to build direct asset URLs
    pub fn build_url(&self, endpoint: &str) -> String {
        self.base_url.build_url(endpoint)
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    /// Bearer token for collaborators working outside the gateway
    pub async fn get_valid_access_token(&self, scope: Scope) -> Option<String> {
        self.tokens.get_valid_access_token(scope).await
    }

    /// Issue a request and classify its outcome
    pub async fn request(&self, endpoint: &str, options: RequestOptions) -> Result<Response> {
        self.wait_until_initialized().await;
        self.update_base_url();

        let url = self.build_url(endpoint);
        let scope = options
            .scope
            .unwrap_or_else(|| Scope::for_endpoint(endpoint));
        let request_id = uuid::Uuid::new_v4().to_string()[..8].to_string();

        let mut attempt: u32 = 0;
        loop {
            let response = self.execute(&url, &options, &request_id, attempt).await?;
            let status = response.status();

            match classify::classify(status, endpoint) {
                Classification::Success | Classification::PassThrough => {
                    tracing::debug!(
                        request_id = %request_id,
                        status = %status,
                        "Request completed"
                    );
                    return Ok(response);
                }

                Classification::Unauthorized if attempt < MAX_AUTH_RETRIES => {
                    tracing::warn!(
                        request_id = %request_id,
                        scope = %scope,
                        "Received 401, refreshing token and retrying..."
                    );

                    if let Err(e) = self.tokens.refresh(scope).await {
                        tracing::error!(request_id = %request_id, "Token refresh failed: {}", e);
                        return Err(ApiError::new(
                            StatusCode::UNAUTHORIZED.as_u16(),
                            SESSION_EXPIRED_MESSAGE,
                            ErrorKind::TokenExpired,
                        ));
                    }

                    attempt += 1;
                }

                Classification::Unauthorized => {
                    tracing::error!(
                        request_id = %request_id,
                        url = %url,
                        "Still unauthorized after token refresh"
                    );
                    return Err(ApiError::new(
                        StatusCode::UNAUTHORIZED.as_u16(),
                        AUTHENTICATION_FAILED_MESSAGE,
                        ErrorKind::AuthenticationError,
                    ));
                }

                Classification::Failure(kind, message) => {
                    let err = classify::into_api_error(response, endpoint, kind, message).await;
                    tracing::warn!(
                        request_id = %request_id,
                        status = err.status,
                        kind = %err.kind,
                        url = %url,
                        "Request failed: {}",
                        err.message
                    );
                    return Err(err);
                }
            }
        }
    }

    /// Send one attempt
    async fn execute(
        &self,
        url: &str,
        options: &RequestOptions,
        request_id: &str,
        attempt: u32,
    ) -> Result<Response> {
        tracing::debug!(
            request_id = %request_id,
            method = %options.method,
            url = %url,
            attempt = attempt + 1,
            "Sending HTTP request"
        );

        self.sync_cookies(url).await;

        let mut builder = self.http.client().request(options.method.clone(), url);

        if !options.body.is_multipart() {
            builder = builder.header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        builder = builder.headers(options.headers.clone());

        builder = match &options.body {
            RequestBody::Empty => builder,
            RequestBody::Text(text) => builder.body(text.clone()),
            RequestBody::Multipart(form) => {
                let form = form.to_form().map_err(|e| {
                    ApiError::new(
                        0,
                        format!("Invalid upload form: {}", e),
                        ErrorKind::BusinessError,
                    )
                })?;
                builder.multipart(form)
            }
        };

        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }

        builder
            .send()
            .await
            .map_err(|e| transport_error(&e, url, request_id))
    }

    /// Make the jar carry the currently stored tokens of both scopes
    async fn sync_cookies(&self, url: &str) {
        let Ok(url) = Url::parse(url) else {
            return;
        };
        for scope in Scope::ALL {
            let credentials = self.tokens.credentials(scope).await;
            self.http.sync_credentials(&url, scope, credentials.as_ref());
        }
    }

    pub async fn get(&self, endpoint: &str, options: RequestOptions) -> Result<Response> {
        self.request(endpoint, options.method(Method::GET)).await
    }

    pub async fn post(
        &self,
        endpoint: &str,
        data: impl Into<Payload>,
        options: RequestOptions,
    ) -> Result<Response> {
        self.send_with_payload(Method::POST, endpoint, data.into(), options)
            .await
    }

    pub async fn put(
        &self,
        endpoint: &str,
        data: impl Into<Payload>,
        options: RequestOptions,
    ) -> Result<Response> {
        self.send_with_payload(Method::PUT, endpoint, data.into(), options)
            .await
    }

    pub async fn patch(
        &self,
        endpoint: &str,
        data: impl Into<Payload>,
        options: RequestOptions,
    ) -> Result<Response> {
        self.send_with_payload(Method::PATCH, endpoint, data.into(), options)
            .await
    }

    pub async fn delete(&self, endpoint: &str, options: RequestOptions) -> Result<Response> {
        self.request(endpoint, options.method(Method::DELETE)).await
    }

    /// POST a multipart form; the transport sets the Content-Type with its boundary
    pub async fn upload(
        &self,
        endpoint: &str,
        form: MultipartForm,
        options: RequestOptions,
    ) -> Result<Response> {
        let options = options
            .method(Method::POST)
            .body(RequestBody::Multipart(form))
            .without_content_type();
        self.request(endpoint, options).await
    }

    pub async fn download(&self, endpoint: &str, options: RequestOptions) -> Result<Response> {
        self.request(endpoint, options.method(Method::GET)).await
    }

    async fn send_with_payload(
        &self,
        method: Method,
        endpoint: &str,
        data: Payload,
        options: RequestOptions,
    ) -> Result<Response> {
        let options = match data.into_body() {
            RequestBody::Empty => options.method(method),
            body => options.method(method).body(body),
        };
        self.request(endpoint, options).await
    }
}

/// Map a transport failure to an `ApiError`
fn transport_error(e: &reqwest::Error, url: &str, request_id: &str) -> ApiError {
    let (error_kind, err) = if e.is_timeout() {
        ("timeout", ApiError::timeout())
    } else if e.is_connect() {
        ("connection_failed", ApiError::network())
    } else if e.is_request() {
        ("request_error", ApiError::network())
    } else {
        let message = if e.to_string().is_empty() {
            "Request failed".to_string()
        } else {
            e.to_string()
        };
        ("unknown", ApiError::new(0, message, ErrorKind::BusinessError))
    };

    tracing::warn!(
        request_id = %request_id,
        error_kind = error_kind,
        error = %e,
        url = %url,
        "HTTP request error"
    );

    err
}
