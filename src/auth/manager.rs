use chrono::Duration;
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Client;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::hooks::{NoopSessionHooks, SessionHooks};
use super::refresh;
use super::store::{CredentialStore, MemoryCredentialStore};
use super::types::{is_expired, Credentials, Scope, TokenState};
use crate::error::RefreshError;
use crate::url::BaseUrl;

type RefreshResult = std::result::Result<Credentials, RefreshError>;
type PendingRefresh = Shared<BoxFuture<'static, RefreshResult>>;

/// Refresh operation state of one scope
///
/// Invariant: while `Refreshing`, every caller of `refresh()` awaits the same
/// pending future, so at most one refresh request per scope is on the wire.
/// The refresh runs in its own task and resets the state to `Idle` when it
/// completes, whether or not anyone is still awaiting it.
enum RefreshState {
    Idle,
    Refreshing(PendingRefresh),
}

/// Timing knobs for the token manager
#[derive(Debug, Clone, Copy)]
pub struct TokenSettings {
    /// Renewal margin before `expires_at` for user credentials
    pub user_skew: Duration,

    /// Renewal margin before `expires_at` for admin credentials
    pub admin_skew: Duration,

    /// Period of the auto-refresh check
    pub check_interval: std::time::Duration,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            user_skew: Duration::seconds(60),
            admin_skew: Duration::seconds(60),
            check_interval: std::time::Duration::from_secs(60),
        }
    }
}

struct ScopeSlot {
    credentials: RwLock<Option<Credentials>>,
    refresh: Mutex<RefreshState>,
    skew: Duration,
}

impl ScopeSlot {
    fn new(credentials: Option<Credentials>, skew: Duration) -> Self {
        Self {
            credentials: RwLock::new(credentials),
            refresh: Mutex::new(RefreshState::Idle),
            skew,
        }
    }
}

struct Inner {
    client: Client,
    base_url: BaseUrl,
    store: Arc<dyn CredentialStore>,
    hooks: Arc<dyn SessionHooks>,
    user: ScopeSlot,
    admin: ScopeSlot,
    check_interval: std::time::Duration,
}

impl Inner {
    fn slot(&self, scope: Scope) -> &ScopeSlot {
        match scope {
            Scope::User => &self.user,
            Scope::Admin => &self.admin,
        }
    }

    async fn perform_refresh(&self, scope: Scope) -> RefreshResult {
        let current = self.slot(scope).credentials.read().await.clone();
        let Some(current) = current else {
            tracing::warn!(scope = %scope, "No refresh token available");
            return Err(RefreshError::NoCredentials(scope));
        };

        let url = self.base_url.build_url(scope.refresh_endpoint());
        match refresh::refresh_scope(&self.client, &url, scope, &current).await {
            Ok(credentials) => {
                self.persist(scope, credentials.clone()).await;
                Ok(credentials)
            }
            Err(e) => {
                tracing::error!(scope = %scope, error = %e, "Token refresh failed");
                match scope {
                    Scope::User => {
                        self.remove(scope).await;
                        self.hooks.credentials_cleared(scope);
                        self.hooks.redirect_to_root();
                    }
                    Scope::Admin => {
                        tracing::warn!("Keeping existing admin credentials after failed refresh");
                    }
                }
                Err(e)
            }
        }
    }

    fn finish_refresh(&self, scope: Scope) {
        let mut state = self
            .slot(scope)
            .refresh
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *state = RefreshState::Idle;
    }

    async fn persist(&self, scope: Scope, credentials: Credentials) {
        if let Err(e) = self.store.save(scope, &credentials) {
            tracing::warn!(scope = %scope, "Failed to persist credentials: {:#}", e);
        }
        *self.slot(scope).credentials.write().await = Some(credentials);
    }

    async fn remove(&self, scope: Scope) {
        if let Err(e) = self.store.clear(scope) {
            tracing::warn!(scope = %scope, "Failed to clear stored credentials: {:#}", e);
        }
        *self.slot(scope).credentials.write().await = None;
    }
}

/// Returns a scope to `Idle` when its refresh task ends, including by panic
struct FinishRefresh {
    inner: Arc<Inner>,
    scope: Scope,
}

impl Drop for FinishRefresh {
    fn drop(&mut self) {
        self.inner.finish_refresh(self.scope);
    }
}

/// Dual-scope token lifecycle manager
///
/// Owns the user and admin credential pairs, renews them before expiry and
/// deduplicates concurrent refreshes per scope. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

impl TokenManager {
    /// Create a token manager, loading existing credentials from `store`
    pub fn new(
        client: Client,
        base_url: BaseUrl,
        store: Arc<dyn CredentialStore>,
        hooks: Arc<dyn SessionHooks>,
        settings: TokenSettings,
    ) -> Self {
        let load = |scope: Scope| match store.load(scope) {
            Ok(credentials) => credentials,
            Err(e) => {
                tracing::warn!(scope = %scope, "Failed to load stored credentials: {:#}", e);
                None
            }
        };

        let user = ScopeSlot::new(load(Scope::User), settings.user_skew);
        let admin = ScopeSlot::new(load(Scope::Admin), settings.admin_skew);

        Self {
            inner: Arc::new(Inner {
                client,
                base_url,
                store,
                hooks,
                user,
                admin,
                check_interval: settings.check_interval,
            }),
        }
    }

    /// Token manager with an in-memory store and no session hooks
    pub fn in_memory(client: Client, base_url: BaseUrl) -> Self {
        Self::new(
            client,
            base_url,
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(NoopSessionHooks),
            TokenSettings::default(),
        )
    }

    /// Current credential pair of a scope
    pub async fn credentials(&self, scope: Scope) -> Option<Credentials> {
        self.inner.slot(scope).credentials.read().await.clone()
    }

    /// Store a freshly issued pair (login); incomplete pairs are rejected
    pub async fn store_credentials(&self, scope: Scope, credentials: Credentials) -> bool {
        if !credentials.is_complete() {
            tracing::warn!(scope = %scope, "Ignoring incomplete credential pair");
            return false;
        }
        tracing::debug!(
            scope = %scope,
            token = credentials.access_token_preview(),
            "Storing credentials"
        );
        self.inner.persist(scope, credentials).await;
        true
    }

    /// Drop the credentials of a scope (logout)
    pub async fn clear(&self, scope: Scope) {
        tracing::debug!(scope = %scope, "Clearing credentials");
        self.inner.remove(scope).await;
    }

    pub async fn clear_all(&self) {
        for scope in Scope::ALL {
            self.clear(scope).await;
        }
    }

    /// Is the scope's access token absent or within its skew of expiry
    pub async fn is_expired(&self, scope: Scope) -> bool {
        let slot = self.inner.slot(scope);
        let credentials = slot.credentials.read().await;
        is_expired(credentials.as_ref(), slot.skew)
    }

    pub fn is_refreshing(&self, scope: Scope) -> bool {
        let state = self
            .inner
            .slot(scope)
            .refresh
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        matches!(*state, RefreshState::Refreshing(_))
    }

    /// Lifecycle state of a scope
    pub async fn state(&self, scope: Scope) -> TokenState {
        if self.is_refreshing(scope) {
            return TokenState::Refreshing;
        }
        if self.credentials(scope).await.is_none() {
            return TokenState::NoCredentials;
        }
        if self.is_expired(scope).await {
            TokenState::ExpiringSoon
        } else {
            TokenState::Valid
        }
    }

    /// Refresh the credentials of a scope
    ///
    /// Joins the in-flight refresh if there is one, so concurrent callers share
    /// a single network call and observe the same result. Dropping the returned
    /// future does not cancel the refresh.
    pub async fn refresh(&self, scope: Scope) -> RefreshResult {
        let pending = {
            let mut state = self
                .inner
                .slot(scope)
                .refresh
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());

            match &*state {
                RefreshState::Refreshing(pending) => {
                    tracing::debug!(scope = %scope, "Joining in-flight token refresh");
                    pending.clone()
                }
                RefreshState::Idle => {
                    let inner = Arc::clone(&self.inner);
                    let task = tokio::spawn(async move {
                        let _finish = FinishRefresh {
                            inner: Arc::clone(&inner),
                            scope,
                        };
                        inner.perform_refresh(scope).await
                    });
                    let pending = async move {
                        task.await.unwrap_or_else(|e| {
                            Err(RefreshError::Transport {
                                scope,
                                message: format!("refresh task failed: {}", e),
                            })
                        })
                    }
                    .boxed()
                    .shared();
                    *state = RefreshState::Refreshing(pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    /// Access token for outbound use, refreshed first if it is about to expire
    ///
    /// Returns `None` when the scope has no credentials or the refresh failed.
    pub async fn get_valid_access_token(&self, scope: Scope) -> Option<String> {
        let credentials = self.credentials(scope).await?;

        if !self.is_expired(scope).await {
            return Some(credentials.access_token);
        }

        match self.refresh(scope).await {
            Ok(fresh) => Some(fresh.access_token),
            Err(e) => {
                tracing::error!(scope = %scope, "Could not obtain a valid access token: {}", e);
                None
            }
        }
    }

    /// Ask the backend whether the scope's access token is valid
    pub async fn validate(&self, scope: Scope) -> bool {
        let Some(credentials) = self.credentials(scope).await else {
            return false;
        };

        let url = self.inner.base_url.build_url(scope.validate_endpoint());
        match refresh::validate_scope(&self.inner.client, &url, scope, &credentials.access_token)
            .await
        {
            Ok(valid) => valid,
            Err(e) => {
                tracing::error!(scope = %scope, "Token validation failed: {:#}", e);
                false
            }
        }
    }

    /// One auto-refresh pass: renew every scope that holds expiring credentials
    pub async fn check_and_refresh(&self) {
        for scope in Scope::ALL {
            if self.credentials(scope).await.is_none() || !self.is_expired(scope).await {
                continue;
            }

            tracing::debug!(scope = %scope, "Token expiring soon, refreshing proactively");
            if let Err(e) = self.refresh(scope).await {
                tracing::error!(scope = %scope, "Automatic token refresh failed: {}", e);
            }
        }
    }

    /// Run `check_and_refresh` once per check interval until the task is aborted
    pub fn spawn_auto_refresh(&self) -> JoinHandle<()> {
        let manager = self.clone();
        let period = self.inner.check_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                manager.check_and_refresh().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn manager() -> TokenManager {
        TokenManager::in_memory(Client::new(), BaseUrl::new("http://127.0.0.1:9"))
    }

    fn creds(expires_in: i64) -> Credentials {
        Credentials::new("access", "refresh", Utc::now() + Duration::seconds(expires_in))
    }

    #[tokio::test]
    async fn test_state_transitions_without_network() {
        let manager = manager();
        assert_eq!(manager.state(Scope::User).await, TokenState::NoCredentials);

        assert!(manager.store_credentials(Scope::User, creds(600)).await);
        assert_eq!(manager.state(Scope::User).await, TokenState::Valid);

        assert!(manager.store_credentials(Scope::User, creds(30)).await);
        assert_eq!(manager.state(Scope::User).await, TokenState::ExpiringSoon);

        manager.clear(Scope::User).await;
        assert_eq!(manager.state(Scope::User).await, TokenState::NoCredentials);
    }

    #[tokio::test]
    async fn test_store_non_ascii_token_with_debug_logging() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let manager = manager();
        let expires_at = Utc::now() + Duration::hours(1);
        let credentials = Credentials::new("aééééééé", "refresh", expires_at);
        assert!(manager.store_credentials(Scope::User, credentials).await);
        assert_eq!(
            manager.credentials(Scope::User).await.map(|c| c.access_token),
            Some("aééééééé".to_string())
        );
    }

    #[tokio::test]
    async fn test_scopes_are_independent() {
        let manager = manager();
        manager.store_credentials(Scope::Admin, creds(600)).await;

        assert!(manager.credentials(Scope::User).await.is_none());
        assert!(manager.is_expired(Scope::User).await);
        assert!(!manager.is_expired(Scope::Admin).await);
    }

    #[tokio::test]
    async fn test_incomplete_pair_rejected() {
        let manager = manager();
        let half = Credentials::new("access", "", Utc::now() + Duration::hours(1));
        assert!(!manager.store_credentials(Scope::User, half).await);
        assert!(manager.credentials(Scope::User).await.is_none());
    }

    #[tokio::test]
    async fn test_valid_token_returned_without_refresh() {
        let manager = manager();
        manager.store_credentials(Scope::User, creds(600)).await;
        assert_eq!(
            manager.get_valid_access_token(Scope::User).await.as_deref(),
            Some("access")
        );
        assert!(!manager.is_refreshing(Scope::User));
    }

    #[tokio::test]
    async fn test_refresh_without_credentials_fails_and_resets() {
        let manager = manager();
        let err = manager.refresh(Scope::Admin).await.unwrap_err();
        assert_eq!(err, RefreshError::NoCredentials(Scope::Admin));
        assert!(!manager.is_refreshing(Scope::Admin));
        assert!(manager.get_valid_access_token(Scope::Admin).await.is_none());
    }

    #[tokio::test]
    async fn test_loads_credentials_from_store() {
        let store = Arc::new(MemoryCredentialStore::new());
        store.save(Scope::Admin, &creds(600)).unwrap();

        let manager = TokenManager::new(
            Client::new(),
            BaseUrl::default(),
            store,
            Arc::new(NoopSessionHooks),
            TokenSettings::default(),
        );
        assert_eq!(manager.state(Scope::Admin).await, TokenState::Valid);
        assert_eq!(manager.state(Scope::User).await, TokenState::NoCredentials);
    }

    #[tokio::test]
    async fn test_validate_without_credentials_is_false() {
        assert!(!manager().validate(Scope::User).await);
    }
}
