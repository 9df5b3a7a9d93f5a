// Backend base URL resolution

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::url::BaseUrl;

pub const PRODUCTION_DOMAIN: &str = "redamancy.com.cn";
pub const PRODUCTION_ORIGIN: &str = "https://redamancy.com.cn";

/// Base URL used when nothing else resolves
pub const FALLBACK_BASE_URL: &str = "http://localhost:8080";

const DEFAULT_PAGE_PORT: u16 = 8080;

/// Delays between the initial resolution and each retry (t=0, +500ms, +1000ms)
pub const INIT_RETRY_DELAYS: [Duration; 2] =
    [Duration::from_millis(500), Duration::from_millis(500)];

// Named environment presets
static ENVIRONMENTS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([("local", "http://localhost:8080"), ("prod", PRODUCTION_ORIGIN)])
});

/// Source of the currently selected environment's API base URL
///
/// An empty string means the environment is not loaded yet.
pub trait EnvironmentProvider: Send + Sync {
    fn api_base_url(&self) -> String;
}

/// Fixed environment chosen by name (`local`, `prod`) or by URL
#[derive(Debug, Clone)]
pub struct NamedEnvironment {
    pub name: String,
    pub api_base_url: String,
}

impl NamedEnvironment {
    /// Look up a preset by name
    pub fn preset(name: &str) -> Option<Self> {
        let name = name.to_lowercase();
        ENVIRONMENTS.get(name.as_str()).map(|url| Self {
            name,
            api_base_url: url.to_string(),
        })
    }

    pub fn names() -> Vec<&'static str> {
        let mut names: Vec<_> = ENVIRONMENTS.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl EnvironmentProvider for NamedEnvironment {
    fn api_base_url(&self) -> String {
        self.api_base_url.clone()
    }
}

/// Where the client is "served from", used by the derived fallback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLocation {
    pub hostname: String,
    pub port: Option<u16>,
}

impl Default for PageLocation {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            port: None,
        }
    }
}

impl PageLocation {
    pub fn new(hostname: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            hostname: hostname.into(),
            port,
        }
    }

    fn is_loopback(&self) -> bool {
        self.hostname == "localhost" || self.hostname == "127.0.0.1"
    }
}

/// Resolves the backend base URL
///
/// Precedence: environment provider, static configuration, derived from the
/// page location.
pub struct BaseUrlResolver {
    environment: Option<Arc<dyn EnvironmentProvider>>,
    static_base_url: Option<String>,
    page: PageLocation,
    production_domain: String,
    production_origin: String,
}

impl Default for BaseUrlResolver {
    fn default() -> Self {
        Self::new(PageLocation::default())
    }
}

impl BaseUrlResolver {
    pub fn new(page: PageLocation) -> Self {
        Self {
            environment: None,
            static_base_url: None,
            page,
            production_domain: PRODUCTION_DOMAIN.to_string(),
            production_origin: PRODUCTION_ORIGIN.to_string(),
        }
    }

    pub fn with_environment(mut self, environment: Arc<dyn EnvironmentProvider>) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn with_static_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.static_base_url = Some(base_url.into());
        self
    }

    pub fn with_production(
        mut self,
        domain: impl Into<String>,
        origin: impl Into<String>,
    ) -> Self {
        self.production_domain = domain.into();
        self.production_origin = origin.into();
        self
    }

    /// Resolve once; may return an empty string if the environment is not ready
    pub fn resolve(&self) -> String {
        if let Some(environment) = &self.environment {
            return environment.api_base_url();
        }

        if let Some(base_url) = self.static_base_url.as_ref().filter(|url| !url.is_empty()) {
            return base_url.clone();
        }

        self.derive_from_page()
    }

    fn derive_from_page(&self) -> String {
        let port = self.page.port.unwrap_or(DEFAULT_PAGE_PORT);

        if self.page.is_loopback() {
            format!("http://localhost:{}", port)
        } else if self.page.hostname.contains(&self.production_domain) {
            self.production_origin.clone()
        } else {
            format!("http://{}:{}", self.page.hostname, port)
        }
    }

    /// Resolve into `base_url`, retrying on the initialization schedule
    ///
    /// Falls back to [`FALLBACK_BASE_URL`] if every attempt comes back empty.
    pub async fn resolve_with_retries(&self, base_url: &BaseUrl) {
        for delay in INIT_RETRY_DELAYS {
            tokio::time::sleep(delay).await;
            let resolved = self.resolve();
            if !resolved.is_empty() {
                base_url.set(resolved);
                return;
            }
        }

        tracing::warn!(
            "API gateway base URL is still empty, using default {}",
            FALLBACK_BASE_URL
        );
        base_url.set(FALLBACK_BASE_URL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Environment that reports empty for the first `empty_calls` lookups
    struct SlowEnvironment {
        calls: AtomicUsize,
        empty_calls: usize,
    }

    impl EnvironmentProvider for SlowEnvironment {
        fn api_base_url(&self) -> String {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.empty_calls {
                String::new()
            } else {
                "https://env.test".to_string()
            }
        }
    }

    #[test]
    fn test_environment_takes_precedence() {
        let resolver = BaseUrlResolver::default()
            .with_static_base_url("https://static.test")
            .with_environment(Arc::new(NamedEnvironment::preset("prod").unwrap()));
        assert_eq!(resolver.resolve(), "https://redamancy.com.cn");
    }

    #[test]
    fn test_empty_environment_is_not_skipped() {
        let resolver = BaseUrlResolver::default()
            .with_static_base_url("https://static.test")
            .with_environment(Arc::new(SlowEnvironment {
                calls: AtomicUsize::new(0),
                empty_calls: 1,
            }));
        assert_eq!(resolver.resolve(), "");
        assert_eq!(resolver.resolve(), "https://env.test");
    }

    #[test]
    fn test_static_base_url() {
        let resolver = BaseUrlResolver::default().with_static_base_url("https://static.test");
        assert_eq!(resolver.resolve(), "https://static.test");

        let resolver = BaseUrlResolver::default().with_static_base_url("");
        assert_eq!(resolver.resolve(), "http://localhost:8080");
    }

    #[test]
    fn test_derived_fallbacks() {
        let resolve =
            |host: &str, port| BaseUrlResolver::new(PageLocation::new(host, port)).resolve();

        assert_eq!(resolve("localhost", None), "http://localhost:8080");
        assert_eq!(resolve("127.0.0.1", Some(3000)), "http://localhost:3000");
        assert_eq!(resolve("www.redamancy.com.cn", Some(443)), "https://redamancy.com.cn");
        assert_eq!(resolve("files.lan", None), "http://files.lan:8080");
        assert_eq!(resolve("files.lan", Some(9000)), "http://files.lan:9000");
    }

    #[test]
    fn test_named_environment_presets() {
        assert_eq!(
            NamedEnvironment::preset("LOCAL").unwrap().api_base_url,
            "http://localhost:8080"
        );
        assert!(NamedEnvironment::preset("staging").is_none());
        assert_eq!(NamedEnvironment::names(), vec!["local", "prod"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_with_retries_picks_up_late_environment() {
        let resolver = BaseUrlResolver::default().with_environment(Arc::new(SlowEnvironment {
            calls: AtomicUsize::new(0),
            empty_calls: 1,
        }));
        let base_url = BaseUrl::default();
        resolver.resolve_with_retries(&base_url).await;
        assert_eq!(base_url.get(), "https://env.test");
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_with_retries_falls_back() {
        let resolver = BaseUrlResolver::default().with_environment(Arc::new(SlowEnvironment {
            calls: AtomicUsize::new(0),
            empty_calls: usize::MAX,
        }));
        let base_url = BaseUrl::default();
        let started = tokio::time::Instant::now();
        resolver.resolve_with_retries(&base_url).await;
        assert_eq!(base_url.get(), FALLBACK_BASE_URL);
        assert!(started.elapsed() >= Duration::from_millis(1000));
        assert!(started.elapsed() < Duration::from_millis(1100));
    }
}
