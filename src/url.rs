// Shared base URL and URL building

use std::sync::{Arc, RwLock};

/// Process-wide handle to the resolved backend base URL
///
/// Written by the gateway's resolver, read by the gateway and the token manager.
#[derive(Debug, Clone, Default)]
pub struct BaseUrl {
    inner: Arc<RwLock<String>>,
}

impl BaseUrl {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(normalize(base_url.into()))),
        }
    }

    /// Current base URL, empty when unresolved
    pub fn get(&self) -> String {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replace the base URL, returning true if it changed
    pub fn set(&self, base_url: impl Into<String>) -> bool {
        let base_url = normalize(base_url.into());
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *guard == base_url {
            return false;
        }
        *guard = base_url;
        true
    }

    pub fn is_empty(&self) -> bool {
        self.get().is_empty()
    }

    /// Build a full URL for an endpoint against the current base URL
    pub fn build_url(&self, endpoint: &str) -> String {
        build_url(&self.get(), endpoint)
    }
}

fn normalize(base_url: String) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Build a full URL from a base URL and an endpoint
///
/// Absolute `http(s)` endpoints are returned unchanged. Relative endpoints get a
/// leading `/` and are appended to the base; with an empty base the endpoint is
/// returned as a root-relative path.
pub fn build_url(base_url: &str, endpoint: &str) -> String {
    if endpoint.is_empty() {
        return String::new();
    }

    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        return endpoint.to_string();
    }

    let path = if endpoint.starts_with('/') {
        endpoint.to_string()
    } else {
        format!("/{}", endpoint)
    };

    if base_url.is_empty() {
        path
    } else {
        format!("{}{}", base_url.trim_end_matches('/'), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_build_url() {
        assert_eq!(build_url("https://x.test", "/api/files"), "https://x.test/api/files");
        assert_eq!(build_url("https://x.test", "api/files"), "https://x.test/api/files");
        assert_eq!(build_url("https://x.test", "https://other/x"), "https://other/x");
        assert_eq!(build_url("https://x.test", "http://other/x"), "http://other/x");
    }

    #[test]
    fn test_build_url_empty_base() {
        assert_eq!(build_url("", "/api/files"), "/api/files");
        assert_eq!(build_url("", "api/files"), "/api/files");
    }

    #[test]
    fn test_build_url_empty_endpoint() {
        assert_eq!(build_url("https://x.test", ""), "");
    }

    #[test]
    fn test_base_url_handle() {
        let base = BaseUrl::default();
        assert!(base.is_empty());
        assert_eq!(base.build_url("/api/files"), "/api/files");

        assert!(base.set("https://x.test/"));
        assert_eq!(base.get(), "https://x.test");
        assert!(!base.set("https://x.test"));

        let shared = base.clone();
        shared.set("http://localhost:8080");
        assert_eq!(base.build_url("api/files"), "http://localhost:8080/api/files");
    }

    proptest! {
        #[test]
        fn prop_leading_slash_is_irrelevant(path in "[a-z][a-z0-9/_-]{0,30}") {
            let with_slash = build_url("https://x.test", &format!("/{}", path));
            let without_slash = build_url("https://x.test", &path);
            prop_assert_eq!(with_slash, without_slash);
        }

        #[test]
        fn prop_absolute_urls_pass_through(host in "[a-z]{1,12}", path in "[a-z0-9/]{0,20}") {
            let url = format!("https://{}/{}", host, path);
            prop_assert_eq!(build_url("http://localhost:8080", &url), url);
        }
    }
}
