// Credential persistence

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::types::{AdminTokenPair, Credentials, Scope, TokenPair};

/// Storage backend for credential pairs
///
/// Every method is required; use [`MemoryCredentialStore`] when nothing
/// should outlive the process.
pub trait CredentialStore: Send + Sync {
    /// Load the pair for a scope; incomplete pairs come back as `None`
    fn load(&self, scope: Scope) -> Result<Option<Credentials>>;

    fn save(&self, scope: Scope, credentials: &Credentials) -> Result<()>;

    fn clear(&self, scope: Scope) -> Result<()>;
}

/// In-process credential store
#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<Scope, Credentials>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self, scope: Scope) -> Result<Option<Credentials>> {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(entries.get(&scope).cloned().and_then(Credentials::into_complete))
    }

    fn save(&self, scope: Scope, credentials: &Credentials) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(scope, credentials.clone());
        Ok(())
    }

    fn clear(&self, scope: Scope) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.remove(&scope);
        Ok(())
    }
}

/// On-disk layout, same shape as the backend login response
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredTokens {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tokens: Option<TokenPair>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    admin_tokens: Option<AdminTokenPair>,
}

/// JSON file credential store
pub struct FileCredentialStore {
    path: PathBuf,

    /// Serializes read-modify-write cycles on the file
    lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<StoredTokens> {
        if !self.path.exists() {
            return Ok(StoredTokens::default());
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read credentials file: {}", self.path.display()))?;

        if content.trim().is_empty() {
            return Ok(StoredTokens::default());
        }

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse credentials file: {}", self.path.display()))
    }

    fn write(&self, stored: &StoredTokens) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create credentials directory: {}", parent.display())
                })?;
            }
        }

        let content =
            serde_json::to_string_pretty(stored).context("Failed to serialize credentials")?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write credentials file: {}", self.path.display()))
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self, scope: Scope) -> Result<Option<Credentials>> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let stored = self.read()?;

        Ok(match scope {
            Scope::User => stored.tokens.and_then(Credentials::from_pair),
            Scope::Admin => stored.admin_tokens.and_then(Credentials::from_admin_pair),
        })
    }

    fn save(&self, scope: Scope, credentials: &Credentials) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut stored = self.read()?;

        match scope {
            Scope::User => stored.tokens = Some(credentials.to_pair()),
            Scope::Admin => stored.admin_tokens = Some(credentials.to_admin_pair()),
        }

        self.write(&stored)
    }

    fn clear(&self, scope: Scope) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut stored = self.read()?;

        match scope {
            Scope::User => stored.tokens = None,
            Scope::Admin => stored.admin_tokens = None,
        }

        self.write(&stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn creds(tag: &str) -> Credentials {
        Credentials::new(
            format!("{}-access", tag),
            format!("{}-refresh", tag),
            Utc::now() + Duration::hours(1),
        )
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryCredentialStore::new();
        assert!(store.load(Scope::User).unwrap().is_none());

        let user = creds("user");
        store.save(Scope::User, &user).unwrap();
        assert_eq!(store.load(Scope::User).unwrap(), Some(user));
        assert!(store.load(Scope::Admin).unwrap().is_none());

        store.clear(Scope::User).unwrap();
        assert!(store.load(Scope::User).unwrap().is_none());
    }

    #[test]
    fn test_memory_store_hides_incomplete_pairs() {
        let store = MemoryCredentialStore::new();
        let half = Credentials::new("access", "", Utc::now());
        store.save(Scope::Admin, &half).unwrap();
        assert!(store.load(Scope::Admin).unwrap().is_none());
    }

    #[test]
    fn test_file_store_keeps_scopes_apart() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("nested/credentials.json"));

        assert!(store.load(Scope::User).unwrap().is_none());

        let user = creds("user");
        let admin = creds("admin");
        store.save(Scope::User, &user).unwrap();
        store.save(Scope::Admin, &admin).unwrap();

        let reopened = FileCredentialStore::new(store.path().to_path_buf());
        assert_eq!(reopened.load(Scope::User).unwrap().unwrap().access_token, "user-access");
        assert_eq!(reopened.load(Scope::Admin).unwrap().unwrap().refresh_token, "admin-refresh");

        reopened.clear(Scope::User).unwrap();
        assert!(store.load(Scope::User).unwrap().is_none());
        assert!(store.load(Scope::Admin).unwrap().is_some());
    }

    #[test]
    fn test_file_store_wire_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let store = FileCredentialStore::new(&path);
        store.save(Scope::Admin, &creds("admin")).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["admin_tokens"]["admin_access_token"], "admin-access");
        assert!(raw.get("tokens").is_none());
    }

    #[test]
    fn test_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, "not json").unwrap();
        let store = FileCredentialStore::new(&path);
        assert!(store.load(Scope::User).is_err());
    }
}
