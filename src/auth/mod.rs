// Authentication module
// Owns the user/admin credential pairs and their renewal

mod hooks;
mod manager;
mod refresh;
mod store;
mod types;

pub use hooks::{LoggingSessionHooks, NoopSessionHooks, SessionHooks};
pub use manager::{TokenManager, TokenSettings};
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use types::{is_expired, AdminTokenPair, Credentials, Scope, TokenPair, TokenState};
