// Session side effects triggered by the token manager

use super::types::Scope;

/// Application hooks invoked when a session ends
///
/// Both methods are required; [`NoopSessionHooks`] is the do-nothing default.
pub trait SessionHooks: Send + Sync {
    /// Stored credentials for `scope` were dropped after a failed refresh
    fn credentials_cleared(&self, scope: Scope);

    /// Hard navigation back to the application root, ending the session
    fn redirect_to_root(&self);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSessionHooks;

impl SessionHooks for NoopSessionHooks {
    fn credentials_cleared(&self, _scope: Scope) {}

    fn redirect_to_root(&self) {}
}

/// Hooks that only report through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSessionHooks;

impl SessionHooks for LoggingSessionHooks {
    fn credentials_cleared(&self, scope: Scope) {
        tracing::warn!(scope = %scope, "Stored credentials cleared");
    }

    fn redirect_to_root(&self) {
        tracing::warn!("Session ended, please log in again");
    }
}
