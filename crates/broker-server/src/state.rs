//! Shared application state.

use broker_auth::{
    BrokerError, BrokerResult, CallbackCoordinator, ClientVerifier, CorsAllowlist,
    HandshakeSession, ProviderAdapter, ProviderKind, ProviderSdk, SessionStore,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "auth_broker.sid";

/// Everything the handlers share.
#[derive(Clone)]
pub struct AppState {
    /// Adapters of the configured providers
    pub adapters: Arc<HashMap<ProviderKind, ProviderAdapter>>,
    /// Provider wire protocol
    pub sdk: Arc<dyn ProviderSdk>,
    /// Client verification
    pub verifier: Arc<ClientVerifier>,
    /// Callback completion
    pub coordinator: Arc<CallbackCoordinator>,
    /// Origins allowed to read the profile
    pub cors: Arc<CorsAllowlist>,
    /// Handshake sessions
    pub sessions: Arc<dyn SessionStore>,
    /// Normalized route prefix, empty for the root
    pub base_path: String,
    /// Mark the session cookie `Secure`
    pub secure_cookies: bool,
}

impl AppState {
    /// Adapter of a provider named in the URL, if it is configured.
    pub fn adapter(&self, provider: &str) -> Option<&ProviderAdapter> {
        ProviderKind::parse(provider).and_then(|kind| self.adapters.get(&kind))
    }

    /// Absolute path of a route below the base path.
    pub fn route_path(&self, path: &str) -> String {
        format!("{}{}", self.base_path, path)
    }

    /// Load the session a cookie points at.
    pub async fn load_session(
        &self,
        session_id: Option<&str>,
    ) -> BrokerResult<Option<HandshakeSession>> {
        match session_id {
            Some(id) => self.sessions.load(id).await,
            None => Ok(None),
        }
    }

    /// Load the session a cookie points at, failing when there is none.
    pub async fn require_session(
        &self,
        session_id: Option<&str>,
        missing: impl FnOnce() -> BrokerError,
    ) -> BrokerResult<(String, HandshakeSession)> {
        match (session_id, self.load_session(session_id).await?) {
            (Some(id), Some(session)) => Ok((id.to_string(), session)),
            _ => Err(missing()),
        }
    }
}
