//! Handshake session
//!
//! The per-browser authorization context. A session is created lazily on
//! the first authorization request, keyed by an opaque token the browser
//! presents, and kept in a server-side [`SessionStore`].
//!
//! The client binding (`api_id`, `client_id`, `redirect_uri`,
//! `response_type`, `state`) is overwritten on every new attempt. The
//! authentication result (`user_valid`, `identity`) is reset whenever an
//! attempt starts and set in one step when the handshake completes.

use crate::error::{BrokerError, BrokerResult};
use crate::identity::Identity;
use crate::provider::{ProviderKind, ProviderState};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Client binding recorded by one verified authorization request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientBinding {
    /// API the client wants a token for
    pub api_id: String,
    /// Registered client
    pub client_id: String,
    /// Registry-resolved redirect URI
    pub redirect_uri: String,
    /// Requested response type (always `token`)
    pub response_type: String,
    /// Opaque client state echoed on completion
    pub state: Option<String>,
}

/// Per-browser handshake state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandshakeSession {
    /// API the client acts for
    pub api_id: Option<String>,
    /// Client the caller claims to be
    pub client_id: Option<String>,
    /// Registry-resolved redirect URI
    pub redirect_uri: Option<String>,
    /// Response type of the current attempt
    pub response_type: Option<String>,
    /// Client state of the current attempt
    pub state: Option<String>,
    /// Whether the profile may be read
    pub user_valid: bool,
    /// Identity of the completed handshake
    pub identity: Option<Identity>,
    /// Provider round trip of the current attempt
    pub provider_state: Option<ProviderState>,
}

impl HandshakeSession {
    /// Create an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new handshake attempt.
    ///
    /// Overwrites the client binding, clears a stale `state`, and resets the
    /// previous authentication result.
    pub fn begin_attempt(&mut self, binding: ClientBinding) {
        self.api_id = Some(binding.api_id);
        self.client_id = Some(binding.client_id);
        self.redirect_uri = Some(binding.redirect_uri);
        self.response_type = Some(binding.response_type);
        self.state = binding.state;
        self.user_valid = false;
        self.identity = None;
        self.provider_state = None;
    }

    /// Remember the provider round trip started for this attempt.
    pub fn await_provider(&mut self, state: ProviderState) {
        self.provider_state = Some(state);
    }

    /// Take the pending provider state for a callback. The state can only be
    /// used once and only by the provider it was issued for.
    pub fn take_provider_state(&mut self, provider: ProviderKind) -> Option<ProviderState> {
        if self.provider_state.as_ref().map(|pending| pending.provider) != Some(provider) {
            return None;
        }
        self.provider_state.take()
    }

    /// Record the completed handshake: identity and profile access together.
    pub fn complete(&mut self, identity: Identity) {
        self.identity = Some(identity);
        self.user_valid = true;
    }

    /// Drop the authentication result, keeping the client binding.
    pub fn invalidate(&mut self) {
        self.user_valid = false;
        self.identity = None;
    }
}

/// Server-side storage for handshake sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a session.
    async fn load(&self, session_id: &str) -> BrokerResult<Option<HandshakeSession>>;

    /// Save a session, refreshing its expiry.
    async fn save(&self, session_id: &str, session: &HandshakeSession) -> BrokerResult<()>;

    /// Remove a session.
    async fn remove(&self, session_id: &str) -> BrokerResult<()>;
}

/// Generate a new opaque session id.
pub fn new_session_id() -> String {
    use rand::RngCore;

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}

struct StoredSession {
    session: HandshakeSession,
    expires_at: DateTime<Utc>,
}

/// In-memory session store with expiry.
#[derive(Clone)]
pub struct MemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, StoredSession>>>,
    ttl: Duration,
}

impl MemorySessionStore {
    /// Create a store whose sessions live for `ttl` after the last save.
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Drop expired sessions, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, stored| stored.expires_at > now);
        let removed = before - sessions.len();
        if removed > 0 {
            debug!(removed, "purged expired sessions");
        }
        removed
    }

    /// Number of stored sessions, expired ones included.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, session_id: &str) -> BrokerResult<Option<HandshakeSession>> {
        let now = Utc::now();
        {
            let sessions = self.sessions.read().await;
            match sessions.get(session_id) {
                Some(stored) if stored.expires_at > now => {
                    return Ok(Some(stored.session.clone()))
                }
                Some(_) => {}
                None => return Ok(None),
            }
        }

        self.sessions.write().await.remove(session_id);
        debug!("dropped expired session");
        Ok(None)
    }

    async fn save(&self, session_id: &str, session: &HandshakeSession) -> BrokerResult<()> {
        if session_id.is_empty() {
            return Err(BrokerError::Internal("Empty session id".to_string()));
        }

        let stored = StoredSession {
            session: session.clone(),
            expires_at: Utc::now() + self.ttl,
        };
        self.sessions
            .write()
            .await
            .insert(session_id.to_string(), stored);
        Ok(())
    }

    async fn remove(&self, session_id: &str) -> BrokerResult<()> {
        self.sessions.write().await.remove(session_id);
        Ok(())
    }
}
