//! Callback coordination
//!
//! Runs once an identity provider has produced a normalized identity: hands
//! the identity to the token exchange service and computes where the browser
//! goes next.

use crate::error::{BrokerError, BrokerResult};
use crate::identity::Identity;
use crate::session::HandshakeSession;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

/// Implicit grant request sent to the token exchange service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplicitGrantRequest {
    /// Provider-prefixed identity id
    pub authenticated_userid: String,
    /// Client the token is for
    pub client_id: String,
    /// API the token is for
    pub api_id: String,
    /// Name of this broker
    pub auth_server: String,
}

/// Token exchange service response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImplicitGrantResponse {
    /// Client redirect carrying the issued token
    #[serde(default, alias = "redirectUri")]
    pub redirect_uri: Option<String>,
}

/// External service turning a verified identity into a client token.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Issue an implicit grant. Failures are [`BrokerError::Exchange`].
    async fn authorize_implicit(
        &self,
        request: &ImplicitGrantRequest,
    ) -> BrokerResult<ImplicitGrantResponse>;
}

/// Final browser redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTarget {
    /// Absolute URL to redirect to
    pub location: String,
}

/// Completes handshakes after a successful provider callback.
pub struct CallbackCoordinator {
    exchange: Arc<dyn TokenExchange>,
    broker_name: String,
}

impl CallbackCoordinator {
    /// Create a coordinator. `broker_name` identifies this broker to the
    /// exchange service.
    pub fn new(exchange: Arc<dyn TokenExchange>, broker_name: impl Into<String>) -> Self {
        Self {
            exchange,
            broker_name: broker_name.into(),
        }
    }

    /// Complete the handshake for `identity`.
    ///
    /// Fails with [`BrokerError::IllegalState`] when there is no identity or
    /// the session was never bound to a client, and with
    /// [`BrokerError::Exchange`] when the exchange fails or returns no
    /// redirect. The session only becomes valid on success.
    #[instrument(skip(self, session, identity))]
    pub async fn complete(
        &self,
        session: &mut HandshakeSession,
        identity: Option<Identity>,
    ) -> BrokerResult<RedirectTarget> {
        let identity = identity.filter(|i| !i.id.is_empty()).ok_or_else(|| {
            BrokerError::IllegalState("Callback without an authenticated identity".to_string())
        })?;

        let (client_id, api_id) = match (&session.client_id, &session.api_id) {
            (Some(client_id), Some(api_id)) => (client_id.clone(), api_id.clone()),
            _ => {
                return Err(BrokerError::IllegalState(
                    "Callback without a verified client request".to_string(),
                ))
            }
        };

        let request = ImplicitGrantRequest {
            authenticated_userid: identity.id.clone(),
            client_id,
            api_id,
            auth_server: self.broker_name.clone(),
        };
        let response = self.exchange.authorize_implicit(&request).await?;

        let redirect_uri = response
            .redirect_uri
            .filter(|r| !r.is_empty())
            .ok_or_else(|| {
                BrokerError::Exchange("Exchange response has no redirect_uri".to_string())
            })?;

        let location = match &session.state {
            Some(state) => append_state(&redirect_uri, state),
            None => redirect_uri,
        };

        info!(identity = %identity.id, client_id = %request.client_id, "handshake completed");
        session.complete(identity);

        Ok(RedirectTarget { location })
    }
}

/// Append `state` to a redirect URI: to the fragment when it has one,
/// otherwise to the query string.
pub fn append_state(uri: &str, state: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(state.as_bytes()).collect();

    let (separator_base, has_params) = match uri.split_once('#') {
        Some((_, fragment)) => ('#', !fragment.is_empty()),
        None => match uri.split_once('?') {
            Some((_, query)) => ('?', !query.is_empty()),
            None => ('?', false),
        },
    };

    let already_open = uri.contains(separator_base);
    let joiner = match (already_open, has_params) {
        (false, _) => separator_base.to_string(),
        (true, false) => String::new(),
        (true, true) if uri.ends_with('&') => String::new(),
        (true, true) => "&".to_string(),
    };

    format!("{}{}state={}", uri, joiner, encoded)
}
