//! Client verification
//!
//! First step of every handshake: check the authorization request against
//! the subscription registry and bind the session to the client before any
//! identity provider is contacted.

use crate::cors::CorsAllowlist;
use crate::error::{BrokerError, BrokerResult};
use crate::session::{ClientBinding, HandshakeSession};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// The only supported response type.
pub const RESPONSE_TYPE_TOKEN: &str = "token";

/// A client's subscription to an API, as the registry knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Registered redirect URI of the client application
    pub redirect_uri: String,
}

/// Read-only client/API subscription registry.
#[async_trait]
pub trait SubscriptionRegistry: Send + Sync {
    /// Resolve the subscription of `client_id` to `api_id`.
    ///
    /// A miss and a transport failure are both [`BrokerError::Registry`].
    async fn lookup(&self, client_id: &str, api_id: &str) -> BrokerResult<Subscription>;
}

/// Inbound authorization request parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    /// API the client wants access to (path parameter)
    #[serde(skip)]
    pub api_id: String,
    /// Client id
    pub client_id: Option<String>,
    /// Response type, must be `token`
    pub response_type: Option<String>,
    /// Caller-supplied redirect URI, only compared against the registry
    pub redirect_uri: Option<String>,
    /// Opaque client state
    pub state: Option<String>,
}

/// Verification passed; the caller may redirect to the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProceedToProvider {
    /// Registry-resolved redirect URI
    pub redirect_uri: String,
}

/// Validates authorization requests and binds sessions to clients.
pub struct ClientVerifier {
    registry: Arc<dyn SubscriptionRegistry>,
    cors: Arc<CorsAllowlist>,
}

impl ClientVerifier {
    /// Create a verifier.
    pub fn new(registry: Arc<dyn SubscriptionRegistry>, cors: Arc<CorsAllowlist>) -> Self {
        Self { registry, cors }
    }

    /// Verify an authorization request and record it in the session.
    ///
    /// Checks run in order: `client_id` present, `response_type == "token"`,
    /// registry lookup, redirect URI equality. Only when all pass is the
    /// session overwritten and the redirect origin learned.
    #[instrument(skip(self, request, session), fields(api_id = %request.api_id))]
    pub async fn verify(
        &self,
        request: AuthorizationRequest,
        session: &mut HandshakeSession,
    ) -> BrokerResult<ProceedToProvider> {
        let client_id = request
            .client_id
            .filter(|c| !c.is_empty())
            .ok_or_else(|| BrokerError::BadRequest("Missing client_id".to_string()))?;

        let response_type = request.response_type.unwrap_or_default();
        if response_type != RESPONSE_TYPE_TOKEN {
            return Err(BrokerError::BadRequest(format!(
                "Unsupported response_type '{}', only 'token' is allowed",
                response_type
            )));
        }

        let subscription = self.registry.lookup(&client_id, &request.api_id).await?;

        if let Some(supplied) = request.redirect_uri.as_deref().filter(|r| !r.is_empty()) {
            if supplied != subscription.redirect_uri {
                warn!(client_id = %client_id, "redirect_uri mismatch");
                return Err(BrokerError::BadRequest("redirect_uri mismatch".to_string()));
            }
        }

        session.begin_attempt(ClientBinding {
            api_id: request.api_id,
            client_id: client_id.clone(),
            redirect_uri: subscription.redirect_uri.clone(),
            response_type,
            state: request.state.filter(|s| !s.is_empty()),
        });
        self.cors.register_redirect_uri(&subscription.redirect_uri);

        info!(client_id = %client_id, "client verified");
        Ok(ProceedToProvider {
            redirect_uri: subscription.redirect_uri,
        })
    }
}
