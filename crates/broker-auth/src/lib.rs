//! # Broker Authentication Core
//!
//! Handshake state machine and identity normalization for the API-gateway
//! authentication broker.
//!
//! ## Overview
//!
//! A handshake runs through these components:
//! - **ClientVerifier**: checks `client_id`, `response_type` and the
//!   redirect URI against the subscription registry and binds the session
//! - **ProviderAdapter**: one variant per identity provider; builds the
//!   authorization redirect and turns the provider callback into an
//!   [`Identity`]
//! - **Normalizers**: map Google, GitHub, Twitter, Facebook and claims-token
//!   payloads onto the canonical [`Identity`]
//! - **CallbackCoordinator**: exchanges the identity for a client token and
//!   computes the final redirect
//! - **CorsAllowlist** and [`get_profile`]: the read path used by client
//!   applications after the handshake
//!
//! HTTP clients for the registry, the exchange service and the identity
//! providers live in `broker-clients`; this crate only defines the traits
//! they implement ([`SubscriptionRegistry`], [`TokenExchange`],
//! [`ProviderSdk`]).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use broker_auth::{
//!     AuthorizationRequest, ClientVerifier, CorsAllowlist, HandshakeSession,
//!     SubscriptionRegistry,
//! };
//! use std::sync::Arc;
//!
//! # async fn run(registry: Arc<dyn SubscriptionRegistry>) -> broker_auth::BrokerResult<()> {
//! let cors = Arc::new(CorsAllowlist::new());
//! let verifier = ClientVerifier::new(registry, Arc::clone(&cors));
//!
//! let mut session = HandshakeSession::new();
//! let request = AuthorizationRequest {
//!     api_id: "orders".to_string(),
//!     client_id: Some("app-1".to_string()),
//!     response_type: Some("token".to_string()),
//!     ..Default::default()
//! };
//! let proceed = verifier.verify(request, &mut session).await?;
//! println!("client returns to {}", proceed.redirect_uri);
//! # Ok(())
//! # }
//! ```

pub mod claims_token;
pub mod coordinator;
pub mod cors;
pub mod error;
pub mod identity;
pub mod normalize;
pub mod profile;
pub mod provider;
pub mod session;
pub mod verifier;

// Re-export main types
pub use claims_token::{ClaimsTokenDecoder, SignatureAlgorithm, VerificationKey};
pub use coordinator::{
    append_state, CallbackCoordinator, ImplicitGrantRequest, ImplicitGrantResponse,
    RedirectTarget, TokenExchange,
};
pub use cors::{origin_of, CorsAllowlist, CorsDecision};
pub use error::{BrokerError, BrokerResult};
pub use identity::Identity;
pub use normalize::{ClaimFields, ClaimsNormalizer, ClaimsSettings, GitHubEmail};
pub use profile::get_profile;
pub use provider::{
    AuthenticationRedirect, CallbackParams, ProviderAdapter, ProviderConfig, ProviderKind,
    ProviderSdk, ProviderState, ProviderTokens,
};
pub use session::{
    new_session_id, ClientBinding, HandshakeSession, MemorySessionStore, SessionStore,
};
pub use verifier::{
    AuthorizationRequest, ClientVerifier, ProceedToProvider, Subscription, SubscriptionRegistry,
    RESPONSE_TYPE_TOKEN,
};
