//! Error types for handshake operations
//!
//! This module defines every failure the broker can report while verifying a
//! client, talking to an identity provider, normalizing a profile or
//! exchanging the identity for a token.

use thiserror::Error;

/// Broker error types.
///
/// Errors other than [`BrokerError::BadRequest`] and
/// [`BrokerError::Unauthorized`] end the handshake with a browser redirect
/// to the failure page.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Malformed or mismatched client input
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The session is not allowed to read the requested resource
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Subscription registry lookup failed or found nothing
    #[error("Registry error: {0}")]
    Registry(String),

    /// Token exchange service failed or returned no redirect target
    #[error("Exchange error: {0}")]
    Exchange(String),

    /// Provider rejected the login or a claims signature did not verify
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Provider returned a profile the broker cannot use
    #[error("Profile normalization failed: {0}")]
    Normalization(String),

    /// Transport error talking to an identity provider
    #[error("Identity provider error: {0}")]
    Provider(String),

    /// Handshake invariant violated, e.g. a callback without prior verification
    #[error("Illegal handshake state: {0}")]
    IllegalState(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

impl BrokerError {
    /// Check if this error should be logged at error level.
    ///
    /// Rejected client input and missing sessions are expected and
    /// should not be logged as errors.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            BrokerError::IllegalState(_) | BrokerError::Config(_) | BrokerError::Internal(_)
        )
    }

    /// Whether the browser should be sent to the failure page instead of
    /// receiving a JSON error body.
    pub fn redirects_to_failure(&self) -> bool {
        !matches!(self, BrokerError::BadRequest(_) | BrokerError::Unauthorized(_))
    }

    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            BrokerError::BadRequest(_) => 400,
            BrokerError::Unauthorized(_) | BrokerError::Authentication(_) => 401,

            BrokerError::Registry(_)
            | BrokerError::Exchange(_)
            | BrokerError::Normalization(_)
            | BrokerError::Provider(_) => 502,

            BrokerError::IllegalState(_) | BrokerError::Config(_) | BrokerError::Internal(_) => {
                500
            }
        }
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            BrokerError::BadRequest(_) => "BAD_REQUEST",
            BrokerError::Unauthorized(_) => "UNAUTHORIZED",
            BrokerError::Registry(_) => "REGISTRY_ERROR",
            BrokerError::Exchange(_) => "EXCHANGE_ERROR",
            BrokerError::Authentication(_) => "AUTHENTICATION_ERROR",
            BrokerError::Normalization(_) => "NORMALIZATION_ERROR",
            BrokerError::Provider(_) => "PROVIDER_ERROR",
            BrokerError::IllegalState(_) => "ILLEGAL_STATE",
            BrokerError::Config(_) => "CONFIG_ERROR",
            BrokerError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
