//! API portal client.
//!
//! HTTP client for the API portal. Resolves client subscriptions (the
//! registry the broker verifies clients against) and requests implicit
//! grants from the token exchange service.

use crate::config::{ConfigError, ServiceEndpoint};
use async_trait::async_trait;
use broker_auth::{
    BrokerError, BrokerResult, ImplicitGrantRequest, ImplicitGrantResponse, Subscription,
    SubscriptionRegistry, TokenExchange,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, instrument, warn};

/// Portal client errors.
#[derive(Debug, Error)]
pub enum PortalError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error ({status}): {message}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// Invalid response from the API.
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// Client has no application registered.
    #[error("Unknown client: {0}")]
    UnknownClient(String),

    /// Client is registered but not subscribed to the API.
    #[error("Client {client_id} is not subscribed to API {api_id}")]
    NotSubscribed {
        /// Client id.
        client_id: String,
        /// API id.
        api_id: String,
    },

    /// Authentication failed.
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// Request URL could not be built from the endpoint.
    #[error("Invalid service URL: {0}")]
    InvalidUrl(#[from] ConfigError),
}

impl PortalError {
    fn into_registry_error(self) -> BrokerError {
        BrokerError::Registry(self.to_string())
    }

    fn into_exchange_error(self) -> BrokerError {
        BrokerError::Exchange(self.to_string())
    }
}

/// Application part of a subscription lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalApplication {
    /// Application id
    #[serde(default)]
    pub id: Option<String>,
    /// Registered redirect URI
    #[serde(default)]
    pub redirect_uri: Option<String>,
}

/// Subscription part of a subscription lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalSubscription {
    /// API the application is subscribed to
    pub api: String,
}

/// Response of `GET /subscriptions/{client_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    /// Application registered for the client id
    pub application: PortalApplication,
    /// Subscription of the client id
    pub subscription: PortalSubscription,
}

/// API portal client.
#[derive(Clone)]
pub struct PortalClient {
    /// HTTP client instance.
    client: Client,

    /// Portal endpoint (subscriptions).
    portal: ServiceEndpoint,

    /// Token exchange endpoint.
    exchange: ServiceEndpoint,
}

impl PortalClient {
    /// Create a new portal client.
    pub fn new(
        portal: ServiceEndpoint,
        exchange: ServiceEndpoint,
        timeout: Duration,
    ) -> Result<Self, PortalError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            portal,
            exchange,
        })
    }

    /// Look up the subscription of a client id.
    #[instrument(skip(self))]
    pub async fn get_subscription(
        &self,
        client_id: &str,
        api_id: &str,
    ) -> Result<SubscriptionInfo, PortalError> {
        debug!("Fetching subscription for client {}", client_id);

        // Dot segments would be resolved away by the URL and address another resource.
        if matches!(client_id, "" | "." | "..") {
            return Err(PortalError::UnknownClient(client_id.to_string()));
        }

        let url = self.portal.segment_url(&["subscriptions", client_id])?;
        let mut request = self.client.get(url);

        if let Some(ref api_key) = self.portal.api_key {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = request.send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PortalError::UnknownClient(client_id.to_string()));
        }

        let info: SubscriptionInfo = self.handle_response(response).await?;
        if info.subscription.api != api_id {
            warn!(subscribed_api = %info.subscription.api, "client subscribed to a different API");
            return Err(PortalError::NotSubscribed {
                client_id: client_id.to_string(),
                api_id: api_id.to_string(),
            });
        }

        Ok(info)
    }

    /// Request an implicit grant for an authenticated user.
    #[instrument(skip(self, request), fields(client_id = %request.client_id, api_id = %request.api_id))]
    pub async fn authorize_implicit_grant(
        &self,
        request: &ImplicitGrantRequest,
    ) -> Result<ImplicitGrantResponse, PortalError> {
        debug!("Requesting implicit grant for {}", request.authenticated_userid);

        let url = self.exchange.url("/oauth2/token/implicit");
        let mut http_request = self.client.post(&url).json(request);

        if let Some(ref api_key) = self.exchange.api_key {
            http_request = http_request.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = http_request.send().await?;
        self.handle_response(response).await
    }

    /// Handle API response and deserialize JSON.
    async fn handle_response<T>(&self, response: reqwest::Response) -> Result<T, PortalError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            error!("Portal authentication failed");
            return Err(PortalError::AuthenticationFailed);
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            warn!("Portal API error ({}): {}", status.as_u16(), message);
            return Err(PortalError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| PortalError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl SubscriptionRegistry for PortalClient {
    async fn lookup(&self, client_id: &str, api_id: &str) -> BrokerResult<Subscription> {
        let info = self
            .get_subscription(client_id, api_id)
            .await
            .map_err(PortalError::into_registry_error)?;

        let redirect_uri = info
            .application
            .redirect_uri
            .filter(|r| !r.is_empty())
            .ok_or_else(|| {
                BrokerError::Registry(format!("Application of {} has no redirect URI", client_id))
            })?;

        Ok(Subscription { redirect_uri })
    }
}

#[async_trait]
impl TokenExchange for PortalClient {
    async fn authorize_implicit(
        &self,
        request: &ImplicitGrantRequest,
    ) -> BrokerResult<ImplicitGrantResponse> {
        self.authorize_implicit_grant(request)
            .await
            .map_err(PortalError::into_exchange_error)
    }
}
