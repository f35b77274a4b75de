//! OAuth2 client for identity providers.
//!
//! Builds authorization URLs, exchanges authorization codes and fetches
//! profile resources. The protocol work is done by the `oauth2` crate;
//! resource calls go through `reqwest`.

use async_trait::async_trait;
use broker_auth::{
    BrokerError, BrokerResult, ProviderConfig, ProviderKind, ProviderSdk, ProviderState,
    ProviderTokens,
};
use oauth2::basic::BasicClient;
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// User agent sent to providers (GitHub rejects requests without one).
pub const USER_AGENT: &str = concat!("auth-broker/", env!("CARGO_PKG_VERSION"));

/// Provider client errors.
#[derive(Debug, Error)]
pub enum ProviderClientError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Provider returned an error response.
    #[error("Provider error ({status}): {message}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Error message from the provider.
        message: String,
    },

    /// Invalid response from the provider.
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    /// Code exchange failed.
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    /// Provider endpoint URL is malformed.
    #[error("Invalid provider URL: {0}")]
    InvalidUrl(String),
}

impl From<ProviderClientError> for BrokerError {
    fn from(err: ProviderClientError) -> Self {
        match err {
            ProviderClientError::InvalidUrl(message) => BrokerError::Config(message),
            other => BrokerError::Provider(other.to_string()),
        }
    }
}

/// `ProviderSdk` backed by the `oauth2` crate.
#[derive(Clone)]
pub struct OAuth2ProviderSdk {
    /// HTTP client for resource calls.
    client: Client,
}

impl OAuth2ProviderSdk {
    /// Create a new provider client.
    pub fn new(timeout: Duration) -> Result<Self, ProviderClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { client })
    }

    fn oauth_client(
        kind: ProviderKind,
        config: &ProviderConfig,
    ) -> BrokerResult<BasicClient> {
        let auth_url = AuthUrl::new(config.get_authorize_url(kind)?)
            .map_err(|e| ProviderClientError::InvalidUrl(format!("authorize URL: {}", e)))?;
        let token_url = TokenUrl::new(config.get_token_url(kind)?)
            .map_err(|e| ProviderClientError::InvalidUrl(format!("token URL: {}", e)))?;
        let redirect_url = RedirectUrl::new(config.callback_url.clone())
            .map_err(|e| ProviderClientError::InvalidUrl(format!("callback URL: {}", e)))?;

        // Twitter only accepts client credentials in the Authorization header
        let auth_type = match kind {
            ProviderKind::Twitter => AuthType::BasicAuth,
            _ => AuthType::RequestBody,
        };

        Ok(BasicClient::new(
            ClientId::new(config.client_id.clone()),
            Some(ClientSecret::new(config.client_secret.clone())),
            auth_url,
            Some(token_url),
        )
        .set_redirect_uri(redirect_url)
        .set_auth_type(auth_type))
    }
}

#[async_trait]
impl ProviderSdk for OAuth2ProviderSdk {
    async fn authorization_url(
        &self,
        kind: ProviderKind,
        config: &ProviderConfig,
        state: &ProviderState,
    ) -> BrokerResult<String> {
        let client = Self::oauth_client(kind, config)?;
        let csrf = state.nonce.clone();

        let mut request = client
            .authorize_url(move || CsrfToken::new(csrf))
            .add_scopes(config.effective_scopes(kind).into_iter().map(Scope::new));

        for (name, value) in config.authorization_params() {
            request = request.add_extra_param(name, value);
        }

        if let Some(verifier) = &state.pkce_verifier {
            let challenge =
                PkceCodeChallenge::from_code_verifier_sha256(&PkceCodeVerifier::new(verifier.clone()));
            request = request.set_pkce_challenge(challenge);
        }

        let (url, _) = request.url();
        Ok(url.to_string())
    }

    #[instrument(skip(self, config, code, state), fields(provider = %kind))]
    async fn exchange_code(
        &self,
        kind: ProviderKind,
        config: &ProviderConfig,
        code: &str,
        state: &ProviderState,
    ) -> BrokerResult<ProviderTokens> {
        let client = Self::oauth_client(kind, config)?;

        let mut request = client.exchange_code(AuthorizationCode::new(code.to_string()));
        if let Some(verifier) = &state.pkce_verifier {
            request = request.set_pkce_verifier(PkceCodeVerifier::new(verifier.clone()));
        }

        let response = request
            .request_async(oauth2::reqwest::async_http_client)
            .await
            .map_err(|e| {
                warn!(error = %e, "authorization code exchange failed");
                ProviderClientError::TokenExchange(e.to_string())
            })?;

        debug!("authorization code exchanged");
        Ok(ProviderTokens {
            access_token: response.access_token().secret().clone(),
            token_type: response.token_type().as_ref().to_string(),
            expires_in: response.expires_in().map(|d| d.as_secs()),
            refresh_token: response.refresh_token().map(|t| t.secret().clone()),
            scope: response.scopes().map(|scopes| {
                scopes
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            }),
        })
    }

    #[instrument(skip(self, access_token))]
    async fn fetch_json(&self, url: &str, access_token: &str) -> BrokerResult<serde_json::Value> {
        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(ProviderClientError::from)?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            warn!("Provider API error ({}): {}", status.as_u16(), message);
            return Err(ProviderClientError::ApiError {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        let body = response
            .json()
            .await
            .map_err(|e| ProviderClientError::InvalidResponse(e.to_string()))?;
        Ok(body)
    }
}
