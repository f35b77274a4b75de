//! Identity provider support
//!
//! The broker talks to a closed set of identity providers. Each one is a
//! [`ProviderKind`] with default endpoints and scopes, configured through a
//! [`ProviderConfig`] and driven through a [`ProviderAdapter`]. The actual
//! OAuth2 wire protocol sits behind the [`ProviderSdk`] trait.

pub mod adapter;

pub use adapter::{AuthenticationRedirect, ClaimsProvider, ProviderAdapter};

use crate::error::{BrokerError, BrokerResult};
use crate::normalize::ClaimsSettings;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Supported identity providers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Google
    Google,
    /// GitHub
    GitHub,
    /// Twitter
    Twitter,
    /// Facebook
    Facebook,
    /// Corporate identity provider issuing signed claims tokens
    Corporate,
    /// Generic OAuth2 provider issuing claims tokens
    OAuth2,
}

impl ProviderKind {
    /// All providers, in route registration order.
    pub const ALL: [ProviderKind; 6] = [
        ProviderKind::Google,
        ProviderKind::GitHub,
        ProviderKind::Twitter,
        ProviderKind::Facebook,
        ProviderKind::Corporate,
        ProviderKind::OAuth2,
    ];

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Google => "google",
            ProviderKind::GitHub => "github",
            ProviderKind::Twitter => "twitter",
            ProviderKind::Facebook => "facebook",
            ProviderKind::Corporate => "corporate",
            ProviderKind::OAuth2 => "oauth2",
        }
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "google" => Some(ProviderKind::Google),
            "github" => Some(ProviderKind::GitHub),
            "twitter" => Some(ProviderKind::Twitter),
            "facebook" => Some(ProviderKind::Facebook),
            "corporate" | "adfs" => Some(ProviderKind::Corporate),
            "oauth2" => Some(ProviderKind::OAuth2),
            _ => None,
        }
    }

    /// Whether the provider returns a signed claims token instead of a
    /// profile endpoint.
    pub fn uses_claims_token(&self) -> bool {
        matches!(self, ProviderKind::Corporate | ProviderKind::OAuth2)
    }

    /// Whether the provider requires PKCE on the authorization request.
    pub fn requires_pkce(&self) -> bool {
        matches!(self, ProviderKind::Twitter)
    }

    /// Get the default authorization URL for the provider.
    pub fn authorize_url(&self) -> Option<&'static str> {
        match self {
            ProviderKind::Google => Some("https://accounts.google.com/o/oauth2/v2/auth"),
            ProviderKind::GitHub => Some("https://github.com/login/oauth/authorize"),
            ProviderKind::Twitter => Some("https://twitter.com/i/oauth2/authorize"),
            ProviderKind::Facebook => Some("https://www.facebook.com/v2.8/dialog/oauth"),
            ProviderKind::Corporate | ProviderKind::OAuth2 => None,
        }
    }

    /// Get the default token URL for the provider.
    pub fn token_url(&self) -> Option<&'static str> {
        match self {
            ProviderKind::Google => Some("https://oauth2.googleapis.com/token"),
            ProviderKind::GitHub => Some("https://github.com/login/oauth/access_token"),
            ProviderKind::Twitter => Some("https://api.twitter.com/2/oauth2/token"),
            ProviderKind::Facebook => Some("https://graph.facebook.com/v2.8/oauth/access_token"),
            ProviderKind::Corporate | ProviderKind::OAuth2 => None,
        }
    }

    /// Get the default profile URL for the provider.
    pub fn profile_url(&self) -> Option<&'static str> {
        match self {
            ProviderKind::Google => Some("https://openidconnect.googleapis.com/v1/userinfo"),
            ProviderKind::GitHub => Some("https://api.github.com/user"),
            ProviderKind::Twitter => Some("https://api.twitter.com/2/users/me"),
            ProviderKind::Facebook => Some(
                "https://graph.facebook.com/v2.8/me?fields=id,name,first_name,last_name,email",
            ),
            ProviderKind::Corporate | ProviderKind::OAuth2 => None,
        }
    }

    /// Get default scopes for the provider.
    pub fn default_scopes(&self) -> Vec<&'static str> {
        match self {
            ProviderKind::Google => vec!["profile", "email"],
            ProviderKind::GitHub => vec!["user:email"],
            ProviderKind::Twitter => vec!["users.read", "tweet.read"],
            ProviderKind::Facebook => vec!["public_profile", "email"],
            ProviderKind::Corporate | ProviderKind::OAuth2 => vec![],
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Client ID registered with the provider
    #[serde(default)]
    pub client_id: String,

    /// Client secret
    #[serde(default)]
    pub client_secret: String,

    /// Callback URL the provider redirects back to
    #[serde(default, alias = "callbackURL")]
    pub callback_url: String,

    /// Authorization URL (optional, uses default for known providers)
    #[serde(default, alias = "authorizationURL")]
    pub authorize_url: Option<String>,

    /// Token URL (optional, uses default for known providers)
    #[serde(default, alias = "tokenURL")]
    pub token_url: Option<String>,

    /// Profile URL (optional, uses default for known providers)
    #[serde(default, alias = "profileURL")]
    pub profile_url: Option<String>,

    /// Scopes to request (defaults per provider)
    #[serde(default)]
    pub scopes: Option<Vec<String>>,

    /// Resource identifier passed on the authorization request
    #[serde(default)]
    pub resource: Option<String>,

    /// Additional authorization parameters
    #[serde(default)]
    pub extra_params: HashMap<String, String>,

    /// Claims-token settings (corporate and generic OAuth2 providers)
    #[serde(default)]
    pub claims: Option<ClaimsSettings>,
}

impl ProviderConfig {
    /// Create a new provider configuration.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        callback_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            callback_url: callback_url.into(),
            ..Self::default()
        }
    }

    /// Check that everything the provider needs is configured.
    pub fn validate(&self, kind: ProviderKind) -> BrokerResult<()> {
        let required = [
            ("clientId", &self.client_id),
            ("clientSecret", &self.client_secret),
            ("callbackUrl", &self.callback_url),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(BrokerError::Config(format!(
                    "{} provider is missing {}",
                    kind, name
                )));
            }
        }

        url::Url::parse(&self.callback_url).map_err(|e| {
            BrokerError::Config(format!("{} provider has an invalid callbackUrl: {}", kind, e))
        })?;

        self.get_authorize_url(kind)?;
        self.get_token_url(kind)?;

        // The corporate IdP issues tokens for a relying-party resource.
        if kind == ProviderKind::Corporate
            && self.resource.as_deref().map_or(true, |r| r.trim().is_empty())
        {
            return Err(BrokerError::Config(format!("{} provider is missing resource", kind)));
        }

        if kind.uses_claims_token() {
            match &self.claims {
                Some(claims) => claims.validate(kind)?,
                None => {
                    return Err(BrokerError::Config(format!(
                        "{} provider is missing its claims settings",
                        kind
                    )))
                }
            }
        }

        Ok(())
    }

    /// Get the authorization URL.
    pub fn get_authorize_url(&self, kind: ProviderKind) -> BrokerResult<String> {
        self.authorize_url
            .clone()
            .or_else(|| kind.authorize_url().map(String::from))
            .ok_or_else(|| {
                BrokerError::Config(format!("{} provider is missing authorizeUrl", kind))
            })
    }

    /// Get the token URL.
    pub fn get_token_url(&self, kind: ProviderKind) -> BrokerResult<String> {
        self.token_url
            .clone()
            .or_else(|| kind.token_url().map(String::from))
            .ok_or_else(|| BrokerError::Config(format!("{} provider is missing tokenUrl", kind)))
    }

    /// Get the profile URL.
    pub fn get_profile_url(&self, kind: ProviderKind) -> BrokerResult<String> {
        self.profile_url
            .clone()
            .or_else(|| kind.profile_url().map(String::from))
            .ok_or_else(|| BrokerError::Config(format!("{} provider has no profile URL", kind)))
    }

    /// Scopes to request: configured ones, else the provider defaults.
    pub fn effective_scopes(&self, kind: ProviderKind) -> Vec<String> {
        match &self.scopes {
            Some(scopes) => scopes.clone(),
            None => kind.default_scopes().iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Extra authorization parameters, including `resource` when set.
    pub fn authorization_params(&self) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = self
            .extra_params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        params.sort();
        if let Some(resource) = &self.resource {
            params.push(("resource".to_string(), resource.clone()));
        }
        params
    }
}

/// Lifetime of a provider state, in seconds.
pub const PROVIDER_STATE_TTL_SECS: i64 = 600;

/// Anti-forgery state of one round trip to an identity provider.
///
/// A state is issued for exactly one provider. Its nonce travels as the OAuth2
/// `state` parameter and must come back unchanged, to the same provider's
/// callback, within [`PROVIDER_STATE_TTL_SECS`]. Providers that require PKCE
/// also get a verifier here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderState {
    /// Provider the round trip was started with
    pub provider: ProviderKind,

    /// Random value echoed back in the callback `state` parameter
    pub nonce: String,

    /// PKCE code verifier
    pub pkce_verifier: Option<String>,

    /// When the round trip started
    pub issued_at: DateTime<Utc>,
}

fn random_alphanumeric(len: usize) -> String {
    use rand::Rng;
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

impl ProviderState {
    /// Issue a fresh state for `provider`, with a PKCE verifier when the
    /// provider requires one.
    pub fn issue(provider: ProviderKind) -> Self {
        Self {
            provider,
            nonce: random_alphanumeric(32),
            pkce_verifier: provider.requires_pkce().then(|| random_alphanumeric(64)),
            issued_at: Utc::now(),
        }
    }

    /// S256 PKCE code challenge of the verifier.
    pub fn pkce_challenge(&self) -> Option<String> {
        use sha2::{Digest, Sha256};

        self.pkce_verifier.as_ref().map(|verifier| {
            let hash = Sha256::digest(verifier.as_bytes());
            base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, hash)
        })
    }

    /// Instant after which the callback is refused.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.issued_at + chrono::Duration::seconds(PROVIDER_STATE_TTL_SECS)
    }

    /// Check if the state has expired.
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at()
    }

    /// Accept or refuse a callback from `provider` echoing `returned`.
    ///
    /// A callback for another provider is an `IllegalState`; a wrong or late
    /// nonce is an `Authentication` failure.
    pub fn verify_callback(
        &self,
        provider: ProviderKind,
        returned: Option<&str>,
    ) -> BrokerResult<()> {
        if provider != self.provider {
            return Err(BrokerError::IllegalState(format!(
                "{} callback while a {} authentication is pending",
                provider, self.provider
            )));
        }
        if returned != Some(self.nonce.as_str()) {
            return Err(BrokerError::Authentication(
                "Provider state mismatch".to_string(),
            ));
        }
        if self.is_expired() {
            return Err(BrokerError::Authentication(
                "Provider state has expired".to_string(),
            ));
        }
        Ok(())
    }
}

/// Token response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderTokens {
    /// Access token
    pub access_token: String,

    /// Token type (usually "Bearer")
    pub token_type: String,

    /// Expires in seconds
    pub expires_in: Option<u64>,

    /// Refresh token (if provided)
    pub refresh_token: Option<String>,

    /// Granted scopes
    pub scope: Option<String>,
}

/// Query parameters a provider redirects back with.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallbackParams {
    /// Authorization code
    pub code: Option<String>,

    /// Echoed provider state
    pub state: Option<String>,

    /// Error code when the user or provider aborted
    pub error: Option<String>,

    /// Human readable error
    pub error_description: Option<String>,
}

/// OAuth2 wire protocol towards identity providers.
#[async_trait]
pub trait ProviderSdk: Send + Sync {
    /// Build the provider authorization URL.
    async fn authorization_url(
        &self,
        kind: ProviderKind,
        config: &ProviderConfig,
        state: &ProviderState,
    ) -> BrokerResult<String>;

    /// Exchange an authorization code for tokens.
    async fn exchange_code(
        &self,
        kind: ProviderKind,
        config: &ProviderConfig,
        code: &str,
        state: &ProviderState,
    ) -> BrokerResult<ProviderTokens>;

    /// Fetch a JSON resource with a bearer token.
    async fn fetch_json(&self, url: &str, access_token: &str) -> BrokerResult<serde_json::Value>;
}
