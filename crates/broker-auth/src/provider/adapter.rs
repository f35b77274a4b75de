//! Per-provider authentication adapters.

use super::{CallbackParams, ProviderConfig, ProviderKind, ProviderSdk, ProviderState};
use crate::error::{BrokerError, BrokerResult};
use crate::identity::Identity;
use crate::normalize::{
    normalize_facebook, normalize_github, normalize_google, normalize_twitter, ClaimsNormalizer,
    GitHubEmail,
};
use tracing::{debug, info, instrument, warn};

/// A claims-token provider: its configuration plus the normalizer built from
/// its claims settings.
#[derive(Debug)]
pub struct ClaimsProvider {
    config: ProviderConfig,
    normalizer: ClaimsNormalizer,
}

impl ClaimsProvider {
    fn new(kind: ProviderKind, config: ProviderConfig) -> BrokerResult<Self> {
        let settings = config.claims.clone().unwrap_or_default();
        let normalizer = ClaimsNormalizer::new(kind, &settings)?;
        Ok(Self { config, normalizer })
    }
}

/// Where to send the browser to start authenticating, plus the state that
/// the callback must echo.
#[derive(Debug, Clone)]
pub struct AuthenticationRedirect {
    /// Provider authorization URL
    pub url: String,
    /// State to keep in the handshake session
    pub state: ProviderState,
}

/// One adapter per supported identity provider.
#[derive(Debug)]
pub enum ProviderAdapter {
    /// Google
    Google(ProviderConfig),
    /// GitHub
    GitHub(ProviderConfig),
    /// Twitter
    Twitter(ProviderConfig),
    /// Facebook
    Facebook(ProviderConfig),
    /// Corporate IdP
    Corporate(ClaimsProvider),
    /// Generic OAuth2 provider
    OAuth2(ClaimsProvider),
}

impl ProviderAdapter {
    /// Build and validate an adapter.
    pub fn from_config(kind: ProviderKind, config: ProviderConfig) -> BrokerResult<Self> {
        config.validate(kind)?;

        let adapter = match kind {
            ProviderKind::Google => ProviderAdapter::Google(config),
            ProviderKind::GitHub => ProviderAdapter::GitHub(config),
            ProviderKind::Twitter => ProviderAdapter::Twitter(config),
            ProviderKind::Facebook => ProviderAdapter::Facebook(config),
            ProviderKind::Corporate => ProviderAdapter::Corporate(ClaimsProvider::new(kind, config)?),
            ProviderKind::OAuth2 => ProviderAdapter::OAuth2(ClaimsProvider::new(kind, config)?),
        };
        Ok(adapter)
    }

    /// Provider this adapter serves.
    pub fn kind(&self) -> ProviderKind {
        match self {
            ProviderAdapter::Google(_) => ProviderKind::Google,
            ProviderAdapter::GitHub(_) => ProviderKind::GitHub,
            ProviderAdapter::Twitter(_) => ProviderKind::Twitter,
            ProviderAdapter::Facebook(_) => ProviderKind::Facebook,
            ProviderAdapter::Corporate(_) => ProviderKind::Corporate,
            ProviderAdapter::OAuth2(_) => ProviderKind::OAuth2,
        }
    }

    /// Provider configuration.
    pub fn config(&self) -> &ProviderConfig {
        match self {
            ProviderAdapter::Google(config)
            | ProviderAdapter::GitHub(config)
            | ProviderAdapter::Twitter(config)
            | ProviderAdapter::Facebook(config) => config,
            ProviderAdapter::Corporate(claims) | ProviderAdapter::OAuth2(claims) => &claims.config,
        }
    }

    /// Start authentication: create a fresh provider state and build the
    /// authorization URL. No normalization happens here.
    #[instrument(skip(self, sdk), fields(provider = %self.kind()))]
    pub async fn begin_authentication(
        &self,
        sdk: &dyn ProviderSdk,
    ) -> BrokerResult<AuthenticationRedirect> {
        let kind = self.kind();
        let state = ProviderState::issue(kind);
        let url = sdk.authorization_url(kind, self.config(), &state).await?;

        debug!("redirecting to identity provider");
        Ok(AuthenticationRedirect { url, state })
    }

    /// Finish authentication from the provider callback.
    ///
    /// The callback must carry no `error`, and its `state` must match the
    /// unexpired state created by [`begin_authentication`]. The code is then
    /// exchanged and the profile fetched and normalized. Any failure aborts
    /// the whole handshake.
    ///
    /// [`begin_authentication`]: ProviderAdapter::begin_authentication
    #[instrument(skip(self, sdk, params, expected), fields(provider = %self.kind()))]
    pub async fn complete_authentication(
        &self,
        sdk: &dyn ProviderSdk,
        params: &CallbackParams,
        expected: Option<&ProviderState>,
    ) -> BrokerResult<Identity> {
        let kind = self.kind();

        if let Some(error) = &params.error {
            let description = params.error_description.as_deref().unwrap_or(error);
            warn!(error = %error, "identity provider reported an error");
            return Err(BrokerError::Authentication(format!(
                "{} rejected the authentication: {}",
                kind, description
            )));
        }

        let expected = expected.ok_or_else(|| {
            BrokerError::IllegalState(format!(
                "{} callback without a pending authentication",
                kind
            ))
        })?;

        expected.verify_callback(kind, params.state.as_deref())?;

        let code = params
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                BrokerError::Authentication("Callback carries no authorization code".to_string())
            })?;

        let tokens = sdk.exchange_code(kind, self.config(), code, expected).await?;
        let access_token = tokens.access_token.as_str();

        let identity = match self {
            ProviderAdapter::Google(config) => {
                let profile = sdk
                    .fetch_json(&config.get_profile_url(kind)?, access_token)
                    .await?;
                normalize_google(profile)?
            }
            ProviderAdapter::GitHub(config) => {
                let profile_url = config.get_profile_url(kind)?;
                let profile = sdk.fetch_json(&profile_url, access_token).await?;
                let emails = sdk
                    .fetch_json(&format!("{}/emails", profile_url), access_token)
                    .await?;
                let emails: Vec<GitHubEmail> = serde_json::from_value(emails).map_err(|e| {
                    BrokerError::Normalization(format!("Unreadable GitHub email list: {}", e))
                })?;
                normalize_github(profile, &emails)?
            }
            ProviderAdapter::Twitter(config) => {
                let profile = sdk
                    .fetch_json(&config.get_profile_url(kind)?, access_token)
                    .await?;
                normalize_twitter(profile)?
            }
            ProviderAdapter::Facebook(config) => {
                let profile = sdk
                    .fetch_json(&config.get_profile_url(kind)?, access_token)
                    .await?;
                normalize_facebook(profile)?
            }
            ProviderAdapter::Corporate(claims) | ProviderAdapter::OAuth2(claims) => {
                claims.normalizer.normalize_token(access_token)?
            }
        };

        info!(identity = %identity.id, "identity provider authentication succeeded");
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{ClaimFields, ClaimsSettings};
    use crate::provider::ProviderTokens;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::HashMap;

    struct FakeSdk {
        access_token: String,
        resources: HashMap<String, Value>,
    }

    impl FakeSdk {
        fn new(access_token: &str) -> Self {
            Self {
                access_token: access_token.to_string(),
                resources: HashMap::new(),
            }
        }

        fn with_resource(mut self, url: &str, body: Value) -> Self {
            self.resources.insert(url.to_string(), body);
            self
        }
    }

    #[async_trait]
    impl ProviderSdk for FakeSdk {
        async fn authorization_url(
            &self,
            kind: ProviderKind,
            config: &ProviderConfig,
            state: &ProviderState,
        ) -> BrokerResult<String> {
            Ok(format!(
                "{}?client_id={}&state={}",
                config.get_authorize_url(kind)?,
                config.client_id,
                state.nonce
            ))
        }

        async fn exchange_code(
            &self,
            _kind: ProviderKind,
            _config: &ProviderConfig,
            code: &str,
            _state: &ProviderState,
        ) -> BrokerResult<ProviderTokens> {
            if code != "good-code" {
                return Err(BrokerError::Provider("invalid_grant".to_string()));
            }
            Ok(ProviderTokens {
                access_token: self.access_token.clone(),
                token_type: "Bearer".to_string(),
                expires_in: Some(3600),
                refresh_token: None,
                scope: None,
            })
        }

        async fn fetch_json(&self, url: &str, _access_token: &str) -> BrokerResult<Value> {
            self.resources
                .get(url)
                .cloned()
                .ok_or_else(|| BrokerError::Provider(format!("404 from {}", url)))
        }
    }

    fn config() -> ProviderConfig {
        ProviderConfig::new("client", "secret", "https://broker/cb")
    }

    fn callback(state: &ProviderState) -> CallbackParams {
        CallbackParams {
            code: Some("good-code".to_string()),
            state: Some(state.nonce.clone()),
            ..CallbackParams::default()
        }
    }

    #[tokio::test]
    async fn test_begin_builds_provider_url() {
        let adapter = ProviderAdapter::from_config(ProviderKind::Google, config()).unwrap();
        let redirect = adapter
            .begin_authentication(&FakeSdk::new("t"))
            .await
            .unwrap();

        assert!(redirect
            .url
            .starts_with("https://accounts.google.com/o/oauth2/v2/auth"));
        assert!(redirect.url.contains(&redirect.state.nonce));
    }

    #[tokio::test]
    async fn test_github_fetches_emails() {
        let sdk = FakeSdk::new("t")
            .with_resource(
                "https://api.github.com/user",
                json!({ "id": 1, "login": "octocat", "name": "The Octocat" }),
            )
            .with_resource(
                "https://api.github.com/user/emails",
                json!([
                    { "email": "a@x", "primary": false, "verified": true },
                    { "email": "b@x", "primary": true, "verified": false }
                ]),
            );
        let adapter = ProviderAdapter::from_config(ProviderKind::GitHub, config()).unwrap();
        let state = ProviderState::issue(ProviderKind::GitHub);

        let identity = adapter
            .complete_authentication(&sdk, &callback(&state), Some(&state))
            .await
            .unwrap();
        assert_eq!(identity.id, "github:1");
        assert_eq!(identity.email.as_deref(), Some("b@x"));
        assert!(!identity.email_verified);
    }

    #[tokio::test]
    async fn test_provider_error_param_fails() {
        let adapter = ProviderAdapter::from_config(ProviderKind::Facebook, config()).unwrap();
        let state = ProviderState::issue(ProviderKind::Facebook);
        let params = CallbackParams {
            error: Some("access_denied".to_string()),
            state: Some(state.nonce.clone()),
            ..CallbackParams::default()
        };

        let result = adapter
            .complete_authentication(&FakeSdk::new("t"), &params, Some(&state))
            .await;
        assert!(matches!(result, Err(BrokerError::Authentication(_))));
    }

    #[tokio::test]
    async fn test_state_mismatch_fails() {
        let adapter = ProviderAdapter::from_config(ProviderKind::Google, config()).unwrap();
        let state = ProviderState::issue(ProviderKind::Google);
        let other = ProviderState::issue(ProviderKind::Google);

        let result = adapter
            .complete_authentication(&FakeSdk::new("t"), &callback(&other), Some(&state))
            .await;
        assert!(matches!(result, Err(BrokerError::Authentication(_))));
    }

    #[tokio::test]
    async fn test_state_issued_for_other_provider_is_illegal() {
        let adapter = ProviderAdapter::from_config(ProviderKind::Google, config()).unwrap();
        let state = ProviderState::issue(ProviderKind::Facebook);

        let result = adapter
            .complete_authentication(&FakeSdk::new("t"), &callback(&state), Some(&state))
            .await;
        assert!(matches!(result, Err(BrokerError::IllegalState(_))));
    }

    #[tokio::test]
    async fn test_missing_pending_state_is_illegal() {
        let adapter = ProviderAdapter::from_config(ProviderKind::Google, config()).unwrap();
        let state = ProviderState::issue(ProviderKind::Google);

        let result = adapter
            .complete_authentication(&FakeSdk::new("t"), &callback(&state), None)
            .await;
        assert!(matches!(result, Err(BrokerError::IllegalState(_))));
    }

    #[tokio::test]
    async fn test_transport_error_fails() {
        let adapter = ProviderAdapter::from_config(ProviderKind::Twitter, config()).unwrap();
        let state = ProviderState::issue(ProviderKind::Twitter);

        let result = adapter
            .complete_authentication(&FakeSdk::new("t"), &callback(&state), Some(&state))
            .await;
        assert!(matches!(result, Err(BrokerError::Provider(_))));
    }

    #[tokio::test]
    async fn test_profile_without_id_fails_normalization() {
        let sdk = FakeSdk::new("t").with_resource(
            "https://openidconnect.googleapis.com/v1/userinfo",
            json!({ "name": "A B" }),
        );
        let adapter = ProviderAdapter::from_config(ProviderKind::Google, config()).unwrap();
        let state = ProviderState::issue(ProviderKind::Google);

        let result = adapter
            .complete_authentication(&sdk, &callback(&state), Some(&state))
            .await;
        assert!(matches!(result, Err(BrokerError::Normalization(_))));
    }

    #[tokio::test]
    async fn test_claims_provider_decodes_access_token() {
        use jsonwebtoken::{encode, EncodingKey, Header};

        let token = encode(
            &Header::default(),
            &json!({ "sub": "42", "given_name": "A", "family_name": "B" }),
            &EncodingKey::from_secret(b"unused"),
        )
        .unwrap();

        let mut config = config();
        config.authorize_url = Some("https://idp.example/authorize".to_string());
        config.token_url = Some("https://idp.example/token".to_string());
        config.claims = Some(ClaimsSettings {
            profile: ClaimFields {
                id: "sub".to_string(),
                given_name: "given_name".to_string(),
                family_name: "family_name".to_string(),
                email: "email".to_string(),
                name: None,
                username: None,
            },
            ..ClaimsSettings::default()
        });

        let adapter = ProviderAdapter::from_config(ProviderKind::OAuth2, config).unwrap();
        let state = ProviderState::issue(ProviderKind::OAuth2);
        let identity = adapter
            .complete_authentication(&FakeSdk::new(&token), &callback(&state), Some(&state))
            .await
            .unwrap();

        assert_eq!(identity.id, "oauth2:42");
        assert_eq!(identity.full_name, "A B");
    }
}
