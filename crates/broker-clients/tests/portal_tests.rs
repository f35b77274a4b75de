//! Integration tests for the portal and provider clients.
//!
//! wiremock stands in for the API portal, the token exchange service and an
//! identity provider's token and profile endpoints.

use broker_auth::{
    BrokerError, ImplicitGrantRequest, ProviderAdapter, ProviderConfig, ProviderKind,
    ProviderSdk, ProviderState, SubscriptionRegistry, TokenExchange,
};
use broker_clients::{OAuth2ProviderSdk, PortalClient, ServiceConfig, ServiceEndpoint};
use std::time::Duration;
use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Test fixture providing mock servers for the portal and exchange service.
struct TestFixture {
    /// Mock portal server.
    portal_server: MockServer,
    /// Mock exchange server.
    exchange_server: MockServer,
    /// Test service configuration.
    config: ServiceConfig,
}

impl TestFixture {
    /// Create a new test fixture with mock servers.
    async fn new() -> Self {
        let portal_server = MockServer::start().await;
        let exchange_server = MockServer::start().await;

        let config = ServiceConfig {
            portal: ServiceEndpoint {
                base_url: portal_server.uri(),
                api_key: Some("test-portal-key".to_string()),
            },
            exchange: ServiceEndpoint {
                base_url: exchange_server.uri(),
                api_key: Some("test-portal-key".to_string()),
            },
            default_timeout_secs: 10,
        };

        Self {
            portal_server,
            exchange_server,
            config,
        }
    }

    /// Get a portal client configured for the mock servers.
    fn portal_client(&self) -> PortalClient {
        PortalClient::new(
            self.config.portal.clone(),
            self.config.exchange.clone(),
            self.config.timeout(),
        )
        .unwrap()
    }
}

fn grant_request() -> ImplicitGrantRequest {
    ImplicitGrantRequest {
        authenticated_userid: "github:583231".to_string(),
        client_id: "app-1".to_string(),
        api_id: "orders".to_string(),
        auth_server: "auth-server".to_string(),
    }
}

// =============================================================================
// Subscription registry
// =============================================================================

#[tokio::test]
async fn test_lookup_resolves_redirect_uri() {
    let fixture = TestFixture::new().await;

    Mock::given(method("GET"))
        .and(path("/subscriptions/app-1"))
        .and(header("Authorization", "Bearer test-portal-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "application": { "id": "app", "redirectUri": "https://app.example/cb" },
            "subscription": { "api": "orders", "plan": "basic" }
        })))
        .expect(1)
        .mount(&fixture.portal_server)
        .await;

    let subscription = fixture
        .portal_client()
        .lookup("app-1", "orders")
        .await
        .unwrap();
    assert_eq!(subscription.redirect_uri, "https://app.example/cb");
}

#[tokio::test]
async fn test_lookup_for_other_api_is_registry_error() {
    let fixture = TestFixture::new().await;

    Mock::given(method("GET"))
        .and(path("/subscriptions/app-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "application": { "redirectUri": "https://app.example/cb" },
            "subscription": { "api": "billing" }
        })))
        .mount(&fixture.portal_server)
        .await;

    let result = fixture.portal_client().lookup("app-1", "orders").await;
    assert!(matches!(result, Err(BrokerError::Registry(_))));
}

#[tokio::test]
async fn test_unknown_client_is_registry_error() {
    let fixture = TestFixture::new().await;

    Mock::given(method("GET"))
        .and(path("/subscriptions/ghost"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&fixture.portal_server)
        .await;

    let result = fixture.portal_client().lookup("ghost", "orders").await;
    assert!(matches!(result, Err(BrokerError::Registry(_))));
}

#[tokio::test]
async fn test_reserved_characters_stay_in_client_segment() {
    let fixture = TestFixture::new().await;

    // Neither a truncated nor a traversed path may be requested.
    for escaped in ["/subscriptions/app-1", "/admin/keys", "/subscriptions/admin/keys"] {
        Mock::given(method("GET"))
            .and(path(escaped))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "application": { "redirectUri": "https://attacker.example/cb" },
                "subscription": { "api": "orders" }
            })))
            .expect(0)
            .mount(&fixture.portal_server)
            .await;
    }
    for encoded in ["/subscriptions/app-1%23evil", "/subscriptions/..%2Fadmin%2Fkeys"] {
        Mock::given(method("GET"))
            .and(path(encoded))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&fixture.portal_server)
            .await;
    }

    let client = fixture.portal_client();
    for client_id in ["app-1#evil", "../admin/keys"] {
        let result = client.lookup(client_id, "orders").await;
        assert!(
            matches!(result, Err(BrokerError::Registry(_))),
            "{client_id} resolved to {result:?}"
        );
    }
}

#[tokio::test]
async fn test_dot_segment_client_ids_are_rejected_locally() {
    let fixture = TestFixture::new().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&fixture.portal_server)
        .await;

    let client = fixture.portal_client();
    for client_id in ["", ".", ".."] {
        let result = client.lookup(client_id, "orders").await;
        assert!(matches!(result, Err(BrokerError::Registry(_))));
    }
}

#[tokio::test]
async fn test_missing_redirect_uri_is_registry_error() {
    let fixture = TestFixture::new().await;

    Mock::given(method("GET"))
        .and(path("/subscriptions/app-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "application": { "id": "app" },
            "subscription": { "api": "orders" }
        })))
        .mount(&fixture.portal_server)
        .await;

    let result = fixture.portal_client().lookup("app-1", "orders").await;
    assert!(matches!(result, Err(BrokerError::Registry(_))));
}

// =============================================================================
// Token exchange
// =============================================================================

#[tokio::test]
async fn test_implicit_grant_posts_identity() {
    let fixture = TestFixture::new().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token/implicit"))
        .and(header("Authorization", "Bearer test-portal-key"))
        .and(body_json(serde_json::json!({
            "authenticated_userid": "github:583231",
            "client_id": "app-1",
            "api_id": "orders",
            "auth_server": "auth-server"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "redirect_uri": "https://app.example/cb#access_token=abc&token_type=bearer"
        })))
        .expect(1)
        .mount(&fixture.exchange_server)
        .await;

    let response = fixture
        .portal_client()
        .authorize_implicit(&grant_request())
        .await
        .unwrap();
    assert_eq!(
        response.redirect_uri.as_deref(),
        Some("https://app.example/cb#access_token=abc&token_type=bearer")
    );
}

#[tokio::test]
async fn test_exchange_failure_is_exchange_error() {
    let fixture = TestFixture::new().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token/implicit"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .expect(1)
        .mount(&fixture.exchange_server)
        .await;

    let result = fixture
        .portal_client()
        .authorize_implicit(&grant_request())
        .await;
    assert!(matches!(result, Err(BrokerError::Exchange(_))));
}

// =============================================================================
// Identity provider
// =============================================================================

fn github_config(server: &MockServer) -> ProviderConfig {
    let mut config = ProviderConfig::new("gh-client", "gh-secret", "https://broker/github/callback");
    config.authorize_url = Some(format!("{}/login/oauth/authorize", server.uri()));
    config.token_url = Some(format!("{}/login/oauth/access_token", server.uri()));
    config.profile_url = Some(format!("{}/user", server.uri()));
    config
}

#[tokio::test]
async fn test_github_login_against_mock_provider() {
    let provider = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .and(body_string_contains("code=the-code"))
        .and(body_string_contains("client_id=gh-client"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "gho_token",
            "token_type": "bearer",
            "scope": "user:email"
        })))
        .expect(1)
        .mount(&provider)
        .await;

    Mock::given(method("GET"))
        .and(path("/user"))
        .and(header("Authorization", "Bearer gho_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 583231, "login": "octocat", "name": "The Octocat"
        })))
        .expect(1)
        .mount(&provider)
        .await;

    Mock::given(method("GET"))
        .and(path("/user/emails"))
        .and(header("Authorization", "Bearer gho_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            { "email": "a@x", "primary": false, "verified": true },
            { "email": "octocat@github.com", "primary": true, "verified": true }
        ])))
        .expect(1)
        .mount(&provider)
        .await;

    let sdk = OAuth2ProviderSdk::new(Duration::from_secs(5)).unwrap();
    let adapter = ProviderAdapter::from_config(ProviderKind::GitHub, github_config(&provider)).unwrap();
    let state = ProviderState::issue(ProviderKind::GitHub);
    let params = broker_auth::CallbackParams {
        code: Some("the-code".to_string()),
        state: Some(state.nonce.clone()),
        ..Default::default()
    };

    let identity = adapter
        .complete_authentication(&sdk, &params, Some(&state))
        .await
        .unwrap();

    assert_eq!(identity.id, "github:583231");
    assert_eq!(identity.username, "octocat");
    assert_eq!(identity.email.as_deref(), Some("octocat@github.com"));
    assert!(identity.email_verified);
}

#[tokio::test]
async fn test_rejected_code_is_provider_error() {
    let provider = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant"
        })))
        .mount(&provider)
        .await;

    let sdk = OAuth2ProviderSdk::new(Duration::from_secs(5)).unwrap();
    let result = sdk
        .exchange_code(
            ProviderKind::GitHub,
            &github_config(&provider),
            "stale",
            &ProviderState::issue(ProviderKind::GitHub),
        )
        .await;
    assert!(matches!(result, Err(BrokerError::Provider(_))));
}

#[tokio::test]
async fn test_profile_fetch_failure_is_provider_error() {
    let provider = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/me"))
        .and(query_param("fields", "id,name"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&provider)
        .await;

    let sdk = OAuth2ProviderSdk::new(Duration::from_secs(5)).unwrap();
    let result = sdk
        .fetch_json(&format!("{}/me?fields=id,name", provider.uri()), "token")
        .await;
    assert!(matches!(result, Err(BrokerError::Provider(_))));
}
