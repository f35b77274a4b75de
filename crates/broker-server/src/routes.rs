//! HTTP routes of the broker.
//!
//! Handshake endpoints answer with redirects: `BadRequest` is returned as a
//! JSON body, every other failure sends the browser to the failure page with
//! the request's correlation id.

use crate::error::ApiError;
use crate::state::{AppState, SESSION_COOKIE};
use crate::telemetry::{correlation_header, correlation_id, MakeCorrelationId};
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header::{
    ACCEPT, ACCEPT_ENCODING, CONNECTION, CONTENT_TYPE, COOKIE, HOST, LOCATION, ORIGIN, REFERER,
    USER_AGENT,
};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, Method, Request, StatusCode};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use broker_auth::{
    get_profile, new_session_id, AuthorizationRequest, BrokerError, BrokerResult, CallbackParams,
    CorsAllowlist, HandshakeSession, Identity, ProviderAdapter, RedirectTarget,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info_span, warn};

/// Build the broker router, mounted below the configured base path.
pub fn build_router(state: AppState) -> Router {
    let profile_cors = profile_cors(state.cors.clone());

    let routes = Router::new()
        .route("/health", get(health))
        .route("/profile", get(profile).layer(profile_cors))
        .route("/failure", get(failure))
        .route("/:provider/api/:api_id", get(authorize))
        .route("/:provider/callback", get(callback))
        .with_state(state.clone());

    let app = if state.base_path.is_empty() {
        routes
    } else {
        Router::new().nest(&state.base_path, routes)
    };

    app.layer(
        TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            info_span!(
                "http_request",
                method = %request.method(),
                path = %request.uri().path(),
                correlation_id = %correlation_id(request.headers()),
            )
        }),
    )
    .layer(PropagateRequestIdLayer::new(correlation_header()))
    .layer(SetRequestIdLayer::new(correlation_header(), MakeCorrelationId))
}

/// CORS policy of the profile endpoint: only learned origins are mirrored,
/// with credentials.
fn profile_cors(cors: Arc<CorsAllowlist>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts: &Parts| {
                origin
                    .to_str()
                    .map(|origin| cors.is_permitted(origin))
                    .unwrap_or(false)
            },
        ))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([
            ACCEPT,
            ACCEPT_ENCODING,
            CONNECTION,
            USER_AGENT,
            CONTENT_TYPE,
            COOKIE,
            HOST,
            ORIGIN,
            REFERER,
        ])
}

// =============================================================================
// Handshake
// =============================================================================

/// `GET /{provider}/api/{api_id}`: verify the client and redirect to the
/// identity provider.
async fn authorize(
    State(state): State<AppState>,
    Path((provider, api_id)): Path<(String, String)>,
    Query(mut request): Query<AuthorizationRequest>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Response {
    let Some(adapter) = state.adapter(&provider) else {
        return ApiError::unknown_provider(&provider).into_response();
    };
    request.api_id = api_id;

    let cookie_id = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());
    let (session_id, mut session) = match state.load_session(cookie_id.as_deref()).await {
        Ok(Some(session)) => (cookie_id.unwrap_or_else(new_session_id), session),
        Ok(None) => (new_session_id(), HandshakeSession::new()),
        Err(e) => return handshake_failure(&state, &headers, jar, e),
    };
    let jar = jar.add(session_cookie(&state, session_id.clone()));

    let result = start_handshake(&state, adapter, request, &mut session).await;
    let saved = state.sessions.save(&session_id, &session).await;

    match result.and_then(|url| saved.map(|_| url)) {
        Ok(url) => found(jar, url),
        Err(e) => handshake_failure(&state, &headers, jar, e),
    }
}

async fn start_handshake(
    state: &AppState,
    adapter: &ProviderAdapter,
    request: AuthorizationRequest,
    session: &mut HandshakeSession,
) -> BrokerResult<String> {
    state.verifier.verify(request, session).await?;

    let redirect = adapter.begin_authentication(state.sdk.as_ref()).await?;
    session.await_provider(redirect.state);
    Ok(redirect.url)
}

/// `GET /{provider}/callback`: finish the provider login, exchange the
/// identity and redirect to the client.
async fn callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(params): Query<CallbackParams>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Response {
    let Some(adapter) = state.adapter(&provider) else {
        return ApiError::unknown_provider(&provider).into_response();
    };

    let cookie_id = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());
    let (session_id, mut session) = match state
        .require_session(cookie_id.as_deref(), || {
            BrokerError::IllegalState("Callback without a handshake session".to_string())
        })
        .await
    {
        Ok(loaded) => loaded,
        Err(e) => return handshake_failure(&state, &headers, jar, e),
    };

    let result = finish_handshake(&state, adapter, &params, &mut session).await;
    let saved = state.sessions.save(&session_id, &session).await;

    match result.and_then(|target| saved.map(|_| target)) {
        Ok(target) => found(jar, target.location),
        Err(e) => handshake_failure(&state, &headers, jar, e),
    }
}

async fn finish_handshake(
    state: &AppState,
    adapter: &ProviderAdapter,
    params: &CallbackParams,
    session: &mut HandshakeSession,
) -> BrokerResult<RedirectTarget> {
    let expected = session.take_provider_state(adapter.kind());
    let identity = adapter
        .complete_authentication(state.sdk.as_ref(), params, expected.as_ref())
        .await?;

    state.coordinator.complete(session, Some(identity)).await
}

// =============================================================================
// Profile, failure page, health
// =============================================================================

/// `GET /profile`: identity of the completed handshake.
async fn profile(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Json<Identity>, ApiError> {
    let cookie_id = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());
    let (_, session) = state
        .require_session(cookie_id.as_deref(), || {
            BrokerError::Unauthorized("No authenticated session".to_string())
        })
        .await?;

    Ok(Json(get_profile(&session)?))
}

#[derive(Debug, Deserialize)]
struct FailureQuery {
    correlation_id: Option<String>,
}

/// `GET /failure`: tell the user the login failed.
async fn failure(
    State(state): State<AppState>,
    Query(query): Query<FailureQuery>,
    jar: CookieJar,
) -> Html<String> {
    let cookie_id = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());
    let redirect_uri = state
        .load_session(cookie_id.as_deref())
        .await
        .ok()
        .flatten()
        .and_then(|session| session.redirect_uri);

    Html(render_failure_page(
        query.correlation_id.as_deref().unwrap_or("n/a"),
        redirect_uri.as_deref(),
    ))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// =============================================================================
// Helpers
// =============================================================================

fn session_cookie(state: &AppState, session_id: String) -> Cookie<'static> {
    let path = if state.base_path.is_empty() {
        "/".to_string()
    } else {
        state.base_path.clone()
    };

    Cookie::build((SESSION_COOKIE, session_id))
        .path(path)
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.secure_cookies)
        .build()
}

fn found(jar: CookieJar, location: String) -> Response {
    (StatusCode::FOUND, jar, [(LOCATION, location)]).into_response()
}

/// Log a failed handshake step and answer it: JSON for rejected client
/// input, a redirect to the failure page for everything else.
fn handshake_failure(
    state: &AppState,
    headers: &HeaderMap,
    jar: CookieJar,
    err: BrokerError,
) -> Response {
    let correlation_id = correlation_id(headers);
    if err.is_server_error() {
        error!(correlation_id = %correlation_id, error = %err, "handshake failed");
    } else {
        warn!(correlation_id = %correlation_id, error = %err, "handshake rejected");
    }

    if !err.redirects_to_failure() {
        return (jar, ApiError::from(err)).into_response();
    }

    let encoded: String = url::form_urlencoded::byte_serialize(correlation_id.as_bytes()).collect();
    let location = format!("{}?correlation_id={}", state.route_path("/failure"), encoded);
    found(jar, location)
}

fn render_failure_page(correlation_id: &str, redirect_uri: Option<&str>) -> String {
    let back = match redirect_uri.filter(|uri| is_linkable(uri)) {
        Some(uri) => format!(
            "<p><a href=\"{}\">Return to the application</a></p>",
            escape_html(uri)
        ),
        None => String::new(),
    };

    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>Sign-in failed</title></head>\n\
         <body>\n<h1>Sign-in failed</h1>\n\
         <p>The login could not be completed. Quote this reference when reporting the problem:</p>\n\
         <p><code>{}</code></p>\n{}\n</body>\n</html>\n",
        escape_html(correlation_id),
        back
    )
}

/// Only absolute URLs with a navigational scheme become the return link.
fn is_linkable(uri: &str) -> bool {
    match url::Url::parse(uri) {
        Ok(url) => !matches!(url.scheme(), "javascript" | "data" | "vbscript"),
        Err(_) => false,
    }
}

/// Escapes text and attribute values of the failure page, nothing else.
fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_page_escapes_input() {
        let page = render_failure_page("<script>", Some("https://app/cb?a=1&b=\"2\""));
        assert!(page.contains("&lt;script&gt;"));
        assert!(page.contains("https://app/cb?a=1&amp;b=&quot;2&quot;"));
        assert!(!page.contains("<script>"));
    }

    #[test]
    fn test_failure_page_links_only_navigable_uris() {
        let page = render_failure_page("abc", Some("javascript:alert(document.cookie)"));
        assert!(!page.contains("<a href"));

        let page = render_failure_page("abc", Some("/relative/cb"));
        assert!(!page.contains("<a href"));

        let page = render_failure_page("abc", Some("urn:app:callback"));
        assert!(page.contains("<a href=\"urn:app:callback\">"));
    }

    #[test]
    fn test_failure_page_without_redirect() {
        let page = render_failure_page("abc", None);
        assert!(page.contains("<code>abc</code>"));
        assert!(!page.contains("<a href"));
    }
}
