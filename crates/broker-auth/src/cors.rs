//! Learned cross-origin allow-list for the profile endpoint.
//!
//! Origins are derived from registry-resolved redirect URIs as handshakes
//! are verified. The set only grows for the lifetime of the process and is
//! shared by reference between the verifier and the HTTP layer.

use dashmap::DashSet;
use tracing::{debug, warn};

/// Outcome of an origin check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorsDecision {
    /// Echo the origin back and allow credentials
    MirrorWithCredentials,
    /// No CORS headers
    Deny,
}

/// Process-wide set of trusted origins.
#[derive(Debug, Default)]
pub struct CorsAllowlist {
    origins: DashSet<String>,
}

impl CorsAllowlist {
    /// Create an empty allow-list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Learn the origin of a redirect URI.
    ///
    /// Returns the registered origin, or `None` when the URI has no usable
    /// origin (for example a URN).
    pub fn register_redirect_uri(&self, redirect_uri: &str) -> Option<String> {
        let origin = match origin_of(redirect_uri) {
            Some(origin) => origin,
            None => {
                warn!(redirect_uri, "redirect URI has no origin, not added to CORS allow-list");
                return None;
            }
        };

        if self.origins.insert(origin.clone()) {
            debug!(origin = %origin, "learned CORS origin");
        }
        Some(origin)
    }

    /// Decide how to answer a request carrying `origin`. Exact match only.
    pub fn permit(&self, origin: &str) -> CorsDecision {
        if self.origins.contains(origin) {
            CorsDecision::MirrorWithCredentials
        } else {
            CorsDecision::Deny
        }
    }

    /// Whether `origin` is allowed.
    pub fn is_permitted(&self, origin: &str) -> bool {
        self.permit(origin) == CorsDecision::MirrorWithCredentials
    }

    /// Number of learned origins.
    pub fn len(&self) -> usize {
        self.origins.len()
    }

    /// Whether no origin was learned yet.
    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }
}

/// `scheme://host[:port]` of a URL, with default ports omitted.
pub fn origin_of(uri: &str) -> Option<String> {
    let parsed = url::Url::parse(uri).ok()?;
    let host = parsed.host_str()?;
    let origin = match parsed.port() {
        Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
        None => format!("{}://{}", parsed.scheme(), host),
    };
    Some(origin)
}
