//! Endpoints of the API portal and the token exchange service.
//!
//! Both endpoints share the portal API key. Values come from the environment
//! and fall back to local development defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_PORTAL_URL: &str = "http://localhost:3001";
const DEFAULT_EXCHANGE_URL: &str = "http://localhost:3002";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A setting required outside development is absent.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// A setting could not be used.
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue {
        /// Environment variable.
        key: String,
        /// What is wrong with it.
        message: String,
    },
}

/// Outbound service endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// API portal, answers subscription lookups
    pub portal: ServiceEndpoint,

    /// Token exchange service, issues implicit grants
    pub exchange: ServiceEndpoint,

    /// Per-request timeout in seconds
    pub default_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            portal: ServiceEndpoint::unauthenticated(DEFAULT_PORTAL_URL),
            exchange: ServiceEndpoint::unauthenticated(DEFAULT_EXCHANGE_URL),
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ServiceConfig {
    /// Read the endpoints from the process environment.
    ///
    /// - `PORTAL_API_URL` (default: http://localhost:3001)
    /// - `PORTAL_EXCHANGE_URL` (default: http://localhost:3002)
    /// - `PORTAL_API_KEY`: bearer key for both services
    /// - `SERVICE_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the endpoints from an arbitrary variable lookup. An unparsable
    /// timeout falls back to the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("PORTAL_API_KEY").filter(|k| !k.is_empty());
        let endpoint = |key: &str, fallback: &str| ServiceEndpoint {
            base_url: lookup(key).unwrap_or_else(|| fallback.to_string()),
            api_key: api_key.clone(),
        };

        Self {
            portal: endpoint("PORTAL_API_URL", DEFAULT_PORTAL_URL),
            exchange: endpoint("PORTAL_EXCHANGE_URL", DEFAULT_EXCHANGE_URL),
            default_timeout_secs: lookup("SERVICE_TIMEOUT_SECS")
                .and_then(|secs| secs.parse().ok())
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    /// Both base URLs must be absolute.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.portal.check("PORTAL_API_URL")?;
        self.exchange.check("PORTAL_EXCHANGE_URL")
    }

    /// Stricter check for deployments: the services must be authenticated.
    pub fn validate_for_production(&self) -> Result<(), ConfigError> {
        self.validate()?;
        match self.portal.api_key {
            Some(_) => Ok(()),
            None => Err(ConfigError::MissingEnvVar("PORTAL_API_KEY".to_string())),
        }
    }
}

/// Base URL and bearer key of one service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    /// Base URL, e.g. `http://portal-api:3001`
    pub base_url: String,

    /// Bearer key, if the service requires one
    pub api_key: Option<String>,
}

impl ServiceEndpoint {
    fn unauthenticated(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            api_key: None,
        }
    }

    /// Join `path` onto the base URL with exactly one slash between them.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Append `segments` to the base URL path, percent-encoding each one so
    /// that `/`, `?` and `#` stay inside their segment.
    ///
    /// `url` silently drops `.` and `..` segments, so callers must reject
    /// those before building the URL.
    pub fn segment_url(&self, segments: &[&str]) -> Result<reqwest::Url, ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: "base_url".to_string(),
            message,
        };

        let mut url = reqwest::Url::parse(&self.base_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn check(&self, key: &str) -> Result<(), ConfigError> {
        reqwest::Url::parse(&self.base_url)
            .map(|_| ())
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })
    }
}
