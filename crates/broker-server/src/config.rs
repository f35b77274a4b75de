//! Broker configuration.
//!
//! Read from the JSON file named by `AUTH_BROKER_CONFIG` (optional) and
//! then overlaid with environment variables. Service endpoints always come
//! from the environment (see [`ServiceConfig::from_env`]).

use broker_auth::{BrokerError, ProviderAdapter, ProviderConfig, ProviderKind};
use broker_clients::ServiceConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Config file is not valid JSON for this shape.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// Invalid configuration value.
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Error message.
        message: String,
    },

    /// A provider section is incomplete.
    #[error(transparent)]
    Provider(#[from] BrokerError),

    /// Service endpoints are invalid.
    #[error(transparent)]
    Services(#[from] broker_clients::ConfigError),
}

/// Identity provider sections. An absent section disables the provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Google
    #[serde(default)]
    pub google: Option<ProviderConfig>,
    /// GitHub
    #[serde(default)]
    pub github: Option<ProviderConfig>,
    /// Twitter
    #[serde(default)]
    pub twitter: Option<ProviderConfig>,
    /// Facebook
    #[serde(default)]
    pub facebook: Option<ProviderConfig>,
    /// Corporate IdP
    #[serde(default, alias = "adfs")]
    pub corporate: Option<ProviderConfig>,
    /// Generic OAuth2 provider
    #[serde(default)]
    pub oauth2: Option<ProviderConfig>,
}

impl ProvidersConfig {
    /// Configured section of a provider.
    pub fn get(&self, kind: ProviderKind) -> Option<&ProviderConfig> {
        match kind {
            ProviderKind::Google => self.google.as_ref(),
            ProviderKind::GitHub => self.github.as_ref(),
            ProviderKind::Twitter => self.twitter.as_ref(),
            ProviderKind::Facebook => self.facebook.as_ref(),
            ProviderKind::Corporate => self.corporate.as_ref(),
            ProviderKind::OAuth2 => self.oauth2.as_ref(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:3010".to_string()
}

fn default_base_path() -> String {
    "/auth-server".to_string()
}

fn default_server_name() -> String {
    "auth-server".to_string()
}

fn default_session_minutes() -> i64 {
    60
}

fn default_true() -> bool {
    true
}

/// Top-level broker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerConfig {
    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path prefix all routes are mounted under
    #[serde(default = "default_base_path")]
    pub base_path: String,

    /// Broker name passed to the token exchange service
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// Session lifetime in minutes
    #[serde(default = "default_session_minutes")]
    pub session_minutes: i64,

    /// Mark the session cookie `Secure`
    #[serde(default = "default_true")]
    pub secure_cookies: bool,

    /// Emit JSON log lines
    #[serde(default)]
    pub log_json: bool,

    /// Identity providers
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Portal and exchange endpoints
    #[serde(skip)]
    pub services: ServiceConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            base_path: default_base_path(),
            server_name: default_server_name(),
            session_minutes: default_session_minutes(),
            secure_cookies: true,
            log_json: false,
            providers: ProvidersConfig::default(),
            services: ServiceConfig::default(),
        }
    }
}

impl BrokerConfig {
    /// Load the configuration from `AUTH_BROKER_CONFIG` and the environment.
    ///
    /// Environment variables:
    /// - `AUTH_BROKER_CONFIG`: path of the JSON config file
    /// - `AUTH_BROKER_LISTEN`: listen address (default: 0.0.0.0:3010)
    /// - `AUTH_BROKER_BASE_PATH`: route prefix (default: /auth-server)
    /// - `AUTH_BROKER_SERVER_NAME`: broker name (default: auth-server)
    /// - `AUTH_SERVER_SESSION_MINUTES`: session lifetime (default: 60)
    /// - `AUTH_BROKER_SECURE_COOKIES`: `false`/`0` to allow plain HTTP cookies
    /// - `AUTH_BROKER_LOG_JSON`: emit JSON logs
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("AUTH_BROKER_CONFIG") {
            Ok(path) => {
                let path = PathBuf::from(path);
                let raw = std::fs::read_to_string(&path)
                    .map_err(|source| ConfigError::Read { path, source })?;
                Self::from_json(&raw)?
            }
            Err(_) => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.services = ServiceConfig::from_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON config document.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Overlay values from an environment lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(listen) = lookup("AUTH_BROKER_LISTEN") {
            self.listen = listen;
        }
        if let Some(base_path) = lookup("AUTH_BROKER_BASE_PATH") {
            self.base_path = base_path;
        }
        if let Some(server_name) = lookup("AUTH_BROKER_SERVER_NAME") {
            self.server_name = server_name;
        }
        if let Some(minutes) = lookup("AUTH_SERVER_SESSION_MINUTES") {
            self.session_minutes = minutes.parse().map_err(|_| ConfigError::InvalidValue {
                key: "AUTH_SERVER_SESSION_MINUTES".to_string(),
                message: format!("'{}' is not a number of minutes", minutes),
            })?;
        }
        if let Some(secure) = lookup("AUTH_BROKER_SECURE_COOKIES") {
            self.secure_cookies = secure != "false" && secure != "0";
        }
        if let Some(json) = lookup("AUTH_BROKER_LOG_JSON") {
            self.log_json = json != "false" && json != "0";
        }
        Ok(())
    }

    /// Parsed listen address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen.parse().map_err(|_| ConfigError::InvalidValue {
            key: "listen".to_string(),
            message: format!("'{}' is not a socket address", self.listen),
        })
    }

    /// Base path normalized to `/segment` form, empty for the root.
    pub fn normalized_base_path(&self) -> String {
        let trimmed = self.base_path.trim().trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{}", trimmed)
        }
    }

    /// Check everything that must hold before the server starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr()?;
        if self.session_minutes <= 0 {
            return Err(ConfigError::InvalidValue {
                key: "sessionMinutes".to_string(),
                message: "must be positive".to_string(),
            });
        }
        self.services.validate()?;
        self.build_adapters()?;
        Ok(())
    }

    /// Build an adapter for every configured provider.
    pub fn build_adapters(&self) -> Result<HashMap<ProviderKind, ProviderAdapter>, ConfigError> {
        let mut adapters = HashMap::new();
        for kind in ProviderKind::ALL {
            if let Some(config) = self.providers.get(kind) {
                adapters.insert(kind, ProviderAdapter::from_config(kind, config.clone())?);
            }
        }
        Ok(adapters)
    }
}
