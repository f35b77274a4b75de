//! # Broker Clients
//!
//! HTTP implementations of the services the authentication broker depends
//! on.
//!
//! ## Overview
//!
//! - [`PortalClient`]: subscription lookups against the API portal
//!   ([`SubscriptionRegistry`]) and implicit grants from the token exchange
//!   service ([`TokenExchange`])
//! - [`OAuth2ProviderSdk`]: authorization URLs, code exchange and profile
//!   fetches for the identity providers ([`ProviderSdk`])
//! - [`ServiceConfig`]: endpoints, API key and timeout, loaded from the
//!   environment
//!
//! Calls are made once; timeouts come from [`ServiceConfig::timeout`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use broker_clients::{OAuth2ProviderSdk, PortalClient, ServiceConfig};
//!
//! let config = ServiceConfig::from_env();
//! let portal = PortalClient::new(
//!     config.portal.clone(),
//!     config.exchange.clone(),
//!     config.timeout(),
//! )
//! .unwrap();
//! let sdk = OAuth2ProviderSdk::new(config.timeout()).unwrap();
//! ```
//!
//! [`SubscriptionRegistry`]: broker_auth::SubscriptionRegistry
//! [`TokenExchange`]: broker_auth::TokenExchange
//! [`ProviderSdk`]: broker_auth::ProviderSdk

pub mod config;
pub mod portal;
pub mod sdk;

pub use config::{ConfigError, ServiceConfig, ServiceEndpoint};
pub use portal::{PortalClient, PortalError, SubscriptionInfo};
pub use sdk::{OAuth2ProviderSdk, ProviderClientError, USER_AGENT};
