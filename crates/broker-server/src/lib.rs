//! # Broker Server
//!
//! `axum` HTTP surface of the authentication broker.
//!
//! ## Routes
//!
//! All routes are mounted below [`BrokerConfig::base_path`]:
//!
//! - `GET /{provider}/api/{api_id}`: verify the client, redirect to the provider
//! - `GET /{provider}/callback`: finish the login, redirect to the client
//! - `GET /profile`: identity of the completed handshake (CORS-gated)
//! - `GET /failure`: failure page with the correlation id
//! - `GET /health`: liveness probe
//!
//! Every response carries a `correlation-id` header.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use config::{BrokerConfig, ConfigError, ProvidersConfig};
pub use error::ApiError;
pub use routes::build_router;
pub use state::{AppState, SESSION_COOKIE};
pub use telemetry::{MakeCorrelationId, CORRELATION_ID_HEADER};
