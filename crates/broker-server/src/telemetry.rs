//! Logging setup and request correlation ids.

use axum::http::{HeaderMap, HeaderName, HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, RequestId};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Header carrying the correlation id.
pub const CORRELATION_ID_HEADER: &str = "correlation-id";

/// Correlation id header name.
pub fn correlation_header() -> HeaderName {
    HeaderName::from_static(CORRELATION_ID_HEADER)
}

/// Generates a UUID v7 correlation id for requests that arrive without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeCorrelationId;

impl MakeRequestId for MakeCorrelationId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::now_v7().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Correlation id of a request, or `n/a` if none was assigned.
pub fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("n/a")
        .to_string()
}

/// Install the global `tracing` subscriber.
///
/// The filter comes from `RUST_LOG` and defaults to `info`.
pub fn init(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .init();
    }
}
