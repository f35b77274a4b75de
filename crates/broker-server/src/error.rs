//! HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use broker_auth::BrokerError;

/// API error with HTTP status code, error code, and human-readable message.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    /// Route exists but the provider is not configured.
    pub fn unknown_provider(provider: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "NOT_FOUND",
            message: format!("Identity provider '{}' is not configured", provider),
        }
    }
}

impl From<BrokerError> for ApiError {
    fn from(e: BrokerError) -> Self {
        let status =
            StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self {
            status,
            code: e.error_code(),
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": {
                "message": self.message,
                "code": self.code,
                "status": self.status.as_u16(),
            }
        });

        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_follows_error_kind() {
        let err = ApiError::from(BrokerError::BadRequest("redirect_uri mismatch".into()));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "BAD_REQUEST");

        let err = ApiError::from(BrokerError::Unauthorized("no session".into()));
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);

        let err = ApiError::unknown_provider("myspace");
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
