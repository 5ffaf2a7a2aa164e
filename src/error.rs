//! Hub error types with HTTP status code mapping.
//!
//! [`HubError`] is the central error type for the hub. Each variant maps
//! to a specific HTTP status code and structured JSON error response.
//! Upstream failures never escape the coordinator as panics: they are
//! logged, recorded in the coordinator status, and the hub keeps serving.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "unknown resource: invoices",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Hub error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category          | HTTP Status                   |
/// |-----------|-------------------|-------------------------------|
/// | 1000–1999 | Validation        | 400 Bad Request               |
/// | 2000–2999 | Not Found         | 404 Not Found                 |
/// | 3000–3999 | Upstream / Server | 500 / 502 / 503               |
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Identity token was empty or malformed.
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    /// Resource key was empty or contained unsupported characters.
    #[error("invalid resource key: {0}")]
    InvalidResourceKey(String),

    /// No coordinator watches the given resource.
    #[error("unknown resource: {0}")]
    UnknownResource(String),

    /// The change-feed backend could not be reached.
    #[error("change feed unavailable: {0}")]
    FeedUnavailable(String),

    /// The change-feed backend refused to open a watch.
    #[error("watch on {resource} rejected: {reason}")]
    OpenRejected {
        /// Resource the watch was requested for.
        resource: String,
        /// Backend-provided reason.
        reason: String,
    },

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HubError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::InvalidIdentity(_) => 1002,
            Self::InvalidResourceKey(_) => 1003,
            Self::UnknownResource(_) => 2001,
            Self::Internal(_) => 3000,
            Self::FeedUnavailable(_) => 3001,
            Self::OpenRejected { .. } => 3002,
            Self::Config(_) => 3003,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::InvalidIdentity(_) | Self::InvalidResourceKey(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::UnknownResource(_) => StatusCode::NOT_FOUND,
            Self::FeedUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::OpenRejected { .. } => StatusCode::BAD_GATEWAY,
            Self::Config(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for HubError {
    fn from(err: sqlx::Error) -> Self {
        Self::FeedUnavailable(err.to_string())
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_map_to_bad_request() {
        for err in [
            HubError::InvalidRequest("x".to_string()),
            HubError::InvalidIdentity("x".to_string()),
            HubError::InvalidResourceKey("x".to_string()),
        ] {
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
            assert!((1000..2000).contains(&err.error_code()));
        }
    }

    #[test]
    fn unknown_resource_is_not_found() {
        let err = HubError::UnknownResource("invoices".to_string());
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.error_code(), 2001);
        assert_eq!(err.to_string(), "unknown resource: invoices");
    }

    #[test]
    fn upstream_errors_map_to_gateway_statuses() {
        let rejected = HubError::OpenRejected {
            resource: "tasks".to_string(),
            reason: "permission denied".to_string(),
        };
        assert_eq!(rejected.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            rejected.to_string(),
            "watch on tasks rejected: permission denied"
        );

        let unavailable = HubError::FeedUnavailable("connection refused".to_string());
        assert_eq!(unavailable.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn into_response_carries_status() {
        let response = HubError::UnknownResource("clients".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
