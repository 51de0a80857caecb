//! The single kind → status mapping table for the HTTP surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

use scriberr_domain::Error;

pub struct ApiError(pub Error);

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl From<scriberr_storage::StorageError> for ApiError {
    fn from(e: scriberr_storage::StorageError) -> Self {
        Self(e.into())
    }
}

impl From<std::io::Error> for ApiError {
    fn from(e: std::io::Error) -> Self {
        Self(Error::Io(e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = match kind {
            "validation" => StatusCode::BAD_REQUEST,
            "unauthenticated" => StatusCode::UNAUTHORIZED,
            "forbidden" => StatusCode::FORBIDDEN,
            "not_found" => StatusCode::NOT_FOUND,
            "conflict" => StatusCode::CONFLICT,
            "queue_full" | "shutting_down" => StatusCode::SERVICE_UNAVAILABLE,
            "upstream" => StatusCode::BAD_GATEWAY,
            // engine_failed + internal; internals never leak details.
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Capacity errors surface their tag verbatim so clients can
        // branch on it; internal errors hide everything else.
        let message = match kind {
            "queue_full" | "shutting_down" => kind.to_string(),
            "internal" => {
                tracing::error!(error = %self.0, "internal error");
                "internal server error".to_string()
            }
            _ => self.0.to_string(),
        };

        (
            status,
            Json(serde_json::json!({ "error": message, "kind": kind })),
        )
            .into_response()
    }
}

/// Shorthand for handler-level input rejection.
pub fn bad_request(message: impl Into<String>) -> ApiError {
    ApiError(Error::Validation(message.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(e: Error) -> StatusCode {
        ApiError(e).into_response().status()
    }

    #[test]
    fn kinds_map_to_documented_statuses() {
        assert_eq!(status_of(Error::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(Error::Unauthenticated("x".into())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(status_of(Error::Forbidden("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(status_of(Error::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(Error::Conflict("x".into())), StatusCode::CONFLICT);
        assert_eq!(status_of(Error::QueueFull), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_of(Error::ShuttingDown), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_of(Error::Upstream("x".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(
            status_of(Error::Internal("secret detail".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
