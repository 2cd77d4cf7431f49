use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use super::repository::RepositoryError;

/// Stable classification of coordinator failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    InvalidArgument,
    Conflict,
    InvalidState,
    Internal,
}

/// Error raised by every lifecycle coordinator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatorError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Forbidden")]
    Forbidden,
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoordinatorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoordinatorError::NotFound(_) => ErrorKind::NotFound,
            CoordinatorError::Forbidden => ErrorKind::Forbidden,
            CoordinatorError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            CoordinatorError::Conflict(_) => ErrorKind::Conflict,
            CoordinatorError::InvalidState(_) => ErrorKind::InvalidState,
            CoordinatorError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::InvalidArgument | ErrorKind::InvalidState => StatusCode::BAD_REQUEST,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Internal detail stays in the logs.
    pub fn message(&self) -> String {
        match self {
            CoordinatorError::Internal(_) => "Server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<RepositoryError> for CoordinatorError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Conflict(detail) => CoordinatorError::Conflict(detail),
            RepositoryError::NotFound(entity) => CoordinatorError::NotFound(entity),
            RepositoryError::Unavailable(detail) => {
                tracing::error!(%detail, "store unavailable");
                CoordinatorError::Internal(detail)
            }
        }
    }
}

impl IntoResponse for CoordinatorError {
    fn into_response(self) -> Response {
        let payload = json!({
            "success": false,
            "message": self.message(),
        });
        (self.status_code(), Json(payload)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_http_statuses() {
        assert_eq!(
            CoordinatorError::NotFound("Booking").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(CoordinatorError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            CoordinatorError::InvalidState("nope".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            CoordinatorError::Conflict("taken".into()).status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn internal_detail_is_not_exposed() {
        let err = CoordinatorError::Internal("connection reset by peer".into());
        assert_eq!(err.message(), "Server error");
        assert_eq!(CoordinatorError::NotFound("Payment").message(), "Payment not found");
    }

    #[test]
    fn repository_errors_convert_by_kind() {
        let conflict: CoordinatorError = RepositoryError::Conflict("dup".into()).into();
        assert_eq!(conflict.kind(), ErrorKind::Conflict);
        let missing: CoordinatorError = RepositoryError::NotFound("Visit").into();
        assert_eq!(missing, CoordinatorError::NotFound("Visit"));
        let offline: CoordinatorError = RepositoryError::Unavailable("offline".into()).into();
        assert_eq!(offline.kind(), ErrorKind::Internal);
    }
}
