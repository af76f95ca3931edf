//! Error types for sb-api

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;

use crate::handlers::ErrorResponse;

/// sb-api error type, one variant per response status
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("unauthorized number")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    UnsupportedMediaType(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sb_core::Error> for ApiError {
    fn from(err: sb_core::Error) -> Self {
        match err {
            sb_core::Error::Unauthorized => Self::Unauthorized,
            sb_core::Error::MalformedInput(reason) => Self::BadRequest(reason),
            sb_core::Error::UnresolvedRoute(reason) => Self::NotFound(reason),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Internal(detail) => {
                error!("Internal error handling request: {}", detail);
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        (self.status(), Json(ErrorResponse { error: message })).into_response()
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_error_mapping() {
        assert_eq!(
            ApiError::from(sb_core::Error::Unauthorized).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(sb_core::Error::MalformedInput("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(sb_core::Error::UnresolvedRoute("x".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(sb_core::Error::HandoffClosed).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
