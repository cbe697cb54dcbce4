//! Server error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use cohort_query::QueryError;
use serde_json::json;
use thiserror::Error;

/// Errors raised while building or running a node.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("repository error: {0}")]
    Store(#[from] cohort_store::StoreError),

    #[error("access list error: {0}")]
    Access(#[from] cohort_rbac::AccessError),

    #[error("federation error: {0}")]
    Federation(#[from] cohort_federation::FederationError),

    #[error("configuration error: {0}")]
    Config(#[from] cohort_config::ConfigError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// A [`QueryError`] rendered as `{"error", "httpStatus"}`.
#[derive(Debug)]
pub struct ApiError(pub QueryError);

impl From<QueryError> for ApiError {
    fn from(e: QueryError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.http_status();
        let code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if code.is_server_error() {
            tracing::error!(code = self.0.code(), error = %self.0, "Request failed");
        } else {
            tracing::debug!(code = self.0.code(), error = %self.0, "Request rejected");
        }
        (
            code,
            Json(json!({
                "error": self.0.to_string(),
                "httpStatus": status,
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_status() {
        let response = ApiError(QueryError::NotAuthorized("D1".into())).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = ApiError(QueryError::BadPageSize(-1)).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ApiError(QueryError::Internal("boom".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
