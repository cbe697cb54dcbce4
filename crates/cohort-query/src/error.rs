//! Query error taxonomy.
//!
//! Every failure a client can observe maps to exactly one variant here, and
//! each variant has a stable code and HTTP status.

use cohort_rbac::AccessError;
use cohort_store::StoreError;
use thiserror::Error;

/// Result type for query operations.
pub type Result<T> = std::result::Result<T, QueryError>;

/// Errors surfaced to clients.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The request body is not JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// JSON that fails shape checks.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A required field or table name is absent or unsupported.
    #[error("missing field: {0}")]
    MissingFieldName(String),

    /// The logic tree of a compound query is malformed.
    #[error("invalid logic: {0}")]
    InvalidLogic(String),

    /// A filter names a field the target table does not have.
    #[error("bad filter key: {0}")]
    BadFilterKey(String),

    /// A filter operand cannot be compared with the record's value.
    #[error("bad input type: {0}")]
    BadInputType(String),

    /// Dataset or entity not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// No valid credentials when credentials are required.
    #[error("not authenticated: {0}")]
    NotAuthenticated(String),

    /// Credentials present but the dataset is outside the caller's access map.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// Negative page size.
    #[error("bad page size: {0}")]
    BadPageSize(i64),

    /// Unexpected server-side failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl QueryError {
    /// Stable machine-readable name.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidJson(_) => "InvalidJson",
            Self::BadRequest(_) => "BadRequest",
            Self::MissingFieldName(_) => "MissingFieldName",
            Self::InvalidLogic(_) => "InvalidLogic",
            Self::BadFilterKey(_) => "BadFilterKey",
            Self::BadInputType(_) => "BadInputType",
            Self::NotFound(_) => "NotFound",
            Self::NotAuthenticated(_) => "NotAuthenticated",
            Self::NotAuthorized(_) => "NotAuthorized",
            Self::BadPageSize(_) => "BadPageSize",
            Self::Internal(_) => "Internal",
        }
    }

    /// HTTP status for the error body.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::NotAuthenticated(_) => 401,
            Self::NotAuthorized(_) => 403,
            Self::Internal(_) => 500,
            _ => 400,
        }
    }

    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub(crate) fn missing(field: impl Into<String>) -> Self {
        Self::MissingFieldName(field.into())
    }
}

impl From<StoreError> for QueryError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DatasetNotFound(name) => Self::NotFound(format!("dataset '{name}'")),
            StoreError::NotFound { kind, id } => Self::NotFound(format!("{kind} '{id}'")),
            StoreError::InvalidId(_) => Self::BadRequest(e.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<AccessError> for QueryError {
    fn from(e: AccessError) -> Self {
        match e {
            AccessError::NotAuthorized(dataset) => Self::NotAuthorized(dataset),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for QueryError {
    fn from(e: serde_json::Error) -> Self {
        use serde_json::error::Category;
        match e.classify() {
            Category::Syntax | Category::Eof | Category::Io => Self::InvalidJson(e.to_string()),
            Category::Data => Self::BadRequest(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(QueryError::InvalidJson(String::new()).http_status(), 400);
        assert_eq!(QueryError::BadPageSize(-1).http_status(), 400);
        assert_eq!(QueryError::NotFound(String::new()).http_status(), 404);
        assert_eq!(QueryError::NotAuthenticated(String::new()).http_status(), 401);
        assert_eq!(QueryError::NotAuthorized(String::new()).http_status(), 403);
    }

    #[test]
    fn test_json_errors_split_syntax_from_shape() {
        let syntax = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(QueryError::from(syntax).code(), "InvalidJson");

        let shape = serde_json::from_str::<Vec<u8>>("{}").unwrap_err();
        assert_eq!(QueryError::from(shape).code(), "BadRequest");
    }

    #[test]
    fn test_store_not_found_maps_to_not_found() {
        let e = QueryError::from(StoreError::DatasetNotFound("D9".into()));
        assert_eq!(e.code(), "NotFound");
    }
}
