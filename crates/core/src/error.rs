//! Error type shared by every core service.
//!
//! Services return typed kinds; the HTTP edge maps them to status codes.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input: bad body, bad query, invalid date format.
    #[error("{0}")]
    BadRequest(String),

    /// Missing or invalid credentials, blacklisted token.
    #[error("{0}")]
    Unauthenticated(String),

    /// Permission, role or ownership check failed.
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// Version mismatch, duplicate key or workflow precondition violated.
    #[error("{0}")]
    Conflict(String),

    /// Edit mode engaged for a non-master user.
    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("database error: {0}")]
    Database(String),
}

impl Error {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        Self::Unauthenticated(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Database(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_message_passthrough() {
        let err = Error::conflict("data conflict: please refresh");
        assert_eq!(err.to_string(), "data conflict: please refresh");
    }

    #[test]
    fn test_database_error_from_rusqlite() {
        let err: Error = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, Error::Database(_)));
    }
}
