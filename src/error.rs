//! Error types for quarry.

use quarry_core::{DecodeError, QueryError};
use quarry_pg::PgError;
use thiserror::Error;

/// The main error type for quarry operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Pg(#[from] PgError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Update or delete of a model that was never inserted.
    #[error("Model of '{0}' has no primary key")]
    MissingPrimaryKey(&'static str),

    /// INSERT ... RETURNING produced no key.
    #[error("Did not receive the returned primary key from '{0}'")]
    MissingReturnedKey(&'static str),

    #[error("Could not find inserted row in '{table}' with primary key {key}")]
    NotFoundAfterInsert { table: &'static str, key: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// SQLSTATE code, for errors reported by the server.
    pub fn code(&self) -> Option<&str> {
        match self {
            Error::Pg(e) => e.code(),
            _ => None,
        }
    }
}

/// Result type alias for quarry operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::MissingPrimaryKey("artists").to_string(),
            "Model of 'artists' has no primary key"
        );
        let err = Error::NotFoundAfterInsert {
            table: "artists",
            key: "7".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Could not find inserted row in 'artists' with primary key 7"
        );
    }

    #[test]
    fn test_wrapped_errors_keep_their_text() {
        let err: Error = QueryError::EmptySelection.into();
        assert_eq!(err.to_string(), QueryError::EmptySelection.to_string());
        assert_eq!(err.code(), None);
    }
}
