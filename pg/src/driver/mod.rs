//! PostgreSQL driver (async I/O).
//!
//! Connection methods are split across modules:
//! - `connection.rs` - struct, open/close, status
//! - `handshake.rs` - startup and authentication state machine (no I/O)
//! - `io.rs` - bounded waits, flush, recv
//! - `query.rs` - dispatch and result draining
//! - `transaction.rs` - transactions and savepoints
//! - `cancel.rs` - query cancellation

mod cancel;
mod connection;
mod handshake;
mod info;
mod io;
mod logger;
mod query;
mod result;
mod row;
mod status;
mod stream;
#[cfg(any(test, feature = "testing"))]
#[doc(hidden)]
pub mod testing;
mod transaction;

pub use cancel::CancelToken;
pub use connection::{Connection, Dispatch, DriverSettings, UnknownStatusPolicy};
pub use handshake::Handshake;
pub use info::{ConnectionInfo, DEFAULT_PORT, SslMode};
pub use logger::{Logger, TracingLogger};
pub use result::{FieldInfo, QueryResult, ResultStatus};
pub use row::Row;
pub use status::{ConnectionStatus, PollingStatus};

use quarry_core::{DecodeError, QueryError};
use thiserror::Error;

use crate::protocol::{EncodeError, ErrorFields};

/// Error type for PostgreSQL driver operations.
#[derive(Debug, Error)]
pub enum PgError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Auth error: {0}")]
    Auth(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// ErrorResponse from the server.
    #[error("{severity}: {message} (SQLSTATE {code})")]
    Server {
        severity: String,
        code: String,
        message: String,
        detail: Option<String>,
        hint: Option<String>,
    },

    #[error("Failed to send query: {0}")]
    Send(String),

    #[error("Failed to flush outbound data: {0}")]
    Flush(String),

    #[error("No result was returned")]
    NoResult,

    #[error("Connection is not ready (status {0:?})")]
    NotReady(ConnectionStatus),

    #[error("Results of the previous statement have not been drained")]
    Busy,

    #[error("A transaction is already active")]
    TransactionActive,

    #[error("No transaction is active")]
    TransactionInactive,

    #[error("Transaction aborted: {0}")]
    TransactionAborted(String),

    #[error("Timed out while {0}")]
    Timeout(&'static str),

    /// The connection can no longer be used and must be re-opened.
    #[error("Connection is broken: {0}")]
    Broken(String),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PgError {
    pub(crate) fn server(fields: ErrorFields) -> Self {
        PgError::Server {
            severity: fields.severity,
            code: fields.code,
            message: fields.message,
            detail: fields.detail,
            hint: fields.hint,
        }
    }

    /// SQLSTATE code, for server errors.
    pub fn code(&self) -> Option<&str> {
        match self {
            PgError::Server { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Human-readable text, as the server sent it where available.
    pub fn message(&self) -> String {
        match self {
            PgError::Server { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Whether the error leaves the connection unusable.
    pub(crate) fn is_fatal(&self) -> bool {
        matches!(
            self,
            PgError::Io(_)
                | PgError::Protocol(_)
                | PgError::Broken(_)
                | PgError::Send(_)
                | PgError::Flush(_)
                | PgError::Timeout(_)
        )
    }
}

/// Result type for PostgreSQL operations.
pub type PgResult<T> = Result<T, PgError>;

/// Affected-row count from a command tag (`INSERT 0 3`, `UPDATE 2`); 0 when absent.
pub(crate) fn parse_affected_rows(tag: &str) -> u64 {
    tag.split_whitespace()
        .last()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}
