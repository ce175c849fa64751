//! Error types for statement construction and value decoding.

use thiserror::Error;

/// Raised while building or rendering a statement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// Sequential markers (`%@`, `\(label)`) and bound values disagree in count.
    #[error("Placeholder count mismatch: {placeholders} placeholders for {values} values")]
    PlaceholderMismatch { placeholders: usize, values: usize },

    /// A native `$n` marker points past the bound values.
    #[error("Placeholder ${0} has no bound value")]
    UnboundPlaceholder(usize),

    /// A bound value is never referenced by a native `$n` marker.
    #[error("Bound value {0} is never referenced")]
    UnusedValue(usize),

    #[error("Cannot mix `$n` markers with `%@` or `\\(label)` markers in one template")]
    MixedPlaceholders,

    #[error("Invalid placeholder: '{0}'")]
    InvalidPlaceholder(String),

    #[error("Unterminated {0} in statement template")]
    Unterminated(&'static str),

    /// SELECT without fields; `.all()` must be explicit.
    #[error("SELECT has no fields (use all() to select every column)")]
    EmptySelection,

    #[error("SELECT has no source")]
    EmptySource,

    #[error("UPDATE of '{0}' has no assignments")]
    EmptyUpdate(String),

    /// Text values cannot carry NUL bytes to the server.
    #[error("Value contains a NUL byte and cannot be inlined")]
    NullByte,
}

/// Raised while converting a received value into a native type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Unexpected NULL while decoding {0}")]
    UnexpectedNull(&'static str),

    #[error("Invalid {target} value: {text:?}")]
    Invalid { target: &'static str, text: String },

    #[error("Non-finite coordinate in point {0:?}")]
    NonFinite(String),

    #[error("Value is not valid UTF-8")]
    InvalidUtf8,

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Row {index} out of range ({count} rows)")]
    RowOutOfRange { index: usize, count: usize },

    #[error("Column '{column}': {source}")]
    Column {
        column: String,
        #[source]
        source: Box<DecodeError>,
    },
}

impl DecodeError {
    pub(crate) fn invalid<T>(text: impl Into<String>) -> Self {
        Self::Invalid {
            target: std::any::type_name::<T>(),
            text: text.into(),
        }
    }

    /// Attach the column a failure came from.
    pub fn in_column(self, column: impl Into<String>) -> Self {
        match self {
            err @ (Self::ColumnNotFound(_) | Self::RowOutOfRange { .. } | Self::Column { .. }) => {
                err
            }
            err => Self::Column {
                column: column.into(),
                source: Box::new(err),
            },
        }
    }
}

/// Result type alias for statement construction.
pub type CoreResult<T> = Result<T, QueryError>;
