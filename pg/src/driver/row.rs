//! Borrowed row view with on-demand decoding.

use quarry_core::{ColumnKey, ColumnRef, DecodeError, FromValue, Value};

use super::result::QueryResult;

/// One row of a [`QueryResult`]. Values are decoded per access.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    result: &'a QueryResult,
    index: usize,
}

impl<'a> Row<'a> {
    pub(crate) fn new(result: &'a QueryResult, index: usize) -> Self {
        Self { result, index }
    }

    /// Position of this row in its result.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.result.fields().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve a key to a column index.
    ///
    /// A [`Field`](quarry_core::Field) matches its qualified name first, then its
    /// bare column name, since the server labels columns unqualified.
    pub fn column_index(&self, key: impl ColumnKey) -> Result<usize, DecodeError> {
        match key.column_ref() {
            ColumnRef::Index(index) if index < self.len() => Ok(index),
            ColumnRef::Index(index) => Err(DecodeError::ColumnNotFound(index.to_string())),
            ColumnRef::Name(name) => self
                .result
                .column_index(name)
                .ok_or_else(|| DecodeError::ColumnNotFound(name.to_string())),
            ColumnRef::Field(field) => self
                .result
                .column_index(&field.qualified_name())
                .or_else(|| self.result.column_index(field.unqualified_name()))
                .ok_or_else(|| DecodeError::ColumnNotFound(field.qualified_name())),
        }
    }

    /// Raw value of a column.
    pub fn value(&self, key: impl ColumnKey) -> Result<Value, DecodeError> {
        let column = self.column_index(key)?;
        Ok(self.result.value_at(self.index, column))
    }

    /// Decode a column into `T`.
    pub fn get<T: FromValue>(&self, key: impl ColumnKey) -> Result<T, DecodeError> {
        let column = self.column_index(key)?;
        T::from_value(self.result.value_at(self.index, column))
            .map_err(|e| e.in_column(self.result.fields()[column].name.clone()))
    }

    pub fn is_null(&self, key: impl ColumnKey) -> Result<bool, DecodeError> {
        Ok(self.value(key)?.is_null())
    }

    /// All values in column order.
    pub fn values(&self) -> Vec<Value> {
        (0..self.len())
            .map(|column| self.result.value_at(self.index, column))
            .collect()
    }
}
