//! Completed command results.

use std::collections::HashMap;
use std::sync::OnceLock;

use quarry_core::{DecodeError, Value, decode_bytea};

use super::parse_affected_rows;
use super::row::Row;
use crate::protocol::{FieldDescription, is_binary_affinity, oid};

/// Outcome classification of one command.
///
/// A `QueryResult` handed to a caller is never `BadResponse` or
/// `FatalError`: those surface as errors from the executing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultStatus {
    EmptyQuery,
    CommandOk,
    TuplesOk,
    CopyOut,
    CopyIn,
    CopyBoth,
    SingleTuple,
    BadResponse,
    FatalError,
    /// A response this driver does not classify.
    Unknown,
}

impl ResultStatus {
    pub fn is_successful(self) -> bool {
        !matches!(self, ResultStatus::BadResponse | ResultStatus::FatalError)
    }
}

/// Metadata of one result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: String,
    pub index: usize,
    pub type_oid: u32,
    /// Source table, 0 when the column is computed.
    pub table_oid: u32,
}

type RawRow = Vec<Option<Vec<u8>>>;

/// Rows and metadata of one completed command.
///
/// Owns the received payload. [`clear`](Self::clear) releases it early;
/// dropping releases whatever is left.
#[derive(Debug)]
pub struct QueryResult {
    status: ResultStatus,
    fields: Vec<FieldInfo>,
    rows: Vec<RawRow>,
    command_tag: Option<String>,
    copy_data: Vec<Vec<u8>>,
    affected: OnceLock<u64>,
    field_map: OnceLock<HashMap<String, usize>>,
}

impl QueryResult {
    pub(crate) fn new(
        status: ResultStatus,
        fields: Option<Vec<FieldDescription>>,
        rows: Vec<RawRow>,
        command_tag: Option<String>,
    ) -> Self {
        let fields = fields
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(index, field)| FieldInfo {
                name: field.name,
                index,
                type_oid: field.type_oid,
                table_oid: field.table_oid,
            })
            .collect();
        Self {
            status,
            fields,
            rows,
            command_tag,
            copy_data: Vec::new(),
            affected: OnceLock::new(),
            field_map: OnceLock::new(),
        }
    }

    pub(crate) fn with_copy_data(mut self, chunks: Vec<Vec<u8>>) -> Self {
        self.copy_data = chunks;
        self
    }

    pub fn status(&self) -> ResultStatus {
        self.status
    }

    /// `SELECT 3`, `INSERT 0 1`, ...
    pub fn command_tag(&self) -> Option<&str> {
        self.command_tag.as_deref()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows touched, from the command tag; 0 when the tag carries no count.
    pub fn affected_rows(&self) -> u64 {
        *self
            .affected
            .get_or_init(|| self.command_tag.as_deref().map(parse_affected_rows).unwrap_or(0))
    }

    /// Columns in server order.
    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Index of the first column called `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.field_map
            .get_or_init(|| {
                let mut map = HashMap::with_capacity(self.fields.len());
                for field in &self.fields {
                    map.entry(field.name.clone()).or_insert(field.index);
                }
                map
            })
            .get(name)
            .copied()
    }

    pub fn row(&self, index: usize) -> Result<Row<'_>, DecodeError> {
        if index >= self.rows.len() {
            return Err(DecodeError::RowOutOfRange {
                index,
                count: self.rows.len(),
            });
        }
        Ok(Row::new(self, index))
    }

    pub fn iter(&self) -> impl Iterator<Item = Row<'_>> {
        (0..self.rows.len()).map(move |index| Row::new(self, index))
    }

    /// Chunks received from `COPY ... TO STDOUT`.
    pub fn copy_data(&self) -> &[Vec<u8>] {
        &self.copy_data
    }

    /// Release the row payload now. Safe to call more than once.
    pub fn clear(&mut self) {
        self.rows = Vec::new();
        self.copy_data = Vec::new();
    }

    /// Value of a cell; NULL stays [`Value::Null`].
    pub(crate) fn value_at(&self, row: usize, column: usize) -> Value {
        let raw = self
            .rows
            .get(row)
            .and_then(|r| r.get(column))
            .and_then(|cell| cell.as_deref());
        let type_oid = self.fields.get(column).map_or(0, |f| f.type_oid);
        to_value(raw, type_oid)
    }
}

impl<'a> IntoIterator for &'a QueryResult {
    type Item = Row<'a>;
    type IntoIter = Box<dyn Iterator<Item = Row<'a>> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

/// Text-format cell to a [`Value`]. bytea arrives hex-encoded and is decoded;
/// other binary-affinity types (geometry) are kept as raw bytes.
fn to_value(raw: Option<&[u8]>, type_oid: u32) -> Value {
    match raw {
        None => Value::Null,
        Some(bytes) if type_oid == oid::BYTEA => {
            Value::Bytes(decode_bytea(bytes).unwrap_or_else(|| bytes.to_vec()))
        }
        Some(bytes) if is_binary_affinity(type_oid) => Value::Bytes(bytes.to_vec()),
        Some(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => Value::Text(text.to_string()),
            Err(_) => Value::Bytes(bytes.to_vec()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn field(name: &str, type_oid: u32) -> FieldDescription {
        FieldDescription {
            name: name.to_string(),
            table_oid: 0,
            column_attr: 0,
            type_oid,
            type_size: -1,
            type_modifier: -1,
            format: 0,
        }
    }

    fn artists() -> QueryResult {
        QueryResult::new(
            ResultStatus::TuplesOk,
            Some(vec![field("id", oid::INT4), field("name", oid::TEXT), field("id", oid::INT4)]),
            vec![
                vec![Some(b"1".to_vec()), Some(b"Josh Rouse".to_vec()), Some(b"9".to_vec())],
                vec![Some(b"2".to_vec()), None, None],
            ],
            Some("SELECT 2".to_string()),
        )
    }

    #[test]
    fn test_counts() {
        let result = artists();
        assert_eq!(result.row_count(), 2);
        assert_eq!(result.affected_rows(), 2);
        assert_eq!(result.field_names().collect::<Vec<_>>(), vec!["id", "name", "id"]);
    }

    #[test]
    fn test_unparseable_tag_counts_zero() {
        let result = QueryResult::new(ResultStatus::CommandOk, None, vec![], Some("CREATE TABLE".into()));
        assert_eq!(result.affected_rows(), 0);
    }

    #[test]
    fn test_first_duplicate_column_wins() {
        let result = artists();
        assert_eq!(result.column_index("id"), Some(0));
        assert_eq!(result.column_index("name"), Some(1));
        assert_eq!(result.column_index("genre"), None);
    }

    #[test]
    fn test_null_stays_null() {
        let result = artists();
        assert_eq!(result.value_at(1, 1), Value::Null);
        assert_eq!(result.value_at(0, 1), Value::from("Josh Rouse"));
    }

    #[test]
    fn test_bytea_and_geometry() {
        assert_eq!(to_value(Some(b"\\x0aff"), oid::BYTEA), Value::Bytes(vec![10, 255]));
        assert_eq!(to_value(Some(b"(1,2)"), oid::POINT), Value::Bytes(b"(1,2)".to_vec()));
        assert_eq!(to_value(Some(&[0xff]), oid::TEXT), Value::Bytes(vec![0xff]));
    }

    #[test]
    fn test_row_out_of_range() {
        let result = artists();
        assert!(matches!(
            result.row(5),
            Err(DecodeError::RowOutOfRange { index: 5, count: 2 })
        ));
    }

    #[test]
    fn test_clear_twice() {
        let mut result = artists();
        result.clear();
        result.clear();
        assert_eq!(result.row_count(), 0);
        assert_eq!(result.iter().count(), 0);
    }
}
