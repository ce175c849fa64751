//! Column references.

use std::borrow::Cow;
use std::fmt::Debug;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// A column, optionally qualified by its table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    table: Option<Cow<'static, str>>,
    name: Cow<'static, str>,
}

impl Field {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            table: None,
            name: name.into(),
        }
    }

    pub fn qualified(table: impl Into<Cow<'static, str>>, name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            table: Some(table.into()),
            name: name.into(),
        }
    }

    /// Parse `table.column` or a bare `column`.
    pub fn parse(reference: &str) -> Self {
        match reference.rsplit_once('.') {
            Some((table, name)) => Self::qualified(table.to_string(), name.to_string()),
            None => Self::new(reference.to_string()),
        }
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// Column name without its table.
    pub fn unqualified_name(&self) -> &str {
        &self.name
    }

    /// `table.column`, or the bare name when unqualified.
    pub fn qualified_name(&self) -> String {
        match &self.table {
            Some(table) => format!("{}.{}", table, self.name),
            None => self.name.to_string(),
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.qualified_name())
    }
}

/// The field enumeration of a model: one variant per mapped column.
///
/// ```ignore
/// #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// enum ArtistField { Id, Name, Genre }
///
/// impl FieldDescriptor for ArtistField {
///     const TABLE: &'static str = "artists";
///     fn name(self) -> &'static str { match self { Self::Id => "id", Self::Name => "name", Self::Genre => "genre" } }
///     fn all() -> &'static [Self] { &[Self::Id, Self::Name, Self::Genre] }
/// }
/// ```
pub trait FieldDescriptor: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    const TABLE: &'static str;

    fn name(self) -> &'static str;

    fn all() -> &'static [Self];

    fn field(self) -> Field {
        Field::qualified(Self::TABLE, self.name())
    }

    fn qualified_name(self) -> String {
        format!("{}.{}", Self::TABLE, self.name())
    }
}

/// Anything usable where a column reference is expected.
pub trait IntoField {
    fn into_field(self) -> Field;
}

impl IntoField for Field {
    fn into_field(self) -> Field {
        self
    }
}

impl IntoField for &Field {
    fn into_field(self) -> Field {
        self.clone()
    }
}

impl IntoField for &str {
    fn into_field(self) -> Field {
        Field::parse(self)
    }
}

impl IntoField for String {
    fn into_field(self) -> Field {
        Field::parse(&self)
    }
}

impl<D: FieldDescriptor> IntoField for D {
    fn into_field(self) -> Field {
        self.field()
    }
}

/// How a row column is looked up.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnRef<'a> {
    Index(usize),
    /// Exact result-column name.
    Name(&'a str),
    /// Tried by qualified name first, then by bare name.
    Field(Field),
}

/// Anything that names a column of a result row.
pub trait ColumnKey {
    fn column_ref(&self) -> ColumnRef<'_>;
}

impl ColumnKey for usize {
    fn column_ref(&self) -> ColumnRef<'_> {
        ColumnRef::Index(*self)
    }
}

impl ColumnKey for &str {
    fn column_ref(&self) -> ColumnRef<'_> {
        ColumnRef::Name(self)
    }
}

impl ColumnKey for String {
    fn column_ref(&self) -> ColumnRef<'_> {
        ColumnRef::Name(self)
    }
}

impl ColumnKey for Field {
    fn column_ref(&self) -> ColumnRef<'_> {
        ColumnRef::Field(self.clone())
    }
}

impl ColumnKey for &Field {
    fn column_ref(&self) -> ColumnRef<'_> {
        ColumnRef::Field((*self).clone())
    }
}

impl<D: FieldDescriptor> ColumnKey for D {
    fn column_ref(&self) -> ColumnRef<'_> {
        ColumnRef::Field(self.field())
    }
}
