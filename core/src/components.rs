//! Parameterized statement fragments.
//!
//! A [`QueryComponents`] is an ordered list of literal SQL and placeholder
//! fragments plus the values bound to them. Placeholders are stored as
//! indices into the value list, so two components can be concatenated and
//! the right-hand side's markers are renumbered by the left-hand side's
//! value count. Numbering (`$1..$N`, `?`) happens only at render time.

use crate::dialect::{Dialect, Postgres};
use crate::error::{CoreResult, QueryError};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Sql(String),
    /// Index into the bound values (0-based).
    Param(usize),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryComponents {
    fragments: Vec<Fragment>,
    values: Vec<Value>,
}

impl QueryComponents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Literal SQL with no bound values. The text is taken verbatim.
    pub fn from_sql(sql: impl Into<String>) -> Self {
        let sql = sql.into();
        let fragments = if sql.is_empty() {
            Vec::new()
        } else {
            vec![Fragment::Sql(sql)]
        };
        Self {
            fragments,
            values: Vec::new(),
        }
    }

    /// Parse a statement template against its values.
    ///
    /// Markers are either sequential (`%@` or `\(label)`, bound in order) or
    /// native (`$n`, 1-based, may repeat). The two styles cannot be mixed.
    /// Markers inside quoted strings, quoted identifiers, dollar-quoted
    /// bodies and comments are left alone.
    pub fn parse<I, V>(template: &str, values: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        let bytes = template.as_bytes();
        let mut out = Self::new();
        let mut literal_start = 0;
        let mut sequential = 0usize;
        let mut native = false;
        let mut i = 0;

        while i < bytes.len() {
            let next = bytes.get(i + 1).copied();
            match bytes[i] {
                quote @ (b'\'' | b'"') => {
                    let backslash_escapes =
                        quote == b'\'' && i > 0 && matches!(bytes[i - 1], b'E' | b'e');
                    i = skip_quoted(bytes, i, quote, backslash_escapes)?;
                }
                b'-' if next == Some(b'-') => {
                    i = template[i..].find('\n').map_or(bytes.len(), |pos| i + pos + 1);
                }
                b'/' if next == Some(b'*') => {
                    let end = template[i + 2..]
                        .find("*/")
                        .ok_or(QueryError::Unterminated("block comment"))?;
                    i += 2 + end + 2;
                }
                b'%' if next == Some(b'@') => {
                    out.push_sql(&template[literal_start..i]);
                    out.fragments.push(Fragment::Param(sequential));
                    sequential += 1;
                    i += 2;
                    literal_start = i;
                }
                b'\\' if next == Some(b'(') => {
                    let close = template[i + 2..]
                        .find(')')
                        .ok_or(QueryError::Unterminated("\\( marker"))?;
                    out.push_sql(&template[literal_start..i]);
                    out.fragments.push(Fragment::Param(sequential));
                    sequential += 1;
                    i += 2 + close + 1;
                    literal_start = i;
                }
                b'$' if i == 0 || !is_ident_byte(bytes[i - 1]) => {
                    if next.is_some_and(|b| b.is_ascii_digit()) {
                        let digits_end = bytes[i + 1..]
                            .iter()
                            .position(|b| !b.is_ascii_digit())
                            .map_or(bytes.len(), |pos| i + 1 + pos);
                        let marker = &template[i..digits_end];
                        let n: usize = marker[1..]
                            .parse()
                            .map_err(|_| QueryError::InvalidPlaceholder(marker.to_string()))?;
                        if n == 0 {
                            return Err(QueryError::InvalidPlaceholder(marker.to_string()));
                        }
                        out.push_sql(&template[literal_start..i]);
                        out.fragments.push(Fragment::Param(n - 1));
                        native = true;
                        i = digits_end;
                        literal_start = i;
                    } else if let Some(tag_end) = dollar_tag_end(bytes, i) {
                        let delimiter = &template[i..=tag_end];
                        let body = tag_end + 1;
                        let close = template[body..]
                            .find(delimiter)
                            .ok_or(QueryError::Unterminated("dollar-quoted string"))?;
                        i = body + close + delimiter.len();
                    } else {
                        i += 1;
                    }
                }
                _ => i += 1,
            }
        }
        out.push_sql(&template[literal_start..]);

        if native && sequential > 0 {
            return Err(QueryError::MixedPlaceholders);
        }
        if native {
            let mut referenced = vec![false; values.len()];
            for fragment in &out.fragments {
                if let Fragment::Param(index) = fragment {
                    match referenced.get_mut(*index) {
                        Some(seen) => *seen = true,
                        None => return Err(QueryError::UnboundPlaceholder(index + 1)),
                    }
                }
            }
            if let Some(unused) = referenced.iter().position(|seen| !seen) {
                return Err(QueryError::UnusedValue(unused + 1));
            }
        } else if sequential != values.len() {
            return Err(QueryError::PlaceholderMismatch {
                placeholders: sequential,
                values: values.len(),
            });
        }

        out.values = values;
        Ok(out)
    }

    /// Append literal SQL, taken verbatim.
    pub fn push_sql(&mut self, sql: &str) -> &mut Self {
        if sql.is_empty() {
            return self;
        }
        match self.fragments.last_mut() {
            Some(Fragment::Sql(last)) => last.push_str(sql),
            _ => self.fragments.push(Fragment::Sql(sql.to_string())),
        }
        self
    }

    /// Append a placeholder bound to `value`.
    pub fn push_value(&mut self, value: impl Into<Value>) -> &mut Self {
        self.fragments.push(Fragment::Param(self.values.len()));
        self.values.push(value.into());
        self
    }

    /// Concatenate `other` onto `self`, separated by a space.
    ///
    /// Placeholders in `other` are shifted past the values already bound
    /// here, so the combined statement still numbers `$1..$N` in order.
    pub fn append(&mut self, other: QueryComponents) -> &mut Self {
        if other.fragments.is_empty() {
            self.values.extend(other.values);
            return self;
        }
        if self.ends_with_token() && other.starts_with_token() {
            self.push_sql(" ");
        }
        let offset = self.values.len();
        for fragment in other.fragments {
            match fragment {
                Fragment::Sql(sql) => {
                    self.push_sql(&sql);
                }
                Fragment::Param(index) => self.fragments.push(Fragment::Param(index + offset)),
            }
        }
        self.values.extend(other.values);
        self
    }

    /// By-value form of [`append`](Self::append).
    pub fn appending(mut self, other: QueryComponents) -> Self {
        self.append(other);
        self
    }

    fn ends_with_token(&self) -> bool {
        match self.fragments.last() {
            Some(Fragment::Sql(sql)) => !sql.ends_with(char::is_whitespace),
            Some(Fragment::Param(_)) => true,
            None => false,
        }
    }

    fn starts_with_token(&self) -> bool {
        match self.fragments.first() {
            Some(Fragment::Sql(sql)) => !sql.starts_with(char::is_whitespace),
            Some(Fragment::Param(_)) => true,
            None => false,
        }
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Values in marker order, repeating any value whose marker repeats.
    /// Needed for positional dialects such as [`QuestionMark`](crate::dialect::QuestionMark).
    pub fn positional_values(&self) -> Vec<Value> {
        self.fragments
            .iter()
            .filter_map(|fragment| match fragment {
                Fragment::Param(index) => self.values.get(*index).cloned(),
                Fragment::Sql(_) => None,
            })
            .collect()
    }

    /// Render with a caller-supplied marker for each 1-based value index.
    pub fn render_with(&self, placeholder: impl Fn(usize) -> String) -> String {
        let mut sql = String::new();
        for fragment in &self.fragments {
            match fragment {
                Fragment::Sql(text) => sql.push_str(text),
                Fragment::Param(index) => sql.push_str(&placeholder(index + 1)),
            }
        }
        sql
    }

    /// Render with PostgreSQL `$n` markers.
    pub fn to_sql(&self) -> String {
        self.sql_for(&Postgres)
    }

    pub fn sql_for(&self, dialect: &dyn Dialect) -> String {
        self.render_with(|index| dialect.placeholder(index))
    }

    /// Render with every value written inline as an escaped literal.
    ///
    /// Used where the extended protocol is unavailable, such as
    /// multi-statement batches.
    pub fn to_inline_sql(&self) -> CoreResult<String> {
        let mut sql = String::new();
        for fragment in &self.fragments {
            match fragment {
                Fragment::Sql(text) => sql.push_str(text),
                Fragment::Param(index) => {
                    let value = self
                        .values
                        .get(*index)
                        .ok_or(QueryError::UnboundPlaceholder(index + 1))?;
                    sql.push_str(&inline_literal(value)?);
                }
            }
        }
        Ok(sql)
    }
}

/// Escape one value as a SQL literal.
pub fn inline_literal(value: &Value) -> CoreResult<String> {
    match value {
        Value::Null => Ok("NULL".to_string()),
        Value::Text(text) => {
            if text.contains('\0') {
                return Err(QueryError::NullByte);
            }
            Ok(format!("'{}'", text.replace('\'', "''")))
        }
        Value::Bytes(bytes) => Ok(format!("'\\x{}'::bytea", hex::encode(bytes))),
    }
}

impl std::fmt::Display for QueryComponents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_sql())
    }
}

impl std::ops::Add for QueryComponents {
    type Output = QueryComponents;

    fn add(self, rhs: QueryComponents) -> QueryComponents {
        self.appending(rhs)
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

/// Index just past the closing quote of the quoted run starting at `start`.
fn skip_quoted(bytes: &[u8], start: usize, quote: u8, backslash_escapes: bool) -> CoreResult<usize> {
    let mut i = start + 1;
    while i < bytes.len() {
        let b = bytes[i];
        if backslash_escapes && b == b'\\' {
            i += 2;
            continue;
        }
        if b == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return Ok(i + 1);
        }
        i += 1;
    }
    Err(QueryError::Unterminated(if quote == b'"' {
        "quoted identifier"
    } else {
        "string literal"
    }))
}

/// If a `$tag$` opening delimiter starts at `start`, the index of its closing `$`.
fn dollar_tag_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start + 1;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'$' {
            return Some(i);
        }
        let valid = if i == start + 1 {
            b.is_ascii_alphabetic() || b == b'_' || b >= 0x80
        } else {
            is_ident_byte(b)
        };
        if !valid {
            return None;
        }
        i += 1;
    }
    None
}

/// Anything that can be turned into a statement for execution.
pub trait IntoComponents {
    fn into_components(self) -> CoreResult<QueryComponents>;
}

impl IntoComponents for QueryComponents {
    fn into_components(self) -> CoreResult<QueryComponents> {
        Ok(self)
    }
}

impl IntoComponents for &QueryComponents {
    fn into_components(self) -> CoreResult<QueryComponents> {
        Ok(self.clone())
    }
}

impl IntoComponents for &str {
    fn into_components(self) -> CoreResult<QueryComponents> {
        Ok(QueryComponents::from_sql(self))
    }
}

impl IntoComponents for String {
    fn into_components(self) -> CoreResult<QueryComponents> {
        Ok(QueryComponents::from_sql(self))
    }
}
