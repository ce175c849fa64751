//! Placeholder numbering and identifier quoting per SQL dialect.

/// SQL reserved words that must be quoted when used as identifiers.
pub const RESERVED_WORDS: &[&str] = &[
    "all", "and", "as", "asc", "between", "case", "check", "constraint", "create", "default",
    "delete", "desc", "distinct", "else", "end", "false", "foreign", "from", "group", "having",
    "in", "index", "inner", "insert", "is", "join", "key", "left", "like", "limit", "not", "null",
    "offset", "on", "or", "order", "outer", "primary", "references", "right", "select", "table",
    "then", "true", "union", "update", "user", "when", "where",
];

/// How bound-value markers are spelled in rendered SQL.
pub trait Dialect {
    /// Marker for the value at `index` (1-based).
    fn placeholder(&self, index: usize) -> String;

    fn quote_identifier(&self, name: &str) -> String {
        escape_identifier(name)
    }
}

/// PostgreSQL: `$1`, `$2`, ...
#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Dialect for Postgres {
    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }
}

/// Positional `?` markers.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuestionMark;

impl Dialect for QuestionMark {
    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }
}

/// Escape an identifier if it's a reserved word or contains special chars.
/// Dotted identifiers (`table.column`) are quoted part by part.
pub fn escape_identifier(name: &str) -> String {
    if name == "*" {
        return name.to_string();
    }
    if name.contains('.') {
        return name
            .split('.')
            .map(escape_single_identifier)
            .collect::<Vec<_>>()
            .join(".");
    }
    escape_single_identifier(name)
}

fn escape_single_identifier(name: &str) -> String {
    if name == "*" {
        return name.to_string();
    }
    let lower = name.to_lowercase();
    let needs_escaping = name.is_empty()
        || RESERVED_WORDS.contains(&lower.as_str())
        || name.chars().any(|c| !c.is_alphanumeric() && c != '_')
        || name.chars().next().is_some_and(|c| c.is_numeric());

    if needs_escaping {
        format!("\"{}\"", name.replace('"', "\"\""))
    } else {
        name.to_string()
    }
}
