//! Statement DSL: SELECT, INSERT, UPDATE and DELETE as plain data.
//!
//! Each statement renders into [`QueryComponents`] through [`Render`]. Nested
//! statements (subqueries) render into the same output, so their values
//! keep the outer statement's `$n` numbering.

mod delete;
mod insert;
mod select;
mod update;

pub use delete::Delete;
pub use insert::{Insert, Returning};
pub use select::Select;
pub use update::Update;

use crate::components::{IntoComponents, QueryComponents};
use crate::dialect::escape_identifier;
use crate::error::CoreResult;
use crate::field::{Field, IntoField};
use crate::predicate::Predicate;
use crate::value::Value;

/// Renders a statement or clause into parameterized components.
pub trait Render {
    fn render_into(&self, out: &mut QueryComponents) -> CoreResult<()>;

    fn to_components(&self) -> CoreResult<QueryComponents> {
        let mut out = QueryComponents::new();
        self.render_into(&mut out)?;
        Ok(out)
    }
}

macro_rules! statement_components {
    ($($t:ty),*) => {
        $(
            impl IntoComponents for $t {
                fn into_components(self) -> CoreResult<QueryComponents> {
                    self.to_components()
                }
            }

            impl IntoComponents for &$t {
                fn into_components(self) -> CoreResult<QueryComponents> {
                    self.to_components()
                }
            }
        )*
    };
}

statement_components!(Select, Insert, Update, Delete);

/// Scalar and aggregate functions usable as a selection or source.
#[derive(Debug, Clone, PartialEq)]
pub enum Function {
    /// `count(*)` when no field is given.
    Count(Option<Field>),
    Sum(Field),
    Avg(Field),
    Min(Field),
    Max(Field),
    Lower(Field),
    Upper(Field),
    /// Any other function, called with bound arguments.
    Call { name: String, args: Vec<Value> },
}

impl Function {
    pub fn count_all() -> Self {
        Function::Count(None)
    }

    pub fn count(field: impl IntoField) -> Self {
        Function::Count(Some(field.into_field()))
    }

    pub fn call<V: Into<Value>>(name: impl Into<String>, args: impl IntoIterator<Item = V>) -> Self {
        Function::Call {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl Render for Function {
    fn render_into(&self, out: &mut QueryComponents) -> CoreResult<()> {
        let (name, field) = match self {
            Function::Count(field) => ("count", field.as_ref()),
            Function::Sum(field) => ("sum", Some(field)),
            Function::Avg(field) => ("avg", Some(field)),
            Function::Min(field) => ("min", Some(field)),
            Function::Max(field) => ("max", Some(field)),
            Function::Lower(field) => ("lower", Some(field)),
            Function::Upper(field) => ("upper", Some(field)),
            Function::Call { name, args } => {
                out.push_sql(&escape_identifier(name));
                out.push_sql("(");
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_sql(", ");
                    }
                    out.push_value(arg.clone());
                }
                out.push_sql(")");
                return Ok(());
            }
        };
        out.push_sql(name);
        out.push_sql("(");
        match field {
            Some(field) => out.push_sql(&escape_identifier(&field.qualified_name())),
            None => out.push_sql("*"),
        };
        out.push_sql(")");
        Ok(())
    }
}

/// One entry of a SELECT list.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// `*`
    All,
    /// A plain column name, rendered as given.
    Name(String),
    Field(Field),
    Subquery { select: Box<Select>, alias: String },
    Function { function: Function, alias: String },
}

/// One entry of a FROM list.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Table(String),
    Subquery { select: Box<Select>, alias: String },
    Function { function: Function, alias: String },
}

impl From<&str> for Source {
    fn from(table: &str) -> Self {
        Source::Table(table.to_string())
    }
}

impl From<String> for Source {
    fn from(table: String) -> Self {
        Source::Table(table)
    }
}

fn render_aliased(
    inner: &dyn Render,
    parenthesize: bool,
    alias: &str,
    out: &mut QueryComponents,
) -> CoreResult<()> {
    if parenthesize {
        out.push_sql("(");
    }
    inner.render_into(out)?;
    if parenthesize {
        out.push_sql(")");
    }
    out.push_sql(" AS ");
    out.push_sql(&escape_identifier(alias));
    Ok(())
}

impl Render for Selection {
    fn render_into(&self, out: &mut QueryComponents) -> CoreResult<()> {
        match self {
            Selection::All => {
                out.push_sql("*");
            }
            Selection::Name(name) => {
                out.push_sql(&escape_identifier(name));
            }
            Selection::Field(field) => {
                out.push_sql(&escape_identifier(&field.qualified_name()));
            }
            Selection::Subquery { select, alias } => render_aliased(select.as_ref(), true, alias, out)?,
            Selection::Function { function, alias } => render_aliased(function, false, alias, out)?,
        }
        Ok(())
    }
}

impl Render for Source {
    fn render_into(&self, out: &mut QueryComponents) -> CoreResult<()> {
        match self {
            Source::Table(name) => {
                out.push_sql(&escape_identifier(name));
            }
            Source::Subquery { select, alias } => render_aliased(select.as_ref(), true, alias, out)?,
            Source::Function { function, alias } => render_aliased(function, false, alias, out)?,
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl JoinKind {
    fn as_sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Full => "FULL JOIN",
            JoinKind::Cross => "CROSS JOIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub source: Source,
    pub on: Option<Predicate>,
}

impl Render for Join {
    fn render_into(&self, out: &mut QueryComponents) -> CoreResult<()> {
        out.push_sql(self.kind.as_sql());
        out.push_sql(" ");
        self.source.render_into(out)?;
        if let Some(on) = &self.on {
            out.push_sql(" ON ");
            on.render_into(out)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub field: Field,
    pub direction: Direction,
}

impl Render for Order {
    fn render_into(&self, out: &mut QueryComponents) -> CoreResult<()> {
        out.push_sql(&escape_identifier(&self.field.qualified_name()));
        out.push_sql(match self.direction {
            Direction::Asc => " ASC",
            Direction::Desc => " DESC",
        });
        Ok(())
    }
}

/// Render `items` separated by `", "`.
fn render_list<T: Render>(items: &[T], out: &mut QueryComponents) -> CoreResult<()> {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_sql(", ");
        }
        item.render_into(out)?;
    }
    Ok(())
}

/// Column name for INSERT column lists and SET clauses, without its table.
fn unqualified(field: &Field) -> String {
    escape_identifier(field.unqualified_name())
}
