//! Predicate trees for WHERE and ON clauses.

use crate::components::QueryComponents;
use crate::dialect::escape_identifier;
use crate::dsl::{Render, Select};
use crate::error::CoreResult;
use crate::field::{Field, IntoField};
use crate::value::Value;

/// Binary comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    ILike,
}

impl Comparison {
    pub fn as_sql(self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Ne => "<>",
            Comparison::Lt => "<",
            Comparison::Lte => "<=",
            Comparison::Gt => ">",
            Comparison::Gte => ">=",
            Comparison::Like => "LIKE",
            Comparison::ILike => "ILIKE",
        }
    }
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Field(Field),
    Value(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        left: Field,
        op: Comparison,
        right: Operand,
    },
    In {
        field: Field,
        values: Vec<Value>,
        negated: bool,
    },
    InSelect {
        field: Field,
        select: Box<Select>,
    },
    IsNull(Field),
    IsNotNull(Field),
    Not(Box<Predicate>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    pub fn and(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::And(mut left), Predicate::And(right)) => {
                left.extend(right);
                Predicate::And(left)
            }
            (Predicate::And(mut left), right) => {
                left.push(right);
                Predicate::And(left)
            }
            (left, right) => Predicate::And(vec![left, right]),
        }
    }

    pub fn or(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::Or(mut left), Predicate::Or(right)) => {
                left.extend(right);
                Predicate::Or(left)
            }
            (Predicate::Or(mut left), right) => {
                left.push(right);
                Predicate::Or(left)
            }
            (left, right) => Predicate::Or(vec![left, right]),
        }
    }

    pub fn negate(self) -> Predicate {
        Predicate::Not(Box::new(self))
    }

    fn is_compound(&self) -> bool {
        matches!(self, Predicate::And(_) | Predicate::Or(_))
    }

    fn render_group(
        children: &[Predicate],
        joiner: &str,
        identity: &str,
        out: &mut QueryComponents,
    ) -> CoreResult<()> {
        if children.is_empty() {
            out.push_sql(identity);
            return Ok(());
        }
        for (i, child) in children.iter().enumerate() {
            if i > 0 {
                out.push_sql(joiner);
            }
            if child.is_compound() {
                out.push_sql("(");
                child.render_into(out)?;
                out.push_sql(")");
            } else {
                child.render_into(out)?;
            }
        }
        Ok(())
    }
}

impl Render for Predicate {
    fn render_into(&self, out: &mut QueryComponents) -> CoreResult<()> {
        match self {
            Predicate::Compare { left, op, right } => {
                out.push_sql(&escape_identifier(&left.qualified_name()));
                out.push_sql(" ");
                out.push_sql(op.as_sql());
                out.push_sql(" ");
                match right {
                    Operand::Field(field) => {
                        out.push_sql(&escape_identifier(&field.qualified_name()));
                    }
                    Operand::Value(value) => {
                        out.push_value(value.clone());
                    }
                }
            }
            Predicate::In {
                field,
                values,
                negated,
            } => {
                if values.is_empty() {
                    // `x IN ()` is not valid SQL
                    out.push_sql(if *negated { "TRUE" } else { "FALSE" });
                    return Ok(());
                }
                out.push_sql(&escape_identifier(&field.qualified_name()));
                out.push_sql(if *negated { " NOT IN (" } else { " IN (" });
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        out.push_sql(", ");
                    }
                    out.push_value(value.clone());
                }
                out.push_sql(")");
            }
            Predicate::InSelect { field, select } => {
                out.push_sql(&escape_identifier(&field.qualified_name()));
                out.push_sql(" IN (");
                select.render_into(out)?;
                out.push_sql(")");
            }
            Predicate::IsNull(field) => {
                out.push_sql(&escape_identifier(&field.qualified_name()));
                out.push_sql(" IS NULL");
            }
            Predicate::IsNotNull(field) => {
                out.push_sql(&escape_identifier(&field.qualified_name()));
                out.push_sql(" IS NOT NULL");
            }
            Predicate::Not(inner) => {
                out.push_sql("NOT (");
                inner.render_into(out)?;
                out.push_sql(")");
            }
            Predicate::And(children) => Self::render_group(children, " AND ", "TRUE", out)?,
            Predicate::Or(children) => Self::render_group(children, " OR ", "FALSE", out)?,
        }
        Ok(())
    }
}

impl std::ops::BitAnd for Predicate {
    type Output = Predicate;

    fn bitand(self, rhs: Predicate) -> Predicate {
        self.and(rhs)
    }
}

impl std::ops::BitOr for Predicate {
    type Output = Predicate;

    fn bitor(self, rhs: Predicate) -> Predicate {
        self.or(rhs)
    }
}

impl std::ops::Not for Predicate {
    type Output = Predicate;

    fn not(self) -> Predicate {
        self.negate()
    }
}

/// Helper to create a comparison against a bound value
pub fn compare(field: impl IntoField, op: Comparison, value: impl Into<Value>) -> Predicate {
    Predicate::Compare {
        left: field.into_field(),
        op,
        right: Operand::Value(value.into()),
    }
}

/// Create an equality condition (field = value)
pub fn eq(field: impl IntoField, value: impl Into<Value>) -> Predicate {
    compare(field, Comparison::Eq, value)
}

pub fn ne(field: impl IntoField, value: impl Into<Value>) -> Predicate {
    compare(field, Comparison::Ne, value)
}

pub fn lt(field: impl IntoField, value: impl Into<Value>) -> Predicate {
    compare(field, Comparison::Lt, value)
}

pub fn lte(field: impl IntoField, value: impl Into<Value>) -> Predicate {
    compare(field, Comparison::Lte, value)
}

pub fn gt(field: impl IntoField, value: impl Into<Value>) -> Predicate {
    compare(field, Comparison::Gt, value)
}

pub fn gte(field: impl IntoField, value: impl Into<Value>) -> Predicate {
    compare(field, Comparison::Gte, value)
}

pub fn like(field: impl IntoField, pattern: impl Into<Value>) -> Predicate {
    compare(field, Comparison::Like, pattern)
}

pub fn ilike(field: impl IntoField, pattern: impl Into<Value>) -> Predicate {
    compare(field, Comparison::ILike, pattern)
}

/// Compare two columns, as in a join condition (left = right)
pub fn eq_field(left: impl IntoField, right: impl IntoField) -> Predicate {
    Predicate::Compare {
        left: left.into_field(),
        op: Comparison::Eq,
        right: Operand::Field(right.into_field()),
    }
}

pub fn is_in<V: Into<Value>>(field: impl IntoField, values: impl IntoIterator<Item = V>) -> Predicate {
    Predicate::In {
        field: field.into_field(),
        values: values.into_iter().map(Into::into).collect(),
        negated: false,
    }
}

pub fn not_in<V: Into<Value>>(field: impl IntoField, values: impl IntoIterator<Item = V>) -> Predicate {
    Predicate::In {
        field: field.into_field(),
        values: values.into_iter().map(Into::into).collect(),
        negated: true,
    }
}

pub fn in_select(field: impl IntoField, select: Select) -> Predicate {
    Predicate::InSelect {
        field: field.into_field(),
        select: Box::new(select),
    }
}

pub fn is_null(field: impl IntoField) -> Predicate {
    Predicate::IsNull(field.into_field())
}

pub fn is_not_null(field: impl IntoField) -> Predicate {
    Predicate::IsNotNull(field.into_field())
}
