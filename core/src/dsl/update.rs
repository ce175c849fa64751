use super::{Render, unqualified};
use crate::components::QueryComponents;
use crate::dialect::escape_identifier;
use crate::error::{CoreResult, QueryError};
use crate::field::{Field, IntoField};
use crate::predicate::Predicate;
use crate::value::Value;

/// An UPDATE. SET targets are written unqualified.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    table: String,
    values: Vec<(Field, Value)>,
    predicate: Option<Predicate>,
}

impl Update {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            values: Vec::new(),
            predicate: None,
        }
    }

    /// Set a column. Setting the same column again replaces its value.
    pub fn set(mut self, field: impl IntoField, value: impl Into<Value>) -> Self {
        let field = field.into_field();
        let value = value.into();
        match self
            .values
            .iter_mut()
            .find(|(existing, _)| existing.unqualified_name() == field.unqualified_name())
        {
            Some(slot) => slot.1 = value,
            None => self.values.push((field, value)),
        }
        self
    }

    pub fn set_all<F: IntoField, V: Into<Value>>(self, pairs: impl IntoIterator<Item = (F, V)>) -> Self {
        pairs
            .into_iter()
            .fold(self, |update, (field, value)| update.set(field, value))
    }

    /// Add a WHERE condition, ANDed with any existing one.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }
}

impl Render for Update {
    fn render_into(&self, out: &mut QueryComponents) -> CoreResult<()> {
        if self.values.is_empty() {
            return Err(QueryError::EmptyUpdate(self.table.clone()));
        }
        out.push_sql("UPDATE ");
        out.push_sql(&escape_identifier(&self.table));
        out.push_sql(" SET ");
        for (i, (field, value)) in self.values.iter().enumerate() {
            if i > 0 {
                out.push_sql(", ");
            }
            out.push_sql(&unqualified(field));
            out.push_sql(" = ");
            out.push_value(value.clone());
        }
        if let Some(predicate) = &self.predicate {
            out.push_sql(" WHERE ");
            predicate.render_into(out)?;
        }
        Ok(())
    }
}
