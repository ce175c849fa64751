use super::{Render, unqualified};
use crate::components::QueryComponents;
use crate::dialect::escape_identifier;
use crate::error::CoreResult;
use crate::field::{Field, IntoField};
use crate::value::Value;

/// What an INSERT hands back.
#[derive(Debug, Clone, PartialEq)]
pub enum Returning {
    /// `RETURNING *`
    All,
    /// `RETURNING <field> AS <alias>`
    Field { field: Field, alias: String },
}

/// An INSERT of one row.
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    table: String,
    values: Vec<(Field, Value)>,
    returning: Option<Returning>,
}

impl Insert {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            values: Vec::new(),
            returning: None,
        }
    }

    /// Set a column. Setting the same column again replaces its value.
    pub fn value(mut self, field: impl IntoField, value: impl Into<Value>) -> Self {
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

    pub fn values<F: IntoField, V: Into<Value>>(self, pairs: impl IntoIterator<Item = (F, V)>) -> Self {
        pairs
            .into_iter()
            .fold(self, |insert, (field, value)| insert.value(field, value))
    }

    pub fn returning_all(mut self) -> Self {
        self.returning = Some(Returning::All);
        self
    }

    pub fn returning(mut self, field: impl IntoField, alias: impl Into<String>) -> Self {
        self.returning = Some(Returning::Field {
            field: field.into_field(),
            alias: alias.into(),
        });
        self
    }
}

impl Render for Insert {
    fn render_into(&self, out: &mut QueryComponents) -> CoreResult<()> {
        out.push_sql("INSERT INTO ");
        out.push_sql(&escape_identifier(&self.table));

        if self.values.is_empty() {
            out.push_sql(" DEFAULT VALUES");
        } else {
            let columns: Vec<String> = self.values.iter().map(|(field, _)| unqualified(field)).collect();
            out.push_sql(" (");
            out.push_sql(&columns.join(", "));
            out.push_sql(") VALUES (");
            for (i, (_, value)) in self.values.iter().enumerate() {
                if i > 0 {
                    out.push_sql(", ");
                }
                out.push_value(value.clone());
            }
            out.push_sql(")");
        }

        match &self.returning {
            Some(Returning::All) => {
                out.push_sql(" RETURNING *");
            }
            Some(Returning::Field { field, alias }) => {
                out.push_sql(" RETURNING ");
                out.push_sql(&escape_identifier(&field.qualified_name()));
                out.push_sql(" AS ");
                out.push_sql(&escape_identifier(alias));
            }
            None => {}
        }
        Ok(())
    }
}
