use super::Render;
use crate::components::QueryComponents;
use crate::dialect::escape_identifier;
use crate::error::CoreResult;
use crate::predicate::Predicate;

#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    table: String,
    predicate: Option<Predicate>,
}

impl Delete {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            predicate: None,
        }
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

impl Render for Delete {
    fn render_into(&self, out: &mut QueryComponents) -> CoreResult<()> {
        out.push_sql("DELETE FROM ");
        out.push_sql(&escape_identifier(&self.table));
        if let Some(predicate) = &self.predicate {
            out.push_sql(" WHERE ");
            predicate.render_into(out)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::{eq, is_in};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_delete() {
        let q = Delete::table("albums")
            .filter(eq("albums.artist_id", 3))
            .filter(is_in("albums.id", [1, 2]))
            .to_components()
            .unwrap();
        assert_eq!(
            q.to_sql(),
            "DELETE FROM albums WHERE albums.artist_id = $1 AND albums.id IN ($2, $3)"
        );
        assert_eq!(Delete::table("albums").to_components().unwrap().to_sql(), "DELETE FROM albums");
    }
}
