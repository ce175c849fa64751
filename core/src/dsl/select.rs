use super::{
    Direction, Function, Join, JoinKind, Order, Render, Selection, Source, render_list,
};
use crate::components::QueryComponents;
use crate::error::{CoreResult, QueryError};
use crate::field::IntoField;
use crate::predicate::Predicate;

/// A SELECT statement.
///
/// Builders consume and return the statement, so a base query can be
/// cloned and refined without touching the original.
///
/// ```ignore
/// let q = Select::table("artists")
///     .all()
///     .filter(eq(ArtistField::Genre, "Rock"))
///     .asc(ArtistField::Name)
///     .limit(10);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Select {
    fields: Vec<Selection>,
    from: Vec<Source>,
    joins: Vec<Join>,
    predicate: Option<Predicate>,
    order: Vec<Order>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Select {
    pub fn table(table: impl Into<String>) -> Self {
        Self::from_source(Source::Table(table.into()))
    }

    pub fn from_source(source: Source) -> Self {
        Self {
            from: vec![source],
            ..Self::default()
        }
    }

    /// Add another FROM entry.
    pub fn and_from(mut self, source: impl Into<Source>) -> Self {
        self.from.push(source.into());
        self
    }

    /// Select every column (`*`).
    pub fn all(mut self) -> Self {
        self.fields.push(Selection::All);
        self
    }

    pub fn field(mut self, field: impl IntoField) -> Self {
        self.fields.push(Selection::Field(field.into_field()));
        self
    }

    pub fn fields<F: IntoField>(mut self, fields: impl IntoIterator<Item = F>) -> Self {
        self.fields
            .extend(fields.into_iter().map(|f| Selection::Field(f.into_field())));
        self
    }

    /// A column by name. Dotted parts are quoted as identifiers when they
    /// need it, so expressions such as `count(*)` end up quoted too.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.fields.push(Selection::Name(name.into()));
        self
    }

    pub fn subquery(mut self, select: Select, alias: impl Into<String>) -> Self {
        self.fields.push(Selection::Subquery {
            select: Box::new(select),
            alias: alias.into(),
        });
        self
    }

    /// Functions are always aliased.
    pub fn function(mut self, function: Function, alias: impl Into<String>) -> Self {
        self.fields.push(Selection::Function {
            function,
            alias: alias.into(),
        });
        self
    }

    pub fn join(mut self, kind: JoinKind, source: impl Into<Source>, on: Option<Predicate>) -> Self {
        self.joins.push(Join {
            kind,
            source: source.into(),
            on,
        });
        self
    }

    pub fn inner_join(self, source: impl Into<Source>, on: Predicate) -> Self {
        self.join(JoinKind::Inner, source, Some(on))
    }

    pub fn left_join(self, source: impl Into<Source>, on: Predicate) -> Self {
        self.join(JoinKind::Left, source, Some(on))
    }

    /// Add a WHERE condition, ANDed with any existing one.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    pub fn order_by(mut self, field: impl IntoField, direction: Direction) -> Self {
        self.order.push(Order {
            field: field.into_field(),
            direction,
        });
        self
    }

    pub fn asc(self, field: impl IntoField) -> Self {
        self.order_by(field, Direction::Asc)
    }

    pub fn desc(self, field: impl IntoField) -> Self {
        self.order_by(field, Direction::Desc)
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }
}

impl Render for Select {
    fn render_into(&self, out: &mut QueryComponents) -> CoreResult<()> {
        if self.fields.is_empty() {
            return Err(QueryError::EmptySelection);
        }
        if self.from.is_empty() {
            return Err(QueryError::EmptySource);
        }

        out.push_sql("SELECT ");
        render_list(&self.fields, out)?;
        out.push_sql(" FROM ");
        render_list(&self.from, out)?;

        for join in &self.joins {
            out.push_sql(" ");
            join.render_into(out)?;
        }

        if let Some(predicate) = &self.predicate {
            out.push_sql(" WHERE ");
            predicate.render_into(out)?;
        }

        if !self.order.is_empty() {
            out.push_sql(" ORDER BY ");
            render_list(&self.order, out)?;
        }

        if let Some(limit) = self.limit {
            out.push_sql(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = self.offset {
            out.push_sql(&format!(" OFFSET {}", offset));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::tests::ArtistField;
    use crate::predicate::{eq, eq_field, gt, like};
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_select_all_minimal() {
        let q = Select::table("artists").all().to_components().unwrap();
        assert_eq!(q.to_sql(), "SELECT * FROM artists");
        assert!(q.values().is_empty());
    }

    #[test]
    fn test_empty_field_list_is_rejected() {
        assert_eq!(
            Select::table("artists").to_components(),
            Err(QueryError::EmptySelection)
        );
    }

    #[test]
    fn test_full_select() {
        let q = Select::table("artists")
            .fields([ArtistField::Id, ArtistField::Name])
            .filter(eq(ArtistField::Genre, "Rock"))
            .filter(like(ArtistField::Name, "J%"))
            .desc(ArtistField::Name)
            .asc(ArtistField::Id)
            .limit(10)
            .offset(20)
            .to_components()
            .unwrap();
        assert_eq!(
            q.to_sql(),
            "SELECT artists.id, artists.name FROM artists \
             WHERE artists.genre = $1 AND artists.name LIKE $2 \
             ORDER BY artists.name DESC, artists.id ASC LIMIT 10 OFFSET 20"
        );
        assert_eq!(q.values(), &[Value::from("Rock"), Value::from("J%")]);
    }

    #[test]
    fn test_or_group_with_and() {
        let q = Select::table("artists")
            .all()
            .filter(
                (eq(ArtistField::Genre, "Rock") & like(ArtistField::Name, "J%"))
                    | eq(ArtistField::Name, "Josh Rouse"),
            )
            .to_components()
            .unwrap();
        assert_eq!(
            q.to_sql(),
            "SELECT * FROM artists WHERE (artists.genre = $1 AND artists.name LIKE $2) \
             OR artists.name = $3"
        );
    }

    #[test]
    fn test_subquery_continues_numbering() {
        let albums = Select::table("albums")
            .function(Function::count_all(), "n")
            .filter(eq_field("albums.artist_id", ArtistField::Id))
            .filter(gt("albums.year", 1990));
        let q = Select::table("artists")
            .field(ArtistField::Name)
            .subquery(albums, "album_count")
            .filter(eq(ArtistField::Genre, "Folk"))
            .to_components()
            .unwrap();
        assert_eq!(
            q.to_sql(),
            "SELECT artists.name, (SELECT count(*) AS n FROM albums \
             WHERE albums.artist_id = artists.id AND albums.year > $1) AS album_count \
             FROM artists WHERE artists.genre = $2"
        );
        assert_eq!(q.values(), &[Value::from(1990), Value::from("Folk")]);
    }

    #[test]
    fn test_join() {
        let q = Select::table("artists")
            .all()
            .left_join("albums", eq_field("albums.artist_id", ArtistField::Id))
            .to_components()
            .unwrap();
        assert_eq!(
            q.to_sql(),
            "SELECT * FROM artists LEFT JOIN albums ON albums.artist_id = artists.id"
        );
    }

    #[test]
    fn test_function_source() {
        let q = Select::from_source(Source::Function {
            function: Function::call("generate_series", [1, 3]),
            alias: "n".into(),
        })
        .all()
        .to_components()
        .unwrap();
        assert_eq!(q.to_sql(), "SELECT * FROM generate_series($1, $2) AS n");
        assert_eq!(q.values().len(), 2);
    }

    #[test]
    fn test_builders_leave_base_untouched() {
        let base = Select::table("artists").all();
        let narrowed = base.clone().filter(eq("id", 1));
        assert_eq!(base.predicate(), None);
        assert!(narrowed.predicate().is_some());
    }

    #[test]
    fn test_names_are_quoted_as_identifiers() {
        let q = Select::table("artists")
            .name("artists.id")
            .name("user")
            .name("lower(name)")
            .to_components()
            .unwrap();
        assert_eq!(q.to_sql(), "SELECT artists.id, \"user\", \"lower(name)\" FROM artists");
    }
}
