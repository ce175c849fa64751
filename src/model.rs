//! Model mapping: typed rows in, typed rows out.
//!
//! A [`Model`] describes how one table maps onto a Rust type. Every model
//! gets the [`Persist`] operations for free.
//!
//! ```ignore
//! let mut artist = Artist { id: None, name: "AC/DC".into(), genre: "rock".into() };
//! artist.insert(&mut conn).await?;
//! let found = Artist::find(&mut conn, artist.id.unwrap()).await?;
//! ```

use std::fmt::Debug;

use async_trait::async_trait;
use quarry_core::dsl::{Delete, Insert, Select, Update};
use quarry_core::predicate::{Predicate, eq};
use quarry_core::{DecodeError, FieldDescriptor, FromValue, Value};
use quarry_pg::{Connection, Row};
use tracing::debug;

use crate::error::{Error, Result};

/// Alias the primary key comes back under after an insert.
const RETURNED_KEY: &str = "returned__pk";

/// Mapping between a Rust type and a table.
pub trait Model: Sized + Send + Sync {
    /// One variant per mapped column.
    type Field: FieldDescriptor;
    type PrimaryKey: FromValue + Into<Value> + Clone + Debug + Send + Sync;

    const PRIMARY_KEY: Self::Field;

    /// `None` until the row exists.
    fn primary_key(&self) -> Option<Self::PrimaryKey>;

    /// Decode a row. Fails if a required column is absent or unparseable.
    fn from_row(row: &Row<'_>) -> std::result::Result<Self, DecodeError>;

    /// Values written by insert and update. The primary key is never written.
    fn persisted_values(&self) -> Vec<(Self::Field, Value)>;

    /// Restrict updates to these fields. `None` writes every persisted value.
    fn changed_fields(&self) -> Option<Vec<Self::Field>> {
        None
    }

    /// Called before every insert or update.
    fn will_save(&mut self) {}

    fn table() -> &'static str {
        <Self::Field as FieldDescriptor>::TABLE
    }

    /// `SELECT` of every mapped column.
    fn select() -> Select {
        Select::table(Self::table()).fields(Self::Field::all().iter().copied())
    }
}

/// Persistence operations, implemented for every [`Model`].
#[async_trait]
pub trait Persist: Model {
    /// Fetch by primary key. Zero matching rows is `Ok(None)`.
    async fn find(conn: &mut Connection, key: Self::PrimaryKey) -> Result<Option<Self>> {
        let select = Self::select().filter(eq(Self::PRIMARY_KEY, key)).limit(1);
        let result = conn.execute(select).await?;
        match result.iter().next() {
            Some(row) => Ok(Some(Self::from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Every row of the table, by primary key.
    async fn fetch_all(conn: &mut Connection) -> Result<Vec<Self>> {
        Self::fetch_where(conn, None).await
    }

    async fn fetch_where(conn: &mut Connection, filter: Option<Predicate>) -> Result<Vec<Self>> {
        let mut select = Self::select();
        if let Some(filter) = filter {
            select = select.filter(filter);
        }
        let result = conn.execute(select.asc(Self::PRIMARY_KEY)).await?;
        let mut models = Vec::with_capacity(result.row_count());
        for row in &result {
            models.push(Self::from_row(&row)?);
        }
        Ok(models)
    }

    /// Insert, then replace `self` with the stored row so server-side
    /// defaults are visible.
    async fn insert(&mut self, conn: &mut Connection) -> Result<()> {
        self.will_save();
        let insert = Insert::table(Self::table())
            .values(writable(self.persisted_values(), Self::PRIMARY_KEY, None))
            .returning(Self::PRIMARY_KEY, RETURNED_KEY);
        let result = conn.execute(insert).await?;

        let key: Option<Self::PrimaryKey> = match result.iter().next() {
            Some(row) => row.get(RETURNED_KEY)?,
            None => None,
        };
        let key = key.ok_or(Error::MissingReturnedKey(Self::table()))?;
        debug!(table = Self::table(), key = ?key, "inserted");

        *self = Self::find(conn, key.clone())
            .await?
            .ok_or_else(|| Error::NotFoundAfterInsert {
                table: Self::table(),
                key: format!("{:?}", key),
            })?;
        Ok(())
    }

    /// Write persisted values, or only the changed ones, to the existing
    /// row. Returns the number of rows touched.
    async fn update(&mut self, conn: &mut Connection) -> Result<u64> {
        let key = self
            .primary_key()
            .ok_or(Error::MissingPrimaryKey(Self::table()))?;
        self.will_save();

        let values = writable(self.persisted_values(), Self::PRIMARY_KEY, self.changed_fields());
        if values.is_empty() {
            return Ok(0);
        }
        let update = Update::table(Self::table())
            .set_all(values)
            .filter(eq(Self::PRIMARY_KEY, key));
        Ok(conn.execute(update).await?.affected_rows())
    }

    /// Insert when there is no primary key yet, update otherwise.
    async fn save(&mut self, conn: &mut Connection) -> Result<()> {
        if self.primary_key().is_some() {
            self.update(conn).await?;
        } else {
            self.insert(conn).await?;
        }
        Ok(())
    }

    /// Delete the row. Returns the number of rows removed.
    async fn delete(&self, conn: &mut Connection) -> Result<u64> {
        let key = self
            .primary_key()
            .ok_or(Error::MissingPrimaryKey(Self::table()))?;
        let delete = Delete::table(Self::table()).filter(eq(Self::PRIMARY_KEY, key));
        Ok(conn.execute(delete).await?.affected_rows())
    }
}

impl<M: Model> Persist for M {}

/// Drop the primary key and, when given, anything outside `only`.
fn writable<F: FieldDescriptor>(
    values: Vec<(F, Value)>,
    primary_key: F,
    only: Option<Vec<F>>,
) -> Vec<(F, Value)> {
    values
        .into_iter()
        .filter(|(field, _)| *field != primary_key)
        .filter(|(field, _)| only.as_ref().is_none_or(|only| only.contains(field)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quarry_core::IntoComponents;
    use quarry_pg::ConnectionInfo;
    use quarry_pg::driver::testing::*;
    use quarry_pg::protocol::oid;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum ArtistField {
        Id,
        Name,
        Genre,
    }

    impl FieldDescriptor for ArtistField {
        const TABLE: &'static str = "artists";

        fn name(self) -> &'static str {
            match self {
                Self::Id => "id",
                Self::Name => "name",
                Self::Genre => "genre",
            }
        }

        fn all() -> &'static [Self] {
            &[Self::Id, Self::Name, Self::Genre]
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Artist {
        id: Option<i32>,
        name: String,
        genre: Option<String>,
    }

    impl Model for Artist {
        type Field = ArtistField;
        type PrimaryKey = i32;

        const PRIMARY_KEY: ArtistField = ArtistField::Id;

        fn primary_key(&self) -> Option<i32> {
            self.id
        }

        fn from_row(row: &Row<'_>) -> std::result::Result<Self, DecodeError> {
            Ok(Self {
                id: row.get(ArtistField::Id)?,
                name: row.get(ArtistField::Name)?,
                genre: row.get(ArtistField::Genre)?,
            })
        }

        fn persisted_values(&self) -> Vec<(ArtistField, Value)> {
            vec![
                (ArtistField::Name, self.name.as_str().into()),
                (ArtistField::Genre, self.genre.clone().into()),
            ]
        }
    }

    #[test]
    fn test_select_all_columns() {
        let sql = Artist::select().into_components().unwrap().to_sql();
        assert_eq!(sql, "SELECT artists.id, artists.name, artists.genre FROM artists");
    }

    #[test]
    fn test_writable_respects_changed_fields() {
        let artist = Artist {
            id: Some(1),
            name: "Josh Rouse".to_string(),
            genre: None,
        };
        let mut values = artist.persisted_values();
        values.push((ArtistField::Id, Value::from(1)));
        let all = writable(values, ArtistField::Id, None);
        assert_eq!(all.len(), 2);
        let only = writable(artist.persisted_values(), ArtistField::Id, Some(vec![ArtistField::Genre]));
        assert_eq!(only, vec![(ArtistField::Genre, Value::Null)]);
    }

    fn stored_artist(id: &str) -> Vec<Vec<u8>> {
        vec![
            row_description(&[("id", oid::INT4), ("name", oid::TEXT), ("genre", oid::TEXT)]),
            data_row(&[Some(id), Some("AC/DC"), Some("rock")]),
            command_complete("SELECT 1"),
        ]
    }

    fn returned_key(key: Option<&str>) -> Vec<Vec<u8>> {
        vec![
            row_description(&[(RETURNED_KEY, oid::INT4)]),
            data_row(&[key]),
            command_complete("INSERT 0 1"),
        ]
    }

    fn new_artist() -> Artist {
        Artist {
            id: None,
            name: "AC/DC".to_string(),
            genre: None,
        }
    }

    /// Body of the Parse message carrying `sql` as the unnamed statement.
    fn parse_body(sql: &str) -> Vec<u8> {
        [&b"\0"[..], sql.as_bytes(), &b"\0"[..]].concat()
    }

    #[tokio::test]
    async fn test_insert_refetches_stored_row() {
        let mut steps = extended_query(returned_key(Some("7")), b'I');
        steps.extend(extended_query(stored_artist("7"), b'I'));
        let (mut conn, server) = open_connection(steps).await;

        let mut artist = new_artist();
        artist.insert(&mut conn).await.unwrap();
        assert_eq!(
            artist,
            Artist {
                id: Some(7),
                name: "AC/DC".to_string(),
                genre: Some("rock".to_string()),
            }
        );

        conn.close().await;
        let received = server.await.unwrap();
        let parses: Vec<&Vec<u8>> = received.iter().filter(|(tag, _)| *tag == b'P').map(|(_, body)| body).collect();
        assert_eq!(parses.len(), 2);
        let insert = parse_body("INSERT INTO artists (name, genre) VALUES ($1, $2) RETURNING artists.id AS returned__pk");
        assert!(parses[0].starts_with(&insert));
        let find = parse_body("SELECT artists.id, artists.name, artists.genre FROM artists WHERE artists.id = $1 LIMIT 1");
        assert!(parses[1].starts_with(&find));
    }

    #[tokio::test]
    async fn test_insert_without_returned_row() {
        let reply = vec![row_description(&[(RETURNED_KEY, oid::INT4)]), command_complete("INSERT 0 0")];
        let (mut conn, _server) = open_connection(extended_query(reply, b'I')).await;
        let err = new_artist().insert(&mut conn).await.unwrap_err();
        assert!(matches!(err, Error::MissingReturnedKey("artists")));
    }

    #[tokio::test]
    async fn test_insert_with_null_returned_key() {
        let (mut conn, _server) = open_connection(extended_query(returned_key(None), b'I')).await;
        let mut artist = new_artist();
        let err = artist.insert(&mut conn).await.unwrap_err();
        assert!(matches!(err, Error::MissingReturnedKey("artists")));
        assert_eq!(artist, new_artist());
    }

    #[tokio::test]
    async fn test_insert_then_row_vanishes() {
        let mut steps = extended_query(returned_key(Some("7")), b'I');
        let empty = vec![
            row_description(&[("id", oid::INT4), ("name", oid::TEXT), ("genre", oid::TEXT)]),
            command_complete("SELECT 0"),
        ];
        steps.extend(extended_query(empty, b'I'));
        let (mut conn, _server) = open_connection(steps).await;

        let err = new_artist().insert(&mut conn).await.unwrap_err();
        match err {
            Error::NotFoundAfterInsert { table, key } => {
                assert_eq!(table, "artists");
                assert_eq!(key, "7");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_find_missing_row_is_none() {
        let empty = vec![
            row_description(&[("id", oid::INT4), ("name", oid::TEXT), ("genre", oid::TEXT)]),
            command_complete("SELECT 0"),
        ];
        let (mut conn, _server) = open_connection(extended_query(empty, b'I')).await;
        assert_eq!(Artist::find(&mut conn, 404).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_update_reports_affected_rows() {
        let (mut conn, server) = open_connection(extended_query(vec![command_complete("UPDATE 1")], b'I')).await;
        let mut artist = Artist {
            id: Some(7),
            ..new_artist()
        };
        assert_eq!(artist.update(&mut conn).await.unwrap(), 1);

        conn.close().await;
        let received = server.await.unwrap();
        let (_, parse) = received.iter().find(|(tag, _)| *tag == b'P').unwrap();
        assert!(parse.starts_with(&parse_body(
            "UPDATE artists SET name = $1, genre = $2 WHERE artists.id = $3"
        )));
    }

    #[tokio::test]
    async fn test_keyless_model_never_reaches_the_server() {
        let mut conn = Connection::new(ConnectionInfo::new("localhost", 5432, "music"));
        let mut artist = new_artist();
        assert!(matches!(
            artist.update(&mut conn).await,
            Err(Error::MissingPrimaryKey("artists"))
        ));
        assert!(matches!(
            artist.delete(&mut conn).await,
            Err(Error::MissingPrimaryKey("artists"))
        ));
    }
}
