//! Live-server model mapping tests.
//!
//! Run: `DATABASE_URL=postgresql://... cargo test --test model -- --ignored`
//! (the missing-key check runs without a server)

use quarry::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ArtistField {
    Id,
    Name,
    Genre,
}

impl FieldDescriptor for ArtistField {
    const TABLE: &'static str = "model_artists";

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
    genre: String,
    dirty: Vec<ArtistField>,
}

impl Artist {
    fn new(name: &str, genre: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            genre: genre.to_string(),
            dirty: Vec::new(),
        }
    }

    fn set_genre(&mut self, genre: &str) {
        self.genre = genre.to_string();
        self.dirty.push(ArtistField::Genre);
    }
}

impl Model for Artist {
    type Field = ArtistField;
    type PrimaryKey = i32;

    const PRIMARY_KEY: ArtistField = ArtistField::Id;

    fn primary_key(&self) -> Option<i32> {
        self.id
    }

    fn from_row(row: &Row<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            id: row.get(ArtistField::Id)?,
            name: row.get(ArtistField::Name)?,
            genre: row.get(ArtistField::Genre)?,
            dirty: Vec::new(),
        })
    }

    fn persisted_values(&self) -> Vec<(ArtistField, Value)> {
        vec![
            (ArtistField::Name, Value::from(&self.name)),
            (ArtistField::Genre, Value::from(&self.genre)),
        ]
    }

    fn changed_fields(&self) -> Option<Vec<ArtistField>> {
        (!self.dirty.is_empty()).then(|| self.dirty.clone())
    }

    fn will_save(&mut self) {
        self.name = self.name.trim().to_string();
    }
}

async fn connect() -> quarry::Result<Connection> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let mut conn = Config::discover()?.connect().await?;
    conn.execute("DROP TABLE IF EXISTS model_artists").await?;
    conn.execute("CREATE TABLE model_artists (id serial PRIMARY KEY, name text NOT NULL, genre text NOT NULL)")
        .await?;
    Ok(conn)
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server"]
async fn test_insert_then_find() -> quarry::Result<()> {
    let mut conn = connect().await?;

    let mut artist = Artist::new("  AC/DC ", "rock");
    artist.insert(&mut conn).await?;
    let key = artist.id.expect("insert did not populate the primary key");
    assert_eq!(artist.name, "AC/DC");

    let found = Artist::find(&mut conn, key).await?.expect("inserted row not found");
    assert_eq!(found.name, "AC/DC");
    assert!(Artist::find(&mut conn, key + 1000).await?.is_none());
    Ok(())
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server"]
async fn test_save_update_delete() -> quarry::Result<()> {
    let mut conn = connect().await?;

    let mut artist = Artist::new("Josh Rouse", "Country");
    artist.save(&mut conn).await?;
    artist.set_genre("Folk");
    assert_eq!(artist.update(&mut conn).await?, 1);

    let all = Artist::fetch_all(&mut conn).await?;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].genre, "Folk");

    let folk = Artist::fetch_where(&mut conn, Some(eq(ArtistField::Genre, "Folk"))).await?;
    assert_eq!(folk.len(), 1);

    assert_eq!(artist.delete(&mut conn).await?, 1);
    assert!(Artist::fetch_all(&mut conn).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_update_without_key_fails() {
    // Never opened: the key check comes before any I/O.
    let mut conn = Connection::new(ConnectionInfo::new("localhost", 5432, "music"));
    let mut artist = Artist::new("Mogwai", "Post-rock");
    assert!(matches!(
        artist.update(&mut conn).await,
        Err(Error::MissingPrimaryKey("model_artists"))
    ));
    assert!(matches!(
        artist.delete(&mut conn).await,
        Err(Error::MissingPrimaryKey("model_artists"))
    ));
    assert_eq!(conn.status(), ConnectionStatus::Needed);
}
