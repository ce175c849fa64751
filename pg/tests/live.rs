//! Live-server tests for quarry-pg.
//!
//! Run: `DATABASE_URL=postgresql://... cargo test -p quarry-pg --test live -- --ignored`

use quarry_core::prelude::*;
use quarry_pg::{Connection, ConnectionInfo, ConnectionStatus, PgError, PgResult, ResultStatus};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn info() -> ConnectionInfo {
    let url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgresql://postgres@localhost/postgres".to_string());
    url.parse().expect("DATABASE_URL is not a valid connection URI")
}

async fn connect() -> PgResult<Connection> {
    init_tracing();
    Connection::connect(info()).await
}

async fn seed(conn: &mut Connection, table: &str) -> PgResult<()> {
    conn.execute(format!("DROP TABLE IF EXISTS {}", table)).await?;
    conn.execute(format!(
        "CREATE TABLE {} (id serial PRIMARY KEY, name text NOT NULL, genre text)",
        table
    ))
    .await?;
    conn.execute_params(
        &format!("INSERT INTO {} (name, genre) VALUES (%@, %@), (%@, %@), (%@, NULL)", table),
        [
            Value::from("Josh Rouse"),
            Value::from("Country"),
            Value::from("AC/DC"),
            Value::from("Rock"),
            Value::from("Mogwai"),
        ],
    )
    .await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server"]
async fn test_open_and_close() -> PgResult<()> {
    let mut conn = connect().await?;
    assert_eq!(conn.status(), ConnectionStatus::Ok);
    assert!(conn.parameter("server_version").is_some());
    conn.close().await;
    conn.close().await;
    assert_eq!(conn.status(), ConnectionStatus::Needed);
    Ok(())
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server"]
async fn test_select_with_dsl() -> PgResult<()> {
    let mut conn = connect().await?;
    seed(&mut conn, "live_artists_select").await?;

    let query = Select::table("live_artists_select")
        .fields(["name", "genre"])
        .filter(eq("genre", "Rock") | eq("name", "Josh Rouse"))
        .asc("name");
    let result = conn.execute(query).await?;
    assert_eq!(result.status(), ResultStatus::TuplesOk);
    let names: Vec<String> = result
        .iter()
        .map(|row| row.get("name"))
        .collect::<Result<_, _>>()?;
    assert_eq!(names, vec!["AC/DC", "Josh Rouse"]);

    let empty = conn
        .execute(Select::table("live_artists_select").all().filter(is_in("id", Vec::<i32>::new())))
        .await?;
    assert!(empty.is_empty());

    let nulls = conn
        .execute(Select::table("live_artists_select").all().filter(is_null("genre")))
        .await?;
    assert_eq!(nulls.row_count(), 1);
    assert_eq!(nulls.row(0)?.get::<Option<String>>("genre")?, None);

    conn.execute("DROP TABLE live_artists_select").await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server"]
async fn test_server_error_and_recovery() -> PgResult<()> {
    let mut conn = connect().await?;
    let err = conn.execute("SELECT * FROM no_such_table_here").await.unwrap_err();
    assert_eq!(err.code(), Some("42P01"));
    let result = conn.execute("SELECT 1 AS one").await?;
    assert_eq!(result.row(0)?.get::<i32>("one")?, 1);
    Ok(())
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server"]
async fn test_transaction_rollback_on_failed_commit() -> PgResult<()> {
    let mut conn = connect().await?;
    seed(&mut conn, "live_artists_tx").await?;

    conn.transaction_start().await?;
    conn.execute("UPDATE live_artists_tx SET genre = 'Folk'").await?;
    assert!(conn.execute("SELECT 1/0").await.is_err());
    assert!(matches!(conn.transaction_end().await, Err(PgError::TransactionAborted(_))));
    assert!(!conn.is_transaction_active());

    let folk = conn
        .execute_params("SELECT count(*) AS n FROM live_artists_tx WHERE genre = $1", ["Folk"])
        .await?;
    assert_eq!(folk.row(0)?.get::<i64>("n")?, 0);

    conn.execute("DROP TABLE live_artists_tx").await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server"]
async fn test_savepoints() -> PgResult<()> {
    let mut conn = connect().await?;
    seed(&mut conn, "live_artists_sp").await?;

    conn.transaction_start().await?;
    conn.savepoint("before_delete").await?;
    conn.execute("DELETE FROM live_artists_sp").await?;
    conn.rollback_to_savepoint("before_delete").await?;
    conn.release_savepoint("before_delete").await?;
    conn.transaction_end().await?;

    let count = conn.execute("SELECT count(*) AS n FROM live_artists_sp").await?;
    assert_eq!(count.row(0)?.get::<i64>("n")?, 3);

    conn.execute("DROP TABLE live_artists_sp").await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server"]
async fn test_cancel_running_statement() -> PgResult<()> {
    let mut conn = connect().await?;
    let token = conn.cancel_token().expect("server sent no backend key");
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        token.cancel_query().await
    });
    let err = conn.execute("SELECT pg_sleep(30)").await.unwrap_err();
    assert_eq!(err.code(), Some("57014"));
    canceller.await.expect("cancel task panicked")?;
    assert_eq!(conn.status(), ConnectionStatus::Ok);
    Ok(())
}
