use sqlx::sqlite::{self, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Opens (or creates) the audit database under `data_folder` and applies the
/// schema. One pool for the whole process lifetime; the engine writes a
/// handful of rows per hourly cycle so a small pool is plenty.
pub async fn connect(data_folder: &str) -> Result<SqlitePool, sqlx::Error> {
    std::fs::create_dir_all(data_folder)?;
    let db_filename = format!("{}/tradr.db", data_folder);

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_filename))?
        .create_if_missing(true)
        .journal_mode(sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlite::SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(30));

    let pool = SqlitePool::connect_with(options).await?;
    apply_schema(&pool).await?;

    info!("Audit database ready at {}", db_filename);
    Ok(pool)
}

/// In-memory database for tests. Capped at a single connection that never
/// expires: every fresh `:memory:` connection is its own empty database, so
/// a second pooled connection would not see the schema.
pub async fn connect_in_memory() -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    apply_schema(&pool).await?;
    Ok(pool)
}

async fn apply_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let schema = include_str!("../sql/schema.sql");
    sqlx::raw_sql(schema).execute(pool).await?;
    Ok(())
}
