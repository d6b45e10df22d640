//! Database module for SQLite persistence.
//!
//! SQLite is the source of truth for the backend record API.

mod repository;

pub use repository::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(connect_options(db_path)?)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Connection options shared by the backend database and the client cache.
pub(crate) fn connect_options(db_path: &Path) -> Result<SqliteConnectOptions, sqlx::Error> {
    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    Ok(SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30)))
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS team_requests (
            id TEXT PRIMARY KEY,
            owner_fingerprint TEXT NOT NULL,
            name TEXT,
            gender TEXT,
            phone TEXT,
            bio TEXT,
            extra TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS team_members (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            request_id TEXT NOT NULL REFERENCES team_requests(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            role TEXT,
            skills TEXT,
            gender_preference TEXT,
            extra TEXT
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_team_requests_created_at ON team_requests(created_at);
        CREATE INDEX IF NOT EXISTS idx_team_members_request ON team_members(request_id, position);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
