//! Database pool construction.
//!
//! All repositories share one `SQLite` database so the per-message pipeline
//! reads and writes a single consistent store. Each repository creates its
//! own tables idempotently on construction.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::Result;

/// Open (or create) the database at the given path.
///
/// Foreign keys are enforced on every connection so attachment metadata
/// and filter children disappear with their parent rows.
///
/// # Errors
///
/// Returns an error if the database connection fails.
pub async fn open(database_path: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{database_path}"))?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Open an in-memory database for testing.
///
/// # Errors
///
/// Returns an error if the database connection fails.
pub async fn in_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    Ok(pool)
}
