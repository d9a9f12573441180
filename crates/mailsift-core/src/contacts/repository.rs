//! Contact storage repository.

use sqlx::Row;
use sqlx::sqlite::SqlitePool;

use super::model::Contact;
use crate::account::AccountId;
use crate::Result;

/// Repository for the auto-collected contact directory.
#[derive(Clone)]
pub struct ContactRepository {
    pool: SqlitePool,
}

impl ContactRepository {
    /// Create a new repository on an open pool.
    ///
    /// Creates the table if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if schema creation fails.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Create an in-memory repository for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        Self::new(crate::db::in_memory().await?).await
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS contacts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL,
                email TEXT NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                times_seen INTEGER NOT NULL DEFAULT 1,
                last_seen TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(account_id, email)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record one sighting of an address (insert, or bump `times_seen`).
    ///
    /// A non-empty name overwrites a previously empty one; an empty name
    /// never erases a known one.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn record(&self, account_id: AccountId, email: &str, name: &str) -> Result<()> {
        let email_normalized = email.trim().to_lowercase();
        if email_normalized.is_empty() {
            return Ok(());
        }

        sqlx::query(
            r"
            INSERT INTO contacts (account_id, email, name, times_seen, last_seen)
            VALUES (?, ?, ?, 1, CURRENT_TIMESTAMP)
            ON CONFLICT(account_id, email) DO UPDATE SET
                name = CASE
                    WHEN excluded.name != '' THEN excluded.name
                    ELSE contacts.name
                END,
                times_seen = contacts.times_seen + 1,
                last_seen = CURRENT_TIMESTAMP
            ",
        )
        .bind(account_id.0)
        .bind(&email_normalized)
        .bind(name.trim())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record a batch of bare addresses (no display names), as collected
    /// from recipient lists.
    ///
    /// # Errors
    ///
    /// Returns an error if any database operation fails.
    pub async fn record_all(&self, account_id: AccountId, emails: &[String]) -> Result<()> {
        for email in emails {
            self.record(account_id, email, "").await?;
        }
        Ok(())
    }

    /// Look up one contact by address.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find(&self, account_id: AccountId, email: &str) -> Result<Option<Contact>> {
        let row = sqlx::query(
            "SELECT account_id, email, name, times_seen, last_seen
             FROM contacts WHERE account_id = ? AND email = ?",
        )
        .bind(account_id.0)
        .bind(email.trim().to_lowercase())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| row_to_contact(&r)))
    }

    /// Most recently seen contacts, most active first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_recent(&self, account_id: AccountId, limit: u32) -> Result<Vec<Contact>> {
        let rows = sqlx::query(
            r"
            SELECT account_id, email, name, times_seen, last_seen
            FROM contacts
            WHERE account_id = ?
            ORDER BY last_seen DESC, times_seen DESC
            LIMIT ?
            ",
        )
        .bind(account_id.0)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_contact).collect())
    }
}

/// Convert a database row to a `Contact`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn row_to_contact(row: &sqlx::sqlite::SqliteRow) -> Contact {
    Contact {
        account_id: AccountId::new(row.get("account_id")),
        email: row.get("email"),
        name: row.get("name"),
        times_seen: row.get::<i64, _>("times_seen") as u32,
        last_seen: row.get("last_seen"),
    }
}
