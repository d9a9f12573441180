//! Filter repository for persistent storage of filters, their conditions,
//! and their actions.

use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};

use super::model::{Filter, FilterAction, FilterCondition, NewFilter};
use crate::account::AccountId;
use crate::Result;

/// Repository for filter definitions.
#[derive(Clone)]
pub struct FilterRepository {
    pool: SqlitePool,
}

/// Counts of filters by enablement.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterStats {
    /// All filters.
    pub total: u32,
    /// Filters participating in evaluation.
    pub enabled: u32,
    /// Filters currently switched off.
    pub disabled: u32,
}

impl FilterRepository {
    /// Create a new repository on an open pool.
    ///
    /// Creates the tables if they don't exist.
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
            CREATE TABLE IF NOT EXISTS filters (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER,
                name TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 0,
                match_all INTEGER NOT NULL DEFAULT 1,
                is_enabled INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS filter_conditions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                filter_id INTEGER NOT NULL REFERENCES filters(id) ON DELETE CASCADE,
                field TEXT NOT NULL,
                operator TEXT NOT NULL,
                value TEXT NOT NULL DEFAULT '',
                position INTEGER NOT NULL DEFAULT 0
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS filter_actions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                filter_id INTEGER NOT NULL REFERENCES filters(id) ON DELETE CASCADE,
                action TEXT NOT NULL,
                value TEXT,
                position INTEGER NOT NULL DEFAULT 0
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Create a filter with its conditions and actions, returning the
    /// stored record.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails.
    pub async fn create(&self, new: &NewFilter) -> Result<Filter> {
        let result = sqlx::query(
            r"
            INSERT INTO filters (account_id, name, priority, match_all, is_enabled)
            VALUES (?, ?, ?, ?, ?)
            ",
        )
        .bind(new.account_id.map(|a| a.0))
        .bind(&new.name)
        .bind(new.priority)
        .bind(new.match_all)
        .bind(new.is_enabled)
        .execute(&self.pool)
        .await?;

        let filter_id = result.last_insert_rowid();

        for (position, condition) in new.conditions.iter().enumerate() {
            #[allow(clippy::cast_possible_wrap)]
            sqlx::query(
                r"
                INSERT INTO filter_conditions (filter_id, field, operator, value, position)
                VALUES (?, ?, ?, ?, ?)
                ",
            )
            .bind(filter_id)
            .bind(&condition.field)
            .bind(&condition.operator)
            .bind(&condition.value)
            .bind(position as i64)
            .execute(&self.pool)
            .await?;
        }

        for (position, action) in new.actions.iter().enumerate() {
            #[allow(clippy::cast_possible_wrap)]
            sqlx::query(
                r"
                INSERT INTO filter_actions (filter_id, action, value, position)
                VALUES (?, ?, ?, ?)
                ",
            )
            .bind(filter_id)
            .bind(&action.action)
            .bind(&action.value)
            .bind(position as i64)
            .execute(&self.pool)
            .await?;
        }

        self.find(filter_id)
            .await?
            .ok_or_else(|| crate::Error::NotFound(format!("filter {filter_id} after insert")))
    }

    /// Load one filter with its children.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find(&self, filter_id: i64) -> Result<Option<Filter>> {
        let row = sqlx::query("SELECT * FROM filters WHERE id = ?")
            .bind(filter_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(self.hydrate(&row).await?))
    }

    /// All enabled filters visible to an account (its own plus global
    /// filters), ordered by priority descending with id ascending as the
    /// tie-break.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_enabled(&self, account_id: AccountId) -> Result<Vec<Filter>> {
        let rows = sqlx::query(
            r"
            SELECT * FROM filters
            WHERE is_enabled = 1 AND (account_id IS NULL OR account_id = ?)
            ORDER BY priority DESC, id ASC
            ",
        )
        .bind(account_id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut filters = Vec::with_capacity(rows.len());
        for row in &rows {
            filters.push(self.hydrate(row).await?);
        }
        Ok(filters)
    }

    /// All filters visible to an account regardless of enablement.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_all(&self, account_id: AccountId) -> Result<Vec<Filter>> {
        let rows = sqlx::query(
            r"
            SELECT * FROM filters
            WHERE account_id IS NULL OR account_id = ?
            ORDER BY priority DESC, id ASC
            ",
        )
        .bind(account_id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut filters = Vec::with_capacity(rows.len());
        for row in &rows {
            filters.push(self.hydrate(row).await?);
        }
        Ok(filters)
    }

    /// Enable or disable a filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn set_enabled(&self, filter_id: i64, enabled: bool) -> Result<()> {
        sqlx::query("UPDATE filters SET is_enabled = ? WHERE id = ?")
            .bind(enabled)
            .bind(filter_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete a filter and its children.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn delete(&self, filter_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM filters WHERE id = ?")
            .bind(filter_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Counts of filters by enablement.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn stats(&self) -> Result<FilterStats> {
        let row = sqlx::query(
            r"
            SELECT
                COUNT(*) AS total,
                SUM(CASE WHEN is_enabled = 1 THEN 1 ELSE 0 END) AS enabled
            FROM filters
            ",
        )
        .fetch_one(&self.pool)
        .await?;

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let total = row.get::<i64, _>("total") as u32;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let enabled = row.get::<Option<i64>, _>("enabled").unwrap_or(0) as u32;

        Ok(FilterStats {
            total,
            enabled,
            disabled: total - enabled,
        })
    }

    /// Attach conditions and actions to a filter row.
    async fn hydrate(&self, row: &SqliteRow) -> Result<Filter> {
        let filter_id: i64 = row.get("id");

        let condition_rows = sqlx::query(
            "SELECT field, operator, value FROM filter_conditions
             WHERE filter_id = ? ORDER BY position, id",
        )
        .bind(filter_id)
        .fetch_all(&self.pool)
        .await?;

        let action_rows = sqlx::query(
            "SELECT action, value FROM filter_actions
             WHERE filter_id = ? ORDER BY position, id",
        )
        .bind(filter_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Filter {
            id: filter_id,
            account_id: row.get::<Option<i64>, _>("account_id").map(AccountId::new),
            name: row.get("name"),
            priority: row.get("priority"),
            match_all: row.get("match_all"),
            is_enabled: row.get("is_enabled"),
            conditions: condition_rows
                .iter()
                .map(|r| FilterCondition {
                    field: r.get("field"),
                    operator: r.get("operator"),
                    value: r.get("value"),
                })
                .collect(),
            actions: action_rows
                .iter()
                .map(|r| FilterAction {
                    action: r.get("action"),
                    value: r.get("value"),
                })
                .collect(),
        })
    }
}
