//! Spam rule and sender list storage.

use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use tracing::warn;

use super::model::{ListEntry, ListKind, RuleType, SpamRule, domain_of};
use crate::account::AccountId;
use crate::Result;

/// Default rules installed on an empty rule table. The header rule mirrors
/// the common provider convention even though header rules currently have
/// no data to match against.
const DEFAULT_RULES: &[(RuleType, &str, i64)] = &[
    (RuleType::Keyword, "you have won", 30),
    (RuleType::Keyword, "free money", 25),
    (RuleType::Keyword, "lottery", 20),
    (RuleType::Link, "", 25),
    (RuleType::Header, "X-Spam-Flag: YES", 50),
];

/// Repository for spam rules and black/whitelist entries.
#[derive(Clone)]
pub struct SpamRepository {
    pool: SqlitePool,
}

impl SpamRepository {
    /// Create a new repository on an open pool.
    ///
    /// Creates the tables if they don't exist and seeds default rules on
    /// first run.
    ///
    /// # Errors
    ///
    /// Returns an error if schema creation fails.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        let repo = Self { pool };
        repo.initialize().await?;
        repo.seed_defaults().await?;
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
            CREATE TABLE IF NOT EXISTS spam_rules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                rule_type TEXT NOT NULL,
                pattern TEXT NOT NULL DEFAULT '',
                priority INTEGER NOT NULL DEFAULT 0,
                is_enabled INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS spam_senders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL,
                email TEXT NOT NULL,
                domain TEXT NOT NULL DEFAULT '',
                kind TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(account_id, email, kind)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Seed the default rule set when the table is empty.
    async fn seed_defaults(&self) -> Result<()> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM spam_rules")
            .fetch_one(&self.pool)
            .await?;
        if row.get::<i64, _>("n") > 0 {
            return Ok(());
        }

        for (rule_type, pattern, priority) in DEFAULT_RULES {
            self.add_rule(*rule_type, pattern, *priority).await?;
        }
        Ok(())
    }

    /// Create a rule, returning the stored record.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn add_rule(
        &self,
        rule_type: RuleType,
        pattern: &str,
        priority: i64,
    ) -> Result<SpamRule> {
        let result = sqlx::query(
            "INSERT INTO spam_rules (rule_type, pattern, priority) VALUES (?, ?, ?)",
        )
        .bind(rule_type.as_str())
        .bind(pattern)
        .bind(priority)
        .execute(&self.pool)
        .await?;

        Ok(SpamRule {
            id: result.last_insert_rowid(),
            rule_type,
            pattern: pattern.to_string(),
            priority,
            is_enabled: true,
        })
    }

    /// All enabled rules, highest weight first. Rows with an unrecognized
    /// type are skipped with a warning rather than failing the load.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_enabled_rules(&self) -> Result<Vec<SpamRule>> {
        let rows = sqlx::query(
            "SELECT id, rule_type, pattern, priority, is_enabled
             FROM spam_rules WHERE is_enabled = 1
             ORDER BY priority DESC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().filter_map(row_to_rule).collect())
    }

    /// All rules regardless of enablement.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_rules(&self) -> Result<Vec<SpamRule>> {
        let rows = sqlx::query(
            "SELECT id, rule_type, pattern, priority, is_enabled
             FROM spam_rules ORDER BY priority DESC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().filter_map(row_to_rule).collect())
    }

    /// Enable or disable a rule.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn set_rule_enabled(&self, rule_id: i64, enabled: bool) -> Result<()> {
        sqlx::query("UPDATE spam_rules SET is_enabled = ? WHERE id = ?")
            .bind(enabled)
            .bind(rule_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete a rule.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn delete_rule(&self, rule_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM spam_rules WHERE id = ?")
            .bind(rule_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Whether a keyword rule with this exact pattern already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn has_keyword_rule(&self, pattern: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM spam_rules
             WHERE rule_type = 'keyword' AND LOWER(pattern) = LOWER(?)",
        )
        .bind(pattern)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>("n") > 0)
    }

    /// Add a sender to a list, deriving the domain from the address.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn add_sender(
        &self,
        account_id: AccountId,
        email: &str,
        kind: ListKind,
    ) -> Result<()> {
        let normalized = email.trim().to_lowercase();

        sqlx::query(
            r"
            INSERT INTO spam_senders (account_id, email, domain, kind)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(account_id, email, kind) DO NOTHING
            ",
        )
        .bind(account_id.0)
        .bind(&normalized)
        .bind(domain_of(&normalized))
        .bind(kind.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Remove a sender from a list.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn remove_sender(
        &self,
        account_id: AccountId,
        email: &str,
        kind: ListKind,
    ) -> Result<()> {
        sqlx::query("DELETE FROM spam_senders WHERE account_id = ? AND email = ? AND kind = ?")
            .bind(account_id.0)
            .bind(email.trim().to_lowercase())
            .bind(kind.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Whether a sender matches a list by exact address or by domain.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn sender_on_list(
        &self,
        account_id: AccountId,
        email: &str,
        kind: ListKind,
    ) -> Result<bool> {
        let normalized = email.trim().to_lowercase();
        let domain = domain_of(&normalized);

        let row = sqlx::query(
            r"
            SELECT COUNT(*) AS n FROM spam_senders
            WHERE account_id = ? AND kind = ?
              AND (email = ? OR (domain != '' AND domain = ?))
            ",
        )
        .bind(account_id.0)
        .bind(kind.as_str())
        .bind(&normalized)
        .bind(&domain)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>("n") > 0)
    }

    /// List entries of one kind for an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_senders(&self, account_id: AccountId, kind: ListKind) -> Result<Vec<ListEntry>> {
        let rows = sqlx::query(
            "SELECT id, account_id, email, domain, kind FROM spam_senders
             WHERE account_id = ? AND kind = ? ORDER BY email",
        )
        .bind(account_id.0)
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().filter_map(row_to_entry).collect())
    }
}

fn row_to_rule(row: &SqliteRow) -> Option<SpamRule> {
    let type_str: String = row.get("rule_type");
    let Some(rule_type) = RuleType::parse(&type_str) else {
        warn!(rule_type = %type_str, "skipping spam rule with unknown type");
        return None;
    };

    Some(SpamRule {
        id: row.get("id"),
        rule_type,
        pattern: row.get("pattern"),
        priority: row.get("priority"),
        is_enabled: row.get("is_enabled"),
    })
}

fn row_to_entry(row: &SqliteRow) -> Option<ListEntry> {
    let kind_str: String = row.get("kind");
    let kind = ListKind::parse(&kind_str)?;

    Some(ListEntry {
        id: row.get("id"),
        account_id: AccountId::new(row.get("account_id")),
        email: row.get("email"),
        domain: row.get("domain"),
        kind,
    })
}
