//! Message repository for persistent storage of synced mail.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};

use super::model::{AttachmentMeta, Draft, NewMessage, StoredMessage};
use crate::account::AccountId;
use crate::{Error, Result};

/// Repository for messages, drafts, tags, attachment metadata, and folder
/// bookkeeping.
#[derive(Clone)]
pub struct MessageRepository {
    pool: SqlitePool,
}

impl MessageRepository {
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
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL,
                uid INTEGER NOT NULL,
                folder TEXT NOT NULL,
                message_id TEXT,
                from_addr TEXT NOT NULL DEFAULT '',
                to_addrs TEXT NOT NULL DEFAULT '[]',
                cc_addrs TEXT NOT NULL DEFAULT '[]',
                subject TEXT NOT NULL DEFAULT '',
                date TEXT,
                body_text TEXT,
                body_html TEXT,
                is_read INTEGER NOT NULL DEFAULT 0,
                is_spam INTEGER NOT NULL DEFAULT 0,
                is_starred INTEGER NOT NULL DEFAULT 0,
                is_important INTEGER NOT NULL DEFAULT 0,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                deleted_at TEXT,
                has_attachments INTEGER NOT NULL DEFAULT 0,
                flags TEXT NOT NULL DEFAULT '[]',
                thread_id INTEGER,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(account_id, folder, uid)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_messages_message_id
            ON messages(account_id, message_id) WHERE message_id IS NOT NULL
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_messages_folder
            ON messages(account_id, folder, date DESC)
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS message_tags (
                message_id INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                PRIMARY KEY (message_id, tag_id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS attachments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                filename TEXT NOT NULL,
                content_type TEXT NOT NULL DEFAULT '',
                size INTEGER NOT NULL DEFAULT 0,
                file_path TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS folders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                last_sync TEXT,
                UNIQUE(account_id, name)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS drafts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL,
                uid INTEGER,
                message_id TEXT,
                to_addrs TEXT NOT NULL DEFAULT '[]',
                cc_addrs TEXT NOT NULL DEFAULT '[]',
                subject TEXT NOT NULL DEFAULT '',
                body_text TEXT NOT NULL DEFAULT '',
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a newly fetched message and return the stored row.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails, including on a violated
    /// `(account, folder, uid)` uniqueness constraint.
    pub async fn insert(&self, new: &NewMessage) -> Result<StoredMessage> {
        let result = sqlx::query(
            r"
            INSERT INTO messages
                (account_id, uid, folder, message_id, from_addr, to_addrs, cc_addrs,
                 subject, date, body_text, body_html, is_read, flags)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(new.account_id.0)
        .bind(new.uid)
        .bind(&new.folder)
        .bind(&new.message_id)
        .bind(&new.from_addr)
        .bind(serde_json::to_string(&new.to_addrs)?)
        .bind(serde_json::to_string(&new.cc_addrs)?)
        .bind(&new.subject)
        .bind(new.date.map(|d| d.to_rfc3339()))
        .bind(&new.body_text)
        .bind(&new.body_html)
        .bind(new.is_read)
        .bind(serde_json::to_string(&new.flags)?)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.find_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("message {id} after insert")))
    }

    /// Find a message by row id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_id(&self, id: i64) -> Result<Option<StoredMessage>> {
        let row = sqlx::query("SELECT * FROM messages WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_message).transpose()
    }

    /// Find a message by `(uid, folder)` identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_uid(
        &self,
        account_id: AccountId,
        uid: u32,
        folder: &str,
    ) -> Result<Option<StoredMessage>> {
        let row = sqlx::query("SELECT * FROM messages WHERE account_id = ? AND uid = ? AND folder = ?")
            .bind(account_id.0)
            .bind(uid)
            .bind(folder)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_message).transpose()
    }

    /// Find a message by its Message-ID header, across all folders.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_message_id(
        &self,
        account_id: AccountId,
        message_id: &str,
    ) -> Result<Option<StoredMessage>> {
        let row = sqlx::query("SELECT * FROM messages WHERE account_id = ? AND message_id = ?")
            .bind(account_id.0)
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_message).transpose()
    }

    /// List messages in a folder, most recent first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_folder(
        &self,
        account_id: AccountId,
        folder: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<StoredMessage>> {
        let rows = sqlx::query(
            r"
            SELECT * FROM messages
            WHERE account_id = ? AND folder = ? AND is_deleted = 0
            ORDER BY date DESC, uid DESC
            LIMIT ? OFFSET ?
            ",
        )
        .bind(account_id.0)
        .bind(folder)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_message).collect()
    }

    /// Highest UID persisted for a folder, used as the incremental sync
    /// watermark. `None` means the folder has never been synced.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn last_seen_uid(&self, account_id: AccountId, folder: &str) -> Result<Option<u32>> {
        let row = sqlx::query("SELECT MAX(uid) AS max_uid FROM messages WHERE account_id = ? AND folder = ?")
            .bind(account_id.0)
            .bind(folder)
            .fetch_one(&self.pool)
            .await?;

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Ok(row.get::<Option<i64>, _>("max_uid").map(|u| u as u32))
    }

    /// Mark a message as read.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn mark_as_read(&self, id: i64) -> Result<()> {
        self.set_flag(id, "is_read", true).await
    }

    /// Mark a message as unread.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn mark_as_unread(&self, id: i64) -> Result<()> {
        self.set_flag(id, "is_read", false).await
    }

    /// Mark a message as spam.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn mark_as_spam(&self, id: i64) -> Result<()> {
        self.set_flag(id, "is_spam", true).await
    }

    /// Clear the spam mark on a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn mark_as_ham(&self, id: i64) -> Result<()> {
        self.set_flag(id, "is_spam", false).await
    }

    /// Set or clear the star on a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn set_starred(&self, id: i64, starred: bool) -> Result<()> {
        self.set_flag(id, "is_starred", starred).await
    }

    /// Set or clear the important flag on a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn set_important(&self, id: i64, important: bool) -> Result<()> {
        self.set_flag(id, "is_important", important).await
    }

    async fn set_flag(&self, id: i64, column: &str, value: bool) -> Result<()> {
        // Column names come from the fixed call sites above, never from input.
        let sql = format!("UPDATE messages SET {column} = ? WHERE id = ?");
        sqlx::query(&sql)
            .bind(value)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Move a message to another folder.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn move_to_folder(&self, id: i64, folder: &str) -> Result<()> {
        sqlx::query("UPDATE messages SET folder = ? WHERE id = ?")
            .bind(folder)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Soft-delete a message (flag plus timestamp). Hard deletion is an
    /// explicit trash-empty operation outside the sync core.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn soft_delete(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE messages SET is_deleted = 1, deleted_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Replace the raw server flags on a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn update_flags(&self, id: i64, flags: &[String]) -> Result<()> {
        sqlx::query("UPDATE messages SET flags = ? WHERE id = ?")
            .bind(serde_json::to_string(flags)?)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Create a tag definition if it doesn't exist, returning its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn create_tag(&self, name: &str) -> Result<i64> {
        sqlx::query("INSERT OR IGNORE INTO tags (name) VALUES (?)")
            .bind(name)
            .execute(&self.pool)
            .await?;

        let row = sqlx::query("SELECT id FROM tags WHERE name = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("id"))
    }

    /// Attach an existing tag to a message.
    ///
    /// Returns `false` if no tag with that name exists; attaching is then a
    /// no-op rather than an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn add_tag(&self, message_id: i64, tag_name: &str) -> Result<bool> {
        let Some(tag_id) = self.tag_id(tag_name).await? else {
            return Ok(false);
        };

        sqlx::query("INSERT OR IGNORE INTO message_tags (message_id, tag_id) VALUES (?, ?)")
            .bind(message_id)
            .bind(tag_id)
            .execute(&self.pool)
            .await?;
        Ok(true)
    }

    /// Detach a tag from a message.
    ///
    /// Returns `false` if no tag with that name exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn remove_tag(&self, message_id: i64, tag_name: &str) -> Result<bool> {
        let Some(tag_id) = self.tag_id(tag_name).await? else {
            return Ok(false);
        };

        sqlx::query("DELETE FROM message_tags WHERE message_id = ? AND tag_id = ?")
            .bind(message_id)
            .bind(tag_id)
            .execute(&self.pool)
            .await?;
        Ok(true)
    }

    /// Tag names attached to a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn tags_for(&self, message_id: i64) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r"
            SELECT t.name FROM tags t
            JOIN message_tags mt ON mt.tag_id = t.id
            WHERE mt.message_id = ?
            ORDER BY t.name
            ",
        )
        .bind(message_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|r| r.get("name")).collect())
    }

    async fn tag_id(&self, name: &str) -> Result<Option<i64>> {
        let row = sqlx::query("SELECT id FROM tags WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("id")))
    }

    /// Record metadata for an attachment persisted to disk, and mark the
    /// owning message as having attachments.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn record_attachment(
        &self,
        message_id: i64,
        filename: &str,
        content_type: &str,
        size: i64,
        file_path: &str,
    ) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO attachments (message_id, filename, content_type, size, file_path)
            VALUES (?, ?, ?, ?, ?)
            ",
        )
        .bind(message_id)
        .bind(filename)
        .bind(content_type)
        .bind(size)
        .bind(file_path)
        .execute(&self.pool)
        .await?;

        sqlx::query("UPDATE messages SET has_attachments = 1 WHERE id = ?")
            .bind(message_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Attachment metadata rows for a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn attachments_for(&self, message_id: i64) -> Result<Vec<AttachmentMeta>> {
        let rows = sqlx::query(
            "SELECT id, message_id, filename, content_type, size, file_path
             FROM attachments WHERE message_id = ? ORDER BY id",
        )
        .bind(message_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| AttachmentMeta {
                id: r.get("id"),
                message_id: r.get("message_id"),
                filename: r.get("filename"),
                content_type: r.get("content_type"),
                size: r.get("size"),
                file_path: r.get("file_path"),
            })
            .collect())
    }

    /// Upsert the bookkeeping record for a folder, stamping `last_sync`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn touch_folder(&self, account_id: AccountId, folder: &str) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO folders (account_id, name, last_sync)
            VALUES (?, ?, ?)
            ON CONFLICT(account_id, name) DO UPDATE SET last_sync = excluded.last_sync
            ",
        )
        .bind(account_id.0)
        .bind(folder)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// When the folder was last synced, if ever.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn folder_last_sync(
        &self,
        account_id: AccountId,
        folder: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query("SELECT last_sync FROM folders WHERE account_id = ? AND name = ?")
            .bind(account_id.0)
            .bind(folder)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row
            .and_then(|r| r.get::<Option<String>, _>("last_sync"))
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|d| d.with_timezone(&Utc)))
    }

    /// Find a draft by its server UID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_draft_by_uid(&self, account_id: AccountId, uid: u32) -> Result<Option<Draft>> {
        let row = sqlx::query("SELECT * FROM drafts WHERE account_id = ? AND uid = ?")
            .bind(account_id.0)
            .bind(uid)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_draft).transpose()
    }

    /// Insert a draft row, returning its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn insert_draft(&self, draft: &Draft) -> Result<i64> {
        let result = sqlx::query(
            r"
            INSERT INTO drafts (account_id, uid, message_id, to_addrs, cc_addrs, subject, body_text)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(draft.account_id.0)
        .bind(draft.uid)
        .bind(&draft.message_id)
        .bind(serde_json::to_string(&draft.to_addrs)?)
        .bind(serde_json::to_string(&draft.cc_addrs)?)
        .bind(&draft.subject)
        .bind(&draft.body_text)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// List all drafts for an account, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_drafts(&self, account_id: AccountId) -> Result<Vec<Draft>> {
        let rows = sqlx::query("SELECT * FROM drafts WHERE account_id = ? ORDER BY updated_at DESC")
            .bind(account_id.0)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_draft).collect()
    }
}

/// Convert a database row to a `StoredMessage`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn row_to_message(row: &SqliteRow) -> Result<StoredMessage> {
    let to_addrs: Vec<String> = serde_json::from_str(&row.get::<String, _>("to_addrs"))?;
    let cc_addrs: Vec<String> = serde_json::from_str(&row.get::<String, _>("cc_addrs"))?;
    let flags: Vec<String> = serde_json::from_str(&row.get::<String, _>("flags"))?;

    Ok(StoredMessage {
        id: row.get("id"),
        account_id: AccountId::new(row.get("account_id")),
        uid: row.get::<i64, _>("uid") as u32,
        folder: row.get("folder"),
        message_id: row.get("message_id"),
        from_addr: row.get("from_addr"),
        to_addrs,
        cc_addrs,
        subject: row.get("subject"),
        date: parse_date(row.get("date")),
        body_text: row.get("body_text"),
        body_html: row.get("body_html"),
        is_read: row.get("is_read"),
        is_spam: row.get("is_spam"),
        is_starred: row.get("is_starred"),
        is_important: row.get("is_important"),
        is_deleted: row.get("is_deleted"),
        deleted_at: parse_date(row.get("deleted_at")),
        has_attachments: row.get("has_attachments"),
        flags,
        thread_id: row.get("thread_id"),
    })
}

/// Convert a database row to a `Draft`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn row_to_draft(row: &SqliteRow) -> Result<Draft> {
    let to_addrs: Vec<String> = serde_json::from_str(&row.get::<String, _>("to_addrs"))?;
    let cc_addrs: Vec<String> = serde_json::from_str(&row.get::<String, _>("cc_addrs"))?;

    Ok(Draft {
        id: row.get("id"),
        account_id: AccountId::new(row.get("account_id")),
        uid: row.get::<Option<i64>, _>("uid").map(|u| u as u32),
        message_id: row.get("message_id"),
        to_addrs,
        cc_addrs,
        subject: row.get("subject"),
        body_text: row.get("body_text"),
    })
}

fn parse_date(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
}
