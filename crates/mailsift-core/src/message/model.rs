//! Message data models.

use chrono::{DateTime, Utc};

use crate::AccountId;

/// A message persisted in the local store.
///
/// Identity fields (`uid`, `folder`, `message_id`) are fixed at creation;
/// state fields are mutated by filter actions and user commands afterwards.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    /// Row identifier.
    pub id: i64,
    /// Account this message belongs to.
    pub account_id: AccountId,
    /// Server-assigned UID, unique per folder.
    pub uid: u32,
    /// Folder the message currently lives in.
    pub folder: String,
    /// Globally unique Message-ID header, when the server provided one.
    pub message_id: Option<String>,
    /// Sender address.
    pub from_addr: String,
    /// Recipient addresses.
    pub to_addrs: Vec<String>,
    /// CC addresses.
    pub cc_addrs: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Message date.
    pub date: Option<DateTime<Utc>>,
    /// Plain text body.
    pub body_text: Option<String>,
    /// HTML body.
    pub body_html: Option<String>,
    /// Whether the message has been read.
    pub is_read: bool,
    /// Whether the message was classified or marked as spam.
    pub is_spam: bool,
    /// Whether the message is starred.
    pub is_starred: bool,
    /// Whether the message is flagged important.
    pub is_important: bool,
    /// Soft-delete marker.
    pub is_deleted: bool,
    /// When the message was soft-deleted.
    pub deleted_at: Option<DateTime<Utc>>,
    /// Whether any attachments were persisted for this message.
    pub has_attachments: bool,
    /// Raw server flags as fetched.
    pub flags: Vec<String>,
    /// Conversation thread, when assigned.
    pub thread_id: Option<i64>,
}

impl StoredMessage {
    /// Concatenated text and HTML bodies, used by filter conditions that
    /// test against "body".
    #[must_use]
    pub fn combined_body(&self) -> String {
        let mut body = self.body_text.clone().unwrap_or_default();
        if let Some(ref html) = self.body_html {
            if !body.is_empty() {
                body.push('\n');
            }
            body.push_str(html);
        }
        body
    }

    /// Approximate message size: subject plus both body lengths.
    #[must_use]
    pub fn size(&self) -> usize {
        self.subject.len()
            + self.body_text.as_ref().map_or(0, String::len)
            + self.body_html.as_ref().map_or(0, String::len)
    }
}

/// Fields for inserting a newly fetched message.
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    /// Account this message belongs to.
    pub account_id: AccountId,
    /// Server-assigned UID.
    pub uid: u32,
    /// Folder the message was fetched from.
    pub folder: String,
    /// Message-ID header, when present.
    pub message_id: Option<String>,
    /// Sender address.
    pub from_addr: String,
    /// Recipient addresses.
    pub to_addrs: Vec<String>,
    /// CC addresses.
    pub cc_addrs: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Message date.
    pub date: Option<DateTime<Utc>>,
    /// Plain text body.
    pub body_text: Option<String>,
    /// HTML body.
    pub body_html: Option<String>,
    /// Whether the server reported the message as seen.
    pub is_read: bool,
    /// Raw server flags.
    pub flags: Vec<String>,
}

/// Attachment metadata; the blob itself lives on disk at `file_path`.
#[derive(Debug, Clone)]
pub struct AttachmentMeta {
    /// Row identifier.
    pub id: i64,
    /// Owning message.
    pub message_id: i64,
    /// Original filename as sent.
    pub filename: String,
    /// MIME type.
    pub content_type: String,
    /// Size in bytes.
    pub size: i64,
    /// Path of the stored blob.
    pub file_path: String,
}

/// A locally stored draft.
#[derive(Debug, Clone, Default)]
pub struct Draft {
    /// Row identifier (0 until persisted).
    pub id: i64,
    /// Account this draft belongs to.
    pub account_id: AccountId,
    /// Server UID once the draft exists remotely.
    pub uid: Option<u32>,
    /// Message-ID header, when present.
    pub message_id: Option<String>,
    /// Recipient addresses.
    pub to_addrs: Vec<String>,
    /// CC addresses.
    pub cc_addrs: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Draft body text.
    pub body_text: String,
}

/// Type of folder, detected from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderType {
    /// Inbox folder.
    Inbox,
    /// Sent mail folder.
    Sent,
    /// Drafts folder.
    Drafts,
    /// Trash folder.
    Trash,
    /// Spam/junk folder.
    Spam,
    /// Archive folder.
    Archive,
    /// Regular folder.
    Regular,
}

impl FolderType {
    /// Detect folder type from its name.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower == "inbox" {
            Self::Inbox
        } else if lower.contains("sent") {
            Self::Sent
        } else if lower.contains("draft") {
            Self::Drafts
        } else if lower.contains("trash") || lower.contains("deleted") {
            Self::Trash
        } else if lower.contains("spam") || lower.contains("junk") {
            Self::Spam
        } else if lower.contains("archive") {
            Self::Archive
        } else {
            Self::Regular
        }
    }

    /// Whether recipients of messages in this folder were addressed by the
    /// user (drives contact collection during sync).
    #[must_use]
    pub const fn is_outgoing(&self) -> bool {
        matches!(self, Self::Sent | Self::Drafts)
    }
}
