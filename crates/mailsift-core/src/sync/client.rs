//! Interface to the remote mailbox.
//!
//! The wire protocol lives in its own crate behind this trait; the sync
//! engine only needs folder selection, windowed fetching, parsing, and
//! append for draft upload.

use chrono::{DateTime, Utc};

/// Errors surfaced by a mailbox client implementation.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Connection could not be established or was lost.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// A folder could not be opened.
    #[error("Cannot open folder: {0}")]
    Folder(String),

    /// A fetch operation failed.
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// A raw message could not be parsed.
    #[error("Parse failed: {0}")]
    Parse(String),

    /// An append operation failed.
    #[error("Append failed: {0}")]
    Append(String),
}

/// Status of an opened folder.
#[derive(Debug, Clone, Copy)]
pub struct FolderStatus {
    /// Number of messages the server reports in the folder.
    pub total: u32,
}

/// A fetched message before parsing. The UID is available up front so the
/// engine can skip already-persisted messages without parsing them.
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Server-assigned UID.
    pub uid: u32,
    /// Raw RFC 822 bytes.
    pub data: Vec<u8>,
}

/// An attachment extracted from a parsed message.
#[derive(Debug, Clone)]
pub struct ParsedAttachment {
    /// Filename as sent.
    pub filename: String,
    /// MIME type.
    pub content_type: String,
    /// Size in bytes.
    pub size: u64,
    /// Attachment bytes.
    pub content: Vec<u8>,
}

/// A raw message parsed into structured fields.
#[derive(Debug, Clone, Default)]
pub struct ParsedMessage {
    /// Server-assigned UID.
    pub uid: u32,
    /// Message-ID header, when present.
    pub message_id: Option<String>,
    /// Sender address.
    pub from: String,
    /// Recipient addresses.
    pub to: Vec<String>,
    /// CC addresses.
    pub cc: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Message date.
    pub date: Option<DateTime<Utc>>,
    /// Plain text body.
    pub body_text: Option<String>,
    /// HTML body.
    pub body_html: Option<String>,
    /// Attachments.
    pub attachments: Vec<ParsedAttachment>,
    /// Raw server flags.
    pub flags: Vec<String>,
}

impl ParsedMessage {
    /// Whether the server reported the message as seen.
    #[must_use]
    pub fn is_seen(&self) -> bool {
        self.flags.iter().any(|f| f.eq_ignore_ascii_case("\\seen"))
    }
}

/// Selection window for a fetch, computed from the folder watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchWindow {
    /// Full sync: the folder has never been persisted.
    All,
    /// Incremental sync: everything after the given UID.
    After(u32),
}

impl FetchWindow {
    /// Derive the window from the highest persisted UID, if any.
    #[must_use]
    pub const fn from_watermark(last_uid: Option<u32>) -> Self {
        match last_uid {
            Some(uid) => Self::After(uid),
            None => Self::All,
        }
    }

    /// Render the selection criterion the server understands.
    #[must_use]
    pub fn criterion(&self) -> String {
        match self {
            Self::All => "ALL".to_string(),
            Self::After(uid) => format!("UID {}:*", uid + 1),
        }
    }
}

impl std::fmt::Display for FetchWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.criterion())
    }
}

/// Operations the sync engine needs from a remote mailbox.
pub trait MailboxClient {
    /// Establish the connection.
    fn connect(&mut self) -> impl Future<Output = Result<(), ClientError>> + Send;

    /// Tear the connection down.
    fn disconnect(&mut self) -> impl Future<Output = Result<(), ClientError>> + Send;

    /// Open a folder, returning its status.
    fn open_folder(
        &mut self,
        name: &str,
        read_only: bool,
    ) -> impl Future<Output = Result<FolderStatus, ClientError>> + Send;

    /// Fetch all messages matching the window, in UID order.
    fn fetch(
        &mut self,
        window: &FetchWindow,
    ) -> impl Future<Output = Result<Vec<RawMessage>, ClientError>> + Send;

    /// Parse a raw message into structured fields.
    ///
    /// # Errors
    ///
    /// Returns an error when the raw bytes cannot be parsed.
    fn parse(&self, raw: &RawMessage) -> Result<ParsedMessage, ClientError>;

    /// Append a message to a mailbox (draft upload).
    fn append(
        &mut self,
        message: &str,
        mailbox: &str,
        flags: &[String],
    ) -> impl Future<Output = Result<(), ClientError>> + Send;
}
