//! Incremental synchronization: mailbox client interface, desktop
//! notifications, and the orchestrating engine.

pub mod client;
pub mod engine;
pub mod notify;

pub use client::{
    ClientError, FetchWindow, FolderStatus, MailboxClient, ParsedAttachment, ParsedMessage,
    RawMessage,
};
pub use engine::{FolderReport, SyncEngine, SyncError, SyncReport};
pub use notify::{DesktopNotifier, NewMailNotice, Notifier};
