//! # mailsift-core
//!
//! Incremental mail synchronization and enrichment pipeline for the
//! `mailsift` email client.
//!
//! This crate provides:
//! - Sync orchestration: watermark-driven incremental fetch, two-stage
//!   deduplication, idempotent persistence
//! - Spam classification: sender lists plus weighted rule scoring
//! - Rule-based filtering: conditions, actions, and the engine applying them
//! - Message, draft, attachment, and contact storage (`SQLite`)
//! - Desktop notifications for new mail
//!
//! The remote mailbox is consumed through the [`sync::MailboxClient`]
//! trait; the wire protocol and the presentation layer live elsewhere.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod account;
pub mod config;
pub mod contacts;
pub mod db;
mod error;
pub mod filter;
pub mod message;
pub mod spam;
pub mod sync;

pub use account::AccountId;
pub use config::{NotificationSettings, SyncSettings};
pub use contacts::{Contact, ContactRepository};
pub use error::{Error, Result};
pub use filter::{
    ActionOutcome, Filter, FilterAction, FilterCondition, FilterEngine, FilterRepository,
    FilterStats, NewFilter,
};
pub use message::{
    AttachmentStore, Draft, FolderType, MessageRepository, NewMessage, StoredMessage,
};
pub use spam::{ListKind, RuleType, SPAM_THRESHOLD, SpamClassifier, SpamRepository, SpamVerdict};
pub use sync::{
    DesktopNotifier, FetchWindow, MailboxClient, NewMailNotice, Notifier, ParsedMessage,
    RawMessage, SyncEngine, SyncError, SyncReport,
};
