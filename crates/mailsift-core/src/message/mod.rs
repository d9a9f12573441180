//! Message domain: persisted messages, drafts, attachments.

pub mod attachments;
pub mod model;
pub mod repository;

pub use attachments::AttachmentStore;
pub use model::{AttachmentMeta, Draft, FolderType, NewMessage, StoredMessage};
pub use repository::MessageRepository;
