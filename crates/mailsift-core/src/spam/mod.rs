//! Spam detection: sender lists, weighted rules, and the classifier.

pub mod classifier;
pub mod model;
pub mod repository;

pub use classifier::{SPAM_THRESHOLD, SpamClassifier};
pub use model::{ListEntry, ListKind, RuleType, SpamRule, SpamVerdict, domain_of};
pub use repository::SpamRepository;
