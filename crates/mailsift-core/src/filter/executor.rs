//! Applies a matched filter's actions to a persisted message.
//!
//! Actions are independent: one failure is reported in its outcome and the
//! remaining actions still run. The caller decides how to present partial
//! failure.

use tracing::warn;

use super::model::{FilterAction, FilterActionKind};
use crate::message::{MessageRepository, StoredMessage};

/// Result of one action.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    /// The action name as stored on the filter.
    pub action: String,
    /// Whether the mutation was applied.
    pub success: bool,
    /// Failure explanation, when there is one.
    pub detail: Option<String>,
}

impl ActionOutcome {
    fn ok(action: &str) -> Self {
        Self {
            action: action.to_string(),
            success: true,
            detail: None,
        }
    }

    fn failed(action: &str, detail: impl Into<String>) -> Self {
        Self {
            action: action.to_string(),
            success: false,
            detail: Some(detail.into()),
        }
    }
}

/// Executes filter actions against the message store.
#[derive(Clone)]
pub struct ActionExecutor {
    messages: MessageRepository,
}

impl ActionExecutor {
    /// Create an executor over the message repository.
    #[must_use]
    pub const fn new(messages: MessageRepository) -> Self {
        Self { messages }
    }

    /// Execute a single action, reporting its outcome.
    pub async fn execute_action(
        &self,
        message: &StoredMessage,
        action: &FilterAction,
    ) -> ActionOutcome {
        let Some(kind) = FilterActionKind::parse(&action.action) else {
            warn!(action = %action.action, "unknown filter action");
            return ActionOutcome::failed(&action.action, "unknown action");
        };

        let result = match kind {
            FilterActionKind::Move => match action.value.as_deref() {
                Some(folder) if !folder.is_empty() => {
                    self.messages.move_to_folder(message.id, folder).await
                }
                _ => return ActionOutcome::failed(&action.action, "move requires a target folder"),
            },
            FilterActionKind::MarkRead => self.messages.mark_as_read(message.id).await,
            FilterActionKind::MarkUnread => self.messages.mark_as_unread(message.id).await,
            FilterActionKind::Star => self.messages.set_starred(message.id, true).await,
            FilterActionKind::Unstar => self.messages.set_starred(message.id, false).await,
            FilterActionKind::Flag => self.messages.set_important(message.id, true).await,
            FilterActionKind::Unflag => self.messages.set_important(message.id, false).await,
            FilterActionKind::Delete => self.messages.soft_delete(message.id).await,
            FilterActionKind::MarkSpam => self.messages.mark_as_spam(message.id).await,
            FilterActionKind::AddTag | FilterActionKind::RemoveTag => {
                return self.execute_tag_action(message, action, kind).await;
            }
        };

        match result {
            Ok(()) => ActionOutcome::ok(&action.action),
            Err(e) => {
                warn!(action = %action.action, message_id = message.id, error = %e, "filter action failed");
                ActionOutcome::failed(&action.action, e.to_string())
            }
        }
    }

    async fn execute_tag_action(
        &self,
        message: &StoredMessage,
        action: &FilterAction,
        kind: FilterActionKind,
    ) -> ActionOutcome {
        let Some(tag) = action.value.as_deref().filter(|t| !t.is_empty()) else {
            return ActionOutcome::failed(&action.action, "tag action requires a tag name");
        };

        let result = match kind {
            FilterActionKind::AddTag => self.messages.add_tag(message.id, tag).await,
            _ => self.messages.remove_tag(message.id, tag).await,
        };

        match result {
            Ok(true) => ActionOutcome::ok(&action.action),
            Ok(false) => ActionOutcome::failed(&action.action, format!("tag '{tag}' does not exist")),
            Err(e) => ActionOutcome::failed(&action.action, e.to_string()),
        }
    }

    /// Execute every action in order, collecting all outcomes.
    pub async fn execute_actions(
        &self,
        message: &StoredMessage,
        actions: &[FilterAction],
    ) -> Vec<ActionOutcome> {
        let mut outcomes = Vec::with_capacity(actions.len());
        for action in actions {
            outcomes.push(self.execute_action(message, action).await);
        }
        outcomes
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::AccountId;
    use crate::message::NewMessage;

    async fn setup() -> (ActionExecutor, MessageRepository, StoredMessage) {
        let repo = MessageRepository::in_memory().await.unwrap();
        let stored = repo
            .insert(&NewMessage {
                account_id: AccountId::new(1),
                uid: 1,
                folder: "INBOX".to_string(),
                from_addr: "a@example.com".to_string(),
                subject: "subject".to_string(),
                ..NewMessage::default()
            })
            .await
            .unwrap();
        (ActionExecutor::new(repo.clone()), repo, stored)
    }

    #[tokio::test]
    async fn test_move_action() {
        let (executor, repo, msg) = setup().await;

        let outcome = executor
            .execute_action(&msg, &FilterAction::new("move", Some("Archive")))
            .await;
        assert!(outcome.success);

        let moved = repo.find_by_id(msg.id).await.unwrap().unwrap();
        assert_eq!(moved.folder, "Archive");
    }

    #[tokio::test]
    async fn test_move_without_target_fails_softly() {
        let (executor, _repo, msg) = setup().await;

        let outcome = executor
            .execute_action(&msg, &FilterAction::new("move", None))
            .await;
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn test_unknown_action_fails_softly() {
        let (executor, _repo, msg) = setup().await;

        let outcome = executor
            .execute_action(&msg, &FilterAction::new("forward", Some("x@example.com")))
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.detail.as_deref(), Some("unknown action"));
    }

    #[tokio::test]
    async fn test_tag_action_requires_existing_tag() {
        let (executor, repo, msg) = setup().await;

        let outcome = executor
            .execute_action(&msg, &FilterAction::new("add_tag", Some("urgent")))
            .await;
        assert!(!outcome.success);

        repo.create_tag("urgent").await.unwrap();
        let outcome = executor
            .execute_action(&msg, &FilterAction::new("add_tag", Some("urgent")))
            .await;
        assert!(outcome.success);
        assert_eq!(repo.tags_for(msg.id).await.unwrap(), vec!["urgent"]);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_subsequent_actions() {
        let (executor, repo, msg) = setup().await;

        let actions = vec![
            FilterAction::new("add_tag", Some("missing-tag")),
            FilterAction::new("mark_read", None),
            FilterAction::new("star", None),
        ];
        let outcomes = executor.execute_actions(&msg, &actions).await;

        assert_eq!(outcomes.len(), 3);
        assert!(!outcomes[0].success);
        assert!(outcomes[1].success);
        assert!(outcomes[2].success);

        let updated = repo.find_by_id(msg.id).await.unwrap().unwrap();
        assert!(updated.is_read);
        assert!(updated.is_starred);
    }

    #[tokio::test]
    async fn test_delete_and_spam_actions() {
        let (executor, repo, msg) = setup().await;

        let outcomes = executor
            .execute_actions(
                &msg,
                &[
                    FilterAction::new("mark_spam", None),
                    FilterAction::new("delete", None),
                ],
            )
            .await;
        assert!(outcomes.iter().all(|o| o.success));

        let updated = repo.find_by_id(msg.id).await.unwrap().unwrap();
        assert!(updated.is_spam);
        assert!(updated.is_deleted);
        assert!(updated.deleted_at.is_some());
    }
}
