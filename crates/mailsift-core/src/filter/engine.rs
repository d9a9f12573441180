//! Filter engine: evaluates enabled filters against a message and applies
//! the actions of every filter that matches.

use tracing::debug;

use super::executor::{ActionExecutor, ActionOutcome};
use super::matcher;
use super::repository::{FilterRepository, FilterStats};
use crate::account::AccountId;
use crate::message::MessageRepository;
use crate::{Error, Result};

/// A filter that matched and had its actions executed.
#[derive(Debug, Clone)]
pub struct AppliedFilter {
    /// The filter's id.
    pub filter_id: i64,
    /// The filter's name.
    pub name: String,
    /// Per-action outcomes, in action order.
    pub outcomes: Vec<ActionOutcome>,
}

/// Result of running all filters against one message.
#[derive(Debug, Clone, Default)]
pub struct FilterRun {
    /// Whether any filter matched.
    pub matched: bool,
    /// Every filter that matched, in evaluation order.
    pub applied: Vec<AppliedFilter>,
}

/// Evaluates filters and dispatches their actions.
#[derive(Clone)]
pub struct FilterEngine {
    filters: FilterRepository,
    messages: MessageRepository,
    executor: ActionExecutor,
}

impl FilterEngine {
    /// Create an engine over the filter and message repositories.
    #[must_use]
    pub fn new(filters: FilterRepository, messages: MessageRepository) -> Self {
        let executor = ActionExecutor::new(messages.clone());
        Self {
            filters,
            messages,
            executor,
        }
    }

    /// Run every enabled filter against a message.
    ///
    /// Filters run in descending priority order. Because an earlier filter's
    /// actions may change fields a later filter tests on (a `move` rewrites
    /// `folder`), the message is re-read from the store before each filter:
    /// every filter sees the latest persisted state, not a stale snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error only if the filter list or the message cannot be
    /// loaded; individual action failures are reported in the outcomes.
    pub async fn apply_filters(&self, message_id: i64, account_id: AccountId) -> Result<FilterRun> {
        let filters = self.filters.list_enabled(account_id).await?;

        let mut run = FilterRun::default();
        for filter in filters {
            let Some(message) = self.messages.find_by_id(message_id).await? else {
                // A prior filter removed the row; nothing left to evaluate.
                break;
            };

            if !matcher::filter_matches(&message, &filter) {
                continue;
            }

            debug!(filter = %filter.name, message_id, "filter matched");
            let outcomes = self.executor.execute_actions(&message, &filter.actions).await;
            run.applied.push(AppliedFilter {
                filter_id: filter.id,
                name: filter.name,
                outcomes,
            });
        }

        run.matched = !run.applied.is_empty();
        Ok(run)
    }

    /// Evaluate one filter against a message without executing actions.
    ///
    /// # Errors
    ///
    /// Returns an error if the filter or message does not exist or cannot
    /// be loaded.
    pub async fn test_filter(&self, message_id: i64, filter_id: i64) -> Result<bool> {
        let filter = self
            .filters
            .find(filter_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("filter {filter_id}")))?;
        let message = self
            .messages
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("message {message_id}")))?;

        Ok(matcher::filter_matches(&message, &filter))
    }

    /// Counts of filters by enablement.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn stats(&self) -> Result<FilterStats> {
        self.filters.stats().await
    }
}
