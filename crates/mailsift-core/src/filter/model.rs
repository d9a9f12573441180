//! Filter data models.
//!
//! Conditions and actions are stored with their user-authored field,
//! operator, and action strings; evaluation parses them into the closed
//! enums below. A string that doesn't parse makes that condition or action
//! fail closed instead of failing the whole filter load.

use crate::AccountId;

/// A message field a condition can test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionField {
    /// Sender address.
    From,
    /// Recipient list.
    To,
    /// CC list.
    Cc,
    /// Subject line.
    Subject,
    /// Concatenated text and HTML bodies.
    Body,
    /// Whether the message carries attachments.
    HasAttachments,
    /// Subject plus body lengths.
    Size,
    /// Message date.
    Date,
    /// Current folder.
    Folder,
}

impl ConditionField {
    /// Parse a stored field name. Unknown names yield `None`; the caller
    /// treats the condition as unsatisfiable.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "from" => Some(Self::From),
            "to" => Some(Self::To),
            "cc" => Some(Self::Cc),
            "subject" => Some(Self::Subject),
            "body" => Some(Self::Body),
            "has_attachments" => Some(Self::HasAttachments),
            "size" => Some(Self::Size),
            "date" => Some(Self::Date),
            "folder" => Some(Self::Folder),
            _ => None,
        }
    }

    /// Stored string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::From => "from",
            Self::To => "to",
            Self::Cc => "cc",
            Self::Subject => "subject",
            Self::Body => "body",
            Self::HasAttachments => "has_attachments",
            Self::Size => "size",
            Self::Date => "date",
            Self::Folder => "folder",
        }
    }
}

/// Comparison operator for a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOperator {
    /// Case-insensitive equality; boolean-aware for boolean fields.
    Equals,
    /// Negated equality.
    NotEquals,
    /// Substring containment.
    Contains,
    /// Negated containment.
    NotContains,
    /// Prefix match.
    StartsWith,
    /// Suffix match.
    EndsWith,
    /// Regular-expression match; an invalid pattern never matches.
    MatchesRegex,
    /// Numeric greater-than.
    GreaterThan,
    /// Numeric less-than.
    LessThan,
    /// Field is null, an empty string, or an empty list.
    IsEmpty,
    /// Negation of `IsEmpty`.
    IsNotEmpty,
}

impl ConditionOperator {
    /// Parse a stored operator name. Unknown names yield `None`; the caller
    /// treats the condition as unsatisfiable.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "equals" => Some(Self::Equals),
            "not_equals" => Some(Self::NotEquals),
            "contains" => Some(Self::Contains),
            "not_contains" => Some(Self::NotContains),
            "starts_with" => Some(Self::StartsWith),
            "ends_with" => Some(Self::EndsWith),
            "matches_regex" => Some(Self::MatchesRegex),
            "greater_than" => Some(Self::GreaterThan),
            "less_than" => Some(Self::LessThan),
            "is_empty" => Some(Self::IsEmpty),
            "is_not_empty" => Some(Self::IsNotEmpty),
            _ => None,
        }
    }

    /// Stored string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::MatchesRegex => "matches_regex",
            Self::GreaterThan => "greater_than",
            Self::LessThan => "less_than",
            Self::IsEmpty => "is_empty",
            Self::IsNotEmpty => "is_not_empty",
        }
    }
}

/// A mutation a matched filter can apply to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterActionKind {
    /// Rewrite the folder.
    Move,
    /// Mark read.
    MarkRead,
    /// Mark unread.
    MarkUnread,
    /// Set the star.
    Star,
    /// Clear the star.
    Unstar,
    /// Set the important flag.
    Flag,
    /// Clear the important flag.
    Unflag,
    /// Soft-delete.
    Delete,
    /// Mark as spam.
    MarkSpam,
    /// Attach an existing tag.
    AddTag,
    /// Detach a tag.
    RemoveTag,
}

impl FilterActionKind {
    /// Parse a stored action name. Unknown names yield `None`; the executor
    /// reports a failed outcome instead of erroring.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "move" => Some(Self::Move),
            "mark_read" => Some(Self::MarkRead),
            "mark_unread" => Some(Self::MarkUnread),
            "star" => Some(Self::Star),
            "unstar" => Some(Self::Unstar),
            "flag" => Some(Self::Flag),
            "unflag" => Some(Self::Unflag),
            "delete" => Some(Self::Delete),
            "mark_spam" => Some(Self::MarkSpam),
            "add_tag" => Some(Self::AddTag),
            "remove_tag" => Some(Self::RemoveTag),
            _ => None,
        }
    }

    /// Stored string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Move => "move",
            Self::MarkRead => "mark_read",
            Self::MarkUnread => "mark_unread",
            Self::Star => "star",
            Self::Unstar => "unstar",
            Self::Flag => "flag",
            Self::Unflag => "unflag",
            Self::Delete => "delete",
            Self::MarkSpam => "mark_spam",
            Self::AddTag => "add_tag",
            Self::RemoveTag => "remove_tag",
        }
    }
}

/// One condition of a filter, as stored.
#[derive(Debug, Clone)]
pub struct FilterCondition {
    /// Field name (see [`ConditionField`]).
    pub field: String,
    /// Operator name (see [`ConditionOperator`]).
    pub operator: String,
    /// Comparison value.
    pub value: String,
}

impl FilterCondition {
    /// Convenience constructor.
    #[must_use]
    pub fn new(field: &str, operator: &str, value: &str) -> Self {
        Self {
            field: field.to_string(),
            operator: operator.to_string(),
            value: value.to_string(),
        }
    }
}

/// One action of a filter, as stored.
#[derive(Debug, Clone)]
pub struct FilterAction {
    /// Action name (see [`FilterActionKind`]).
    pub action: String,
    /// Action argument (target folder, tag name), when the action takes one.
    pub value: Option<String>,
}

impl FilterAction {
    /// Convenience constructor.
    #[must_use]
    pub fn new(action: &str, value: Option<&str>) -> Self {
        Self {
            action: action.to_string(),
            value: value.map(ToString::to_string),
        }
    }
}

/// A persisted filter with its ordered conditions and actions.
#[derive(Debug, Clone)]
pub struct Filter {
    /// Row identifier.
    pub id: i64,
    /// Owning account; `None` means the filter applies to every account.
    pub account_id: Option<AccountId>,
    /// Display name.
    pub name: String,
    /// Evaluation priority; higher runs first.
    pub priority: i64,
    /// AND semantics across conditions when true, OR when false.
    pub match_all: bool,
    /// Whether the filter participates in evaluation.
    pub is_enabled: bool,
    /// Ordered conditions. An empty list always matches.
    pub conditions: Vec<FilterCondition>,
    /// Ordered actions executed on match.
    pub actions: Vec<FilterAction>,
}

/// Fields for creating a filter.
#[derive(Debug, Clone, Default)]
pub struct NewFilter {
    /// Owning account; `None` for a global filter.
    pub account_id: Option<AccountId>,
    /// Display name.
    pub name: String,
    /// Evaluation priority; higher runs first.
    pub priority: i64,
    /// AND semantics when true, OR when false.
    pub match_all: bool,
    /// Whether the filter starts enabled.
    pub is_enabled: bool,
    /// Ordered conditions.
    pub conditions: Vec<FilterCondition>,
    /// Ordered actions.
    pub actions: Vec<FilterAction>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_parse_roundtrip() {
        for field in [
            ConditionField::From,
            ConditionField::To,
            ConditionField::Cc,
            ConditionField::Subject,
            ConditionField::Body,
            ConditionField::HasAttachments,
            ConditionField::Size,
            ConditionField::Date,
            ConditionField::Folder,
        ] {
            assert_eq!(ConditionField::parse(field.as_str()), Some(field));
        }
        assert_eq!(ConditionField::parse("x-priority"), None);
    }

    #[test]
    fn test_operator_parse_is_case_insensitive() {
        assert_eq!(
            ConditionOperator::parse("CONTAINS"),
            Some(ConditionOperator::Contains)
        );
        assert_eq!(ConditionOperator::parse("fuzzy_match"), None);
    }

    #[test]
    fn test_action_parse_roundtrip() {
        for kind in [
            FilterActionKind::Move,
            FilterActionKind::MarkRead,
            FilterActionKind::MarkUnread,
            FilterActionKind::Star,
            FilterActionKind::Unstar,
            FilterActionKind::Flag,
            FilterActionKind::Unflag,
            FilterActionKind::Delete,
            FilterActionKind::MarkSpam,
            FilterActionKind::AddTag,
            FilterActionKind::RemoveTag,
        ] {
            assert_eq!(FilterActionKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(FilterActionKind::parse("forward"), None);
    }
}
