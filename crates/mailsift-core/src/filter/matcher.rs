//! Pure predicate evaluation for filter conditions.
//!
//! Everything here is infallible by contract: an unknown field or operator,
//! an invalid regex, or a non-numeric comparison makes the condition false.
//! A malformed filter must never abort a sync batch.

use tracing::warn;

use super::model::{ConditionField, ConditionOperator, Filter, FilterCondition};
use crate::message::StoredMessage;

/// A message field resolved for comparison.
#[derive(Debug, Clone, PartialEq)]
enum FieldValue {
    Text(String),
    TextList(Vec<String>),
    Bool(bool),
    Number(i64),
    /// Known field with no value (e.g. a message without a date).
    Missing,
}

impl FieldValue {
    /// Lowercased textual form used by the string operators.
    fn as_text(&self) -> Option<String> {
        match self {
            Self::Text(s) => Some(s.to_lowercase()),
            Self::TextList(items) => Some(items.join(", ").to_lowercase()),
            Self::Bool(b) => Some(b.to_string()),
            Self::Number(n) => Some(n.to_string()),
            Self::Missing => None,
        }
    }

    /// Numeric form used by `greater_than`/`less_than`.
    fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => {
                #[allow(clippy::cast_precision_loss)]
                Some(*n as f64)
            }
            Self::Text(s) => s.trim().parse().ok(),
            Self::TextList(_) | Self::Bool(_) | Self::Missing => None,
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.is_empty(),
            Self::TextList(items) => items.is_empty(),
            Self::Missing => true,
            Self::Bool(_) | Self::Number(_) => false,
        }
    }
}

fn resolve_field(message: &StoredMessage, field: ConditionField) -> FieldValue {
    match field {
        ConditionField::From => FieldValue::Text(message.from_addr.clone()),
        ConditionField::To => FieldValue::TextList(message.to_addrs.clone()),
        ConditionField::Cc => FieldValue::TextList(message.cc_addrs.clone()),
        ConditionField::Subject => FieldValue::Text(message.subject.clone()),
        ConditionField::Body => FieldValue::Text(message.combined_body()),
        ConditionField::HasAttachments => FieldValue::Bool(message.has_attachments),
        ConditionField::Size => {
            #[allow(clippy::cast_possible_wrap)]
            FieldValue::Number(message.size() as i64)
        }
        ConditionField::Date => message
            .date
            .map_or(FieldValue::Missing, |d| FieldValue::Number(d.timestamp())),
        ConditionField::Folder => FieldValue::Text(message.folder.clone()),
    }
}

/// Evaluate one condition against a message.
#[must_use]
pub fn match_condition(message: &StoredMessage, condition: &FilterCondition) -> bool {
    let Some(field) = ConditionField::parse(&condition.field) else {
        warn!(field = %condition.field, "unknown condition field, treating as no match");
        return false;
    };
    let Some(operator) = ConditionOperator::parse(&condition.operator) else {
        warn!(operator = %condition.operator, "unknown condition operator, treating as no match");
        return false;
    };

    let value = resolve_field(message, field);
    let expected = condition.value.to_lowercase();

    match operator {
        ConditionOperator::Equals => value.as_text().is_some_and(|t| t == expected),
        ConditionOperator::NotEquals => value.as_text().is_some_and(|t| t != expected),
        ConditionOperator::Contains => value.as_text().is_some_and(|t| t.contains(&expected)),
        ConditionOperator::NotContains => value.as_text().is_some_and(|t| !t.contains(&expected)),
        ConditionOperator::StartsWith => value.as_text().is_some_and(|t| t.starts_with(&expected)),
        ConditionOperator::EndsWith => value.as_text().is_some_and(|t| t.ends_with(&expected)),
        ConditionOperator::MatchesRegex => match_regex(&value, &condition.value),
        ConditionOperator::GreaterThan => compare_numeric(&value, &condition.value, |a, b| a > b),
        ConditionOperator::LessThan => compare_numeric(&value, &condition.value, |a, b| a < b),
        ConditionOperator::IsEmpty => value.is_empty(),
        ConditionOperator::IsNotEmpty => !value.is_empty(),
    }
}

fn match_regex(value: &FieldValue, pattern: &str) -> bool {
    let Some(text) = value.as_text() else {
        return false;
    };
    match regex::RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(re) => re.is_match(&text),
        Err(e) => {
            warn!(pattern, error = %e, "invalid filter regex, treating as no match");
            false
        }
    }
}

fn compare_numeric(value: &FieldValue, expected: &str, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (value.as_number(), expected.trim().parse::<f64>()) {
        (Some(a), Ok(b)) => cmp(a, b),
        _ => false,
    }
}

/// True when every condition is satisfied. Vacuously true for an empty list.
#[must_use]
pub fn match_all(message: &StoredMessage, conditions: &[FilterCondition]) -> bool {
    conditions.iter().all(|c| match_condition(message, c))
}

/// True when at least one condition is satisfied.
#[must_use]
pub fn match_any(message: &StoredMessage, conditions: &[FilterCondition]) -> bool {
    conditions.iter().any(|c| match_condition(message, c))
}

/// Whether a filter matches a message, honoring its `match_all` flag.
///
/// A filter with no conditions always matches, which makes it a pure
/// catch-all action list.
#[must_use]
pub fn filter_matches(message: &StoredMessage, filter: &Filter) -> bool {
    if filter.conditions.is_empty() {
        return true;
    }
    if filter.match_all {
        match_all(message, &filter.conditions)
    } else {
        match_any(message, &filter.conditions)
    }
}
