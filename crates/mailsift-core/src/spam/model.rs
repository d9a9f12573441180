//! Spam rule and sender list data models.

use crate::AccountId;

/// What a spam rule inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleType {
    /// Pattern match over subject and body.
    Keyword,
    /// Link heuristics: shorteners, bare IPs, suspicious TLDs.
    Link,
    /// Header match. Currently has no header data to inspect.
    Header,
}

impl RuleType {
    /// Parse from database string representation. Unknown types yield
    /// `None` and the rule is skipped.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "keyword" => Some(Self::Keyword),
            "link" => Some(Self::Link),
            "header" => Some(Self::Header),
            _ => None,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Link => "link",
            Self::Header => "header",
        }
    }
}

/// A weighted spam rule. `priority` doubles as the score a match
/// contributes; all enabled rules are evaluated and their scores sum.
#[derive(Debug, Clone)]
pub struct SpamRule {
    /// Row identifier.
    pub id: i64,
    /// What the rule inspects.
    pub rule_type: RuleType,
    /// Rule pattern; meaning depends on the type.
    pub pattern: String,
    /// Weight contributed on match.
    pub priority: i64,
    /// Whether the rule participates in scoring.
    pub is_enabled: bool,
}

/// Which list a sender entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    /// Senders always treated as spam.
    Blacklist,
    /// Senders never treated as spam. Takes precedence over the blacklist.
    Whitelist,
}

impl ListKind {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "blacklist" => Some(Self::Blacklist),
            "whitelist" => Some(Self::Whitelist),
            _ => None,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Blacklist => "blacklist",
            Self::Whitelist => "whitelist",
        }
    }
}

/// A black- or whitelisted sender. The domain is derived from the address
/// when the entry is written; either an exact address match or a domain
/// match qualifies.
#[derive(Debug, Clone)]
pub struct ListEntry {
    /// Row identifier.
    pub id: i64,
    /// Account the entry belongs to.
    pub account_id: AccountId,
    /// Full address, normalized to lowercase.
    pub email: String,
    /// Domain part of the address.
    pub domain: String,
    /// Which list this entry is on.
    pub kind: ListKind,
}

/// Outcome of classifying one message.
#[derive(Debug, Clone, Default)]
pub struct SpamVerdict {
    /// Total score across matched rules (100 for blacklisted senders).
    pub score: i64,
    /// Whether the score reached the spam threshold.
    pub is_spam: bool,
    /// Human-readable explanation of each contribution.
    pub reasons: Vec<String>,
}

/// Domain part of an address, lowercased. Empty when the address has no
/// `@`.
#[must_use]
pub fn domain_of(email: &str) -> String {
    email
        .rsplit_once('@')
        .map(|(_, domain)| domain.trim().to_lowercase())
        .unwrap_or_default()
}
