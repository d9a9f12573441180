//! Weighted spam classification.
//!
//! Evaluation order is fixed: whitelist, then blacklist, then the rule
//! set. A whitelisted sender is never spam even when also blacklisted.

use tracing::{debug, info};

use super::model::{ListKind, RuleType, SpamRule, SpamVerdict};
use super::repository::SpamRepository;
use crate::account::AccountId;
use crate::message::StoredMessage;
use crate::Result;

/// Score at or above which a message is spam.
pub const SPAM_THRESHOLD: i64 = 50;

/// Score assigned to blacklisted senders.
const BLACKLIST_SCORE: i64 = 100;

/// Weight of rules created from user feedback.
const LEARNED_RULE_PRIORITY: i64 = 5;

/// Phrases mined from the subject when the user marks a message as spam.
const SPAM_VOCABULARY: &[&str] = &[
    "free",
    "winner",
    "prize",
    "click here",
    "act now",
    "limited time",
];

/// Domains commonly used to disguise link targets.
const URL_SHORTENERS: &[&str] = &[
    "bit.ly", "tinyurl.com", "goo.gl", "t.co", "ow.ly", "is.gd", "buff.ly",
];

/// Top-level domains that are disproportionately abused.
const SUSPICIOUS_TLDS: &[&str] = &[".xyz", ".top", ".click", ".loan", ".work", ".gq"];

/// Classifies messages against the rule set and sender lists.
#[derive(Clone)]
pub struct SpamClassifier {
    rules: SpamRepository,
}

impl SpamClassifier {
    /// Create a classifier over the spam repository.
    #[must_use]
    pub const fn new(rules: SpamRepository) -> Self {
        Self { rules }
    }

    /// Access to the underlying repository, for list management commands.
    #[must_use]
    pub const fn repository(&self) -> &SpamRepository {
        &self.rules
    }

    /// Classify one message.
    ///
    /// # Errors
    ///
    /// Returns an error if a database query fails. Rule evaluation itself
    /// never errors; malformed patterns simply don't match.
    pub async fn classify(
        &self,
        account_id: AccountId,
        message: &StoredMessage,
    ) -> Result<SpamVerdict> {
        let sender = &message.from_addr;

        // Whitelist wins over everything, including the blacklist.
        if self
            .rules
            .sender_on_list(account_id, sender, ListKind::Whitelist)
            .await?
        {
            debug!(%sender, "sender whitelisted");
            return Ok(SpamVerdict {
                score: 0,
                is_spam: false,
                reasons: vec![format!("sender {sender} is whitelisted")],
            });
        }

        if self
            .rules
            .sender_on_list(account_id, sender, ListKind::Blacklist)
            .await?
        {
            debug!(%sender, "sender blacklisted");
            return Ok(SpamVerdict {
                score: BLACKLIST_SCORE,
                is_spam: true,
                reasons: vec![format!("sender {sender} is blacklisted")],
            });
        }

        let mut verdict = SpamVerdict::default();
        for rule in self.rules.list_enabled_rules().await? {
            if let Some(reason) = rule_matches(&rule, message) {
                verdict.score += rule.priority;
                verdict.reasons.push(reason);
            }
        }

        verdict.is_spam = verdict.score >= SPAM_THRESHOLD;
        Ok(verdict)
    }

    /// Learn from a user's spam/ham decision.
    ///
    /// Marking spam mines a fixed vocabulary against the subject and
    /// creates a low-weight keyword rule for each phrase not already
    /// covered. Marking ham has no corrective effect and only logs; rules
    /// created from earlier feedback are left in place.
    ///
    /// Returns the rules created, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if a database operation fails.
    pub async fn learn_from_feedback(
        &self,
        message: &StoredMessage,
        is_spam: bool,
    ) -> Result<Vec<SpamRule>> {
        if !is_spam {
            info!(message_id = message.id, "message marked as ham, no rules changed");
            return Ok(Vec::new());
        }

        let subject = message.subject.to_lowercase();
        let mut created = Vec::new();

        for phrase in SPAM_VOCABULARY {
            if !subject.contains(phrase) {
                continue;
            }
            if self.rules.has_keyword_rule(phrase).await? {
                continue;
            }

            let rule = self
                .rules
                .add_rule(RuleType::Keyword, phrase, LEARNED_RULE_PRIORITY)
                .await?;
            info!(pattern = phrase, "learned spam keyword rule");
            created.push(rule);
        }

        Ok(created)
    }
}

/// Evaluate one rule, returning the reason string on a match.
fn rule_matches(rule: &SpamRule, message: &StoredMessage) -> Option<String> {
    match rule.rule_type {
        RuleType::Keyword => keyword_matches(&rule.pattern, message)
            .then(|| format!("keyword rule '{}' matched", rule.pattern)),
        RuleType::Link => link_matches(rule, message),
        // Raw headers are not carried past parsing, so header rules have
        // nothing to inspect and can never match. Left in place so stored
        // rules like "X-Spam-Flag: YES" keep their intent visible.
        // TODO: thread a header map through ParsedMessage into the store
        // so these rules can fire.
        RuleType::Header => None,
    }
}

/// Pattern test over subject and body: tried as a case-insensitive regex,
/// degrading to substring containment when the pattern doesn't compile.
fn keyword_matches(pattern: &str, message: &StoredMessage) -> bool {
    if pattern.is_empty() {
        return false;
    }

    let haystack = format!("{}\n{}", message.subject, message.combined_body()).to_lowercase();

    match regex::RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
    {
        Ok(re) => re.is_match(&haystack),
        Err(_) => haystack.contains(&pattern.to_lowercase()),
    }
}

/// Link heuristics over every URL found in the subject and body.
fn link_matches(rule: &SpamRule, message: &StoredMessage) -> Option<String> {
    let text = format!("{}\n{}", message.subject, message.combined_body()).to_lowercase();

    for host in extract_hosts(&text) {
        if URL_SHORTENERS
            .iter()
            .any(|s| host == *s || host.ends_with(&format!(".{s}")))
        {
            return Some(format!("link to URL shortener {host}"));
        }
        if is_ipv4_host(&host) {
            return Some(format!("link to bare IP address {host}"));
        }
        if SUSPICIOUS_TLDS.iter().any(|tld| host.ends_with(tld)) {
            return Some(format!("link to suspicious domain {host}"));
        }
    }

    if !rule.pattern.is_empty() && keyword_matches(&rule.pattern, message) {
        return Some(format!("link rule pattern '{}' matched", rule.pattern));
    }

    None
}

/// Hostnames of every http(s) URL in the text.
fn extract_hosts(text: &str) -> Vec<String> {
    let mut hosts = Vec::new();
    for (idx, _) in text.match_indices("http") {
        let rest = &text[idx..];
        let after_scheme = rest
            .strip_prefix("https://")
            .or_else(|| rest.strip_prefix("http://"));
        if let Some(after) = after_scheme {
            let host: String = after
                .chars()
                .take_while(|c| !c.is_whitespace() && !matches!(c, '/' | '"' | '\'' | '<' | '>' | ')'))
                .collect();
            let host = host
                .split_once(':')
                .map_or(host.as_str(), |(h, _)| h)
                .trim_end_matches(['.', ',', ';'])
                .to_string();
            if !host.is_empty() {
                hosts.push(host);
            }
        }
    }
    hosts
}

/// Whether a host is a bare IPv4 literal.
fn is_ipv4_host(host: &str) -> bool {
    let octets: Vec<&str> = host.split('.').collect();
    octets.len() == 4 && octets.iter().all(|o| !o.is_empty() && o.parse::<u8>().is_ok())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn message_with(subject: &str, body: &str) -> StoredMessage {
        StoredMessage {
            id: 1,
            account_id: AccountId::new(1),
            uid: 1,
            folder: "INBOX".into(),
            message_id: None,
            from_addr: "someone@example.com".into(),
            to_addrs: vec![],
            cc_addrs: vec![],
            subject: subject.into(),
            date: None,
            body_text: Some(body.into()),
            body_html: None,
            is_read: false,
            is_spam: false,
            is_starred: false,
            is_important: false,
            is_deleted: false,
            deleted_at: None,
            has_attachments: false,
            flags: vec![],
            thread_id: None,
        }
    }

    async fn bare_classifier() -> SpamClassifier {
        let repo = SpamRepository::in_memory().await.unwrap();
        // Remove seeded defaults so tests control the rule set exactly.
        for rule in repo.list_rules().await.unwrap() {
            repo.delete_rule(rule.id).await.unwrap();
        }
        SpamClassifier::new(repo)
    }

    #[tokio::test]
    async fn test_whitelist_takes_precedence_over_blacklist() {
        let classifier = bare_classifier().await;
        let account = AccountId::new(1);
        let repo = classifier.repository();

        repo.add_sender(account, "both@example.com", ListKind::Blacklist)
            .await
            .unwrap();
        repo.add_sender(account, "both@example.com", ListKind::Whitelist)
            .await
            .unwrap();

        let mut msg = message_with("you have won a prize", "click here");
        msg.from_addr = "both@example.com".into();

        let verdict = classifier.classify(account, &msg).await.unwrap();
        assert!(!verdict.is_spam);
        assert_eq!(verdict.score, 0);
    }

    #[tokio::test]
    async fn test_blacklisted_sender_scores_100() {
        let classifier = bare_classifier().await;
        let account = AccountId::new(1);

        classifier
            .repository()
            .add_sender(account, "bad@example.com", ListKind::Blacklist)
            .await
            .unwrap();

        let mut msg = message_with("totally innocent", "hello");
        msg.from_addr = "bad@example.com".into();

        let verdict = classifier.classify(account, &msg).await.unwrap();
        assert!(verdict.is_spam);
        assert_eq!(verdict.score, 100);
    }

    #[tokio::test]
    async fn test_scores_sum_and_threshold_applies() {
        let classifier = bare_classifier().await;
        let account = AccountId::new(1);
        let repo = classifier.repository();

        repo.add_rule(RuleType::Keyword, "lottery", 10).await.unwrap();
        repo.add_rule(RuleType::Keyword, "click here", 5).await.unwrap();

        let msg = message_with("lottery results", "click here to claim");
        let verdict = classifier.classify(account, &msg).await.unwrap();

        // Both match, 15 total, below the threshold of 50.
        assert_eq!(verdict.score, 15);
        assert!(!verdict.is_spam);
        assert_eq!(verdict.reasons.len(), 2);

        repo.add_rule(RuleType::Keyword, "claim", 40).await.unwrap();
        let verdict = classifier.classify(account, &msg).await.unwrap();
        assert_eq!(verdict.score, 55);
        assert!(verdict.is_spam);
    }

    #[tokio::test]
    async fn test_invalid_keyword_pattern_degrades_to_substring() {
        let classifier = bare_classifier().await;
        let account = AccountId::new(1);

        classifier
            .repository()
            .add_rule(RuleType::Keyword, "[[[deal", 60)
            .await
            .unwrap();

        let hit = message_with("great [[[deal inside", "");
        assert!(classifier.classify(account, &hit).await.unwrap().is_spam);

        let miss = message_with("no such thing", "");
        assert!(!classifier.classify(account, &miss).await.unwrap().is_spam);
    }

    #[tokio::test]
    async fn test_link_rule_flags_shorteners_ips_and_tlds() {
        let classifier = bare_classifier().await;
        let account = AccountId::new(1);
        classifier
            .repository()
            .add_rule(RuleType::Link, "", 60)
            .await
            .unwrap();

        for body in [
            "see https://bit.ly/2xyz now",
            "visit http://203.0.113.7/login",
            "offer at https://cheap-stuff.xyz/buy",
        ] {
            let verdict = classifier
                .classify(account, &message_with("hi", body))
                .await
                .unwrap();
            assert!(verdict.is_spam, "expected spam for body: {body}");
        }

        let clean = classifier
            .classify(account, &message_with("hi", "see https://docs.rs/sqlx"))
            .await
            .unwrap();
        assert!(!clean.is_spam);
    }

    #[tokio::test]
    async fn test_header_rules_never_match() {
        let classifier = bare_classifier().await;
        let account = AccountId::new(1);

        classifier
            .repository()
            .add_rule(RuleType::Header, "X-Spam-Flag: YES", 100)
            .await
            .unwrap();

        let msg = message_with("X-Spam-Flag: YES", "X-Spam-Flag: YES");
        let verdict = classifier.classify(account, &msg).await.unwrap();
        assert_eq!(verdict.score, 0);
        assert!(!verdict.is_spam);
    }

    #[tokio::test]
    async fn test_learning_creates_rules_for_known_phrases() {
        let classifier = bare_classifier().await;

        let msg = message_with("You are a WINNER, click here for your prize", "");
        let created = classifier.learn_from_feedback(&msg, true).await.unwrap();

        let patterns: Vec<&str> = created.iter().map(|r| r.pattern.as_str()).collect();
        assert!(patterns.contains(&"winner"));
        assert!(patterns.contains(&"click here"));
        assert!(patterns.contains(&"prize"));
        assert!(created.iter().all(|r| r.priority == 5));

        // Already-covered phrases are not duplicated.
        let again = classifier.learn_from_feedback(&msg, true).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_learning_from_ham_is_a_no_op() {
        let classifier = bare_classifier().await;

        let msg = message_with("free prize winner", "");
        let created = classifier.learn_from_feedback(&msg, false).await.unwrap();
        assert!(created.is_empty());
        assert!(classifier.repository().list_rules().await.unwrap().is_empty());
    }
}
