//! End-to-end tests for the sync pipeline against a scripted mailbox.

#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use mailsift_core::filter::{FilterAction, FilterCondition, FilterEngine, FilterRepository, NewFilter};
use mailsift_core::spam::ListKind;
use mailsift_core::sync::{
    ClientError, FetchWindow, FolderStatus, MailboxClient, NewMailNotice, Notifier,
    ParsedAttachment, ParsedMessage, RawMessage,
};
use mailsift_core::{
    AccountId, ContactRepository, Draft, MessageRepository, SpamClassifier, SpamRepository,
    SyncEngine, SyncError, SyncSettings,
};

/// Scripted in-memory mailbox. Folder contents are behind an `Arc` so
/// tests can rewrite the remote between sync runs.
#[derive(Clone, Default)]
struct FakeMailbox {
    folders: Arc<Mutex<HashMap<String, Vec<ParsedMessage>>>>,
    bad_uids: HashSet<u32>,
    fail_connect: bool,
    fail_open: HashSet<String>,
    open: Option<String>,
    criteria: Arc<Mutex<Vec<String>>>,
    appended: Arc<Mutex<Vec<(String, String, Vec<String>)>>>,
}

impl FakeMailbox {
    fn with_folder(self, name: &str, messages: Vec<ParsedMessage>) -> Self {
        self.folders.lock().unwrap().insert(name.to_string(), messages);
        self
    }
}

impl MailboxClient for FakeMailbox {
    async fn connect(&mut self) -> Result<(), ClientError> {
        if self.fail_connect {
            return Err(ClientError::Connection("refused".into()));
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ClientError> {
        Ok(())
    }

    async fn open_folder(&mut self, name: &str, _read_only: bool) -> Result<FolderStatus, ClientError> {
        if self.fail_open.contains(name) {
            return Err(ClientError::Folder(format!("cannot open {name}")));
        }
        self.open = Some(name.to_string());
        let total = self
            .folders
            .lock()
            .unwrap()
            .get(name)
            .map_or(0, Vec::len);
        #[allow(clippy::cast_possible_truncation)]
        Ok(FolderStatus { total: total as u32 })
    }

    async fn fetch(&mut self, window: &FetchWindow) -> Result<Vec<RawMessage>, ClientError> {
        self.criteria.lock().unwrap().push(window.criterion());

        let folder = self.open.clone().ok_or_else(|| ClientError::Fetch("no folder open".into()))?;
        let folders = self.folders.lock().unwrap();
        let messages = folders.get(&folder).cloned().unwrap_or_default();

        Ok(messages
            .iter()
            .filter(|m| match window {
                FetchWindow::All => true,
                FetchWindow::After(uid) => m.uid > *uid,
            })
            .map(|m| RawMessage {
                uid: m.uid,
                data: Vec::new(),
            })
            .collect())
    }

    fn parse(&self, raw: &RawMessage) -> Result<ParsedMessage, ClientError> {
        if self.bad_uids.contains(&raw.uid) {
            return Err(ClientError::Parse(format!("uid {} is malformed", raw.uid)));
        }

        let folder = self.open.clone().ok_or_else(|| ClientError::Parse("no folder open".into()))?;
        self.folders
            .lock()
            .unwrap()
            .get(&folder)
            .and_then(|msgs| msgs.iter().find(|m| m.uid == raw.uid).cloned())
            .ok_or_else(|| ClientError::Parse(format!("uid {} not found", raw.uid)))
    }

    async fn append(&mut self, message: &str, mailbox: &str, flags: &[String]) -> Result<(), ClientError> {
        self.appended
            .lock()
            .unwrap()
            .push((message.to_string(), mailbox.to_string(), flags.to_vec()));
        Ok(())
    }
}

/// Notifier that records every notice instead of showing it.
#[derive(Clone, Default)]
struct RecordingNotifier {
    notices: Arc<Mutex<Vec<NewMailNotice>>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: &NewMailNotice) {
        self.notices.lock().unwrap().push(notice.clone());
    }
}

fn parsed(uid: u32, from: &str, subject: &str) -> ParsedMessage {
    ParsedMessage {
        uid,
        message_id: Some(format!("<{uid}@remote.example>")),
        from: from.to_string(),
        to: vec!["me@example.com".to_string()],
        cc: vec![],
        subject: subject.to_string(),
        date: Some(Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap() + chrono::Duration::minutes(i64::from(uid))),
        body_text: Some("nothing remarkable".to_string()),
        body_html: None,
        attachments: vec![],
        flags: vec![],
    }
}

struct Harness {
    engine: SyncEngine<FakeMailbox, RecordingNotifier>,
    messages: MessageRepository,
    contacts: ContactRepository,
    filters: FilterRepository,
    spam: SpamRepository,
    notices: Arc<Mutex<Vec<NewMailNotice>>>,
    criteria: Arc<Mutex<Vec<String>>>,
    folders: Arc<Mutex<HashMap<String, Vec<ParsedMessage>>>>,
    appended: Arc<Mutex<Vec<(String, String, Vec<String>)>>>,
    _data_dir: TempDir,
}

const ACCOUNT: AccountId = AccountId::new(1);

async fn harness(client: FakeMailbox) -> Harness {
    let pool = mailsift_core::db::in_memory().await.unwrap();
    let messages = MessageRepository::new(pool.clone()).await.unwrap();
    let contacts = ContactRepository::new(pool.clone()).await.unwrap();
    let filters = FilterRepository::new(pool.clone()).await.unwrap();
    let spam = SpamRepository::new(pool).await.unwrap();

    // Tests script their own rules; drop the seeded defaults.
    for rule in spam.list_rules().await.unwrap() {
        spam.delete_rule(rule.id).await.unwrap();
    }

    let data_dir = TempDir::new().unwrap();
    let settings = SyncSettings {
        folders: vec!["INBOX".to_string()],
        data_dir: data_dir.path().to_path_buf(),
        ..SyncSettings::default()
    };

    let notifier = RecordingNotifier::default();
    let notices = Arc::clone(&notifier.notices);
    let criteria = Arc::clone(&client.criteria);
    let folders = Arc::clone(&client.folders);
    let appended = Arc::clone(&client.appended);

    let engine = SyncEngine::new(
        client,
        notifier,
        ACCOUNT,
        settings,
        messages.clone(),
        contacts.clone(),
        SpamClassifier::new(spam.clone()),
        FilterEngine::new(filters.clone(), messages.clone()),
    );

    Harness {
        engine,
        messages,
        contacts,
        filters,
        spam,
        notices,
        criteria,
        folders,
        appended,
        _data_dir: data_dir,
    }
}

fn inbox() -> Vec<String> {
    vec!["INBOX".to_string()]
}

#[tokio::test]
async fn sync_is_idempotent_and_window_is_incremental() {
    let client = FakeMailbox::default().with_folder(
        "INBOX",
        vec![
            parsed(1, "a@example.com", "one"),
            parsed(2, "b@example.com", "two"),
            parsed(3, "c@example.com", "three"),
        ],
    );
    let mut h = harness(client).await;

    // Settings carry INBOX as the configured folder list.
    let first = h.engine.sync_configured().await.unwrap();
    assert_eq!(first.total_new, 3);
    assert_eq!(first.total_errors, 0);

    let second = h.engine.sync_configured().await.unwrap();
    assert_eq!(second.total_new, 0);
    assert_eq!(second.total_errors, 0);

    // First run sees an empty store and fetches everything; the second
    // computes the window from the persisted watermark.
    let criteria = h.criteria.lock().unwrap().clone();
    assert_eq!(criteria, vec!["ALL".to_string(), "UID 4:*".to_string()]);
}

#[tokio::test]
async fn seen_message_id_is_skipped_even_with_new_uid() {
    let client = FakeMailbox::default()
        .with_folder("INBOX", vec![parsed(1, "a@example.com", "hello")]);
    let mut h = harness(client).await;

    assert_eq!(h.engine.sync_folders(&inbox()).await.unwrap().total_new, 1);

    // The server renumbered the same message to UID 99.
    let mut renumbered = parsed(99, "a@example.com", "hello");
    renumbered.message_id = Some("<1@remote.example>".to_string());
    h.folders.lock().unwrap().insert("INBOX".to_string(), vec![renumbered]);

    let report = h.engine.sync_folders(&inbox()).await.unwrap();
    assert_eq!(report.total_new, 0);
    assert_eq!(report.total_errors, 0);
}

#[tokio::test]
async fn parse_failure_isolates_one_message() {
    let mut client = FakeMailbox::default().with_folder(
        "INBOX",
        vec![
            parsed(1, "a@example.com", "one"),
            parsed(2, "b@example.com", "two"),
            parsed(3, "c@example.com", "three"),
        ],
    );
    client.bad_uids.insert(2);
    let mut h = harness(client).await;

    let report = h.engine.sync_folders(&inbox()).await.unwrap();
    assert_eq!(report.total_new, 2);
    assert_eq!(report.total_errors, 1);

    // The message after the failure was still processed.
    assert!(
        h.messages
            .find_by_uid(ACCOUNT, 3, "INBOX")
            .await
            .unwrap()
            .is_some()
    );
    // The failed one can be retried on the next run: it was never persisted.
    assert!(
        h.messages
            .find_by_uid(ACCOUNT, 2, "INBOX")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn folder_failure_does_not_stop_remaining_folders() {
    let mut client = FakeMailbox::default()
        .with_folder("Broken", vec![parsed(1, "a@example.com", "x")])
        .with_folder("Archive", vec![parsed(1, "b@example.com", "y")]);
    client.fail_open.insert("Broken".to_string());
    let mut h = harness(client).await;

    let report = h
        .engine
        .sync_folders(&["Broken".to_string(), "Archive".to_string()])
        .await
        .unwrap();

    assert_eq!(report.folders.len(), 2);
    assert!(report.folders[0].error.is_some());
    assert_eq!(report.folders[1].new_messages, 1);
    assert_eq!(report.total_new, 1);
    assert_eq!(report.total_errors, 1);
}

#[tokio::test]
async fn connect_failure_is_the_only_hard_error() {
    let mut client = FakeMailbox::default();
    client.fail_connect = true;
    let mut h = harness(client).await;

    let result = h.engine.sync_folders(&inbox()).await;
    assert!(matches!(result, Err(SyncError::Connect(_))));
}

#[tokio::test]
async fn blacklisted_sender_is_marked_spam_but_still_persisted() {
    let client = FakeMailbox::default().with_folder(
        "INBOX",
        vec![
            parsed(1, "spammer@bad.example", "cheap watches"),
            parsed(2, "friend@good.example", "lunch?"),
        ],
    );
    let mut h = harness(client).await;

    h.spam
        .add_sender(ACCOUNT, "spammer@bad.example", ListKind::Blacklist)
        .await
        .unwrap();

    let report = h.engine.sync_folders(&inbox()).await.unwrap();
    assert_eq!(report.total_new, 2);
    assert_eq!(report.spam_detected, 1);

    let spam_msg = h.messages.find_by_uid(ACCOUNT, 1, "INBOX").await.unwrap().unwrap();
    assert!(spam_msg.is_spam);

    // Only the clean message produced a notification.
    let notices = h.notices.lock().unwrap();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].body.contains("friend@good.example"));
}

#[tokio::test]
async fn whitelist_beats_blacklist_during_sync() {
    let client = FakeMailbox::default().with_folder(
        "INBOX",
        vec![parsed(1, "both@example.com", "am I spam?")],
    );
    let mut h = harness(client).await;

    h.spam
        .add_sender(ACCOUNT, "both@example.com", ListKind::Blacklist)
        .await
        .unwrap();
    h.spam
        .add_sender(ACCOUNT, "both@example.com", ListKind::Whitelist)
        .await
        .unwrap();

    let report = h.engine.sync_folders(&inbox()).await.unwrap();
    assert_eq!(report.spam_detected, 0);

    let msg = h.messages.find_by_uid(ACCOUNT, 1, "INBOX").await.unwrap().unwrap();
    assert!(!msg.is_spam);
    assert_eq!(h.notices.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn classification_only_runs_for_the_inbox() {
    let client = FakeMailbox::default().with_folder(
        "Archive",
        vec![parsed(1, "spammer@bad.example", "old spam")],
    );
    let mut h = harness(client).await;

    h.spam
        .add_sender(ACCOUNT, "spammer@bad.example", ListKind::Blacklist)
        .await
        .unwrap();

    let report = h.engine.sync_folders(&["Archive".to_string()]).await.unwrap();
    assert_eq!(report.total_new, 1);
    assert_eq!(report.spam_detected, 0);
    // Non-inbox folders never notify either.
    assert!(h.notices.lock().unwrap().is_empty());
}

#[tokio::test]
async fn filters_run_against_new_messages() {
    let client = FakeMailbox::default().with_folder(
        "INBOX",
        vec![parsed(1, "news@letters.example", "Weekly newsletter")],
    );
    let mut h = harness(client).await;

    h.filters
        .create(&NewFilter {
            account_id: Some(ACCOUNT),
            name: "newsletters".to_string(),
            priority: 5,
            match_all: true,
            is_enabled: true,
            conditions: vec![FilterCondition::new("subject", "contains", "newsletter")],
            actions: vec![
                FilterAction::new("move", Some("Feed")),
                FilterAction::new("mark_read", None),
            ],
        })
        .await
        .unwrap();

    let report = h.engine.sync_folders(&inbox()).await.unwrap();
    assert_eq!(report.total_new, 1);
    assert_eq!(report.filters_applied, 1);

    let msg = h.messages.find_by_id(1).await.unwrap().unwrap();
    assert_eq!(msg.folder, "Feed");
    assert!(msg.is_read);
}

#[tokio::test]
async fn contacts_collected_from_sender_and_sent_recipients() {
    let mut sent = parsed(1, "me@example.com", "re: plans");
    sent.to = vec!["alice@example.com".to_string()];
    sent.cc = vec!["bob@example.com".to_string()];

    let mut incoming = parsed(1, "carol@example.com", "hi");
    incoming.to = vec!["inbox-recipient@example.com".to_string()];

    let client = FakeMailbox::default()
        .with_folder("INBOX", vec![incoming])
        .with_folder("Sent", vec![sent]);
    let mut h = harness(client).await;

    h.engine
        .sync_folders(&["INBOX".to_string(), "Sent".to_string()])
        .await
        .unwrap();

    // Sender collected from the inbox message.
    assert!(h.contacts.find(ACCOUNT, "carol@example.com").await.unwrap().is_some());
    // Sender and all recipients collected from the sent message.
    assert!(h.contacts.find(ACCOUNT, "me@example.com").await.unwrap().is_some());
    assert!(h.contacts.find(ACCOUNT, "alice@example.com").await.unwrap().is_some());
    assert!(h.contacts.find(ACCOUNT, "bob@example.com").await.unwrap().is_some());

    // Recipients of incoming mail are not collected.
    assert!(
        h.contacts
            .find(ACCOUNT, "inbox-recipient@example.com")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn attachments_are_written_and_recorded() {
    let mut message = parsed(1, "sender@example.com", "the report");
    message.attachments = vec![ParsedAttachment {
        filename: "q2/report?.pdf".to_string(),
        content_type: "application/pdf".to_string(),
        size: 5,
        content: b"%PDF-".to_vec(),
    }];

    let client = FakeMailbox::default().with_folder("INBOX", vec![message]);
    let mut h = harness(client).await;

    h.engine.sync_folders(&inbox()).await.unwrap();

    let stored = h.messages.find_by_uid(ACCOUNT, 1, "INBOX").await.unwrap().unwrap();
    assert!(stored.has_attachments);

    let metas = h.messages.attachments_for(stored.id).await.unwrap();
    assert_eq!(metas.len(), 1);
    // Sanitized and prefixed with the message id.
    assert!(metas[0].file_path.ends_with(&format!("{}_q2report.pdf", stored.id)));
    assert_eq!(std::fs::read(&metas[0].file_path).unwrap(), b"%PDF-");
}

#[tokio::test]
async fn read_flag_derived_from_seen() {
    let mut seen = parsed(1, "a@example.com", "seen one");
    seen.flags = vec!["\\Seen".to_string()];
    let unseen = parsed(2, "a@example.com", "unseen one");

    let client = FakeMailbox::default().with_folder("INBOX", vec![seen, unseen]);
    let mut h = harness(client).await;

    h.engine.sync_folders(&inbox()).await.unwrap();

    assert!(h.messages.find_by_uid(ACCOUNT, 1, "INBOX").await.unwrap().unwrap().is_read);
    assert!(!h.messages.find_by_uid(ACCOUNT, 2, "INBOX").await.unwrap().unwrap().is_read);
}

#[tokio::test]
async fn folder_bookkeeping_updated_despite_message_errors() {
    let mut client = FakeMailbox::default()
        .with_folder("INBOX", vec![parsed(1, "a@example.com", "broken")]);
    client.bad_uids.insert(1);
    let mut h = harness(client).await;

    let report = h.engine.sync_folders(&inbox()).await.unwrap();
    assert_eq!(report.total_errors, 1);

    assert!(
        h.messages
            .folder_last_sync(ACCOUNT, "INBOX")
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn draft_sync_dedups_by_uid_and_skips_enrichment() {
    let client = FakeMailbox::default().with_folder(
        "Drafts",
        vec![parsed(7, "me@example.com", "unfinished thought")],
    );
    let mut h = harness(client).await;

    assert_eq!(h.engine.sync_drafts().await.unwrap(), 1);
    assert_eq!(h.engine.sync_drafts().await.unwrap(), 0);

    let drafts = h.messages.list_drafts(ACCOUNT).await.unwrap();
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].uid, Some(7));
    assert_eq!(drafts[0].subject, "unfinished thought");

    // No enrichment fan-out for drafts.
    assert!(h.notices.lock().unwrap().is_empty());
    assert!(h.contacts.find(ACCOUNT, "me@example.com").await.unwrap().is_none());
}

#[tokio::test]
async fn draft_upload_appends_with_draft_flag() {
    let client = FakeMailbox::default();
    let mut h = harness(client).await;

    let draft = Draft {
        account_id: ACCOUNT,
        to_addrs: vec!["you@example.com".to_string()],
        subject: "wip".to_string(),
        body_text: "almost done".to_string(),
        ..Draft::default()
    };
    h.engine.upload_draft(&draft).await.unwrap();

    let appended = h.appended.lock().unwrap();
    assert_eq!(appended.len(), 1);
    let (message, mailbox, flags) = &appended[0];
    assert_eq!(mailbox, "Drafts");
    assert_eq!(flags, &vec!["\\Draft".to_string()]);
    assert!(message.contains("Subject: wip"));
    assert!(message.contains("almost done"));
}

#[tokio::test]
async fn watermark_never_goes_backwards() {
    let client = FakeMailbox::default().with_folder(
        "INBOX",
        vec![parsed(5, "a@example.com", "five"), parsed(9, "a@example.com", "nine")],
    );
    let mut h = harness(client).await;

    h.engine.sync_folders(&inbox()).await.unwrap();
    assert_eq!(h.messages.last_seen_uid(ACCOUNT, "INBOX").await.unwrap(), Some(9));

    // The remote now only shows lower UIDs (e.g. deletions upstream); the
    // watermark stays where it was.
    h.folders
        .lock()
        .unwrap()
        .insert("INBOX".to_string(), vec![parsed(5, "a@example.com", "five")]);
    h.engine.sync_folders(&inbox()).await.unwrap();
    assert_eq!(h.messages.last_seen_uid(ACCOUNT, "INBOX").await.unwrap(), Some(9));

    let criteria = h.criteria.lock().unwrap().clone();
    assert_eq!(criteria.last().unwrap(), "UID 10:*");
}
