//! Sync orchestrator.
//!
//! Drives one sync invocation: connect, then per folder compute the
//! incremental window from the persisted watermark, fetch, deduplicate,
//! persist, and run each new message through classification, filtering,
//! contact collection, and notification.
//!
//! Only a failed connection is an error to the caller. Folder-level
//! failures are recorded in that folder's report entry and the sync moves
//! on; message-level failures abort that message only.

use tracing::{debug, info, warn};

use super::client::{ClientError, FetchWindow, MailboxClient, ParsedMessage, RawMessage};
use super::notify::{NewMailNotice, Notifier};
use crate::account::AccountId;
use crate::config::SyncSettings;
use crate::contacts::ContactRepository;
use crate::filter::FilterEngine;
use crate::message::{AttachmentStore, Draft, FolderType, MessageRepository, NewMessage, StoredMessage};
use crate::spam::SpamClassifier;

/// Errors the orchestrator surfaces to its caller.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The initial connection could not be established. Everything below
    /// this level is aggregated into the [`SyncReport`] instead.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// A draft could not be appended to the remote mailbox.
    #[error("Draft upload failed: {0}")]
    Upload(String),
}

/// Per-folder sync outcome.
#[derive(Debug, Clone, Default)]
pub struct FolderReport {
    /// Folder name.
    pub folder: String,
    /// Messages persisted for the first time.
    pub new_messages: u32,
    /// Message-level failures.
    pub errors: u32,
    /// Messages the classifier marked as spam.
    pub spam_detected: u32,
    /// Filters that matched across all new messages.
    pub filters_applied: u32,
    /// Folder-level failure, when the folder could not be synced at all.
    pub error: Option<String>,
}

impl FolderReport {
    fn new(folder: &str) -> Self {
        Self {
            folder: folder.to_string(),
            ..Self::default()
        }
    }
}

/// Aggregate outcome of one sync invocation.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Messages persisted for the first time, across folders.
    pub total_new: u32,
    /// Message- and folder-level failures, across folders.
    pub total_errors: u32,
    /// Messages the classifier marked as spam.
    pub spam_detected: u32,
    /// Filters that matched across all new messages.
    pub filters_applied: u32,
    /// Per-folder breakdown, in requested order.
    pub folders: Vec<FolderReport>,
}

/// Folder-level failure, recorded in the report rather than propagated.
#[derive(Debug, thiserror::Error)]
enum FolderError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Store(#[from] crate::Error),
}

/// Outcome of processing one fetched message.
enum Processed {
    /// Already persisted; a normal skip, not an error.
    Skipped,
    /// Persisted as new.
    New {
        spam: bool,
        filters_applied: u32,
        enrich_failed: bool,
    },
    /// Failed before persistence.
    Failed,
}

/// What the enrichment fan-out observed for a new message.
#[derive(Default)]
struct Enrichment {
    spam: bool,
    filters_applied: u32,
}

/// Top-level driver for mailbox synchronization.
pub struct SyncEngine<C, N> {
    client: C,
    notifier: N,
    account_id: AccountId,
    settings: SyncSettings,
    messages: MessageRepository,
    contacts: ContactRepository,
    classifier: SpamClassifier,
    filters: FilterEngine,
    attachments: AttachmentStore,
}

impl<C: MailboxClient, N: Notifier> SyncEngine<C, N> {
    /// Create an engine over the repositories and a mailbox client.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        client: C,
        notifier: N,
        account_id: AccountId,
        settings: SyncSettings,
        messages: MessageRepository,
        contacts: ContactRepository,
        classifier: SpamClassifier,
        filters: FilterEngine,
    ) -> Self {
        let attachments = AttachmentStore::new(&settings.data_dir);
        Self {
            client,
            notifier,
            account_id,
            settings,
            messages,
            contacts,
            classifier,
            filters,
            attachments,
        }
    }

    /// Sync the folders configured in the settings.
    ///
    /// # Errors
    ///
    /// Returns an error only if the connection cannot be established.
    pub async fn sync_configured(&mut self) -> Result<SyncReport, SyncError> {
        let folders = self.settings.folders.clone();
        self.sync_folders(&folders).await
    }

    /// Sync the given folders in order.
    ///
    /// # Errors
    ///
    /// Returns an error only if the connection cannot be established;
    /// every other failure is aggregated into the report.
    pub async fn sync_folders(&mut self, folders: &[String]) -> Result<SyncReport, SyncError> {
        self.client
            .connect()
            .await
            .map_err(|e| SyncError::Connect(e.to_string()))?;

        let mut report = SyncReport::default();
        for folder in folders {
            let folder_report = match self.sync_folder(folder).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(%folder, error = %e, "folder sync failed");
                    let mut failed = FolderReport::new(folder);
                    failed.error = Some(e.to_string());
                    failed
                }
            };

            report.total_new += folder_report.new_messages;
            report.total_errors += folder_report.errors;
            report.spam_detected += folder_report.spam_detected;
            report.filters_applied += folder_report.filters_applied;
            if folder_report.error.is_some() {
                report.total_errors += 1;
            }
            report.folders.push(folder_report);
        }

        if let Err(e) = self.client.disconnect().await {
            warn!(error = %e, "disconnect failed");
        }

        info!(
            new = report.total_new,
            errors = report.total_errors,
            spam = report.spam_detected,
            "sync finished"
        );
        Ok(report)
    }

    /// Sync one folder. A connection-level failure here aborts this folder
    /// only.
    async fn sync_folder(&mut self, folder: &str) -> Result<FolderReport, FolderError> {
        let status = self.client.open_folder(folder, false).await?;
        let watermark = self.messages.last_seen_uid(self.account_id, folder).await?;
        let window = FetchWindow::from_watermark(watermark);
        debug!(folder, total = status.total, criterion = %window, "fetching");

        let raws = self.client.fetch(&window).await?;

        let mut report = FolderReport::new(folder);
        let folder_type = FolderType::from_name(folder);

        for raw in &raws {
            match self.process_message(folder, folder_type, raw).await {
                Processed::Skipped => {}
                Processed::New {
                    spam,
                    filters_applied,
                    enrich_failed,
                } => {
                    report.new_messages += 1;
                    report.filters_applied += filters_applied;
                    if spam {
                        report.spam_detected += 1;
                    }
                    if enrich_failed {
                        report.errors += 1;
                    }
                }
                Processed::Failed => report.errors += 1,
            }
        }

        // Stamp the bookkeeping record even when individual messages failed.
        if let Err(e) = self.messages.touch_folder(self.account_id, folder).await {
            warn!(folder, error = %e, "failed to update folder bookkeeping");
        }

        info!(
            folder,
            new = report.new_messages,
            errors = report.errors,
            "folder synced"
        );
        Ok(report)
    }

    /// Run one fetched message through dedup, persistence, and enrichment.
    async fn process_message(
        &mut self,
        folder: &str,
        folder_type: FolderType,
        raw: &RawMessage,
    ) -> Processed {
        // Dedup by (uid, folder) before spending any parse work.
        match self.messages.find_by_uid(self.account_id, raw.uid, folder).await {
            Ok(Some(_)) => {
                debug!(uid = raw.uid, folder, "already persisted, skipping");
                return Processed::Skipped;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(uid = raw.uid, folder, error = %e, "dedup lookup failed");
                return Processed::Failed;
            }
        }

        let parsed = match self.client.parse(raw) {
            Ok(p) => p,
            Err(e) => {
                warn!(uid = raw.uid, folder, error = %e, "parse failed");
                return Processed::Failed;
            }
        };

        // Dedup by Message-ID across folders: a resync after UID
        // renumbering must not duplicate the message.
        if let Some(ref message_id) = parsed.message_id {
            match self.messages.find_by_message_id(self.account_id, message_id).await {
                Ok(Some(_)) => {
                    debug!(uid = raw.uid, %message_id, "message id already known, skipping");
                    return Processed::Skipped;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(uid = raw.uid, error = %e, "message id lookup failed");
                    return Processed::Failed;
                }
            }
        }

        let stored = match self.persist(folder, raw.uid, &parsed).await {
            Ok(s) => s,
            Err(e) => {
                warn!(uid = raw.uid, folder, error = %e, "persist failed");
                return Processed::Failed;
            }
        };

        match self.enrich(&stored, &parsed, folder, folder_type).await {
            Ok(enrichment) => Processed::New {
                spam: enrichment.spam,
                filters_applied: enrichment.filters_applied,
                enrich_failed: false,
            },
            Err(e) => {
                warn!(message_id = stored.id, error = %e, "enrichment failed, message kept");
                Processed::New {
                    spam: false,
                    filters_applied: 0,
                    enrich_failed: true,
                }
            }
        }
    }

    async fn persist(
        &self,
        folder: &str,
        uid: u32,
        parsed: &ParsedMessage,
    ) -> crate::Result<StoredMessage> {
        self.messages
            .insert(&NewMessage {
                account_id: self.account_id,
                uid,
                folder: folder.to_string(),
                message_id: parsed.message_id.clone(),
                from_addr: parsed.from.clone(),
                to_addrs: parsed.to.clone(),
                cc_addrs: parsed.cc.clone(),
                subject: parsed.subject.clone(),
                date: parsed.date,
                body_text: parsed.body_text.clone(),
                body_html: parsed.body_html.clone(),
                is_read: parsed.is_seen(),
                flags: parsed.flags.clone(),
            })
            .await
    }

    /// Enrichment fan-out for a freshly persisted message: attachments,
    /// spam classification, filters, contacts, notification.
    async fn enrich(
        &mut self,
        stored: &StoredMessage,
        parsed: &ParsedMessage,
        folder: &str,
        folder_type: FolderType,
    ) -> crate::Result<Enrichment> {
        self.save_attachments(stored.id, parsed).await;

        let mut enrichment = Enrichment::default();

        // Spam classification applies to the inbox only.
        if folder_type == FolderType::Inbox {
            let verdict = self.classifier.classify(self.account_id, stored).await?;
            if verdict.is_spam {
                info!(
                    message_id = stored.id,
                    score = verdict.score,
                    reasons = ?verdict.reasons,
                    "message classified as spam"
                );
                self.messages.mark_as_spam(stored.id).await?;
                enrichment.spam = true;
            }
        }

        // Spam messages still run through filters and contact collection.
        let run = self.filters.apply_filters(stored.id, self.account_id).await?;
        #[allow(clippy::cast_possible_truncation)]
        {
            enrichment.filters_applied = run.applied.len() as u32;
        }

        self.collect_contacts(parsed, folder_type).await;

        if folder_type == FolderType::Inbox {
            self.maybe_notify(stored.id, folder).await?;
        }

        Ok(enrichment)
    }

    /// Write attachment blobs and their metadata rows. Failures are logged
    /// and never fail the message.
    async fn save_attachments(&self, message_id: i64, parsed: &ParsedMessage) {
        for attachment in &parsed.attachments {
            let path = match self
                .attachments
                .save(message_id, &attachment.filename, &attachment.content)
                .await
            {
                Ok(p) => p,
                Err(e) => {
                    warn!(
                        message_id,
                        filename = %attachment.filename,
                        error = %e,
                        "failed to save attachment"
                    );
                    continue;
                }
            };

            #[allow(clippy::cast_possible_wrap)]
            if let Err(e) = self
                .messages
                .record_attachment(
                    message_id,
                    &attachment.filename,
                    &attachment.content_type,
                    attachment.size as i64,
                    &path.to_string_lossy(),
                )
                .await
            {
                warn!(message_id, error = %e, "failed to record attachment metadata");
            }
        }
    }

    /// Best-effort contact collection: the sender always, every recipient
    /// when the folder holds outgoing mail.
    async fn collect_contacts(&self, parsed: &ParsedMessage, folder_type: FolderType) {
        if let Err(e) = self.contacts.record(self.account_id, &parsed.from, "").await {
            warn!(error = %e, "failed to record sender contact");
        }

        if folder_type.is_outgoing() {
            for list in [&parsed.to, &parsed.cc] {
                if let Err(e) = self.contacts.record_all(self.account_id, list).await {
                    warn!(error = %e, "failed to record recipient contacts");
                }
            }
        }
    }

    /// Notify for inbox messages that are, in their latest persisted state,
    /// not spam. A filter may have marked the message spam after
    /// classification, so the flag is re-read rather than trusted from the
    /// verdict.
    async fn maybe_notify(&self, message_id: i64, folder: &str) -> crate::Result<()> {
        let Some(current) = self.messages.find_by_id(message_id).await? else {
            return Ok(());
        };
        if current.is_spam {
            return Ok(());
        }

        debug!(message_id, folder, "emitting new-mail notification");
        self.notifier.notify(&NewMailNotice {
            title: "New mail".to_string(),
            body: format!("{}: {}", current.from_addr, current.subject),
            sound: self.settings.notifications.sound,
        });
        Ok(())
    }

    /// Sync the Drafts folder: dedup by `(uid, Drafts)` and persist draft
    /// rows, with none of the enrichment fan-out. Returns the number of
    /// new drafts.
    ///
    /// # Errors
    ///
    /// Returns an error only if the connection cannot be established.
    pub async fn sync_drafts(&mut self) -> Result<u32, SyncError> {
        self.client
            .connect()
            .await
            .map_err(|e| SyncError::Connect(e.to_string()))?;

        let new_drafts = match self.sync_drafts_inner().await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "draft sync failed");
                0
            }
        };

        if let Err(e) = self.client.disconnect().await {
            warn!(error = %e, "disconnect failed");
        }

        Ok(new_drafts)
    }

    async fn sync_drafts_inner(&mut self) -> Result<u32, FolderError> {
        self.client.open_folder("Drafts", true).await?;
        let raws = self.client.fetch(&FetchWindow::All).await?;

        let mut new_drafts = 0;
        for raw in &raws {
            match self.messages.find_draft_by_uid(self.account_id, raw.uid).await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => {
                    warn!(uid = raw.uid, error = %e, "draft dedup lookup failed");
                    continue;
                }
            }

            let parsed = match self.client.parse(raw) {
                Ok(p) => p,
                Err(e) => {
                    warn!(uid = raw.uid, error = %e, "draft parse failed");
                    continue;
                }
            };

            let draft = Draft {
                id: 0,
                account_id: self.account_id,
                uid: Some(raw.uid),
                message_id: parsed.message_id.clone(),
                to_addrs: parsed.to.clone(),
                cc_addrs: parsed.cc.clone(),
                subject: parsed.subject.clone(),
                body_text: parsed.body_text.clone().unwrap_or_default(),
            };
            match self.messages.insert_draft(&draft).await {
                Ok(_) => new_drafts += 1,
                Err(e) => warn!(uid = raw.uid, error = %e, "draft persist failed"),
            }
        }

        if let Err(e) = self.messages.touch_folder(self.account_id, "Drafts").await {
            warn!(error = %e, "failed to update drafts bookkeeping");
        }

        Ok(new_drafts)
    }

    /// Upload a local draft to the remote Drafts mailbox.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or the
    /// append is rejected.
    pub async fn upload_draft(&mut self, draft: &Draft) -> Result<(), SyncError> {
        self.client
            .connect()
            .await
            .map_err(|e| SyncError::Connect(e.to_string()))?;

        let message = render_draft(draft);
        let result = self
            .client
            .append(&message, "Drafts", &["\\Draft".to_string()])
            .await
            .map_err(|e| SyncError::Upload(e.to_string()));

        if let Err(e) = self.client.disconnect().await {
            warn!(error = %e, "disconnect failed");
        }

        result
    }
}

/// Render a draft as minimal RFC 822 text for append.
fn render_draft(draft: &Draft) -> String {
    let mut out = String::new();
    out.push_str(&format!("To: {}\r\n", draft.to_addrs.join(", ")));
    if !draft.cc_addrs.is_empty() {
        out.push_str(&format!("Cc: {}\r\n", draft.cc_addrs.join(", ")));
    }
    if let Some(ref message_id) = draft.message_id {
        out.push_str(&format!("Message-ID: {message_id}\r\n"));
    }
    out.push_str(&format!("Subject: {}\r\n", draft.subject));
    out.push_str("\r\n");
    out.push_str(&draft.body_text);
    out
}
