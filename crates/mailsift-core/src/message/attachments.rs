//! Attachment blob storage.
//!
//! Blobs are written under `<data_dir>/attachments/<email_id>_<filename>`;
//! the metadata row referencing the path lives with the message repository.

use std::path::{Path, PathBuf};

use crate::Result;

/// Characters stripped from attachment filenames before they touch the
/// filesystem.
const FORBIDDEN: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Maximum filename length after sanitization.
const MAX_FILENAME_LEN: usize = 255;

/// Writes attachment blobs to disk.
#[derive(Debug, Clone)]
pub struct AttachmentStore {
    root: PathBuf,
}

impl AttachmentStore {
    /// Create a store rooted at `<data_dir>/attachments`.
    #[must_use]
    pub fn new(data_dir: &Path) -> Self {
        Self {
            root: data_dir.join("attachments"),
        }
    }

    /// Directory the store writes into.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist one attachment blob, returning the path it was written to.
    ///
    /// The filename is prefixed with the owning email's id so two messages
    /// can carry identically named attachments.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file
    /// cannot be written.
    pub async fn save(&self, email_id: i64, filename: &str, content: &[u8]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.root).await?;

        let safe_name = sanitize_filename(filename);
        let path = self.root.join(format!("{email_id}_{safe_name}"));
        tokio::fs::write(&path, content).await?;

        Ok(path)
    }
}

/// Make a filename safe for the local filesystem: strip reserved
/// characters, collapse whitespace runs, and cap the length.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let stripped: String = name.chars().filter(|c| !FORBIDDEN.contains(c)).collect();

    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");

    let trimmed = collapsed.trim();
    let base = if trimmed.is_empty() { "attachment" } else { trimmed };

    base.chars().take(MAX_FILENAME_LEN).collect()
}
