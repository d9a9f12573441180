//! Sync settings that persist across sessions.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Desktop notification preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    /// Whether new-mail notifications are shown at all.
    pub enabled: bool,
    /// Whether the notification plays a sound.
    pub sound: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            sound: true,
        }
    }
}

/// Settings for the synchronization pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Folders to synchronize, in order.
    pub folders: Vec<String>,
    /// Directory where attachments and the database live.
    pub data_dir: PathBuf,
    /// Desktop notification preferences.
    #[serde(default)]
    pub notifications: NotificationSettings,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            folders: vec!["INBOX".to_string(), "Sent".to_string()],
            data_dir: default_data_dir(),
            notifications: NotificationSettings::default(),
        }
    }
}

impl SyncSettings {
    /// Load settings from a JSON file, falling back to defaults if the file
    /// does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    /// Save settings to a JSON file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Path of the `SQLite` database inside the data directory.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("mailsift.db")
    }

    /// Validate that the settings are usable for a sync run.
    ///
    /// # Errors
    ///
    /// Returns an error if no folders are configured.
    pub fn validate(&self) -> Result<()> {
        if self.folders.is_empty() {
            return Err(Error::Config("no folders configured for sync".into()));
        }
        Ok(())
    }
}

/// Default data directory (`~/.local/share/mailsift` on Linux).
fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailsift")
}
