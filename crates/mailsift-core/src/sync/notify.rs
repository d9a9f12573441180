//! Desktop notification sink.
//!
//! Notifications are fire-and-forget: a failed notification is logged and
//! never affects the sync result.

use tracing::warn;

use crate::config::NotificationSettings;

/// A new-mail notice handed to the sink.
#[derive(Debug, Clone)]
pub struct NewMailNotice {
    /// Notification title.
    pub title: String,
    /// Notification body.
    pub body: String,
    /// Whether to play a sound.
    pub sound: bool,
}

/// Something that can surface a new-mail notice to the user.
pub trait Notifier {
    /// Deliver the notice. Implementations must not fail loudly; log and
    /// move on.
    fn notify(&self, notice: &NewMailNotice);
}

/// Desktop notifier backed by the platform notification service.
#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    settings: NotificationSettings,
}

impl DesktopNotifier {
    /// Create a notifier with the given preferences.
    #[must_use]
    pub const fn new(settings: NotificationSettings) -> Self {
        Self { settings }
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, notice: &NewMailNotice) {
        if !self.settings.enabled {
            return;
        }

        let mut notification = notify_rust::Notification::new();
        notification
            .summary(&notice.title)
            .body(&notice.body)
            .appname("mailsift");

        if notice.sound && self.settings.sound {
            notification.sound_name("message-new-email");
        }

        if let Err(e) = notification.show() {
            warn!(error = %e, "failed to show desktop notification");
        }
    }
}
