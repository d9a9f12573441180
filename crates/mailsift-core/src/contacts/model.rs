//! Contact data model.

use crate::AccountId;

/// An address collected from synced mail.
#[derive(Debug, Clone)]
pub struct Contact {
    /// Account the contact was collected under.
    pub account_id: AccountId,
    /// Email address, normalized to lowercase.
    pub email: String,
    /// Display name, when one was seen.
    pub name: String,
    /// How many messages this address has appeared on.
    pub times_seen: u32,
    /// When the address was last seen, as stored.
    pub last_seen: Option<String>,
}
