use crossbeam_channel::Receiver;

use super::watch::Watch;
use crate::models::message::TaskMessage;

/// Single-slot mailbox for the latest user-facing message. Publishing
/// overwrites whatever is pending; nothing is queued.
pub struct NotificationSlot {
    slot: Watch<Option<String>>,
}

impl NotificationSlot {
    pub fn new() -> Self {
        Self {
            slot: Watch::new(None),
        }
    }

    pub fn publish(&self, message: &TaskMessage) {
        self.slot.set(Some(message.to_string()));
    }

    /// Takes the pending message, leaving the slot empty.
    pub fn consume(&self) -> Option<String> {
        self.slot.replace(None)
    }

    pub fn peek(&self) -> Option<String> {
        self.slot.get()
    }

    pub fn subscribe(&self) -> Receiver<Option<String>> {
        self.slot.subscribe()
    }
}

impl Default for NotificationSlot {
    fn default() -> Self {
        Self::new()
    }
}
