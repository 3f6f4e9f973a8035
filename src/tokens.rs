//! Token cost estimation.
//!
//! The window selection and the reported stats both rely on `count` being
//! deterministic: the same text must always cost the same, or the trimming
//! decision would wobble between identical requests.

use crate::history::StoredMessage;

pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;

    /// Fixed per-message overhead charged by the target API, if any.
    fn message_overhead(&self) -> usize {
        0
    }

    fn count_message(&self, message: &StoredMessage) -> usize {
        self.count(&message.text) + self.message_overhead()
    }

    fn count_messages(&self, messages: &[StoredMessage]) -> usize {
        messages.iter().map(|m| self.count_message(m)).sum()
    }
}

/// One token per four characters — the rough cost the hosted models charge
/// for Russian and English text.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharEstimate {
    pub per_message_overhead: usize,
}

impl CharEstimate {
    pub const fn new() -> Self {
        Self {
            per_message_overhead: 0,
        }
    }
}

impl TokenCounter for CharEstimate {
    fn count(&self, text: &str) -> usize {
        text.chars().count() / 4
    }

    fn message_overhead(&self) -> usize {
        self.per_message_overhead
    }
}
