//! Context window selection.
//!
//! Pure selection over an immutable history: given the token budget, decide
//! which suffix of the stored history accompanies the new message. The
//! stored history itself is never mutated or shrunk here; older turns are
//! only dropped from the outgoing request.

use crate::history::StoredMessage;
use crate::tokens::TokenCounter;

/// Outcome of fitting a history under `max_context_tokens`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextWindow {
    /// Index of the first kept message; the outgoing slice is `history[start..]`.
    pub start: usize,
    /// Number of messages dropped from the front.
    pub dropped: usize,
    /// Token cost of the system prompt plus the new message. Never trimmed,
    /// so the total can legitimately exceed the budget.
    pub reserved_tokens: usize,
    /// Token cost of the kept history slice.
    pub sent_history_tokens: usize,
}

impl ContextWindow {
    pub fn sent<'a>(&self, history: &'a [StoredMessage]) -> &'a [StoredMessage] {
        &history[self.start..]
    }
}

/// Walk the history from the most recent message backward, keeping messages
/// while reserved + accumulated cost stays within the budget. The first
/// message that would overflow is dropped whole, along with everything older
/// than it — a message is never truncated mid-text.
pub fn fit(
    history: &[StoredMessage],
    system_prompt: &str,
    new_message: &str,
    max_context_tokens: usize,
    counter: &dyn TokenCounter,
) -> ContextWindow {
    let reserved = counter.count(system_prompt)
        + counter.count(new_message)
        + counter.message_overhead();
    let budget = max_context_tokens.saturating_sub(reserved);

    let mut accumulated = 0usize;
    let mut start = history.len();
    for (index, message) in history.iter().enumerate().rev() {
        let cost = counter.count_message(message);
        if accumulated + cost > budget {
            break;
        }
        accumulated += cost;
        start = index;
    }

    ContextWindow {
        start,
        dropped: start,
        reserved_tokens: reserved,
        sent_history_tokens: accumulated,
    }
}
