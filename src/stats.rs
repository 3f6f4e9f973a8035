use crate::history::StoredMessage;
use crate::tokens::TokenCounter;
use serde::Serialize;

/// Usage summary over the full stored history, derived on demand and never
/// persisted. Reflects what is on disk, independent of how much of it was
/// sent to the model in the last exchange.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageStats {
    pub total_messages: usize,
    pub system_tokens: usize,
    pub history_tokens: usize,
    pub total_tokens: usize,
    pub max_context_tokens: usize,
    /// Can exceed 100 when the reserved prompt alone is over the budget.
    pub usage_percent: f64,
    pub model: String,
}

impl UsageStats {
    pub fn compute(
        history: &[StoredMessage],
        system_prompt: &str,
        max_context_tokens: usize,
        model: &str,
        counter: &dyn TokenCounter,
    ) -> Self {
        let system_tokens = counter.count(system_prompt);
        let history_tokens = counter.count_messages(history);
        let total_tokens = system_tokens + history_tokens;

        #[allow(clippy::cast_precision_loss)]
        let usage_percent = if max_context_tokens == 0 {
            0.0
        } else {
            let raw = total_tokens as f64 / max_context_tokens as f64 * 100.0;
            (raw * 100.0).round() / 100.0
        };

        Self {
            total_messages: history.len(),
            system_tokens,
            history_tokens,
            total_tokens,
            max_context_tokens,
            usage_percent,
            model: model.to_string(),
        }
    }
}
