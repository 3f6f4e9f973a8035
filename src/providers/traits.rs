use crate::history::StoredMessage;
use async_trait::async_trait;

/// Reply from a hosted model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderReply {
    pub text: String,
    /// Total tokens the provider billed for the call, when it reports one.
    /// Advisory only — stats are always computed from the local counter so
    /// they stay reproducible.
    pub tokens_used: Option<u64>,
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn model(&self) -> &str;

    /// One inference call: fixed system prompt, trimmed prior history, and
    /// the new user message. Implementations must not mutate or re-order
    /// the history they are given.
    async fn generate(
        &self,
        system_prompt: &str,
        history: &[StoredMessage],
        new_message: &str,
    ) -> anyhow::Result<ProviderReply>;
}
