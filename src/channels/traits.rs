use async_trait::async_trait;

/// A message received from a chat platform.
///
/// `sender` is the platform user id (numeric for Telegram); `chat_id` is
/// where replies go.
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    pub sender: String,
    pub chat_id: String,
    pub text: String,
    pub timestamp: u64,
}

/// Core channel trait — implement for any messaging platform.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable channel name
    fn name(&self) -> &str;

    fn max_message_length(&self) -> usize {
        usize::MAX
    }

    /// Send a message through this channel
    async fn send(&self, message: &str, chat_id: &str) -> anyhow::Result<()>;

    /// Start listening for incoming messages (long-running)
    async fn listen(&self, tx: tokio::sync::mpsc::Sender<ChannelMessage>) -> anyhow::Result<()>;

    /// Check if channel is healthy
    async fn health_check(&self) -> bool {
        true
    }

    async fn send_chunked(&self, message: &str, chat_id: &str) -> anyhow::Result<()> {
        for chunk in super::chunker::chunk_message(message, self.max_message_length()) {
            self.send(&chunk, chat_id).await?;
        }
        Ok(())
    }
}
