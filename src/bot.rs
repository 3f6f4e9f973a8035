//! The bot loop: the thin caller sitting between a channel and the session
//! manager. Parses slash commands, tracks each chat's selected role, and
//! translates relay errors into user-facing text. All conversation state
//! lives in the core; the only thing kept here is which role a chat picked.

use crate::channels::{Channel, ChannelMessage};
use crate::error::RelayError;
use crate::roles::Role;
use crate::session::SessionManager;
use crate::stats::UsageStats;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use strum::IntoEnumIterator;

const UPSTREAM_APOLOGY: &str =
    "Sorry, the assistant is unavailable right now. Please try again in a moment.";
const BUSY_NOTICE: &str =
    "Your previous message is still being processed. Please wait for the reply.";

pub struct Bot {
    channel: Arc<dyn Channel>,
    manager: Arc<SessionManager>,
    selected_roles: Mutex<HashMap<String, Role>>,
}

impl Bot {
    pub fn new(channel: Arc<dyn Channel>, manager: Arc<SessionManager>) -> Self {
        Self {
            channel,
            manager,
            selected_roles: Mutex::new(HashMap::new()),
        }
    }

    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        if !self.channel.health_check().await {
            tracing::warn!(
                channel = self.channel.name(),
                "channel health check failed, starting anyway"
            );
        }

        let (tx, mut rx) = tokio::sync::mpsc::channel::<ChannelMessage>(64);

        let listener = self.channel.clone();
        tokio::spawn(async move {
            if let Err(error) = listener.listen(tx).await {
                tracing::error!(%error, "channel listener stopped");
            }
        });

        // Each message is handled on its own task so a long model call for
        // one identity never stalls the other chats; the manager's
        // per-identity lock keeps same-identity exchanges ordered.
        while let Some(message) = rx.recv().await {
            let bot = Arc::clone(&self);
            tokio::spawn(async move {
                let reply = bot.reply_for(&message).await;
                if let Err(error) = bot.channel.send_chunked(&reply, &message.chat_id).await {
                    tracing::error!(%error, chat_id = %message.chat_id, "failed sending reply");
                }
            });
        }
        Ok(())
    }

    async fn reply_for(&self, message: &ChannelMessage) -> String {
        let Ok(user_id) = message.sender.parse::<i64>() else {
            tracing::warn!(sender = %message.sender, "non-numeric sender id, ignoring");
            return UPSTREAM_APOLOGY.to_string();
        };

        let text = message.text.trim();
        let (command, argument) = match text.split_once(char::is_whitespace) {
            Some((head, tail)) => (head, tail.trim()),
            None => (text, ""),
        };

        match command {
            "/start" | "/help" => Self::greeting(),
            "/role" => self.handle_role_command(&message.chat_id, argument),
            "/clear" => self.handle_clear(user_id, &message.chat_id, argument).await,
            "/stats" => self.handle_stats(user_id, &message.chat_id).await,
            _ => self.handle_chat(user_id, &message.chat_id, text).await,
        }
    }

    fn greeting() -> String {
        let roles: Vec<String> = Role::iter().map(|r| r.to_string()).collect();
        format!(
            "Hi! I am the FX & investments assistant.\n\n\
             Just write your question, or use:\n\
             /role <{}> — switch the assistant persona\n\
             /clear [role|all] — forget our conversation\n\
             /stats — token usage for the current role",
            roles.join("|")
        )
    }

    fn selected_role(&self, chat_id: &str) -> Role {
        self.selected_roles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(chat_id)
            .copied()
            .unwrap_or_default()
    }

    fn handle_role_command(&self, chat_id: &str, argument: &str) -> String {
        if argument.is_empty() {
            return format!(
                "Current role: {}. Available: {}.",
                self.selected_role(chat_id),
                Role::iter()
                    .map(|r| r.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        match Role::parse_inbound(argument) {
            Ok(role) => {
                self.selected_roles
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(chat_id.to_string(), role);
                format!("Role switched to {role}.")
            }
            Err(_) => format!(
                "Unknown role {argument:?}. Available: {}.",
                Role::iter()
                    .map(|r| r.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }

    async fn handle_clear(&self, user_id: i64, chat_id: &str, argument: &str) -> String {
        let role = match argument {
            "" => Some(self.selected_role(chat_id)),
            "all" => None,
            other => match Role::parse_inbound(other) {
                Ok(role) => Some(role),
                Err(_) => {
                    return format!("Unknown role {other:?}; use /clear, /clear all or /clear <role>.");
                }
            },
        };

        match self.manager.clear_history(user_id, role).await {
            Ok(outcome) => {
                if outcome.cleared {
                    "History cleared.".to_string()
                } else {
                    "Nothing to clear — the history was already empty.".to_string()
                }
            }
            Err(error) => {
                tracing::error!(%error, user_id, "clear_history failed");
                UPSTREAM_APOLOGY.to_string()
            }
        }
    }

    async fn handle_stats(&self, user_id: i64, chat_id: &str) -> String {
        let role = self.selected_role(chat_id);
        match self.manager.get_stats(user_id, role).await {
            Ok(stats) => format_stats(role, &stats),
            Err(error) => {
                tracing::error!(%error, user_id, "get_stats failed");
                UPSTREAM_APOLOGY.to_string()
            }
        }
    }

    async fn handle_chat(&self, user_id: i64, chat_id: &str, text: &str) -> String {
        let role = self.selected_role(chat_id);
        match self.manager.handle_message(user_id, Some(role), text).await {
            Ok(reply) => reply.text,
            Err(RelayError::Validation(error)) => error.to_string(),
            Err(RelayError::LockTimeout { .. }) => BUSY_NOTICE.to_string(),
            Err(error) => {
                tracing::error!(%error, user_id, "handle_message failed");
                UPSTREAM_APOLOGY.to_string()
            }
        }
    }
}

fn format_stats(role: Role, stats: &UsageStats) -> String {
    format!(
        "Role: {role}\nModel: {}\nMessages stored: {}\nTokens: {} of {} ({:.2}%)\n\
         — system prompt: {}\n— history: {}",
        stats.model,
        stats.total_messages,
        stats.total_tokens,
        stats.max_context_tokens,
        stats.usage_percent,
        stats.system_tokens,
        stats.history_tokens,
    )
}
