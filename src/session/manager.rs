//! The conversation orchestrator.
//!
//! One `handle_message` call is the whole exchange: validate, take the
//! per-identity lock, load history, select the context window, call the
//! provider chain, append the user/assistant pair, report stats. Mutations
//! for a single identity are fully serialized by the lock; unrelated
//! identities never contend.

use crate::config::Config;
use crate::context;
use crate::error::{RelayError, UpstreamError, ValidationError};
use crate::history::{HistoryStore, Identity, StoredMessage};
use crate::providers::{ChatProvider, ProviderReply};
use crate::roles::{Role, RolePrompts};
use crate::stats::UsageStats;
use crate::tokens::TokenCounter;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use strum::IntoEnumIterator;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Clone)]
pub struct Reply {
    pub text: String,
    /// The role that actually served the exchange (after defaulting).
    pub role: Role,
    pub stats: UsageStats,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearOutcome {
    pub cleared: bool,
    pub message: String,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub max_context_tokens: usize,
    pub request_timeout: Duration,
    pub lock_timeout: Duration,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_context_tokens: config.max_context_tokens,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            lock_timeout: Duration::from_secs(config.lock_timeout_secs),
        }
    }
}

type LockMap = Mutex<HashMap<Identity, Arc<AsyncMutex<()>>>>;

pub struct SessionManager {
    store: Arc<dyn HistoryStore>,
    providers: Vec<Arc<dyn ChatProvider>>,
    counter: Arc<dyn TokenCounter>,
    prompts: RolePrompts,
    settings: SessionSettings,
    locks: LockMap,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn HistoryStore>,
        providers: Vec<Arc<dyn ChatProvider>>,
        counter: Arc<dyn TokenCounter>,
        prompts: RolePrompts,
        settings: SessionSettings,
    ) -> Self {
        Self {
            store,
            providers,
            counter,
            prompts,
            settings,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Process one user message end to end. A `None` role defaults to
    /// [`Role::User`] — the caller-facing contract's only implicit default.
    pub async fn handle_message(
        &self,
        user_id: i64,
        role: Option<Role>,
        text: &str,
    ) -> Result<Reply, RelayError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::EmptyMessage.into());
        }
        let role = role.unwrap_or_default();
        let identity = Identity::new(user_id, role);

        let _guard = self.acquire(identity).await?;

        let history = self.store.load(identity).await?;
        let system_prompt = self.prompts.system_prompt(role);
        let window = context::fit(
            &history,
            &system_prompt,
            text,
            self.settings.max_context_tokens,
            self.counter.as_ref(),
        );
        if window.dropped > 0 {
            tracing::debug!(
                %identity,
                dropped = window.dropped,
                sent_tokens = window.sent_history_tokens,
                "trimmed oldest turns from the outgoing request"
            );
        }

        let (provider, reply) = self
            .generate_with_fallback(&system_prompt, window.sent(&history), text)
            .await?;

        let user_msg = StoredMessage::user(text);
        let assistant_msg = StoredMessage::assistant(&reply.text);
        self.store
            .append_exchange(identity, user_msg.clone(), assistant_msg.clone())
            .await?;

        // Stats cover the full persisted sequence, not the trimmed window.
        let mut full_history = history;
        full_history.push(user_msg);
        full_history.push(assistant_msg);
        let stats = UsageStats::compute(
            &full_history,
            &system_prompt,
            self.settings.max_context_tokens,
            provider.name(),
            self.counter.as_ref(),
        );

        tracing::info!(
            %identity,
            provider = provider.name(),
            total_messages = stats.total_messages,
            usage_percent = stats.usage_percent,
            billed_tokens = reply.tokens_used,
            "exchange completed"
        );

        Ok(Reply {
            text: reply.text,
            role,
            stats,
        })
    }

    /// Clear one role's history, or every role's when `role` is `None`.
    pub async fn clear_history(
        &self,
        user_id: i64,
        role: Option<Role>,
    ) -> Result<ClearOutcome, RelayError> {
        let cleared = match role {
            Some(role) => {
                let identity = Identity::new(user_id, role);
                let _guard = self.acquire(identity).await?;
                self.store.clear(identity).await?
            }
            None => {
                // Take every role's lock (fixed iteration order) so no
                // in-flight exchange can re-append mid-clear.
                let mut guards = Vec::new();
                for role in Role::iter() {
                    guards.push(self.acquire(Identity::new(user_id, role)).await?);
                }
                self.store.clear_all(user_id).await?
            }
        };

        let message = if cleared {
            match role {
                Some(role) => format!("history cleared for user {user_id}, role {role}"),
                None => format!("all histories cleared for user {user_id}"),
            }
        } else {
            format!("no history found for user {user_id}")
        };
        Ok(ClearOutcome { cleared, message })
    }

    /// Usage stats over the full stored history, without contacting a model.
    pub async fn get_stats(&self, user_id: i64, role: Role) -> Result<UsageStats, RelayError> {
        let history = self.store.load(Identity::new(user_id, role)).await?;
        Ok(UsageStats::compute(
            &history,
            &self.prompts.system_prompt(role),
            self.settings.max_context_tokens,
            self.model_label(),
            self.counter.as_ref(),
        ))
    }

    fn model_label(&self) -> &'static str {
        self.providers.first().map_or("none", |p| p.name())
    }

    async fn acquire(&self, identity: Identity) -> Result<OwnedMutexGuard<()>, RelayError> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Drop entries nobody holds before adding another one.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(identity).or_default().clone()
        };

        tokio::time::timeout(self.settings.lock_timeout, lock.lock_owned())
            .await
            .map_err(|_| RelayError::LockTimeout {
                user_id: identity.user_id,
                role: identity.role,
            })
    }

    async fn generate_with_fallback(
        &self,
        system_prompt: &str,
        history: &[StoredMessage],
        text: &str,
    ) -> Result<(&Arc<dyn ChatProvider>, ProviderReply), RelayError> {
        let mut last = UpstreamError::NoProviders;

        for provider in &self.providers {
            let call = provider.generate(system_prompt, history, text);
            match tokio::time::timeout(self.settings.request_timeout, call).await {
                Ok(Ok(reply)) => {
                    if reply.text.trim().is_empty() {
                        tracing::warn!(provider = provider.name(), "provider returned empty text");
                        last = UpstreamError::EmptyReply {
                            provider: provider.name(),
                        };
                        continue;
                    }
                    return Ok((provider, reply));
                }
                Ok(Err(error)) => {
                    tracing::warn!(
                        provider = provider.name(),
                        %error,
                        "provider call failed, trying the next one"
                    );
                    last = UpstreamError::Request {
                        provider: provider.name(),
                        message: error.to_string(),
                    };
                }
                Err(_) => {
                    tracing::warn!(
                        provider = provider.name(),
                        timeout_secs = self.settings.request_timeout.as_secs(),
                        "provider call timed out, trying the next one"
                    );
                    last = UpstreamError::Timeout {
                        provider: provider.name(),
                        timeout_secs: self.settings.request_timeout.as_secs(),
                    };
                }
            }
        }

        Err(last.into())
    }
}
