//! Durable per-identity history storage.
//!
//! `JsonFileStore` keeps one JSON file per (user, role) pair and replaces it
//! atomically on every append, so a crash mid-write never leaves a torn file
//! behind. A file that is unreadable anyway (hand-edited, partial from an
//! older version) is logged and treated as an empty history: chat continuity
//! matters more than a single corrupted file.

use super::types::{Identity, StoredMessage};
use crate::roles::Role;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use strum::IntoEnumIterator;

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Full stored sequence for `identity`; empty when none exists.
    async fn load(&self, identity: Identity) -> Result<Vec<StoredMessage>>;

    /// Append one user/assistant pair and persist it durably before
    /// returning. Both messages land or neither does.
    async fn append_exchange(
        &self,
        identity: Identity,
        user_msg: StoredMessage,
        assistant_msg: StoredMessage,
    ) -> Result<()>;

    /// Remove the history for one identity. Returns whether anything was
    /// actually removed; clearing an absent history is a successful no-op.
    async fn clear(&self, identity: Identity) -> Result<bool>;

    /// Remove histories for every role of `user_id`.
    async fn clear_all(&self, user_id: i64) -> Result<bool> {
        let mut removed = false;
        for role in Role::iter() {
            removed |= self.clear(Identity::new(user_id, role)).await?;
        }
        Ok(removed)
    }
}

pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, identity: Identity) -> PathBuf {
        self.dir
            .join(format!("chat_history_{}_{}.json", identity.user_id, identity.role))
    }

    async fn write_atomic(&self, identity: Identity, messages: &[StoredMessage]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed creating history dir {}", self.dir.display()))?;

        let path = self.path_for(identity);
        let temp_path = path.with_extension("json.tmp");
        let data = serde_json::to_vec_pretty(messages).context("failed encoding history")?;

        tokio::fs::write(&temp_path, &data)
            .await
            .with_context(|| format!("failed writing {}", temp_path.display()))?;

        if let Err(rename_error) = tokio::fs::rename(&temp_path, &path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(rename_error)
                .with_context(|| format!("failed replacing {}", path.display()));
        }

        Ok(())
    }
}

#[async_trait]
impl HistoryStore for JsonFileStore {
    async fn load(&self, identity: Identity) -> Result<Vec<StoredMessage>> {
        let path = self.path_for(identity);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Vec::new());
            }
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("failed reading {}", path.display()));
            }
        };

        match serde_json::from_slice(&raw) {
            Ok(messages) => Ok(messages),
            Err(error) => {
                tracing::warn!(
                    %error,
                    path = %path.display(),
                    "history file unreadable, starting from an empty history"
                );
                Ok(Vec::new())
            }
        }
    }

    async fn append_exchange(
        &self,
        identity: Identity,
        user_msg: StoredMessage,
        assistant_msg: StoredMessage,
    ) -> Result<()> {
        let mut messages = self.load(identity).await?;
        messages.push(user_msg);
        messages.push(assistant_msg);
        self.write_atomic(identity, &messages).await
    }

    async fn clear(&self, identity: Identity) -> Result<bool> {
        let path = self.path_for(identity);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(error) => {
                Err(error).with_context(|| format!("failed removing {}", path.display()))
            }
        }
    }
}

/// In-memory store for tests and embedded use.
#[derive(Default)]
pub struct MemoryStore {
    histories: Mutex<HashMap<Identity, Vec<StoredMessage>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Identity, Vec<StoredMessage>>> {
        self.histories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn load(&self, identity: Identity) -> Result<Vec<StoredMessage>> {
        Ok(self.lock().get(&identity).cloned().unwrap_or_default())
    }

    async fn append_exchange(
        &self,
        identity: Identity,
        user_msg: StoredMessage,
        assistant_msg: StoredMessage,
    ) -> Result<()> {
        let mut histories = self.lock();
        let history = histories.entry(identity).or_default();
        history.push(user_msg);
        history.push(assistant_msg);
        Ok(())
    }

    async fn clear(&self, identity: Identity) -> Result<bool> {
        Ok(self.lock().remove(&identity).is_some())
    }
}
