use crate::roles::Role;
use thiserror::Error;

/// Structured error surface for kursbot.
///
/// Callers match on these to pick a recovery strategy; internal code uses
/// `anyhow::Result` for ad-hoc context chains. Unreadable persisted history
/// is deliberately absent here: it is recovered in the store (logged and
/// treated as empty) so a single torn file never takes the chat down.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Rejected before any history read. No side effects.
    #[error("validation: {0}")]
    Validation(#[from] ValidationError),

    /// The model collaborator failed or timed out. No history mutation.
    #[error("upstream: {0}")]
    Upstream(#[from] UpstreamError),

    /// Could not acquire the per-identity history lock in time. Retryable.
    #[error("an exchange for user {user_id} role {role} is still in flight")]
    LockTimeout { user_id: i64, role: Role },

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // Generic fallthrough (wraps anyhow for interop)
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("unknown role {0:?} (expected one of: user, employee, investor)")]
    UnknownRole(String),

    #[error("message text is empty")]
    EmptyMessage,
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("provider {provider} request failed: {message}")]
    Request {
        provider: &'static str,
        message: String,
    },

    #[error("provider {provider} timed out after {timeout_secs}s")]
    Timeout {
        provider: &'static str,
        timeout_secs: u64,
    },

    #[error("provider {provider} returned an empty reply")]
    EmptyReply { provider: &'static str },

    #[error("no LLM provider is configured")]
    NoProviders,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
