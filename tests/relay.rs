//! End-to-end properties of the session manager over the file-backed store.

use async_trait::async_trait;
use kursbot::error::{RelayError, UpstreamError};
use kursbot::history::{HistoryStore, Identity, JsonFileStore, StoredMessage};
use kursbot::providers::{ChatProvider, ProviderReply};
use kursbot::roles::{Role, RolePrompts};
use kursbot::session::{SessionManager, SessionSettings};
use kursbot::tokens::CharEstimate;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Succeeds with a canned reply and records how many history messages each
/// call was given.
struct RecordingProvider {
    reply: String,
    history_lens: Mutex<Vec<usize>>,
}

impl RecordingProvider {
    fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            history_lens: Mutex::new(Vec::new()),
        }
    }

    fn seen_history_lens(&self) -> Vec<usize> {
        self.history_lens.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatProvider for RecordingProvider {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn model(&self) -> &str {
        "recording-1"
    }

    async fn generate(
        &self,
        _system_prompt: &str,
        history: &[StoredMessage],
        _new_message: &str,
    ) -> anyhow::Result<ProviderReply> {
        self.history_lens.lock().unwrap().push(history.len());
        Ok(ProviderReply {
            text: self.reply.clone(),
            tokens_used: Some(7),
        })
    }
}

struct FailingProvider;

#[async_trait]
impl ChatProvider for FailingProvider {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn model(&self) -> &str {
        "failing-1"
    }

    async fn generate(
        &self,
        _system_prompt: &str,
        _history: &[StoredMessage],
        _new_message: &str,
    ) -> anyhow::Result<ProviderReply> {
        anyhow::bail!("simulated upstream outage")
    }
}

struct SlowProvider {
    delay: Duration,
}

#[async_trait]
impl ChatProvider for SlowProvider {
    fn name(&self) -> &'static str {
        "slow"
    }

    fn model(&self) -> &str {
        "slow-1"
    }

    async fn generate(
        &self,
        _system_prompt: &str,
        _history: &[StoredMessage],
        _new_message: &str,
    ) -> anyhow::Result<ProviderReply> {
        tokio::time::sleep(self.delay).await;
        Ok(ProviderReply {
            text: "too late".to_string(),
            tokens_used: None,
        })
    }
}

struct Fixture {
    _dir: TempDir,
    store: Arc<JsonFileStore>,
    manager: SessionManager,
}

fn fixture_with(providers: Vec<Arc<dyn ChatProvider>>, settings: SessionSettings) -> Fixture {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(JsonFileStore::new(dir.path()));
    let manager = SessionManager::new(
        store.clone(),
        providers,
        Arc::new(CharEstimate::new()),
        RolePrompts::without_rates(),
        settings,
    );
    Fixture {
        _dir: dir,
        store,
        manager,
    }
}

fn default_settings() -> SessionSettings {
    SessionSettings {
        max_context_tokens: 30000,
        request_timeout: Duration::from_secs(5),
        lock_timeout: Duration::from_secs(5),
    }
}

fn fixture(providers: Vec<Arc<dyn ChatProvider>>) -> Fixture {
    fixture_with(providers, default_settings())
}

#[tokio::test]
async fn successful_exchange_appends_exactly_one_pair() {
    let fx = fixture(vec![Arc::new(RecordingProvider::new("521.5 at Halyk"))]);

    let reply = fx
        .manager
        .handle_message(42, Some(Role::User), "best USD rate?")
        .await
        .unwrap();

    assert_eq!(reply.text, "521.5 at Halyk");
    assert_eq!(reply.stats.total_messages, 2);

    let history = fx.store.load(Identity::new(42, Role::User)).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].text, "best USD rate?");
    assert_eq!(history[1].text, "521.5 at Halyk");
}

#[tokio::test]
async fn upstream_failure_appends_nothing() {
    let fx = fixture(vec![Arc::new(FailingProvider)]);

    let result = fx.manager.handle_message(42, None, "hello").await;
    assert!(matches!(
        result,
        Err(RelayError::Upstream(UpstreamError::Request { .. }))
    ));

    let history = fx.store.load(Identity::new(42, Role::User)).await.unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn upstream_timeout_appends_nothing() {
    let fx = fixture_with(
        vec![Arc::new(SlowProvider {
            delay: Duration::from_secs(30),
        })],
        SessionSettings {
            request_timeout: Duration::from_millis(50),
            ..default_settings()
        },
    );

    let result = fx.manager.handle_message(1, None, "hello").await;
    assert!(matches!(
        result,
        Err(RelayError::Upstream(UpstreamError::Timeout { .. }))
    ));
    assert!(
        fx.store
            .load(Identity::new(1, Role::User))
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn fallback_provider_serves_when_the_first_fails() {
    let second = Arc::new(RecordingProvider::new("fallback reply"));
    let fx = fixture(vec![Arc::new(FailingProvider), second.clone()]);

    let reply = fx.manager.handle_message(7, None, "hi").await.unwrap();
    assert_eq!(reply.text, "fallback reply");
    assert_eq!(reply.stats.model, "recording");
    assert_eq!(second.seen_history_lens(), vec![0]);

    let history = fx.store.load(Identity::new(7, Role::User)).await.unwrap();
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn trimming_limits_the_request_but_not_the_store() {
    // System prompts are a few hundred tokens; keep the budget just above
    // them so at most a couple of history messages ever fit.
    let provider = Arc::new(RecordingProvider::new(&"r".repeat(400)));
    let prompts = RolePrompts::without_rates();
    let prompt_tokens = CharEstimate::new();
    let system_cost = {
        use kursbot::tokens::TokenCounter;
        prompt_tokens.count(&prompts.system_prompt(Role::User))
    };

    let fx = fixture_with(
        vec![provider.clone()],
        SessionSettings {
            max_context_tokens: system_cost + 150,
            ..default_settings()
        },
    );

    for _ in 0..6 {
        fx.manager
            .handle_message(3, None, &"q".repeat(200))
            .await
            .unwrap();
    }

    // The full history kept growing on disk...
    let stats = fx.manager.get_stats(3, Role::User).await.unwrap();
    assert_eq!(stats.total_messages, 12);
    assert!(stats.usage_percent > 100.0);

    // ...while the provider saw an ever-trimmed window.
    let lens = provider.seen_history_lens();
    assert_eq!(lens.len(), 6);
    assert!(
        lens.iter().all(|&len| len <= 2),
        "provider saw too much history: {lens:?}"
    );
}

#[tokio::test]
async fn concurrent_exchanges_for_one_identity_both_land() {
    let fx = Arc::new(fixture(vec![Arc::new(RecordingProvider::new("reply"))]));

    let a = {
        let fx = fx.clone();
        tokio::spawn(async move { fx.manager.handle_message(5, None, "first").await })
    };
    let b = {
        let fx = fx.clone();
        tokio::spawn(async move { fx.manager.handle_message(5, None, "second").await })
    };
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    let history = fx.store.load(Identity::new(5, Role::User)).await.unwrap();
    assert_eq!(history.len(), 4);

    // Pairs are intact: user question directly followed by its reply.
    use kursbot::history::Speaker;
    for pair in history.chunks(2) {
        assert_eq!(pair[0].speaker, Speaker::User);
        assert_eq!(pair[1].speaker, Speaker::Assistant);
    }
    let questions: Vec<_> = history
        .iter()
        .filter(|m| m.speaker == Speaker::User)
        .map(|m| m.text.as_str())
        .collect();
    assert!(questions.contains(&"first"));
    assert!(questions.contains(&"second"));
}

#[tokio::test]
async fn second_caller_times_out_while_the_first_holds_the_lock() {
    let fx = Arc::new(fixture_with(
        vec![Arc::new(SlowProvider {
            delay: Duration::from_secs(2),
        })],
        SessionSettings {
            request_timeout: Duration::from_secs(10),
            lock_timeout: Duration::from_millis(50),
            ..default_settings()
        },
    ));

    let holder = {
        let fx = fx.clone();
        tokio::spawn(async move { fx.manager.handle_message(8, None, "slow one").await })
    };
    // Let the first call take the lock.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let result = fx.manager.handle_message(8, None, "impatient").await;
    assert!(matches!(result, Err(RelayError::LockTimeout { .. })));

    holder.await.unwrap().unwrap();
    let history = fx.store.load(Identity::new(8, Role::User)).await.unwrap();
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn other_identities_are_not_blocked_by_a_slow_exchange() {
    let slow: Arc<dyn ChatProvider> = Arc::new(SlowProvider {
        delay: Duration::from_millis(500),
    });
    let fx = Arc::new(fixture_with(
        vec![slow],
        SessionSettings {
            request_timeout: Duration::from_secs(10),
            lock_timeout: Duration::from_millis(100),
            ..default_settings()
        },
    ));

    let busy = {
        let fx = fx.clone();
        tokio::spawn(async move { fx.manager.handle_message(1, None, "slow").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // A different user gets served while user 1's exchange is in flight;
    // their lock is independent so no LockTimeout can occur.
    fx.manager.handle_message(2, None, "quick").await.unwrap();
    busy.await.unwrap().unwrap();
}

#[tokio::test]
async fn clear_all_removes_every_role_and_stats_read_zero() {
    let fx = fixture(vec![Arc::new(RecordingProvider::new("ok"))]);

    fx.manager
        .handle_message(42, Some(Role::User), "hi")
        .await
        .unwrap();
    fx.manager
        .handle_message(42, Some(Role::Employee), "hello")
        .await
        .unwrap();

    let outcome = fx.manager.clear_history(42, None).await.unwrap();
    assert!(outcome.cleared);

    assert_eq!(
        fx.manager.get_stats(42, Role::User).await.unwrap().total_messages,
        0
    );
    assert_eq!(
        fx.manager
            .get_stats(42, Role::Employee)
            .await
            .unwrap()
            .total_messages,
        0
    );
}

#[tokio::test]
async fn clearing_one_role_leaves_the_others() {
    let fx = fixture(vec![Arc::new(RecordingProvider::new("ok"))]);

    fx.manager
        .handle_message(42, Some(Role::User), "hi")
        .await
        .unwrap();
    fx.manager
        .handle_message(42, Some(Role::Investor), "hello")
        .await
        .unwrap();

    let outcome = fx
        .manager
        .clear_history(42, Some(Role::User))
        .await
        .unwrap();
    assert!(outcome.cleared);

    assert_eq!(
        fx.manager.get_stats(42, Role::User).await.unwrap().total_messages,
        0
    );
    assert_eq!(
        fx.manager
            .get_stats(42, Role::Investor)
            .await
            .unwrap()
            .total_messages,
        2
    );
}

#[tokio::test]
async fn corrupt_history_file_recovers_into_a_fresh_conversation() {
    let fx = fixture(vec![Arc::new(RecordingProvider::new("fresh reply"))]);
    std::fs::create_dir_all(fx._dir.path()).unwrap();
    std::fs::write(
        fx._dir.path().join("chat_history_11_user.json"),
        "{torn write",
    )
    .unwrap();

    let reply = fx.manager.handle_message(11, None, "still there?").await.unwrap();
    assert_eq!(reply.stats.total_messages, 2);

    let history = fx.store.load(Identity::new(11, Role::User)).await.unwrap();
    assert_eq!(history.len(), 2);
}
