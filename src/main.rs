use anyhow::Context;
use clap::Parser;
use kursbot::bot::Bot;
use kursbot::channels::TelegramChannel;
use kursbot::config::Config;
use kursbot::history::JsonFileStore;
use kursbot::providers;
use kursbot::roles::RolePrompts;
use kursbot::session::{SessionManager, SessionSettings};
use kursbot::tokens::CharEstimate;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "kursbot",
    version,
    about = "Telegram ↔ LLM relay for the bank FX & investments assistant"
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    anyhow::ensure!(
        !config.telegram_bot_token.trim().is_empty(),
        "TELEGRAM_BOT_TOKEN is not set; configure it in the environment or the config file"
    );

    let store = Arc::new(JsonFileStore::new(&config.history_dir));
    let chain = providers::build_chain(&config).context("assembling the provider chain")?;
    let prompts = RolePrompts::new(config.rates_snapshot.as_deref());
    let manager = Arc::new(SessionManager::new(
        store,
        chain,
        Arc::new(CharEstimate::new()),
        prompts,
        SessionSettings::from(&config),
    ));

    let channel = Arc::new(TelegramChannel::new(config.telegram_bot_token.trim()));
    tracing::info!(
        history_dir = %config.history_dir.display(),
        max_context_tokens = config.max_context_tokens,
        "kursbot starting"
    );

    let bot = Arc::new(Bot::new(channel, manager));
    tokio::select! {
        result = bot.run() => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            Ok(())
        }
    }
}
