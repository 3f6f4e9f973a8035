//! TOML configuration with environment overrides.
//!
//! File values come first, then environment variables override them. The
//! conventional provider variables (`OPENAI_API_KEY` etc.) are honored so a
//! bare deployment needs no config file at all.

use crate::error::ConfigError;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_cohere_model() -> String {
    "command-r-08-2024".to_string()
}

fn default_gpt_model() -> String {
    "gpt-4.1-mini".to_string()
}

fn default_gemini_model() -> String {
    "models/gemini-2.5-flash".to_string()
}

fn default_max_context_tokens() -> usize {
    30000
}

fn default_temperature() -> f64 {
    0.2
}

fn default_max_output_tokens() -> u32 {
    2000
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_lock_timeout_secs() -> u64 {
    30
}

fn default_history_dir() -> PathBuf {
    ProjectDirs::from("", "", "kursbot").map_or_else(
        || PathBuf::from("history"),
        |dirs| dirs.data_dir().join("history"),
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub telegram_bot_token: String,

    #[serde(default)]
    pub cohere_api_key: String,
    #[serde(default)]
    pub openai_api_key: String,
    #[serde(default)]
    pub gemini_api_key: String,

    #[serde(default = "default_cohere_model")]
    pub cohere_model: String,
    #[serde(default = "default_gpt_model")]
    pub gpt_model: String,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,

    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    #[serde(default = "default_history_dir")]
    pub history_dir: PathBuf,
    /// FX rates snapshot appended to every role prompt, when present.
    #[serde(default)]
    pub rates_snapshot: Option<PathBuf>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            telegram_bot_token: String::new(),
            cohere_api_key: String::new(),
            openai_api_key: String::new(),
            gemini_api_key: String::new(),
            cohere_model: default_cohere_model(),
            gpt_model: default_gpt_model(),
            gemini_model: default_gemini_model(),
            max_context_tokens: default_max_context_tokens(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            history_dir: default_history_dir(),
            rates_snapshot: None,
            request_timeout_secs: default_request_timeout_secs(),
            lock_timeout_secs: default_lock_timeout_secs(),
        }
    }
}

impl Config {
    pub fn default_path() -> PathBuf {
        ProjectDirs::from("", "", "kursbot").map_or_else(
            || PathBuf::from("kursbot.toml"),
            |dirs| dirs.config_dir().join("kursbot.toml"),
        )
    }

    /// Load from `path` (or the default location), apply environment
    /// overrides, validate. A missing file is fine — defaults plus
    /// environment variables are often a complete configuration.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map_or_else(Self::default_path, Path::to_path_buf);

        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            toml::from_str(&raw)
                .map_err(|error| ConfigError::Load(format!("{}: {error}", path.display())))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        override_from_env(&mut self.telegram_bot_token, "TELEGRAM_BOT_TOKEN");
        override_from_env(&mut self.cohere_api_key, "COHERE_API_KEY");
        override_from_env(&mut self.openai_api_key, "OPENAI_API_KEY");
        override_from_env(&mut self.gemini_api_key, "GEMINI_API_KEY");
        override_from_env(&mut self.cohere_model, "COHERE_MODEL");
        override_from_env(&mut self.gpt_model, "GPT_MODEL");
        override_from_env(&mut self.gemini_model, "GEMINI_MODEL");

        if let Ok(value) = std::env::var("KURSBOT_HISTORY_DIR") {
            let value = value.trim();
            if !value.is_empty() {
                self.history_dir = PathBuf::from(value);
            }
        }
        if let Ok(value) = std::env::var("KURSBOT_MAX_CONTEXT_TOKENS")
            && let Ok(parsed) = value.trim().parse::<usize>()
        {
            self.max_context_tokens = parsed;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_context_tokens == 0 {
            return Err(ConfigError::Validation(
                "max_context_tokens must be positive".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Validation(format!(
                "temperature {} out of range 0.0..=2.0",
                self.temperature
            )));
        }
        Ok(())
    }
}

fn override_from_env(field: &mut String, var: &str) {
    if let Ok(value) = std::env::var(var) {
        let value = value.trim();
        if !value.is_empty() {
            *field = value.to_string();
        }
    }
}
