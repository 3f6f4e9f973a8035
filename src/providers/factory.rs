//! Provider chain assembly.
//!
//! Providers are tried in the fixed fallback order Cohere → OpenAI → Gemini;
//! whichever API keys are configured decide which of them participate.

use super::cohere::CohereProvider;
use super::gemini::GeminiProvider;
use super::openai::OpenAiProvider;
use super::traits::ChatProvider;
use crate::config::Config;
use crate::error::ConfigError;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// Shared HTTP client settings for all providers.
pub(crate) fn http_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(120))
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .unwrap_or_else(|_| Client::new())
}

pub fn build_chain(config: &Config) -> Result<Vec<Arc<dyn ChatProvider>>, ConfigError> {
    let mut chain: Vec<Arc<dyn ChatProvider>> = Vec::new();

    if !config.cohere_api_key.trim().is_empty() {
        chain.push(Arc::new(CohereProvider::new(
            config.cohere_api_key.trim(),
            &config.cohere_model,
            config.temperature,
            config.max_output_tokens,
        )));
    }
    if !config.openai_api_key.trim().is_empty() {
        chain.push(Arc::new(OpenAiProvider::new(
            config.openai_api_key.trim(),
            &config.gpt_model,
            config.temperature,
            config.max_output_tokens,
        )));
    }
    if !config.gemini_api_key.trim().is_empty() {
        chain.push(Arc::new(GeminiProvider::new(
            config.gemini_api_key.trim(),
            &config.gemini_model,
            config.temperature,
            config.max_output_tokens,
        )));
    }

    if chain.is_empty() {
        return Err(ConfigError::Validation(
            "no provider API key configured; set at least one of \
             COHERE_API_KEY, OPENAI_API_KEY or GEMINI_API_KEY"
                .to_string(),
        ));
    }

    tracing::info!(
        providers = ?chain.iter().map(|p| p.name()).collect::<Vec<_>>(),
        "provider chain assembled"
    );
    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_keys_is_a_config_error() {
        let config = Config::default();
        assert!(build_chain(&config).is_err());
    }

    #[test]
    fn chain_follows_fallback_order() {
        let config = Config {
            gemini_api_key: "g".to_string(),
            cohere_api_key: "c".to_string(),
            ..Config::default()
        };
        let chain = build_chain(&config).unwrap();
        let names: Vec<_> = chain.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["cohere", "gemini"]);
    }

    #[test]
    fn whitespace_keys_do_not_count() {
        let config = Config {
            openai_api_key: "   ".to_string(),
            gemini_api_key: "g".to_string(),
            ..Config::default()
        };
        let chain = build_chain(&config).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].name(), "gemini");
    }
}
