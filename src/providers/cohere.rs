use super::traits::{ChatProvider, ProviderReply};
use crate::history::{Speaker, StoredMessage};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.cohere.com";

pub struct CohereProvider {
    /// Pre-computed `"Bearer <key>"` header value.
    cached_auth_header: String,
    client: Client,
    model: String,
    temperature: f64,
    max_output_tokens: u32,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    message: &'a str,
    chat_history: Vec<HistoryEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    preamble: Option<&'a str>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct HistoryEntry {
    role: &'static str,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    text: Option<String>,
    meta: Option<Meta>,
}

#[derive(Debug, Deserialize)]
struct Meta {
    billed_units: Option<BilledUnits>,
}

#[derive(Debug, Deserialize)]
struct BilledUnits {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
}

impl CohereProvider {
    pub fn new(api_key: &str, model: &str, temperature: f64, max_output_tokens: u32) -> Self {
        Self {
            cached_auth_header: format!("Bearer {api_key}"),
            client: super::factory::http_client(),
            model: model.to_string(),
            temperature,
            max_output_tokens,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn history_entries(history: &[StoredMessage]) -> Vec<HistoryEntry> {
        history
            .iter()
            .filter(|msg| !msg.text.trim().is_empty())
            .map(|msg| HistoryEntry {
                role: match msg.speaker {
                    Speaker::Assistant => "CHATBOT",
                    Speaker::User | Speaker::System => "USER",
                },
                message: msg.text.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl ChatProvider for CohereProvider {
    fn name(&self) -> &'static str {
        "cohere"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        system_prompt: &str,
        history: &[StoredMessage],
        new_message: &str,
    ) -> anyhow::Result<ProviderReply> {
        let request = ChatRequest {
            model: &self.model,
            message: new_message,
            chat_history: Self::history_entries(history),
            preamble: (!system_prompt.is_empty()).then_some(system_prompt),
            temperature: self.temperature,
            max_tokens: self.max_output_tokens,
        };

        let resp = self
            .client
            .post(format!("{}/v1/chat", self.base_url))
            .header("Authorization", &self.cached_auth_header)
            .json(&request)
            .send()
            .await
            .context("cohere request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read response body: {e}>"));
            anyhow::bail!("cohere chat failed ({status}): {body}");
        }

        let parsed: ChatResponse = resp.json().await.context("cohere response parse failed")?;
        let text = parsed
            .text
            .filter(|t| !t.trim().is_empty())
            .context("cohere returned no text")?;

        let tokens_used = parsed.meta.and_then(|m| m.billed_units).and_then(|units| {
            match (units.input_tokens, units.output_tokens) {
                (None, None) => None,
                (input, output) => Some(input.unwrap_or(0) + output.unwrap_or(0)),
            }
        });

        Ok(ProviderReply { text, tokens_used })
    }
}
