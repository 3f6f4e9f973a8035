use super::traits::{ChatProvider, ProviderReply};
use crate::history::{Speaker, StoredMessage};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiProvider {
    api_key: String,
    client: Client,
    /// Fully-qualified id, e.g. `models/gemini-2.5-flash`.
    model: String,
    temperature: f64,
    max_output_tokens: u32,
    base_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    parts: Option<Vec<ResponsePart>>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    total_token_count: Option<u64>,
}

impl GeminiProvider {
    pub fn new(api_key: &str, model: &str, temperature: f64, max_output_tokens: u32) -> Self {
        Self {
            api_key: api_key.to_string(),
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

    fn contents(history: &[StoredMessage], new_message: &str) -> Vec<Content> {
        let mut contents: Vec<Content> = history
            .iter()
            .map(|msg| Content {
                role: Some(match msg.speaker {
                    Speaker::Assistant => "model",
                    Speaker::User | Speaker::System => "user",
                }),
                parts: vec![Part {
                    text: msg.text.clone(),
                }],
            })
            .collect();
        contents.push(Content {
            role: Some("user"),
            parts: vec![Part {
                text: new_message.to_string(),
            }],
        });
        contents
    }
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
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
        let request = GenerateRequest {
            system_instruction: (!system_prompt.is_empty()).then(|| Content {
                role: None,
                parts: vec![Part {
                    text: system_prompt.to_string(),
                }],
            }),
            contents: Self::contents(history, new_message),
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        };

        let resp = self
            .client
            .post(format!(
                "{}/v1beta/{}:generateContent",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .context("gemini request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read response body: {e}>"));
            anyhow::bail!("gemini generateContent failed ({status}): {body}");
        }

        let parsed: GenerateResponse =
            resp.json().await.context("gemini response parse failed")?;
        let tokens_used = parsed
            .usage_metadata
            .and_then(|meta| meta.total_token_count);

        let text = parsed
            .candidates
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .and_then(|content| content.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|part| part.text)
            .collect::<Vec<_>>()
            .join("");
        let text = (!text.trim().is_empty())
            .then_some(text)
            .context("gemini returned no text")?;

        Ok(ProviderReply { text, tokens_used })
    }
}
