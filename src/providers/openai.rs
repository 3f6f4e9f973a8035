use super::traits::{ChatProvider, ProviderReply};
use crate::history::{Speaker, StoredMessage};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

pub struct OpenAiProvider {
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
    messages: Vec<Message<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: Option<u64>,
}

impl OpenAiProvider {
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

    fn build_messages<'a>(
        system_prompt: &'a str,
        history: &'a [StoredMessage],
        new_message: &'a str,
    ) -> Vec<Message<'a>> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        if !system_prompt.is_empty() {
            messages.push(Message {
                role: "system",
                content: system_prompt,
            });
        }
        for msg in history {
            messages.push(Message {
                role: match msg.speaker {
                    Speaker::User => "user",
                    Speaker::Assistant => "assistant",
                    Speaker::System => "system",
                },
                content: &msg.text,
            });
        }
        messages.push(Message {
            role: "user",
            content: new_message,
        });
        messages
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
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
            messages: Self::build_messages(system_prompt, history, new_message),
            temperature: self.temperature,
            max_tokens: self.max_output_tokens,
        };

        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", &self.cached_auth_header)
            .json(&request)
            .send()
            .await
            .context("openai request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read response body: {e}>"));
            anyhow::bail!("openai chat completion failed ({status}): {body}");
        }

        let parsed: ChatResponse = resp.json().await.context("openai response parse failed")?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|t| !t.trim().is_empty())
            .context("openai returned no text")?;

        Ok(ProviderReply {
            text,
            tokens_used: parsed.usage.and_then(|u| u.total_tokens),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_leads_and_new_message_trails() {
        let history = vec![
            StoredMessage::user("q1"),
            StoredMessage::assistant("a1"),
        ];
        let messages = OpenAiProvider::build_messages("prompt", &history, "q2");
        let roles: Vec<_> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(messages.last().unwrap().content, "q2");
    }

    #[test]
    fn empty_system_prompt_is_omitted() {
        let messages = OpenAiProvider::build_messages("", &[], "hi");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");
    }
}
