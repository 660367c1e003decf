use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use anyhow::{Result, anyhow};

use super::{with_retry, AiReply, RequestError, RetryPolicy};
use crate::state::ChatMessage;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const THINKING_BUDGET_TOKENS: u32 = 2000;
// Must exceed the thinking budget.
const MAX_TOKENS_WITH_THINKING: u32 = 4000;
const MAX_TOKENS: u32 = 1024;

#[derive(Serialize)]
struct ClaudeMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ThinkingConfig {
    #[serde(rename = "type")]
    kind: &'static str,
    budget_tokens: u32,
}

#[derive(Serialize)]
struct ClaudeRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<ThinkingConfig>,
    messages: Vec<ClaudeMessage<'a>>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClaudeContent {
    Text { text: String },
    Thinking { thinking: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeContent>,
}

impl ClaudeResponse {
    fn into_reply(self) -> AiReply {
        let mut reasoning = Vec::new();
        let mut answer = Vec::new();
        for block in self.content {
            match block {
                ClaudeContent::Text { text } => answer.push(text),
                ClaudeContent::Thinking { thinking } => reasoning.push(thinking),
                ClaudeContent::Other => {}
            }
        }
        let reasoning = reasoning.join(" ");
        AiReply {
            reasoning: (!reasoning.trim().is_empty()).then_some(reasoning),
            answer: answer.join(" "),
        }
    }
}

fn is_retryable(status: StatusCode, body: &str) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 529 || body.contains("overloaded")
}

#[derive(Clone)]
pub struct ClaudeClient {
    client: Client,
    api_key: String,
    thinking: bool,
    retry: RetryPolicy,
}

impl ClaudeClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            thinking: true,
            retry: RetryPolicy::default(),
        }
    }

    /// Ask for extended thinking blocks along with the answer.
    pub fn with_thinking(mut self, enabled: bool) -> Self {
        self.thinking = enabled;
        self
    }

    pub async fn send_turn(&self, model: &str, system_prompt: &str, history: &[ChatMessage]) -> Result<AiReply> {
        let request = ClaudeRequest {
            model,
            max_tokens: if self.thinking { MAX_TOKENS_WITH_THINKING } else { MAX_TOKENS },
            // Thinking requires a temperature of exactly 1.0.
            temperature: if self.thinking { 1.0 } else { 0.7 },
            system: (!system_prompt.is_empty()).then_some(system_prompt),
            thinking: self.thinking.then_some(ThinkingConfig {
                kind: "enabled",
                budget_tokens: THINKING_BUDGET_TOKENS,
            }),
            messages: history
                .iter()
                .map(|m| ClaudeMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
        };

        let request = &request;
        let claude_response: ClaudeResponse = with_retry(self.retry, "claude", || async move {
            let response = self.client
                .post(API_URL)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01")
                .header("content-type", "application/json")
                .json(request)
                .send()
                .await
                .map_err(|e| RequestError::Fatal(e.into()))?;

            if !response.status().is_success() {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                let err = anyhow!("Claude API error {}: {}", status, text);
                return Err(if is_retryable(status, &text) {
                    RequestError::Transient(err)
                } else {
                    RequestError::Fatal(err)
                });
            }

            response.json().await.map_err(|e| RequestError::Fatal(e.into()))
        })
        .await?;

        Ok(claude_response.into_reply())
    }

    pub fn list_models() -> Vec<String> {
        vec![
            "claude-3-7-sonnet-20250219".to_string(),
            "claude-sonnet-4-20250514".to_string(),
            "claude-opus-4-20250514".to_string(),
        ]
    }
}
