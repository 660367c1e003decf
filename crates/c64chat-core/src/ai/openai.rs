use reqwest::Client;
use serde::{Deserialize, Serialize};
use anyhow::{Result, anyhow};

use super::{split_reasoning, AiReply};
use crate::state::ChatMessage;

#[derive(Serialize)]
struct OpenAIMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

fn build_messages<'a>(system_prompt: &'a str, history: &'a [ChatMessage]) -> Vec<OpenAIMessage<'a>> {
    let system = (!system_prompt.is_empty()).then_some(OpenAIMessage {
        role: "system",
        content: system_prompt,
    });
    system
        .into_iter()
        .chain(history.iter().map(|m| OpenAIMessage {
            role: m.role.as_str(),
            content: &m.content,
        }))
        .collect()
}

#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    api_key: String,
}

impl OpenAIClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
        }
    }

    pub async fn send_turn(&self, model: &str, system_prompt: &str, history: &[ChatMessage]) -> Result<AiReply> {
        let request = OpenAIRequest {
            model,
            messages: build_messages(system_prompt, history),
        };

        let response = self.client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("OpenAI API error {}: {}", status, text));
        }

        let openai_response: OpenAIResponse = response.json().await?;
        let content = openai_response.choices.into_iter().next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        Ok(split_reasoning(&content))
    }

    pub fn list_models() -> Vec<String> {
        vec![
            "gpt-4o".to_string(),
            "gpt-4o-mini".to_string(),
            "gpt-4-turbo".to_string(),
            "gpt-3.5-turbo".to_string(),
        ]
    }
}
