use reqwest::Client;
use serde::{Deserialize, Serialize};
use anyhow::{Result, anyhow};

use super::{split_reasoning, AiReply};
use crate::state::ChatMessage;

#[derive(Serialize)]
struct OllamaMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaResponseMessage {
    content: String,
    /// Set by reasoning models when thinking is returned separately.
    #[serde(default)]
    thinking: Option<String>,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

#[derive(Deserialize)]
struct OllamaModelsResponse {
    models: Vec<OllamaModel>,
}

impl OllamaChatResponse {
    fn into_reply(self) -> AiReply {
        let mut reply = split_reasoning(&self.message.content);
        if let Some(thinking) = self.message.thinking.filter(|t| !t.trim().is_empty()) {
            reply.reasoning = Some(match reply.reasoning {
                Some(inline) => format!("{} {}", thinking.trim(), inline),
                None => thinking.trim().to_string(),
            });
        }
        reply
    }
}

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn send_turn(&self, model: &str, system_prompt: &str, history: &[ChatMessage]) -> Result<AiReply> {
        let url = format!("{}/api/chat", self.base_url);

        let system = (!system_prompt.is_empty()).then_some(OllamaMessage {
            role: "system",
            content: system_prompt,
        });
        let request = OllamaChatRequest {
            model,
            messages: system
                .into_iter()
                .chain(history.iter().map(|m| OllamaMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                }))
                .collect(),
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Ollama request failed with status: {}. Make sure Ollama is running with: ollama serve",
                response.status()
            ));
        }

        let ollama_response: OllamaChatResponse = response.json().await?;
        Ok(ollama_response.into_reply())
    }

    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to list models: {}", response.status()));
        }

        let models_response: OllamaModelsResponse = response.json().await?;
        Ok(models_response
            .models
            .into_iter()
            .map(|model| model.name)
            .collect())
    }
}
