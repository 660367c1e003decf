use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use anyhow::{Result, anyhow};

use super::{split_reasoning, with_retry, AiReply, RequestError, RetryPolicy};
use crate::state::{ChatMessage, ChatRole};

const USER_TAG: &str = "<｜User｜>";
const ASSISTANT_TAG: &str = "<｜Assistant｜>";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    n_predict: i32,
    temperature: f32,
    min_p: f32,
    stream: bool,
    stop: [&'static str; 2],
}

#[derive(Deserialize)]
struct CompletionResponse {
    content: String,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Deserialize)]
struct ModelsResponse {
    data: Vec<ModelEntry>,
}

/// Render the conversation in the DeepSeek chat template llama.cpp expects.
fn format_prompt(system_prompt: &str, history: &[ChatMessage]) -> String {
    let mut prompt = String::new();
    if !system_prompt.is_empty() {
        prompt.push_str(system_prompt);
        prompt.push('\n');
    }
    for message in history {
        let tag = match message.role {
            ChatRole::User => USER_TAG,
            ChatRole::Assistant => ASSISTANT_TAG,
        };
        prompt.push_str(tag);
        prompt.push_str(&message.content);
    }
    prompt.push_str(ASSISTANT_TAG);
    prompt
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE
}

/// Client for a local llama.cpp server. The server runs a single model, so
/// no model name is sent.
#[derive(Clone)]
pub struct LlamaCppClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl LlamaCppClient {
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub async fn send_turn(&self, system_prompt: &str, history: &[ChatMessage]) -> Result<AiReply> {
        let prompt = format_prompt(system_prompt, history);
        let request = CompletionRequest {
            prompt: &prompt,
            n_predict: -1,
            temperature: 0.5,
            min_p: 0.2,
            stream: false,
            stop: ["</s>", USER_TAG],
        };
        let url = format!("{}/completion", self.base_url);

        let (client, url, request) = (&self.client, &url, &request);
        let completion: CompletionResponse = with_retry(self.retry, "llama.cpp", || async move {
            // Connection failures are retried too; the server may still be loading.
            let response = client
                .post(url)
                .json(request)
                .send()
                .await
                .map_err(|e| RequestError::Transient(e.into()))?;

            if !response.status().is_success() {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                let err = anyhow!("llama.cpp API error {}: {}", status, text);
                return Err(if is_retryable(status) {
                    RequestError::Transient(err)
                } else {
                    RequestError::Fatal(err)
                });
            }

            response.json().await.map_err(|e| RequestError::Fatal(e.into()))
        })
        .await?;

        Ok(split_reasoning(&completion.content))
    }

    /// Models the server exposes on its OpenAI-compatible endpoint.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/v1/models", self.base_url);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to list models: {}", response.status()));
        }

        let models: ModelsResponse = response.json().await?;
        Ok(models.data.into_iter().map(|m| m.id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_uses_chat_template() {
        let history = [
            ChatMessage::user("hi"),
            ChatMessage::assistant("HELLO"),
            ChatMessage::user("what is a sid chip"),
        ];
        let prompt = format_prompt("", &history);
        assert_eq!(
            prompt,
            "<｜User｜>hi<｜Assistant｜>HELLO<｜User｜>what is a sid chip<｜Assistant｜>"
        );
    }

    #[test]
    fn test_prompt_leads_with_system_text() {
        let prompt = format_prompt("BE BRIEF", &[ChatMessage::user("hi")]);
        assert!(prompt.starts_with("BE BRIEF\n<｜User｜>hi"));
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable(StatusCode::BAD_REQUEST));
    }
}
