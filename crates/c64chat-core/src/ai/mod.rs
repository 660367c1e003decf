pub mod claude;
pub mod llamacpp;
pub mod ollama;
pub mod openai;

pub use claude::ClaudeClient;
pub use llamacpp::LlamaCppClient;
pub use ollama::OllamaClient;
pub use openai::OpenAIClient;

use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{anyhow, Result};
use regex::Regex;
use tracing::warn;

use crate::config::Config;
use crate::provider::Provider;
use crate::state::ChatMessage;

/// A provider's answer, with the model's reasoning split off when it has any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AiReply {
    pub reasoning: Option<String>,
    pub answer: String,
}

impl AiReply {
    pub fn answer(answer: impl Into<String>) -> Self {
        Self {
            reasoning: None,
            answer: answer.into(),
        }
    }
}

/// Anything that can answer the next turn of a conversation.
///
/// `history` is the whole conversation, oldest first, ending with the user
/// turn to answer.
pub trait ChatBackend: Send + Sync {
    fn send_turn(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
    ) -> impl Future<Output = Result<AiReply>> + Send;
}

fn think_regex() -> &'static Regex {
    static THINK: OnceLock<Regex> = OnceLock::new();
    THINK.get_or_init(|| {
        Regex::new(r"(?s)<think>(.*?)(?:</think>|$)").expect("think regex must compile")
    })
}

/// Split `<think>...</think>` sections out of a plain-text answer.
///
/// Reasoning models served through llama.cpp often omit the opening tag, so
/// text before a lone `</think>` counts as reasoning too.
pub fn split_reasoning(text: &str) -> AiReply {
    let mut reasoning = Vec::new();
    let mut rest = text.to_string();

    if !rest.contains("<think>") {
        if let Some((before, after)) = rest.split_once("</think>") {
            reasoning.push(before.trim().to_string());
            rest = after.to_string();
        }
    }

    for caps in think_regex().captures_iter(&rest) {
        if let Some(m) = caps.get(1) {
            reasoning.push(m.as_str().trim().to_string());
        }
    }
    let answer = think_regex().replace_all(&rest, "").trim().to_string();

    let reasoning: Vec<String> = reasoning.into_iter().filter(|r| !r.is_empty()).collect();
    AiReply {
        reasoning: (!reasoning.is_empty()).then(|| reasoning.join(" ")),
        answer,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
        }
    }
}

/// Outcome of one failed request attempt.
#[derive(Debug)]
pub(crate) enum RequestError {
    /// Worth retrying (rate limit, overload, unavailable).
    Transient(anyhow::Error),
    Fatal(anyhow::Error),
}

/// Run `attempt` until it succeeds, fails fatally, or runs out of retries.
/// The delay doubles after every transient failure.
pub(crate) async fn with_retry<T, F, Fut>(policy: RetryPolicy, provider: &str, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, RequestError>>,
{
    let mut delay = policy.initial_delay;
    let mut retries = 0;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(RequestError::Fatal(err)) => return Err(err),
            Err(RequestError::Transient(err)) => {
                if retries >= policy.max_retries {
                    return Err(err.context(format!("{} gave up after {} retries", provider, retries)));
                }
                retries += 1;
                warn!(
                    provider,
                    retry = retries,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying request"
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }
    }
}

/// A configured provider client plus the model to ask.
#[derive(Clone)]
pub enum AiClient {
    Claude(ClaudeClient, String),
    OpenAI(OpenAIClient, String),
    Ollama(OllamaClient, String),
    LlamaCpp(LlamaCppClient),
}

impl AiClient {
    pub fn from_config(config: &Config) -> Result<Self> {
        let provider = config.provider()?;
        let model = config.model();
        let client = match provider {
            Provider::Claude => {
                let key = config
                    .claude_api_key()
                    .ok_or_else(|| anyhow!("No Claude API key: set ANTHROPIC_API_KEY or claude_api_key in the config"))?;
                AiClient::Claude(ClaudeClient::new(&key).with_thinking(config.claude_thinking), model)
            }
            Provider::OpenAI => {
                let key = config
                    .openai_api_key()
                    .ok_or_else(|| anyhow!("No OpenAI API key: set OPENAI_API_KEY or openai_api_key in the config"))?;
                AiClient::OpenAI(OpenAIClient::new(&key), model)
            }
            Provider::Ollama => AiClient::Ollama(OllamaClient::new(&config.ollama_url), model),
            Provider::LlamaCpp => AiClient::LlamaCpp(LlamaCppClient::new(&config.llamacpp_url)),
        };
        Ok(client)
    }

    pub fn provider(&self) -> Provider {
        match self {
            AiClient::Claude(..) => Provider::Claude,
            AiClient::OpenAI(..) => Provider::OpenAI,
            AiClient::Ollama(..) => Provider::Ollama,
            AiClient::LlamaCpp(_) => Provider::LlamaCpp,
        }
    }

    pub async fn list_models(&self) -> Result<Vec<String>> {
        match self {
            AiClient::Claude(..) => Ok(ClaudeClient::list_models()),
            AiClient::OpenAI(..) => Ok(OpenAIClient::list_models()),
            AiClient::Ollama(client, _) => client.list_models().await,
            AiClient::LlamaCpp(client) => client.list_models().await,
        }
    }
}

impl ChatBackend for AiClient {
    async fn send_turn(&self, system_prompt: &str, history: &[ChatMessage]) -> Result<AiReply> {
        match self {
            AiClient::Claude(client, model) => client.send_turn(model, system_prompt, history).await,
            AiClient::OpenAI(client, model) => client.send_turn(model, system_prompt, history).await,
            AiClient::Ollama(client, model) => client.send_turn(model, system_prompt, history).await,
            AiClient::LlamaCpp(client) => client.send_turn(system_prompt, history).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_split_reasoning_extracts_think_block() {
        let reply = split_reasoning("<think>User says hi.</think>\nHELLO THERE!");
        assert_eq!(reply.reasoning.as_deref(), Some("User says hi."));
        assert_eq!(reply.answer, "HELLO THERE!");
    }

    #[test]
    fn test_split_reasoning_without_opening_tag() {
        let reply = split_reasoning("weighing options</think> READY.");
        assert_eq!(reply.reasoning.as_deref(), Some("weighing options"));
        assert_eq!(reply.answer, "READY.");
    }

    #[test]
    fn test_split_reasoning_plain_answer() {
        let reply = split_reasoning("  JUST AN ANSWER ");
        assert_eq!(reply, AiReply::answer("JUST AN ANSWER"));
    }

    #[test]
    fn test_split_reasoning_empty_think_is_none() {
        let reply = split_reasoning("<think>\n\n</think>OK");
        assert_eq!(reply.reasoning, None);
        assert_eq!(reply.answer, "OK");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_backs_off_then_succeeds() {
        let attempts = Arc::new(AtomicU32::new(0));
        let start = tokio::time::Instant::now();
        let counter = attempts.clone();
        let result = with_retry(RetryPolicy::default(), "test", move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(RequestError::Transient(anyhow!("overloaded")))
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        // 1s + 2s of backoff
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let result: Result<()> = with_retry(RetryPolicy::default(), "test", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(RequestError::Transient(anyhow!("429")))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_is_not_retried() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let result: Result<()> = with_retry(RetryPolicy::default(), "test", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(RequestError::Fatal(anyhow!("401")))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
