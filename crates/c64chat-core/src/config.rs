use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result, anyhow};

use crate::mailbox::MailboxLayout;
use crate::provider::Provider;
use crate::vice;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are talking to a user on a Commodore 64 computer from the 1980s. \
The C64 has extremely limited display capabilities. You can mention how neat it is, but you don't need to \
pretend to be a C64, the user is on one. VERY IMPORTANT: Keep ALL responses under 200 characters total. \
Use extremely concise language, telegram style. The user reads your answer on a 40-column display. \
Only use standard ASCII characters: no Unicode, emojis or special symbols. Do not use line breaks or \
paragraph formatting.";

pub const ANTHROPIC_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub provider: Option<String>,
    pub default_model: Option<String>,
    pub claude_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    /// Request extended thinking from Claude.
    pub claude_thinking: bool,
    pub ollama_url: String,
    pub llamacpp_url: String,
    pub vice_host: String,
    pub vice_port: u16,
    pub system_prompt: Option<String>,
    /// How often the bridge looks at the outbound slot.
    pub poll_interval_ms: u64,
    pub layout: MailboxLayout,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            provider: Some("claude".to_string()),
            default_model: None,
            claude_api_key: None,
            openai_api_key: None,
            claude_thinking: true,
            ollama_url: "http://localhost:11434".to_string(),
            llamacpp_url: "http://127.0.0.1:3000".to_string(),
            vice_host: "127.0.0.1".to_string(),
            vice_port: vice::DEFAULT_PORT,
            system_prompt: None,
            poll_interval_ms: 200,
            layout: MailboxLayout::default(),
        }
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    /// Load `path`, falling back to defaults when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config = serde_json::from_str(&config_content)
            .with_context(|| format!("parsing {}", path.display()))?;
        config.layout.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    pub fn provider(&self) -> Result<Provider> {
        let name = self.provider.as_deref().unwrap_or("claude");
        Provider::from_str(name).ok_or_else(|| anyhow!("Unknown provider '{}'", name))
    }

    pub fn model(&self) -> String {
        match &self.default_model {
            Some(model) => model.clone(),
            None => self
                .provider()
                .map(|p| p.default_model())
                .unwrap_or_default()
                .to_string(),
        }
    }

    /// Environment first, then the config file.
    pub fn claude_api_key(&self) -> Option<String> {
        key_from_env(ANTHROPIC_KEY_ENV).or_else(|| self.claude_api_key.clone())
    }

    pub fn openai_api_key(&self) -> Option<String> {
        key_from_env(OPENAI_KEY_ENV).or_else(|| self.openai_api_key.clone())
    }

    pub fn system_prompt(&self) -> &str {
        self.system_prompt.as_deref().unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("c64chat"))
    }

    pub fn get_config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }
}

fn key_from_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|k| !k.trim().is_empty())
}
