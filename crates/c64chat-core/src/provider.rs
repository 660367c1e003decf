#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Claude,
    OpenAI,
    Ollama,
    LlamaCpp,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Claude => "claude",
            Provider::OpenAI => "openai",
            Provider::Ollama => "ollama",
            Provider::LlamaCpp => "llamacpp",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "claude" | "anthropic" => Some(Provider::Claude),
            "openai" => Some(Provider::OpenAI),
            "ollama" => Some(Provider::Ollama),
            "llamacpp" | "llama.cpp" | "llama" => Some(Provider::LlamaCpp),
            _ => None,
        }
    }

    pub fn all() -> Vec<Provider> {
        vec![
            Provider::Claude,
            Provider::OpenAI,
            Provider::Ollama,
            Provider::LlamaCpp,
        ]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Claude => "Claude (Anthropic)",
            Provider::OpenAI => "ChatGPT (OpenAI)",
            Provider::Ollama => "Ollama (Local)",
            Provider::LlamaCpp => "llama.cpp server (Local)",
        }
    }

    /// Model used when none is configured.
    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Claude => "claude-3-7-sonnet-20250219",
            Provider::OpenAI => "gpt-4o-mini",
            Provider::Ollama => "llama3.2",
            Provider::LlamaCpp => "default",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str_accepts_aliases() {
        assert_eq!(Provider::from_str("Claude"), Some(Provider::Claude));
        assert_eq!(Provider::from_str("llama.cpp"), Some(Provider::LlamaCpp));
        assert_eq!(Provider::from_str("gemini"), None);
    }

    #[test]
    fn test_as_str_round_trips() {
        for provider in Provider::all() {
            assert_eq!(Provider::from_str(provider.as_str()), Some(provider));
        }
    }
}
