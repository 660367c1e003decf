//! Host-side conversation state
//!
//! The bridge keeps the turns of the current session here and sends all of
//! them to the AI provider on every request.

use serde::{Deserialize, Serialize};

/// Turns kept in the conversation.
pub const MAX_TURNS: usize = 10;

/// A chat message in the AI conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// Ordered turns of the current session, bounded to the most recent
/// [`MAX_TURNS`].
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    turns: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.turns.push(message);
        if self.turns.len() > MAX_TURNS {
            let excess = self.turns.len() - MAX_TURNS;
            self.turns.drain(..excess);
        }
        // Providers expect the history to open with a user turn.
        while self.turns.first().is_some_and(|m| m.role == ChatRole::Assistant) {
            self.turns.remove(0);
        }
    }

    /// Drop the last turn if it is an unanswered user turn.
    pub fn pop_unanswered(&mut self) -> Option<ChatMessage> {
        if self.turns.last().is_some_and(|m| m.role == ChatRole::User) {
            self.turns.pop()
        } else {
            None
        }
    }

    pub fn reset(&mut self) {
        self.turns.clear();
    }

    pub fn turns(&self) -> &[ChatMessage] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
