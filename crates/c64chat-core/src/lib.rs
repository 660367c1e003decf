pub mod ai;
pub mod bridge;
pub mod charset;
pub mod commands;
pub mod config;
pub mod device;
pub mod error;
pub mod history;
pub mod mailbox;
pub mod memory;
pub mod palette;
pub mod protocol;
pub mod provider;
pub mod screen;
pub mod state;
pub mod vice;

// Re-export main types for convenience
pub use ai::{AiClient, AiReply, ChatBackend, ClaudeClient, LlamaCppClient, OllamaClient, OpenAIClient};
pub use bridge::{Bridge, BridgeCommand, BridgeState, TurnOutcome};
pub use config::Config;
pub use device::{DeviceStatus, DeviceTerminal, Submission};
pub use error::{BusError, LayoutError};
pub use history::{HistoryRenderer, Speaker};
pub use mailbox::{Channel, ChunkStatus, MailboxLayout};
pub use memory::{MemoryBus, SharedMemory};
pub use palette::C64Color;
pub use protocol::{MailboxEngine, Timing};
pub use provider::Provider;
pub use screen::TextScreen;
pub use state::{ChatMessage, ChatRole, Conversation};
pub use vice::ViceMonitor;
