//! Host-side loop: take complete messages from the outbound slot, ask the AI
//! and write its answer (and reasoning, if any) back to the device.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::ai::ChatBackend;
use crate::charset::{
    sanitize, to_device_text, truncate_with_ellipsis, MAX_ANSWER_CHARS, MAX_ERROR_CHARS,
    MAX_REASONING_CHARS,
};
use crate::error::BusError;
use crate::mailbox::Channel;
use crate::memory::MemoryBus;
use crate::protocol::MailboxEngine;
use crate::state::{ChatMessage, Conversation};

pub const STILL_THINKING: &str = "STILL THINKING... PLEASE WAIT...";
pub const RESET_COMMAND: &str = "/reset";
pub const RESET_REPLY: &str = "CONVERSATION RESET.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Idle,
    Processing,
}

/// When to tell the device that an answer is taking a while.
#[derive(Debug, Clone, Copy)]
pub struct StillThinking {
    pub after: Duration,
    /// Only messages longer than this get the notice.
    pub min_chars: usize,
}

impl Default for StillThinking {
    fn default() -> Self {
        Self {
            after: Duration::from_secs(5),
            min_chars: 50,
        }
    }
}

/// Result of handling one user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Answered {
        prompt: String,
        reasoning: Option<String>,
        answer: String,
    },
    Failed {
        prompt: String,
        error: String,
    },
    Reset,
}

/// Requests from the host console.
#[derive(Debug)]
pub enum BridgeCommand {
    /// Handle a line typed on the host as if the device had sent it.
    Submit(String),
    Reset,
    /// Return the inbound and reasoning slots to idle.
    ClearInbound,
    /// Read the outbound slot directly, bypassing the protocol.
    ReadOutbound(oneshot::Sender<Result<Option<String>, BusError>>),
    Quit,
}

pub struct Bridge<B, C> {
    engine: MailboxEngine<B>,
    backend: C,
    conversation: Conversation,
    system_prompt: String,
    state: BridgeState,
    poll_interval: Duration,
    still_thinking: StillThinking,
    outcomes: Option<mpsc::UnboundedSender<TurnOutcome>>,
}

impl<B, C> Bridge<B, C>
where
    B: MemoryBus + Send,
    C: ChatBackend,
{
    pub fn new(engine: MailboxEngine<B>, backend: C, system_prompt: impl Into<String>) -> Self {
        Self {
            engine,
            backend,
            conversation: Conversation::new(),
            system_prompt: system_prompt.into(),
            state: BridgeState::Idle,
            poll_interval: Duration::from_millis(200),
            still_thinking: StillThinking::default(),
            outcomes: None,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_still_thinking(mut self, still_thinking: StillThinking) -> Self {
        self.still_thinking = still_thinking;
        self
    }

    /// Report every handled message on `tx`.
    pub fn with_outcomes(mut self, tx: mpsc::UnboundedSender<TurnOutcome>) -> Self {
        self.outcomes = Some(tx);
        self
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn engine_mut(&mut self) -> &mut MailboxEngine<B> {
        &mut self.engine
    }

    /// Clear length and status of every slot so stale data from a previous
    /// session is not taken as a new message.
    pub fn start(&mut self) -> Result<(), BusError> {
        self.engine.clear_all()?;
        self.state = BridgeState::Idle;
        info!(layout = ?self.engine.layout(), "bridge started, all slots cleared");
        Ok(())
    }

    /// Poll the outbound slot once and handle a completed message.
    pub async fn tick(&mut self) -> Result<Option<TurnOutcome>, BusError> {
        let Some(message) = self.engine.receive_message(Channel::Outbound)? else {
            return Ok(None);
        };

        // The engine hands out each sequence number once, so no message is
        // processed twice.
        debug!(seq = message.seq, chunks = message.chunks, "outbound message complete");
        if message.truncated {
            warn!(seq = message.seq, chunks = message.chunks, "processing truncated message");
        }
        self.process_message(&message.text).await
    }

    /// Handle one user message: ask the AI and write the reply to the device.
    pub async fn process_message(&mut self, text: &str) -> Result<Option<TurnOutcome>, BusError> {
        let text = sanitize(text);
        if text.is_empty() {
            return Ok(None);
        }

        if text == RESET_COMMAND {
            self.conversation.reset();
            info!("conversation reset from device");
            self.engine.send_chunked(Channel::Inbound, RESET_REPLY).await?;
            return Ok(Some(self.report(TurnOutcome::Reset)));
        }

        self.state = BridgeState::Processing;
        info!(chars = text.chars().count(), "asking AI");
        self.conversation.push(ChatMessage::user(text.clone()));

        let result = self.ask(&text).await;
        let outcome = match result {
            Ok(reply) => self.deliver(text, reply.reasoning, reply.answer).await,
            Err(err) => {
                self.conversation.pop_unanswered();
                error!(error = %err, "AI request failed");
                let message = truncate_with_ellipsis(
                    &to_device_text(&format!("ERROR: {:#}", err), usize::MAX),
                    MAX_ERROR_CHARS,
                );
                self.engine.send_chunked(Channel::Inbound, &message).await.map(|_| {
                    TurnOutcome::Failed {
                        prompt: text,
                        error: format!("{:#}", err),
                    }
                })
            }
        };
        self.state = BridgeState::Idle;
        outcome.map(|o| Some(self.report(o)))
    }

    /// Call the backend, sending the "still thinking" notice once if a long
    /// message takes a while.
    async fn ask(&mut self, text: &str) -> anyhow::Result<crate::ai::AiReply> {
        let call = self
            .backend
            .send_turn(&self.system_prompt, self.conversation.turns());
        tokio::pin!(call);

        if text.chars().count() <= self.still_thinking.min_chars {
            return call.await;
        }

        tokio::select! {
            reply = &mut call => reply,
            _ = tokio::time::sleep(self.still_thinking.after) => {
                debug!("AI is slow, sending still-thinking notice");
                if let Err(err) = self.engine.send_chunked(Channel::Inbound, STILL_THINKING).await {
                    warn!(error = %err, "could not send still-thinking notice");
                }
                call.await
            }
        }
    }

    async fn deliver(
        &mut self,
        prompt: String,
        reasoning: Option<String>,
        answer: String,
    ) -> Result<TurnOutcome, BusError> {
        let device_answer = to_device_text(&answer, MAX_ANSWER_CHARS);
        if device_answer.is_empty() {
            self.conversation.pop_unanswered();
            warn!("AI returned an empty answer");
            self.engine
                .send_chunked(Channel::Inbound, "ERROR: EMPTY RESPONSE FROM AI")
                .await?;
            return Ok(TurnOutcome::Failed {
                prompt,
                error: "empty response".to_string(),
            });
        }

        let device_reasoning = reasoning
            .as_deref()
            .map(|r| truncate_with_ellipsis(&to_device_text(r, usize::MAX), MAX_REASONING_CHARS))
            .filter(|r| !r.is_empty());
        if let Err(err) = self.write_reply(device_reasoning.as_deref(), &device_answer).await {
            // The device never got the answer.
            self.conversation.pop_unanswered();
            return Err(err);
        }

        self.conversation.push(ChatMessage::assistant(answer.trim()));
        info!(
            answer_chars = device_answer.chars().count(),
            reasoning = device_reasoning.is_some(),
            turns = self.conversation.len(),
            "answer delivered"
        );
        Ok(TurnOutcome::Answered {
            prompt,
            reasoning: device_reasoning,
            answer: device_answer,
        })
    }

    async fn write_reply(&mut self, reasoning: Option<&str>, answer: &str) -> Result<(), BusError> {
        if let Some(reasoning) = reasoning {
            self.engine.send_chunked(Channel::Reasoning, reasoning).await?;
        }
        self.engine.send_chunked(Channel::Inbound, answer).await?;
        Ok(())
    }

    fn report(&self, outcome: TurnOutcome) -> TurnOutcome {
        if let Some(tx) = &self.outcomes {
            let _ = tx.send(outcome.clone());
        }
        outcome
    }

    /// Run until [`BridgeCommand::Quit`] arrives or the command sender is
    /// dropped. Transport errors are logged and polling carries on.
    pub async fn run(mut self, mut commands: mpsc::Receiver<BridgeCommand>) -> Result<(), BusError> {
        self.start()?;
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    if !self.handle_command(command).await {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.tick().await {
                        error!(error = %err, "mailbox poll failed");
                    }
                }
            }
        }

        info!("bridge stopped");
        Ok(())
    }

    async fn handle_command(&mut self, command: BridgeCommand) -> bool {
        match command {
            BridgeCommand::Submit(text) => {
                if let Err(err) = self.process_message(&text).await {
                    error!(error = %err, "failed to process console message");
                }
            }
            BridgeCommand::Reset => {
                self.conversation.reset();
                info!("conversation reset");
            }
            BridgeCommand::ClearInbound => {
                let cleared = self
                    .engine
                    .clear(Channel::Inbound)
                    .and_then(|_| self.engine.clear(Channel::Reasoning));
                match cleared {
                    Ok(()) => info!("inbound and reasoning slots cleared"),
                    Err(err) => error!(error = %err, "failed to clear slots"),
                }
            }
            BridgeCommand::ReadOutbound(reply) => {
                let _ = reply.send(self.engine.take_raw(Channel::Outbound));
            }
            BridgeCommand::Quit => return false,
        }
        true
    }
}
