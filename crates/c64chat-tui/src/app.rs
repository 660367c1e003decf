use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use c64chat_core::bridge::{Bridge, BridgeCommand, TurnOutcome};
use c64chat_core::error::BusError;
use c64chat_core::protocol::SendReport;
use c64chat_core::{
    AiClient, Channel, Config, DeviceTerminal, MailboxEngine, MailboxLayout, Provider, SharedMemory,
    Submission, Timing,
};

/// The simulator: a device terminal and an in-process bridge sharing one
/// memory image.
pub struct App {
    pub device: DeviceTerminal<SharedMemory>,
    pub memory: SharedMemory,
    pub layout: MailboxLayout,
    pub provider: Provider,
    pub model: String,
    pub should_quit: bool,
    /// Outbound send in progress; the device blocks new input while it runs.
    pub send_task: Option<JoinHandle<Result<SendReport, BusError>>>,
    /// Summary of the last turn the bridge handled, for the footer.
    pub last_outcome: Option<String>,
    bridge_commands: mpsc::Sender<BridgeCommand>,
    bridge_task: Option<JoinHandle<Result<(), BusError>>>,
    outcomes: mpsc::UnboundedReceiver<TurnOutcome>,
}

impl App {
    pub fn new(config: &Config, client: AiClient) -> Result<Self> {
        let memory = SharedMemory::new();
        let layout = config.layout;
        let provider = client.provider();

        let (outcome_tx, outcomes) = mpsc::unbounded_channel();
        let engine = MailboxEngine::new(memory.clone(), layout, Timing::default())?;
        let bridge = Bridge::new(engine, client, config.system_prompt())
            .with_poll_interval(config.poll_interval())
            .with_outcomes(outcome_tx);
        let (bridge_commands, rx) = mpsc::channel(8);
        let bridge_task = tokio::spawn(bridge.run(rx));

        let engine = MailboxEngine::new(memory.clone(), layout, Timing::default())?;
        Ok(Self {
            device: DeviceTerminal::new(engine),
            memory,
            layout,
            provider,
            model: config.model(),
            should_quit: false,
            send_task: None,
            last_outcome: None,
            bridge_commands,
            bridge_task: Some(bridge_task),
            outcomes,
        })
    }

    pub fn is_sending(&self) -> bool {
        self.send_task.is_some()
    }

    /// Submit the input line. Forwarded text goes out on a background task so
    /// the screen keeps updating while the host drains the chunks.
    pub fn submit(&mut self) -> Result<()> {
        if self.is_sending() {
            return Ok(());
        }
        if let Submission::Forward(text) = self.device.submit() {
            let mut engine = MailboxEngine::new(self.memory.clone(), self.layout, Timing::default())?;
            self.send_task = Some(tokio::spawn(async move {
                engine.send_chunked(Channel::Outbound, &text).await
            }));
        }
        Ok(())
    }

    /// One pass of the device main loop.
    pub async fn tick(&mut self) {
        if self.send_task.as_ref().is_some_and(|task| task.is_finished()) {
            if let Some(task) = self.send_task.take() {
                match task.await {
                    Ok(Ok(report)) => self.device.mark_sent(report),
                    Ok(Err(err)) => self.device.mark_send_failed(&err),
                    Err(err) => error!(error = %err, "send task failed"),
                }
            }
        }

        if let Err(err) = self.device.service() {
            error!(error = %err, "device poll failed");
        }

        while let Ok(outcome) = self.outcomes.try_recv() {
            self.last_outcome = Some(describe(&outcome));
        }

        self.device.redraw();
    }

    /// Stop the bridge and wait for it to finish.
    pub async fn shutdown(&mut self) {
        let _ = self.bridge_commands.send(BridgeCommand::Quit).await;
        if let Some(task) = self.bridge_task.take() {
            match task.await {
                Ok(Ok(())) => info!("simulator bridge stopped"),
                Ok(Err(err)) => error!(error = %err, "simulator bridge failed"),
                Err(err) => error!(error = %err, "simulator bridge panicked"),
            }
        }
    }
}

fn describe(outcome: &TurnOutcome) -> String {
    match outcome {
        TurnOutcome::Answered { reasoning, answer, .. } => format!(
            "answered ({} chars{})",
            answer.chars().count(),
            if reasoning.is_some() { ", with reasoning" } else { "" }
        ),
        TurnOutcome::Failed { error, .. } => format!("failed: {}", error),
        TurnOutcome::Reset => "conversation reset".to_string(),
    }
}
