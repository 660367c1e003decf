//! The device side of the chat: input line, local commands, history and
//! screen, talking to the host through a [`MailboxEngine`].

use tracing::{debug, warn};

use crate::charset::MAX_INPUT_CHARS;
use crate::commands::{interpret, DeviceSettings, Interpretation};
use crate::error::BusError;
use crate::history::{HistoryRenderer, Speaker};
use crate::mailbox::Channel;
use crate::memory::MemoryBus;
use crate::protocol::{LogicalMessage, MailboxEngine, SendReport};
use crate::screen::{TextScreen, COLUMNS, INPUT_ROWS, INPUT_TOP_ROW, STATUS_ROW, TITLE_ROW};

pub const TITLE: &str = "**** C64 AI CHAT ****";
const CURSOR: char = '_';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Ready,
    Sending,
    Waiting,
}

impl DeviceStatus {
    pub fn label(&self) -> &'static str {
        match self {
            DeviceStatus::Ready => "READY.",
            DeviceStatus::Sending => "SENDING...",
            DeviceStatus::Waiting => "WAITING FOR AI...",
        }
    }
}

/// What became of a submitted input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// The line was empty.
    Nothing,
    /// A local command ran; nothing goes to the host.
    Local,
    /// Send this text on the outbound channel.
    Forward(String),
}

pub struct DeviceTerminal<B> {
    engine: MailboxEngine<B>,
    history: HistoryRenderer,
    screen: TextScreen,
    settings: DeviceSettings,
    input: String,
    status: DeviceStatus,
}

impl<B: MemoryBus> DeviceTerminal<B> {
    pub fn new(engine: MailboxEngine<B>) -> Self {
        let mut history = HistoryRenderer::for_screen();
        history.append_message(Speaker::System, "READY.");
        Self {
            engine,
            history,
            screen: TextScreen::new(),
            settings: DeviceSettings::default(),
            input: String::new(),
            status: DeviceStatus::Ready,
        }
    }

    pub fn engine_mut(&mut self) -> &mut MailboxEngine<B> {
        &mut self.engine
    }

    pub fn history(&self) -> &HistoryRenderer {
        &self.history
    }

    pub fn screen(&self) -> &TextScreen {
        &self.screen
    }

    pub fn settings(&self) -> &DeviceSettings {
        &self.settings
    }

    pub fn status(&self) -> DeviceStatus {
        self.status
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    /// Type one character. Only printable ASCII is accepted and the line is
    /// capped at [`MAX_INPUT_CHARS`].
    pub fn push_char(&mut self, c: char) -> bool {
        if !(' '..='~').contains(&c) || self.input.chars().count() >= MAX_INPUT_CHARS {
            return false;
        }
        self.input.push(c);
        true
    }

    pub fn backspace(&mut self) {
        self.input.pop();
    }

    /// Finish the input line: run it through the command interpreter and
    /// echo it into the history.
    pub fn submit(&mut self) -> Submission {
        let line = std::mem::take(&mut self.input);
        let line = line.trim();
        if line.is_empty() {
            return Submission::Nothing;
        }

        self.history.append_message(Speaker::User, line);
        let submission = match interpret(line, &mut self.settings) {
            Interpretation::Handled { reply } => {
                self.history.append_message(Speaker::System, &reply);
                Submission::Local
            }
            Interpretation::Forward(text) => {
                self.status = DeviceStatus::Sending;
                Submission::Forward(text)
            }
        };
        self.redraw();
        submission
    }

    /// Send `text` to the host on this terminal's own engine.
    pub async fn send_outbound(&mut self, text: &str) -> Result<SendReport, BusError> {
        self.status = DeviceStatus::Sending;
        let report = self.engine.send_chunked(Channel::Outbound, text).await?;
        self.mark_sent(report);
        Ok(report)
    }

    /// Record that a forwarded line has been written to the outbound slot.
    pub fn mark_sent(&mut self, report: SendReport) {
        if report.unconfirmed > 0 {
            warn!(
                chunks = report.chunks,
                unconfirmed = report.unconfirmed,
                "host did not take every chunk"
            );
        }
        self.status = DeviceStatus::Waiting;
    }

    pub fn mark_send_failed(&mut self, error: &BusError) {
        self.history
            .append_message(Speaker::System, &format!("SEND FAILED: {}", error).to_uppercase());
        self.status = DeviceStatus::Ready;
        self.redraw();
    }

    /// Take any messages waiting on the reasoning and inbound channels.
    /// Returns how many were added to the history.
    ///
    /// Reasoning is always drained so the host is not held up, but only shown
    /// while the thinking display is on.
    pub fn service(&mut self) -> Result<usize, BusError> {
        let mut shown = 0;
        let status = self.status;

        if let Some(message) = self.engine.receive_message(Channel::Reasoning)? {
            if self.settings.show_reasoning {
                shown += self.show(Speaker::Reasoning, &message);
            } else {
                debug!(seq = message.seq, "reasoning hidden");
            }
        }

        if let Some(message) = self.engine.receive_message(Channel::Inbound)? {
            let speaker = if message.text.starts_with("ERROR:") {
                Speaker::System
            } else {
                Speaker::Ai
            };
            shown += self.show(speaker, &message);
            if !message.text.starts_with("STILL THINKING") {
                self.status = DeviceStatus::Ready;
            }
        }

        if shown > 0 || self.status != status {
            self.redraw();
        }
        Ok(shown)
    }

    fn show(&mut self, speaker: Speaker, message: &LogicalMessage) -> usize {
        let added = self.history.append_message(speaker, &message.text);
        usize::from(added > 0)
    }

    /// Repaint the whole screen from the current state.
    pub fn redraw(&mut self) {
        self.screen.border = self.settings.border_color;
        self.screen.clear();

        let text = self.screen.text;
        let title_column = COLUMNS.saturating_sub(TITLE.len()) / 2;
        self.screen.put_str(TITLE_ROW, title_column, TITLE, text);

        self.history.redraw(&mut self.screen);

        let mut status = self.status.label().to_string();
        if !self.settings.show_reasoning {
            status.push_str(" (THINKING HIDDEN)");
        }
        self.screen.put_str(STATUS_ROW, 0, &status, text);

        for (offset, line) in input_rows(&self.input).iter().enumerate() {
            self.screen.put_str(INPUT_TOP_ROW + offset, 0, line, text);
        }
    }
}

/// Split the input line plus cursor into screen rows, keeping the last rows
/// when it does not fit.
fn input_rows(input: &str) -> Vec<String> {
    let mut chars: Vec<char> = input.chars().collect();
    chars.push(CURSOR);
    let rows: Vec<String> = chars.chunks(COLUMNS).map(|row| row.iter().collect()).collect();
    let skip = rows.len().saturating_sub(INPUT_ROWS);
    rows.into_iter().skip(skip).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::{ChunkStatus, MailboxLayout, Slot};
    use crate::memory::SharedMemory;
    use crate::palette::C64Color;
    use crate::protocol::Timing;
    use crate::screen::{HISTORY_ROWS, HISTORY_TOP_ROW};

    fn terminal(mem: &SharedMemory) -> DeviceTerminal<SharedMemory> {
        let engine = MailboxEngine::new(mem.clone(), MailboxLayout::default(), Timing::default()).unwrap();
        DeviceTerminal::new(engine)
    }

    fn post(mem: &SharedMemory, channel: Channel, text: &str) {
        let mut bus = mem.clone();
        let slot = Slot::new(&MailboxLayout::default(), channel);
        slot.set_length(&mut bus, text.len() as u8).unwrap();
        slot.set_payload(&mut bus, text.as_bytes()).unwrap();
        slot.set_status(&mut bus, ChunkStatus::FinalChunk).unwrap();
    }

    fn last_line(device: &DeviceTerminal<SharedMemory>) -> String {
        device.history().lines().last().unwrap().visible()
    }

    fn type_line(device: &mut DeviceTerminal<SharedMemory>, line: &str) {
        for c in line.chars() {
            device.push_char(c);
        }
    }

    #[test]
    fn test_color_command_is_local() {
        let mem = SharedMemory::new();
        let mut device = terminal(&mem);
        type_line(&mut device, "/color red");

        assert_eq!(device.submit(), Submission::Local);
        assert_eq!(last_line(&device), "! BORDER COLOR SET TO RED");
        assert_eq!(device.settings().border_color, C64Color::Red);
        assert_eq!(device.status(), DeviceStatus::Ready);

        device.redraw();
        assert_eq!(device.screen().border, C64Color::Red);
    }

    #[test]
    fn test_unknown_color_replies_and_forwards_nothing() {
        let mem = SharedMemory::new();
        let mut device = terminal(&mem);
        type_line(&mut device, "/color mauve");

        assert_eq!(device.submit(), Submission::Local);
        assert_eq!(last_line(&device), "! UNKNOWN COLOR: MAUVE");
    }

    #[test]
    fn test_bare_color_command_stays_local() {
        let mem = SharedMemory::new();
        let mut device = terminal(&mem);
        type_line(&mut device, "/color");

        assert_eq!(device.submit(), Submission::Local);
        assert_eq!(last_line(&device), "! USAGE: /COLOR <NAME>");
        assert_eq!(device.status(), DeviceStatus::Ready);
    }

    #[test]
    fn test_chat_line_is_forwarded() {
        let mem = SharedMemory::new();
        let mut device = terminal(&mem);
        type_line(&mut device, "hello");

        assert_eq!(device.submit(), Submission::Forward("hello".to_string()));
        assert_eq!(last_line(&device), "> hello");
        assert_eq!(device.status(), DeviceStatus::Sending);
        assert!(device.input().is_empty());
    }

    #[test]
    fn test_blank_line_does_nothing() {
        let mem = SharedMemory::new();
        let mut device = terminal(&mem);
        type_line(&mut device, "   ");
        assert_eq!(device.submit(), Submission::Nothing);
    }

    #[test]
    fn test_input_is_capped() {
        let mem = SharedMemory::new();
        let mut device = terminal(&mem);
        type_line(&mut device, &"A".repeat(300));
        assert_eq!(device.input().len(), MAX_INPUT_CHARS);
        assert!(!device.push_char('\u{7f}'));
    }

    #[test]
    fn test_service_shows_answer_and_reasoning() {
        let mem = SharedMemory::new();
        let mut device = terminal(&mem);
        post(&mem, Channel::Reasoning, "USER WANTS A GREETING");
        post(&mem, Channel::Inbound, "HELLO, COMMODORE USER!");

        assert_eq!(device.service().unwrap(), 2);
        let lines: Vec<String> = device.history().lines().iter().map(|l| l.visible()).collect();
        assert_eq!(lines[HISTORY_ROWS - 2], "~ USER WANTS A GREETING");
        assert_eq!(lines[HISTORY_ROWS - 1], "* HELLO, COMMODORE USER!");
        assert_eq!(device.status(), DeviceStatus::Ready);
    }

    #[test]
    fn test_hidden_reasoning_is_still_drained() {
        let mem = SharedMemory::new();
        let mut device = terminal(&mem);
        type_line(&mut device, "/thinking");
        device.submit();

        post(&mem, Channel::Reasoning, "SECRET THOUGHTS");
        assert_eq!(device.service().unwrap(), 0);
        assert_eq!(last_line(&device), "! THINKING DISPLAY OFF");

        let layout = MailboxLayout::default();
        let length = mem.snapshot(layout.base(Channel::Reasoning), 1).unwrap();
        assert_eq!(length, vec![0]);
    }

    #[test]
    fn test_new_history_is_painted_without_explicit_redraw() {
        let mem = SharedMemory::new();
        let mut device = terminal(&mem);
        type_line(&mut device, "hello");
        device.submit();
        let bottom = HISTORY_TOP_ROW + HISTORY_ROWS - 1;
        assert!(device.screen().row_text(bottom).contains("> hello"));

        post(&mem, Channel::Inbound, "HI THERE");
        device.service().unwrap();
        assert!(device.screen().row_text(bottom).contains("* HI THERE"));
        assert!(device.screen().row_text(STATUS_ROW).starts_with("READY."));
    }

    #[test]
    fn test_error_message_uses_system_prefix() {
        let mem = SharedMemory::new();
        let mut device = terminal(&mem);
        post(&mem, Channel::Inbound, "ERROR: TIMED OUT");
        device.service().unwrap();
        assert_eq!(last_line(&device), "! ERROR: TIMED OUT");
    }

    #[test]
    fn test_redraw_lays_out_screen() {
        let mem = SharedMemory::new();
        let mut device = terminal(&mem);
        type_line(&mut device, "HI");
        device.redraw();

        let screen = device.screen();
        assert!(screen.row_text(TITLE_ROW).contains(TITLE));
        assert!(screen.row_text(HISTORY_TOP_ROW + HISTORY_ROWS - 1).contains("! READY."));
        assert!(screen.row_text(STATUS_ROW).starts_with("READY."));
        assert!(screen.row_text(INPUT_TOP_ROW).starts_with("HI_"));
    }

    #[test]
    fn test_long_input_shows_its_tail() {
        let rows = input_rows(&"X".repeat(MAX_INPUT_CHARS));
        assert_eq!(rows.len(), INPUT_ROWS);
        assert!(rows.last().unwrap().ends_with("X_"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_outbound_writes_chunks() {
        let mem = SharedMemory::new();
        let mut device = terminal(&mem);
        let report = device.send_outbound("HELLO").await.unwrap();

        assert_eq!(report.chunks, 1);
        // Nobody drained it.
        assert_eq!(report.unconfirmed, 1);
        assert_eq!(device.status(), DeviceStatus::Waiting);
        let layout = MailboxLayout::default();
        assert_eq!(mem.snapshot(layout.base(Channel::Outbound), 6).unwrap(), b"\x05HELLO".to_vec());
    }
}
