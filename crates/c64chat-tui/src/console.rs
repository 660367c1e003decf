//! Bridge mode: serve a running emulator and accept commands on stdin.

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use c64chat_core::bridge::{Bridge, BridgeCommand, TurnOutcome};
use c64chat_core::{AiClient, Config, MailboxEngine, Timing, ViceMonitor};

pub const HELP: &str = "\
Commands:
  /help   show this help
  /read   read the outbound slot directly
  /clear  clear the inbound and reasoning slots
  /reset  start a new conversation
  /quit   stop the bridge
Anything else is sent to the AI as if typed on the C64.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Help,
    Read,
    Clear,
    Reset,
    Quit,
    Message(String),
    Empty,
}

pub fn parse_console_line(line: &str) -> ConsoleCommand {
    let line = line.trim();
    match line {
        "" => ConsoleCommand::Empty,
        "/help" => ConsoleCommand::Help,
        "/read" => ConsoleCommand::Read,
        "/clear" => ConsoleCommand::Clear,
        "/reset" => ConsoleCommand::Reset,
        "/quit" | "/exit" => ConsoleCommand::Quit,
        other => ConsoleCommand::Message(other.to_string()),
    }
}

fn print_outcome(outcome: &TurnOutcome) {
    match outcome {
        TurnOutcome::Answered { prompt, reasoning, answer } => {
            println!("C64: {}", prompt);
            if let Some(reasoning) = reasoning {
                println!("  (thinking) {}", reasoning);
            }
            println!("AI:  {}", answer);
        }
        TurnOutcome::Failed { prompt, error } => {
            println!("C64: {}", prompt);
            println!("ERROR: {}", error);
        }
        TurnOutcome::Reset => println!("Conversation reset."),
    }
}

pub async fn run_bridge(config: &Config, client: AiClient) -> Result<()> {
    let mut monitor = ViceMonitor::new(&config.vice_host, config.vice_port);
    monitor
        .ping()
        .with_context(|| format!("VICE monitor not reachable at {} (start VICE with -binarymonitor)", monitor.endpoint()))?;
    info!(endpoint = monitor.endpoint(), provider = %client.provider(), "connected to VICE");

    let (outcome_tx, mut outcomes) = mpsc::unbounded_channel();
    let engine = MailboxEngine::new(monitor, config.layout, Timing::default())?;
    let bridge = Bridge::new(engine, client, config.system_prompt())
        .with_poll_interval(config.poll_interval())
        .with_outcomes(outcome_tx);
    let (commands, rx) = mpsc::channel(8);
    let bridge_task = tokio::spawn(bridge.run(rx));

    tokio::spawn(async move {
        while let Some(outcome) = outcomes.recv().await {
            print_outcome(&outcome);
        }
    });

    println!("Bridge running. Type /help for commands.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match parse_console_line(&line) {
            ConsoleCommand::Empty => continue,
            ConsoleCommand::Help => {
                println!("{}", HELP);
                continue;
            }
            ConsoleCommand::Read => {
                let (tx, rx) = oneshot::channel();
                commands.send(BridgeCommand::ReadOutbound(tx)).await?;
                match rx.await? {
                    Ok(Some(text)) => println!("Outbound slot: {}", text),
                    Ok(None) => println!("Outbound slot is empty."),
                    Err(err) => warn!(error = %err, "could not read outbound slot"),
                }
                continue;
            }
            ConsoleCommand::Clear => BridgeCommand::ClearInbound,
            ConsoleCommand::Reset => {
                println!("Conversation reset.");
                BridgeCommand::Reset
            }
            ConsoleCommand::Quit => break,
            ConsoleCommand::Message(text) => BridgeCommand::Submit(text),
        };
        commands.send(command).await?;
    }

    commands.send(BridgeCommand::Quit).await?;
    bridge_task.await??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_console_commands() {
        assert_eq!(parse_console_line("/help"), ConsoleCommand::Help);
        assert_eq!(parse_console_line("  /read "), ConsoleCommand::Read);
        assert_eq!(parse_console_line("/clear"), ConsoleCommand::Clear);
        assert_eq!(parse_console_line("/reset"), ConsoleCommand::Reset);
        assert_eq!(parse_console_line("/exit"), ConsoleCommand::Quit);
        assert_eq!(parse_console_line(""), ConsoleCommand::Empty);
        assert_eq!(
            parse_console_line("what is a sprite?"),
            ConsoleCommand::Message("what is a sprite?".to_string())
        );
    }
}
