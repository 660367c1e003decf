use clap::{Parser, Subcommand};
use anyhow::Result;

mod app;
mod console;
mod handler;
mod logging;
mod tui;
mod ui;

use c64chat_core::{AiClient, Config, Provider};

#[derive(Parser, Debug)]
#[command(name = "c64chat")]
#[command(version, about = "Chat with AI models from a Commodore 64")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// AI provider: claude, openai, ollama or llamacpp
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Model to ask (defaults to the provider's default)
    #[arg(long, global = true)]
    model: Option<String>,

    /// VICE binary monitor host
    #[arg(long, global = true)]
    host: Option<String>,

    /// VICE binary monitor port
    #[arg(long, global = true)]
    port: Option<u16>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Bridge a running VICE emulator to the AI (default)
    Bridge,
    /// Run the 40x25 device simulator in the terminal
    Simulate,
    /// List models for the configured provider
    Models,
}

fn apply_overrides(config: &mut Config, cli: &Cli) -> Result<()> {
    if let Some(provider) = &cli.provider {
        let parsed = Provider::from_str(provider)
            .ok_or_else(|| anyhow::anyhow!("Unknown provider '{}'", provider))?;
        config.provider = Some(parsed.as_str().to_string());
        // A model picked for another provider makes no sense here.
        config.default_model = None;
    }
    if let Some(model) = &cli.model {
        config.default_model = Some(model.clone());
    }
    if let Some(host) = &cli.host {
        config.vice_host = host.clone();
    }
    if let Some(port) = cli.port {
        config.vice_port = port;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load().unwrap_or_else(|err| {
        eprintln!("Could not load config ({:#}), using defaults", err);
        Config::new()
    });
    apply_overrides(&mut config, &cli)?;

    match cli.command.unwrap_or(Commands::Bridge) {
        Commands::Bridge => {
            logging::init_stderr();
            let client = AiClient::from_config(&config)?;
            console::run_bridge(&config, client).await
        }
        Commands::Simulate => run_simulator(&config).await,
        Commands::Models => list_models(&config).await,
    }
}

async fn run_simulator(config: &Config) -> Result<()> {
    logging::init_file(&Config::config_dir()?.join("c64chat.log"))?;
    let client = AiClient::from_config(config)?;
    let mut app = app::App::new(config, client)?;

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let result = run_app(&mut terminal, &mut app).await;
    tui::restore()?;

    app.shutdown().await;
    result
}

async fn run_app(terminal: &mut tui::Tui, app: &mut app::App) -> Result<()> {
    let mut events = tui::EventHandler::new();
    app.device.redraw();

    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;
        if let Some(event) = events.next().await {
            handler::handle_event(app, event).await?;
        }
    }
    Ok(())
}

async fn list_models(config: &Config) -> Result<()> {
    let client = AiClient::from_config(config)?;
    let provider = client.provider();
    println!("Models for {}:", provider.display_name());
    for model in client.list_models().await? {
        let marker = if model == config.model() { "*" } else { " " };
        println!(" {} {}", marker, model);
    }
    Ok(())
}
