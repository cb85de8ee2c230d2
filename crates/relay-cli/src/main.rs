//! Relay CLI - talk to a streaming assistant backend from the terminal
//!
//! Uses the same session client and event dispatcher an editor integration
//! would, so it doubles as a manual test harness for backends.

mod prompt;
mod render;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use console::style;
use futures::StreamExt;
use relay_core::{
    BackendConfig, ConfigManager, ConnectionState, ContextItem, Event, EventDispatcher,
    SendMessageRequest, SessionClient,
};
use tracing_subscriber::EnvFilter;

use prompt::{Input, Prompt};
use render::{print_event, ConsoleListener};

#[derive(Parser)]
#[command(name = "relay")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Talk to a streaming assistant backend over stdio", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to <config dir>/relay/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend executable, overriding the config file
    #[arg(long = "command", global = true)]
    backend_command: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one message and print the response
    Send {
        /// Message text
        text: String,

        /// Session to send the message in
        #[arg(long, default_value = "cli")]
        session: String,

        /// Attach a file as context (repeatable)
        #[arg(long = "file")]
        files: Vec<PathBuf>,
    },

    /// Interactive chat mode
    Chat {
        /// Session to chat in
        #[arg(long, default_value = "cli")]
        session: String,
    },

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path.clone())?,
        None => ConfigManager::new()?,
    };

    init_logging(cli.verbose, &config_manager.config().general.log_level);

    let mut backend = config_manager.config().backend.clone();
    if let Some(command) = cli.backend_command {
        backend.command = command;
    }
    let show_tool_calls = config_manager.config().general.show_tool_calls;

    match cli.command {
        Commands::Send {
            text,
            session,
            files,
        } => run_send(backend, show_tool_calls, &session, &text, &files).await,
        Commands::Chat { session } => run_chat(backend, show_tool_calls, &session).await,
        Commands::Config => show_config(&config_manager, &backend),
    }
}

/// RUST_LOG wins; otherwise the config level, or debug output for relay with --verbose.
/// Logs go to stderr so they never mix with streamed output.
fn init_logging(verbose: bool, log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("info,relay_core=debug")
        } else {
            EnvFilter::new(log_level)
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn connect(client: &SessionClient) -> anyhow::Result<()> {
    let spinner = indicatif::ProgressBar::new_spinner();
    spinner.set_style(
        indicatif::ProgressStyle::default_spinner().template("{spinner:.blue} {msg}")?,
    );
    spinner.set_message(format!(
        "Starting {}...",
        client.supervisor().config().command
    ));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = client.connect().await;
    spinner.finish_and_clear();

    result.context("Could not start the backend")
}

async fn run_send(
    backend: BackendConfig,
    show_tool_calls: bool,
    session_id: &str,
    text: &str,
    files: &[PathBuf],
) -> anyhow::Result<()> {
    let mut request = SendMessageRequest::new(session_id, text);
    for path in files {
        request = request.with_context(file_context(path)?)?;
    }

    let client = SessionClient::new(backend);
    connect(&client).await?;

    let mut events = client.send_message(request).await?;
    let listener = ConsoleListener::new(show_tool_calls);
    let mut cancelled = false;
    let mut failed = false;

    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(event) => {
                    failed |= matches!(event, Event::Error(_));
                    print_event(&listener, &event);
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                if cancelled {
                    break;
                }
                cancelled = true;
                eprintln!("{}", style("Cancelling... (Ctrl-C again to quit)").yellow());
                client.cancel(session_id).await;
            }
        }
    }

    client.disconnect().await;

    if failed {
        anyhow::bail!("Request failed");
    }
    Ok(())
}

async fn run_chat(
    backend: BackendConfig,
    show_tool_calls: bool,
    session_id: &str,
) -> anyhow::Result<()> {
    let dispatcher = EventDispatcher::new()?;
    dispatcher.subscribe(Arc::new(ConsoleListener::new(show_tool_calls)));

    let client = SessionClient::with_dispatcher(backend, dispatcher.clone());
    connect(&client).await?;

    println!(
        "{} {}",
        style("Connected to").dim(),
        style(&client.supervisor().config().command).cyan()
    );
    println!(
        "{}",
        style("Type a message, /exit to quit. Ctrl-C cancels a running response.").dim()
    );
    println!();

    let mut prompt = Prompt::spawn("> ".to_string())?;

    loop {
        let line = match prompt.read().await {
            Input::Line(line) => line,
            Input::Exit => break,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "/exit" | "/quit") {
            break;
        }

        if !client.is_connected() {
            if client.state() != ConnectionState::Closed {
                println!(
                    "{}",
                    style("Backend is restarting, try again in a moment").yellow()
                );
                continue;
            }
            if let Err(e) = connect(&client).await {
                println!("{}", style(format!("Error: {:#}", e)).red());
                continue;
            }
        }

        let mut pump = match client
            .dispatch(SendMessageRequest::new(session_id, line))
            .await
        {
            Ok(pump) => pump,
            Err(e) => {
                println!("{}", style(format!("Error: {}", e)).red());
                continue;
            }
        };

        let mut cancelled = false;
        loop {
            tokio::select! {
                result = &mut pump => {
                    if let Err(e) = result {
                        tracing::warn!("Event pump failed: {}", e);
                    }
                    break;
                }
                _ = tokio::signal::ctrl_c() => {
                    if cancelled {
                        pump.abort();
                        break;
                    }
                    cancelled = true;
                    client.cancel(session_id).await;
                }
            }
        }

        // Let the last events render before the next prompt
        dispatcher.flush().await;
    }

    client.disconnect().await;
    dispatcher.dispose();
    Ok(())
}

fn show_config(manager: &ConfigManager, backend: &BackendConfig) -> anyhow::Result<()> {
    println!("{}", style("Configuration:").bold());
    println!();
    println!("  Config file: {}", style(manager.path().display()).green());
    println!();

    let mut config = manager.config().clone();
    config.backend = backend.clone();
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn file_context(path: &Path) -> anyhow::Result<ContextItem> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    Ok(ContextItem::File {
        path: path.display().to_string(),
        content,
        language: language_for(path).to_string(),
    })
}

fn language_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();

    match extension {
        "rs" => "rust",
        "py" => "python",
        "ts" | "tsx" => "typescript",
        "js" | "jsx" => "javascript",
        "go" => "go",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "c" | "h" => "c",
        "cpp" | "cc" | "hpp" => "cpp",
        "md" => "markdown",
        "toml" => "toml",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        _ => "plaintext",
    }
}
