//! Widget Console - Terminal Host for the Chat Widget
//!
//! Mounts one widget session and renders it as a running transcript on
//! stdout. Logs go to stderr so they never interleave with the transcript.
//!
//! # Usage
//!
//! ```bash
//! # Socket URL from the config file or WIDGET_SOCKET_URL
//! WIDGET_TOKEN=... WIDGET_USER_ID=alice widget-console
//!
//! # Explicit endpoints
//! widget-console --socket-url wss://chat.example.com/ws \
//!     --history-url https://chat.example.com/history \
//!     --token "$TOKEN" --user-id alice
//!
//! # Verbose logging
//! RUST_LOG=widget_core=debug widget-console
//! ```
//!
//! # Commands
//!
//! - any text: send it
//! - `/older`: load older history
//! - `/quit`: destroy the widget and exit

mod input;
mod render;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use widget_core::config::{default_config_path, load_config_with};
use widget_core::{ConfigOverrides, InitConfig};

use input::InputCommand;
use render::Transcript;

/// Widget Console - chat with the widget backend from a terminal
#[derive(Parser, Debug)]
#[command(name = "widget-console")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "WIDGET_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// WebSocket endpoint (overrides config and WIDGET_SOCKET_URL)
    #[arg(long, value_name = "URL")]
    socket_url: Option<String>,

    /// History endpoint (overrides config and WIDGET_HISTORY_URL)
    #[arg(long, value_name = "URL")]
    history_url: Option<String>,

    /// Auth token sent on every connection
    #[arg(long, env = "WIDGET_TOKEN", hide_env_values = true)]
    token: String,

    /// User whose history is shown
    #[arg(short = 'u', long, env = "WIDGET_USER_ID")]
    user_id: String,
}

/// Initialize logging to stderr
fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new("widget_core=info,widget_console=info")
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();

    let mut overrides = ConfigOverrides::new();
    if let Some(url) = args.socket_url {
        overrides = overrides.with_socket_url(url);
    }
    if let Some(url) = args.history_url {
        overrides = overrides.with_history_url(url);
    }
    let config_path = args.config.or_else(default_config_path);
    let config = load_config_with(config_path, &overrides, |key| std::env::var(key).ok())
        .context("Failed to load widget configuration")?;

    let (handle, mut views) = widget_core::init(&config, InitConfig::new(args.token, args.user_id))
        .context("Failed to start widget")?;
    info!(session_id = %handle.id(), endpoint = %config.socket_url, "Widget console started");

    handle.open().context("Failed to open widget")?;

    let mut transcript = Transcript::new();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                match InputCommand::parse(&line) {
                    InputCommand::Send(text) => handle.send(text)?,
                    InputCommand::Older => handle.scroll_to_top(transcript.content_height())?,
                    InputCommand::Quit => break,
                    InputCommand::Unknown(command) => {
                        warn!(command, "Unknown command (try /older or /quit)");
                    }
                }
            }
            update = views.recv() => {
                let Some(update) = update else {
                    break;
                };
                let text = transcript.render(&update);
                if !text.is_empty() {
                    stdout.write_all(text.as_bytes()).await?;
                    stdout.flush().await?;
                }
            }
        }
    }

    handle.destroy().await;
    info!("Widget console stopped");
    Ok(())
}
