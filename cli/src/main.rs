use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use client::admission::Rejection;
use client::api::{self, ApiError};
use client::config::{ClientConfig, ConfigError};
use client::transport::TieredTransport;
use client::{ChatController, ConnectionState, Renderer, SendError, SendOutcome, Status};
use frames::ChatMessage;
use tokio::sync::mpsc;
use tokio::time::timeout;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned HTTP {0}")]
    HttpStatus(u16),
    #[error("history request failed: {0}")]
    Api(#[from] ApiError),
    #[error("invalid client configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("send failed: {0}")]
    Send(#[from] SendError),
    #[error("message rejected: {0}")]
    Rejected(Rejection),
    #[error("not connected to the relay")]
    NotConnected,
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "chat-cli", about = "Chat relay history, send and watch CLI")]
struct Cli {
    #[arg(long, env = "CHAT_BASE_URL", default_value = "http://127.0.0.1:3000")]
    base_url: String,

    /// Relay WebSocket URL. Derived from the base URL when omitted.
    #[arg(long, env = "CHAT_WS_URL")]
    ws_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check the relay's health endpoint.
    Ping,
    /// Print the relay's retained messages.
    History(HistoryArgs),
    /// Send one message and wait for the relay's echo.
    Send(SendArgs),
    /// Print messages and status changes until ctrl-c.
    Watch(WatchArgs),
}

#[derive(Args, Debug)]
struct HistoryArgs {
    /// Print raw JSON instead of one line per message.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Args, Debug)]
struct SendArgs {
    #[arg(long)]
    text: String,

    #[arg(long)]
    emoji: Option<String>,

    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,
}

#[derive(Args, Debug)]
struct WatchArgs {
    /// Stop after this many rendered messages.
    #[arg(long)]
    count: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Ping => run_ping(&cli.base_url).await,
        Command::History(args) => run_history(&cli.base_url, args).await,
        Command::Send(args) => {
            let ws_url = resolve_ws_url(&cli.base_url, cli.ws_url.as_deref())?;
            run_send(ws_url, args).await
        }
        Command::Watch(args) => {
            let ws_url = resolve_ws_url(&cli.base_url, cli.ws_url.as_deref())?;
            run_watch(ws_url, args).await
        }
    }
}

async fn run_ping(base_url: &str) -> Result<(), CliError> {
    let url = format!("{}/healthz", base_url.trim_end_matches('/'));
    let response = reqwest::get(url).await?;
    let status = response.status();
    if !status.is_success() {
        return Err(CliError::HttpStatus(status.as_u16()));
    }
    println!("ok");
    Ok(())
}

async fn run_history(base_url: &str, args: HistoryArgs) -> Result<(), CliError> {
    let messages = api::fetch_history(base_url).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
        return Ok(());
    }
    for message in &messages {
        println!("{}", format_message(message));
    }
    eprintln!("{} message(s)", messages.len());
    Ok(())
}

async fn run_send(ws_url: String, args: SendArgs) -> Result<(), CliError> {
    let deadline = Duration::from_millis(args.timeout_ms);
    let (controller, mut events) = start_controller(ws_url)?;
    wait_until_ready(&controller, deadline).await?;

    let outcome = controller.send_message(&args.text, args.emoji.as_deref()).await?;
    let result = match outcome {
        SendOutcome::Sent(message) => {
            wait_for_echo(&mut events, &message.id, deadline).await?;
            println!("{}", format_message(&message));
            Ok(())
        }
        SendOutcome::Local(message) => {
            println!("{} (static mode, not delivered)", format_message(&message));
            Ok(())
        }
        SendOutcome::Rejected(reason) => Err(CliError::Rejected(reason)),
        SendOutcome::NotConnected => Err(CliError::NotConnected),
    };
    controller.shutdown();
    result
}

async fn run_watch(ws_url: String, args: WatchArgs) -> Result<(), CliError> {
    let (controller, mut events) = start_controller(ws_url)?;
    let mut seen = 0_usize;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    Event::Message(message) => {
                        println!("{}", format_message(&message));
                        seen = seen.saturating_add(1);
                        if args.count.is_some_and(|limit| seen >= limit) {
                            break;
                        }
                    }
                    Event::Status(status) => eprintln!("-- {}", status.label()),
                }
            }
        }
    }

    controller.shutdown();
    Ok(())
}

// =============================================================================
// CONTROLLER PLUMBING
// =============================================================================

#[derive(Debug)]
enum Event {
    Message(ChatMessage),
    Status(Status),
}

/// Forwards renderer callbacks to the command loop.
struct ChannelRenderer {
    tx: mpsc::UnboundedSender<Event>,
}

impl Renderer for ChannelRenderer {
    fn on_message_rendered(&self, message: &ChatMessage) {
        let _ = self.tx.send(Event::Message(message.clone()));
    }

    fn on_status_changed(&self, status: Status) {
        let _ = self.tx.send(Event::Status(status));
    }
}

fn start_controller(ws_url: String) -> Result<(ChatController, mpsc::UnboundedReceiver<Event>), CliError> {
    let mut config = ClientConfig::from_env()?;
    config.relay_urls = vec![ws_url];
    let transport = TieredTransport::from_urls(config.relay_urls.clone());
    let (tx, rx) = mpsc::unbounded_channel();
    let controller = ChatController::start(config, transport, Arc::new(ChannelRenderer { tx }));
    Ok((controller, rx))
}

async fn wait_until_ready(controller: &ChatController, deadline: Duration) -> Result<(), CliError> {
    let mut state = controller.watch_state();
    timeout(
        deadline,
        state.wait_for(|s| matches!(s, ConnectionState::Connected | ConnectionState::StaticFallback)),
    )
    .await
    .map_err(|_| CliError::Timeout("relay connection"))?
    .map_err(|_| CliError::NotConnected)?;
    Ok(())
}

async fn wait_for_echo(
    events: &mut mpsc::UnboundedReceiver<Event>,
    id: &str,
    deadline: Duration,
) -> Result<(), CliError> {
    timeout(deadline, async {
        while let Some(event) = events.recv().await {
            if let Event::Message(message) = event {
                if message.id == id {
                    return Ok(());
                }
            }
        }
        Err(CliError::NotConnected)
    })
    .await
    .map_err(|_| CliError::Timeout("relay echo"))?
}

// =============================================================================
// FORMATTING
// =============================================================================

fn resolve_ws_url(base_url: &str, ws_url: Option<&str>) -> Result<String, CliError> {
    if let Some(url) = ws_url {
        return Ok(url.to_owned());
    }
    let base = base_url.trim_end_matches('/');
    if let Some(rest) = base.strip_prefix("http://") {
        return Ok(format!("ws://{rest}/ws"));
    }
    if let Some(rest) = base.strip_prefix("https://") {
        return Ok(format!("wss://{rest}/ws"));
    }

    Err(CliError::InvalidBaseUrl(base_url.to_owned()))
}

fn format_message(message: &ChatMessage) -> String {
    let marker = if message.filtered { " (filtered)" } else { "" };
    format!("[{}] {} {}{marker}", message.timestamp, message.emoji, message.text)
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
