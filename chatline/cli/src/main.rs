//! Chatline - Streaming Chat Client
//!
//! Command-line front end for `chatline-core`: sends a message to the chat
//! backend and prints the reply as it streams in.
//!
//! # Usage
//!
//! ```bash
//! # Ask something in a new conversation
//! chatline --backend-url http://localhost:8080 send "Plan a weekend in Lisbon"
//!
//! # Continue an existing conversation with search grounding
//! chatline send --chat-id c-123 --grounding "What about restaurants?"
//!
//! # Browse history
//! chatline chats
//! chatline messages c-123
//!
//! # Backend status
//! chatline health
//!
//! # Verbose logging (goes to stderr)
//! RUST_LOG=debug chatline send "Hi"
//! ```
//!
//! # Signals
//!
//! - `SIGINT` (Ctrl-C) while streaming: stop the reply, keep what was shown

mod render;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use chatline_core::{
    default_config_path, load_config_from_path, ChatId, ChatSession, ConfigOverrides,
    CredentialProvider, NoCredential, SendOptions, StaticCredential, StreamOutcome,
};

use render::StreamPrinter;

/// Exit code used when the user stops a reply (128 + SIGINT)
const EXIT_STOPPED: u8 = 130;

/// Chatline - streaming chat from the terminal
#[derive(Parser, Debug)]
#[command(name = "chatline")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "CHATLINE_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Chat backend base URL (overrides config and environment)
    #[arg(long, value_name = "URL")]
    backend_url: Option<String>,

    /// Model to generate with
    #[arg(short = 'm', long)]
    model: Option<String>,

    /// Bearer token for the backend
    #[arg(long, env = "CHATLINE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// How often streamed text is flushed to the screen (milliseconds)
    #[arg(long, value_name = "MS")]
    flush_interval_ms: Option<u64>,

    /// Refuse to send without a token
    #[arg(long)]
    require_auth: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "CHATLINE_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a message and stream the reply
    Send {
        /// The message
        message: String,

        /// Continue this conversation instead of starting a new one
        #[arg(long, value_name = "ID")]
        chat_id: Option<String>,

        /// Ground the answer with web search
        #[arg(long)]
        grounding: bool,

        /// Attachment reference (repeatable)
        #[arg(long = "attach", value_name = "URL")]
        attachments: Vec<String>,
    },

    /// List conversations
    Chats {
        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a conversation's messages
    Messages {
        /// Conversation ID
        chat_id: String,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Check backend health
    Health,
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("chatline={level},chatline_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .init();
}

fn build_session(args: &Args) -> Result<ChatSession> {
    let config_path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(config_path).context("Failed to load configuration")?;

    let overrides = ConfigOverrides {
        backend_url: args.backend_url.clone(),
        model: args.model.clone(),
        flush_interval_ms: args.flush_interval_ms,
        require_auth: args.require_auth.then_some(true),
    };
    overrides
        .apply(&mut config)
        .context("Invalid command-line overrides")?;

    info!(
        backend = ?config.backend_url,
        model = %config.default_model,
        source = ?config.source(),
        "Configuration resolved"
    );

    let credentials: Arc<dyn CredentialProvider> = match &args.token {
        Some(token) => Arc::new(StaticCredential::new(token.clone())),
        None => Arc::new(NoCredential),
    };

    ChatSession::from_config(config, credentials).context("Failed to create chat client")
}

async fn send(session: &ChatSession, chat_id: Option<String>, options: SendOptions) -> Result<ExitCode> {
    if let Some(chat_id) = chat_id {
        session
            .select_chat(ChatId::from(chat_id))
            .await
            .context("Failed to load conversation")?;
    }

    let mut revisions = session.subscribe();
    let handle = session.send(options)?;
    debug!(request_id = %handle.request_id(), "Streaming reply");

    let mut printer = StreamPrinter::new(io::stdout().lock());
    let outcome = handle.outcome();
    tokio::pin!(outcome);

    let outcome = loop {
        tokio::select! {
            outcome = &mut outcome => break outcome,
            Ok(()) = revisions.changed() => {
                printer.render(&session.state())?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping reply");
                session.stop();
            }
        }
    };

    printer.render(&session.state())?;
    printer.finish()?;

    match outcome {
        StreamOutcome::Completed { chat_id, .. } => {
            if let Some(chat_id) = chat_id {
                eprintln!("chat: {chat_id}");
            }
            Ok(ExitCode::SUCCESS)
        }
        StreamOutcome::Failed { message } => {
            eprintln!("error: {message}");
            Ok(ExitCode::FAILURE)
        }
        StreamOutcome::Cancelled => {
            eprintln!("stopped");
            Ok(ExitCode::from(EXIT_STOPPED))
        }
    }
}

async fn list_chats(session: &ChatSession, json: bool) -> Result<ExitCode> {
    let chats = session
        .refresh_chats()
        .await
        .context("Failed to list conversations")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&chats)?);
    } else if chats.is_empty() {
        eprintln!("no conversations");
    } else {
        for chat in &chats {
            println!("{}\t{}", chat.id, chat.title);
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn show_messages(session: &ChatSession, chat_id: String, json: bool) -> Result<ExitCode> {
    session
        .select_chat(ChatId::from(chat_id))
        .await
        .context("Failed to load conversation")?;
    let messages = session.state().messages;

    if json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
    } else {
        for message in &messages {
            let role = match message.role {
                chatline_core::MessageRole::User => "you",
                chatline_core::MessageRole::Assistant => "assistant",
            };
            println!("[{role}] {}", message.content);
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn health(session: &ChatSession) -> ExitCode {
    let Some(report) = session.health().await else {
        eprintln!("backend unreachable");
        return ExitCode::FAILURE;
    };

    println!("status: {}", report.status);
    for (name, ok) in &report.checks {
        println!("  {name}: {}", if *ok { "ok" } else { "unavailable" });
    }
    ExitCode::SUCCESS
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging(&args.log_level);

    debug!(version = env!("CARGO_PKG_VERSION"), "Chatline starting");

    let session = build_session(&args)?;

    match args.command {
        Command::Send {
            message,
            chat_id,
            grounding,
            attachments,
        } => {
            let options = SendOptions::new(message)
                .with_grounding(grounding)
                .with_attachments(attachments);
            send(&session, chat_id, options).await
        }
        Command::Chats { json } => list_chats(&session, json).await,
        Command::Messages { chat_id, json } => show_messages(&session, chat_id, json).await,
        Command::Health => Ok(health(&session).await),
    }
}
