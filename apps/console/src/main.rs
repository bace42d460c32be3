mod command;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chat_core::{
    directory::{unread_count_of, DirectoryUiState},
    load_settings, logging, ChatSession, DeliveryState, Notice, SessionEvent, SessionIdentity,
};
use clap::{Parser, ValueEnum};
use command::Command;
use shared::domain::{Role, UserId};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::{wrappers::errors::BroadcastStreamRecvError, wrappers::BroadcastStream, StreamExt};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(about = "Terminal client for the support chat")]
struct Args {
    /// Chat server base URL, e.g. http://127.0.0.1:8080
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    user_id: Option<String>,
    #[arg(long, value_enum)]
    role: Option<RoleArg>,
    /// TOML settings file. Defaults to ./chat.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RoleArg {
    Client,
    Admin,
    SuperAdmin,
}

impl From<RoleArg> for Role {
    fn from(value: RoleArg) -> Self {
        match value {
            RoleArg::Client => Role::Client,
            RoleArg::Admin => Role::Admin,
            RoleArg::SuperAdmin => Role::SuperAdmin,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }
    if let Some(user_id) = args.user_id {
        settings.user_id = Some(UserId::new(user_id));
    }
    if let Some(role) = args.role {
        settings.role = role.into();
    }
    logging::init(&settings.log_level)?;

    let user_id = settings
        .user_id
        .clone()
        .context("a user id is required (--user-id or APP__USER_ID)")?;
    let identity = SessionIdentity {
        user_id,
        role: settings.role,
        profile: None,
    };
    let session = ChatSession::connect(&settings, identity)
        .await
        .with_context(|| format!("failed to connect to {}", settings.server_url))?;
    info!(server_url = %settings.server_url, "console: connected");

    if let Err(err) = session.load_directory().await {
        warn!(%err, "console: initial directory load failed");
    }
    print_directory(&session).await;

    let mut events = BroadcastStream::new(session.subscribe_events());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match Command::parse(&line) {
                    Ok(Command::Quit) => break,
                    Ok(command) => run_command(&session, command).await,
                    Err(usage) => eprintln!("{usage}"),
                }
            }
            Some(event) = events.next() => match event {
                Ok(event) => render_event(&session, event).await,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "console: dropped session events");
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.shutdown().await;
    Ok(())
}

async fn run_command(session: &ChatSession, command: Command) {
    let result = match command {
        Command::List => session.refresh_directory().await,
        Command::Open(conversation_id) => session.open_conversation(conversation_id).await,
        Command::Close => session.close_conversation().await,
        Command::Focus => {
            session.focus_input().await;
            Ok(())
        }
        Command::Blur => session.blur_input().await,
        Command::Retry(token) => session.retry_message(&token).await,
        Command::Discard(token) => {
            if !session.discard_message(&token).await {
                eprintln!("no failed message with token {token}");
            }
            Ok(())
        }
        Command::Send(text) => {
            session.set_composer_text(text).await;
            session.submit().await.map(|_| ())
        }
        Command::Quit | Command::Nothing => Ok(()),
    };
    if let Err(err) = result {
        eprintln!("error: {err}");
    }
}

async fn render_event(session: &ChatSession, event: SessionEvent) {
    match event {
        SessionEvent::DirectoryUpdated => print_directory(session).await,
        SessionEvent::ThreadUpdated { .. } => print_thread(session).await,
        SessionEvent::Notice(Notice { kind, message }) => eprintln!("[{kind:?}] {message}"),
        SessionEvent::ClientMessageReceived { sender, .. } => {
            println!("* new message from {}", sender.display_name());
        }
        SessionEvent::ConversationClosed { conversation_id } => {
            println!("* conversation {conversation_id} was closed");
        }
        SessionEvent::ConnectionChanged { connected } => {
            println!("* {}", if connected { "reconnected" } else { "connection lost, retrying" });
        }
    }
}

async fn print_directory(session: &ChatSession) {
    let directory = session.directory().await;
    match directory.ui_state() {
        DirectoryUiState::Loading => println!("loading conversations..."),
        DirectoryUiState::Empty => println!("no conversations"),
        DirectoryUiState::Error if directory.conversations().is_empty() => {
            println!("conversations unavailable")
        }
        DirectoryUiState::Ready | DirectoryUiState::Error => {
            let user_id = &session.identity().user_id;
            for conversation in directory.conversations() {
                let name = conversation
                    .client
                    .as_ref()
                    .map(|client| client.display_name())
                    .unwrap_or_else(|| conversation.client_id.to_string());
                let status = if conversation.is_closed() { "closed" } else { "open" };
                println!(
                    "{:<24} {:<24} {:<6} unread={}",
                    conversation.id.as_str(),
                    name,
                    status,
                    unread_count_of(conversation, user_id)
                );
            }
        }
    }
}

async fn print_thread(session: &ChatSession) {
    let thread = session.thread().await;
    let Some(conversation_id) = thread.conversation_id() else {
        println!("-- no conversation open --");
        return;
    };
    println!("-- {conversation_id} --");
    for entry in thread.entries() {
        let marker = match &entry.delivery {
            DeliveryState::Confirmed => String::new(),
            DeliveryState::Pending => " (sending)".into(),
            DeliveryState::Failed { reason } => {
                let token = entry
                    .message
                    .client_token
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default();
                format!(" (failed: {reason}; /retry {token})")
            }
        };
        println!(
            "[{}] {}: {}{marker}",
            entry.message.created_at.format("%H:%M"),
            entry.message.sender_id,
            entry.message.content
        );
    }
}
