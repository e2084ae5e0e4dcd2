use std::fs::File;
use std::process::ExitCode;
use std::sync::Arc;

use chatsync::api::HttpChatApi;
use chatsync::core::config::{self, CliOverrides};
use chatsync::core::identity::{Identity, identity_dir};
use chatsync::core::model::{Message, Role, Thread};
use chatsync::sync::{ChatError, ChatSession};
use clap::{Parser, Subcommand};
use simplelog::{ConfigBuilder, WriteLogger};

#[derive(Parser)]
#[command(name = "chatsync", about = "Realtime support chat client")]
struct Args {
    /// Which side of the conversation to act as
    #[arg(short, long, value_enum)]
    role: Option<Role>,

    /// API root, e.g. https://example.com/api
    #[arg(long)]
    base_url: Option<String>,

    /// Bearer token
    #[arg(long)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List conversations, most recent first
    Threads,
    /// Print a conversation, oldest first
    Messages { thread_id: String },
    /// Send a message
    Send {
        thread_id: String,
        text: String,
        /// Quote an earlier message from the same thread
        #[arg(long)]
        reply_to: Option<String>,
    },
    /// Set a reaction; an empty emoji clears it
    React {
        thread_id: String,
        message_id: String,
        emoji: String,
    },
    /// Delete one message
    Delete { thread_id: String, message_id: String },
    /// Clear a conversation from your own view
    Clear { thread_id: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    dotenv::dotenv().ok();

    let file_config = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let cli = CliOverrides {
        role: args.role,
        base_url: args.base_url.clone(),
        token: args.token.clone(),
    };
    let resolved = config::resolve(&file_config, &cli);

    let log_config = ConfigBuilder::new().set_time_format_rfc3339().build();
    if let Ok(log_file) = File::create(&resolved.log_file) {
        let _ = WriteLogger::init(resolved.log_level, log_config, log_file);
    }

    let identity = match identity_dir().and_then(|dir| {
        Identity::load_from(&dir, resolved.role, resolved.user_id.clone(), resolved.token.clone())
    }) {
        Ok(identity) => identity,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    log::info!(
        "chatsync starting as {} ({}) against {}",
        resolved.role.label(),
        identity.key(),
        resolved.base_url
    );

    let api = match HttpChatApi::new(&resolved.base_url, identity.role, resolved.request_timeout) {
        Ok(api) => api.with_bearer(identity.token.clone()),
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let session = ChatSession::builder(Arc::new(api), resolved.role)
        .pin_threshold(resolved.pin_threshold_px)
        .on_unauthorized(|| log::warn!("Session invalidated by server"))
        .build();

    match run(&session, args.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_auth() => {
            eprintln!("{e}");
            eprintln!("Sign in again and pass the new token with --token or CHATSYNC_TOKEN.");
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(session: &ChatSession, command: Command) -> Result<(), ChatError> {
    match command {
        Command::Threads => {
            session.load_threads().await?;
            for thread in session.snapshot().threads.iter() {
                println!("{}", format_thread(thread));
            }
        }
        Command::Messages { thread_id } => {
            session.open_thread(&thread_id).await?;
            for message in session.snapshot().log.iter() {
                println!("{}", format_message(message));
            }
        }
        Command::Send {
            thread_id,
            text,
            reply_to,
        } => {
            if let Some(target) = reply_to {
                // The reply snapshot is taken from the loaded log.
                session.open_thread(&thread_id).await?;
                session.set_reply_target(&target);
            }
            let sent = session.send_message(&thread_id, &text).await?;
            println!("{}", format_message(&sent));
        }
        Command::React {
            thread_id,
            message_id,
            emoji,
        } => match session.react_message(&thread_id, &message_id, &emoji).await? {
            Some(reaction) => println!("{message_id} {reaction}"),
            None => println!("{message_id} (no reaction)"),
        },
        Command::Delete { thread_id, message_id } => {
            session.delete_message(&thread_id, &message_id).await?;
            println!("Deleted {message_id}");
        }
        Command::Clear { thread_id } => {
            session.delete_thread_messages(&thread_id).await?;
            println!("Cleared {thread_id}");
        }
    }
    Ok(())
}

fn format_thread(thread: &Thread) -> String {
    let name = thread
        .user
        .as_ref()
        .and_then(|u| u.name.clone())
        .unwrap_or_else(|| thread.user_id.clone());
    let unread = match thread.unread_count {
        0 => String::new(),
        n => format!(" ({n} unread)"),
    };
    format!(
        "{}  {}{}  {}",
        thread.created_at.format("%Y-%m-%d %H:%M"),
        name,
        unread,
        thread.message.as_deref().unwrap_or("")
    )
}

fn format_message(message: &Message) -> String {
    let mut line = format!(
        "[{}] {} {}: ",
        message.id,
        message.created_at.format("%H:%M"),
        message.sender_role.label()
    );
    if let Some(reply) = &message.reply_to {
        line.push_str(&format!("> {} | ", reply.preview));
    }
    line.push_str(&message.body);
    if let Some(reaction) = &message.reaction {
        line.push_str(&format!(" {reaction}"));
    }
    if message.seen_at.is_some() {
        line.push_str(" ✓✓");
    } else if message.delivered_at.is_some() {
        line.push_str(" ✓");
    }
    line
}
