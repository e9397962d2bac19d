use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use client_core::{ChatClient, ClientEvent, NoticeLevel, PendingUpload, StaticUserDirectory};
use shared::{
    channel::BROADCAST_CHANNEL,
    domain::{ChannelId, UserId},
};
use storage::MessageStore;

mod settings;

#[derive(Parser, Debug)]
struct Args {
    /// Identity to log in as (e.g. a USN like 1CR19CS001).
    #[arg(long)]
    identity: String,
    /// Display name snapshotted onto outgoing messages.
    #[arg(long)]
    display_name: String,
    /// Relay websocket URL; overrides shelftalk.toml and env.
    #[arg(long)]
    relay_url: Option<String>,
    /// Message snapshot path; overrides shelftalk.toml and env.
    #[arg(long)]
    store_path: Option<String>,
    /// Known peer as ID=Name; may be repeated.
    #[arg(long = "peer", value_parser = parse_peer)]
    peers: Vec<(String, String)>,
}

fn parse_peer(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(id, name)| (id.trim().to_string(), name.trim().to_string()))
        .ok_or_else(|| format!("expected ID=Name, got '{raw}'"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let mut settings = settings::load_settings();
    if let Some(relay_url) = args.relay_url {
        settings.relay_url = relay_url;
    }
    if let Some(store_path) = args.store_path {
        settings.store_path = store_path;
    }

    let store = Arc::new(MessageStore::open(&settings.store_path)?);
    let directory = Arc::new(StaticUserDirectory::from_pairs(args.peers));
    let chat = ChatClient::new(Arc::clone(&store), settings.relay_url, directory);
    chat.start();
    chat.login(UserId::new(args.identity), args.display_name);

    spawn_event_printer(&chat);

    let mut channel = ChannelId::new(BROADCAST_CHANNEL);
    print_history(&chat, &channel);
    println!("commands: /dm <id>, /global, /recent, /attach <path>, /quit; anything else sends");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }

        if let Some(target) = line.strip_prefix("/dm ") {
            match chat.join_conversation(target) {
                Ok(direct) => {
                    channel = direct;
                    print_history(&chat, &channel);
                }
                Err(err) => eprintln!("! {err}"),
            }
        } else if line == "/global" {
            chat.leave_conversation();
            channel = ChannelId::new(BROADCAST_CHANNEL);
            print_history(&chat, &channel);
        } else if line == "/recent" {
            for conversation in chat.list_recent_conversations() {
                println!("  {} ({})", conversation.display_name, conversation.identity);
            }
        } else if let Some(path) = line.strip_prefix("/attach ") {
            match PendingUpload::from_path(path.trim()).await {
                Ok(upload) => {
                    if chat.send_upload(channel.clone(), &upload).await.is_ok() {
                        println!("sent {}", upload.filename);
                    }
                }
                Err(err) => eprintln!("! cannot stage '{}': {err}", path.trim()),
            }
        } else if line == "/quit" {
            break;
        } else if let Err(err) = chat.send(line, channel.clone(), None) {
            eprintln!("! {err}");
        }
    }

    chat.logout();
    chat.shutdown();
    Ok(())
}

fn print_history(chat: &ChatClient, channel: &ChannelId) {
    println!("--- {channel} ---");
    for message in chat.messages(channel) {
        let marker = message.attachment.as_ref().map(|a| a.name()).unwrap_or("");
        println!("[{}] {}: {} {marker}", message.timestamp, message.sender_name, message.content);
    }
}

fn spawn_event_printer(chat: &Arc<ChatClient>) {
    let mut store_events = chat.store().subscribe();
    let mut client_events = chat.subscribe_events();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = store_events.recv() => match event {
                    Ok(storage::StoreEvent::Appended { channel_id }) => {
                        tracing::debug!(channel = %channel_id, "message stored");
                    }
                    Err(_) => break,
                },
                event = client_events.recv() => match event {
                    Ok(ClientEvent::Notice { level, text }) => {
                        let tag = match level {
                            NoticeLevel::Success => "ok",
                            NoticeLevel::Error => "error",
                            NoticeLevel::Info => "info",
                        };
                        println!("({tag}) {text}");
                    }
                    Ok(ClientEvent::Connection(state)) => {
                        tracing::info!(?state, "relay connection");
                    }
                    Ok(ClientEvent::DirectoryUpdated { identity, name }) => {
                        tracing::debug!(%identity, %name, "directory updated");
                    }
                    Err(_) => break,
                },
            }
        }
    });
}
