use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};

use chat_relay::app::{RelayApp, RelayDeps};
use chat_relay::commands::{AccessLevel, CommandRequest};
use chat_relay::config::RelayConfig;
use chat_relay::conn::{ConnectionHandle, MemoryTransport, Transport};
use chat_relay::events::{BotEvent, PrivateChannelEvent};
use chat_relay::hub::{LocalHub, MessageSender};
use chat_relay::scheduler::TokioScheduler;
use chat_relay::services::{BanList, CharacterDirectory, StaticAccess};
use chat_relay::settings::InMemorySettings;

/// Name of the console user.
const LOCAL_USER: &str = "Localuser";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = RelayConfig::from_env();
    config.validate().context("invalid relay configuration")?;

    eprintln!("📡 Chat Relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Connections: {}", config.connections.join(", "));
    eprintln!(
        "   Relay bot: {}",
        if config.relay_bot.is_empty() {
            "(none)"
        } else {
            &config.relay_bot
        }
    );
    eprintln!("   !<command> runs a command, +Name / -Name joins / leaves,");
    eprintln!("   'ban Name' bans, anything else is private channel chat.\n");

    // ── Characters & connections ────────────────────────────────────────
    let characters = Arc::new(CharacterDirectory::new());
    let mut connections = Vec::new();
    for (i, name) in config.connections.iter().enumerate() {
        let char_id = characters.get_or_insert(name).await;
        connections.push(ConnectionHandle::new(format!("bot{i}"), char_id, name.clone()));
    }
    let transport = Arc::new(MemoryTransport::new(connections).with_echo(true));

    let access = Arc::new(StaticAccess::new());
    let local_id = characters.get_or_insert(LOCAL_USER).await;
    access.set_level(local_id, AccessLevel::Admin).await;

    let bans = Arc::new(BanList::new());

    let app = RelayApp::build(
        &config,
        RelayDeps {
            transport: transport.clone(),
            hub: Arc::new(LocalHub::new()),
            settings: Arc::new(InMemorySettings::new()),
            scheduler: Arc::new(TokioScheduler::new()),
            access,
            characters: characters.clone(),
            bans: bans.clone(),
            presence: None,
            logon_history: None,
        },
    )
    .await
    .context("failed to start relay")?;

    app.handle_event(&BotEvent::Connect).await;

    // ── Console loop ────────────────────────────────────────────────────
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let conn = app.resolver.resolve(None).await;

        if let Some(command) = line.strip_prefix('!') {
            let request = CommandRequest::new(MessageSender::new(local_id, LOCAL_USER), None);
            if let Some(reply) = app.handle_command(&request, command).await {
                println!("{reply}");
            }
        } else if let Some(name) = line.strip_prefix('+') {
            let char_id = characters.get_or_insert(name).await;
            transport.add_member(&conn, char_id).await;
            app.handle_event(&BotEvent::PrivateChannel(PrivateChannelEvent::Joined {
                char_id,
                name: name.to_string(),
                conn,
            }))
            .await;
        } else if let Some(name) = line.strip_prefix('-') {
            let char_id = characters.get_or_insert(name).await;
            transport.remove_member(&conn, char_id).await;
            app.handle_event(&BotEvent::PrivateChannel(PrivateChannelEvent::Left {
                char_id,
                name: name.to_string(),
                conn,
            }))
            .await;
        } else if let Some(name) = line.strip_prefix("ban ") {
            let char_id = characters.get_or_insert(name.trim()).await;
            if bans.add(char_id).await {
                app.handle_event(&BotEvent::BanAdded { char_id }).await;
            }
        } else {
            app.handle_event(&BotEvent::PrivateChannel(PrivateChannelEvent::Message {
                char_id: local_id,
                name: LOCAL_USER.to_string(),
                conn,
                message: line.to_string(),
            }))
            .await;
        }
    }

    tracing::info!(conn = %transport.primary_connection().id, "Console closed");
    Ok(())
}
