//! Relay between the private channel and the message hub.
//!
//! Hub traffic is posted to the channel verbatim. Channel chat, command output
//! and join/leave notices are published to the hub under `private_channel`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::conn::{CharId, ConnectionHandle, Transport};
use crate::error::Result;
use crate::events::{BotEvent, EventHandler, EventKind, PrivateChannelEvent};
use crate::hub::{ChatMessage, HubContext, HubDestination, MessageHub, MessageSender, sources};
use crate::private_channel::membership::MembershipLifecycle;
use crate::private_channel::resolver::{ConnectionResolver, PRIVATE_CHANNEL_CONN_SETTING};
use crate::services::{BanService, CharacterService, LogonHistory, PresenceDisplay};
use crate::settings::{Setting, SettingKind, SettingsStore};
use crate::text::{MessageBody, paginate};

pub const PRIVATE_CHANNEL_PREFIX_SETTING: &str = "private_channel_prefix";

/// Page length setting owned by the org channel module.
pub const MAX_PAGE_LENGTH_SETTING: &str = "org_channel_max_page_length";

/// Blobs paginating to this many pages or more are relayed as their title only.
pub const MAX_RELAYED_PAGES: usize = 4;

const SUBSCRIBED_SOURCES: &[&str] = &[
    sources::ORG_CHANNEL,
    sources::DISCORD,
    sources::WEBSOCKET_RELAY,
    sources::BROADCAST,
    sources::RAFFLE,
    sources::SHUTDOWN_NOTICE,
    sources::RAID,
    sources::TIMERS,
    sources::ALLIANCE,
];

const HANDLED_EVENTS: &[EventKind] = &[
    EventKind::Connect,
    EventKind::BanAdded,
    EventKind::PrivateChannelJoined,
    EventKind::PrivateChannelLeft,
    EventKind::PrivateChannelMessage,
    EventKind::PrivateChannelCommand,
];

/// Collaborators of the private channel bridge.
pub struct PrivateChannelDeps {
    pub transport: Arc<dyn Transport>,
    pub hub: Arc<dyn MessageHub>,
    pub settings: Arc<dyn SettingsStore>,
    pub characters: Arc<dyn CharacterService>,
    pub bans: Arc<dyn BanService>,
    pub resolver: Arc<ConnectionResolver>,
    pub membership: Arc<MembershipLifecycle>,
    /// Optional richer join display.
    pub presence: Option<Arc<dyn PresenceDisplay>>,
    /// Optional logon/logoff summaries.
    pub logon_history: Option<Arc<dyn LogonHistory>>,
}

pub struct PrivateChannelBridge {
    module: String,
    default_page_length: usize,
    deps: PrivateChannelDeps,
}

impl PrivateChannelBridge {
    pub fn new(
        module: impl Into<String>,
        default_page_length: usize,
        deps: PrivateChannelDeps,
    ) -> Self {
        Self {
            module: module.into(),
            default_page_length,
            deps,
        }
    }

    /// Event kinds this bridge must be registered for.
    pub fn event_kinds() -> &'static [EventKind] {
        HANDLED_EVENTS
    }

    /// First startup phase: announce the hub source.
    pub async fn pre_start(&self) {
        self.deps
            .hub
            .register_source(sources::PRIVATE_CHANNEL)
            .await;
    }

    /// Second startup phase: settings and hub destination.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let settings = &self.deps.settings;
        settings
            .register(
                Setting::new(
                    &self.module,
                    PRIVATE_CHANNEL_PREFIX_SETTING,
                    "[Priv]",
                    SettingKind::Choice,
                    "The name to show for messages coming from the private channel",
                )
                .with_options(["[Priv]", "[Guest]"]),
            )
            .await;
        settings
            .register(
                Setting::new(
                    &self.module,
                    PRIVATE_CHANNEL_CONN_SETTING,
                    "",
                    SettingKind::Text { allow_empty: true },
                    "The conn id or name to use for the private channel",
                )
                .with_extended_description(
                    "If empty, the bot will use the primary conn. You MUST restart the bot after changing this value for the change to take effect.",
                ),
            )
            .await;

        self.deps
            .hub
            .register_destination(
                sources::PRIVATE_CHANNEL,
                Arc::clone(self) as Arc<dyn HubDestination>,
                SUBSCRIBED_SOURCES,
                &[sources::PRIVATE_CHANNEL],
            )
            .await?;
        Ok(())
    }

    async fn prefix(&self) -> Option<String> {
        self.deps
            .settings
            .get_value(PRIVATE_CHANNEL_PREFIX_SETTING)
            .await
    }

    async fn max_page_length(&self) -> usize {
        self.deps
            .settings
            .get_value(MAX_PAGE_LENGTH_SETTING)
            .await
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.default_page_length)
    }

    async fn publish(&self, sender: Option<MessageSender>, body: impl Into<String>) -> Result<()> {
        let message = ChatMessage::new(sources::PRIVATE_CHANNEL, body)
            .with_sender(sender)
            .with_prefix(self.prefix().await);
        self.deps.hub.send_message(message).await?;
        Ok(())
    }

    /// Post to the channel and publish to the hub as a system notice. A failed
    /// channel post still publishes.
    async fn announce(&self, conn: &ConnectionHandle, notice: String) -> Result<()> {
        if let Err(e) = self
            .deps
            .transport
            .send_private_channel_message(conn, &notice)
            .await
        {
            warn!(conn = %conn.id, error = %e, "Failed to post private channel notice");
        }
        self.publish(None, notice).await
    }

    async fn on_connect(&self) -> Result<()> {
        self.deps.resolver.load_connection_choices().await?;
        Ok(())
    }

    async fn on_ban_added(&self, char_id: CharId) -> Result<()> {
        let kicked = self.deps.membership.kick_from_all(char_id).await;
        debug!(char_id = %char_id, channels = kicked, "Kicked banned character");
        Ok(())
    }

    async fn on_message(&self, char_id: CharId, name: &str, message: &str) -> Result<()> {
        // Our own characters and banned characters are never relayed.
        if self.deps.transport.connection_by_char_id(char_id).is_some()
            || self.deps.bans.is_banned(char_id).await
        {
            debug!(char_id = %char_id, "Dropped private channel message");
            return Ok(());
        }
        self.publish(Some(MessageSender::new(char_id, name)), message)
            .await
    }

    async fn on_joined(&self, char_id: CharId, name: &str, conn: &ConnectionHandle) -> Result<()> {
        let char_info = match &self.deps.presence {
            Some(presence) => presence.char_info_display(char_id, conn).await,
            None => self
                .deps
                .characters
                .resolve_char_to_name(char_id)
                .await
                .unwrap_or_else(|| name.to_string()),
        };

        let mut notice = format!("{char_info} has joined the private channel.");
        if let Some(history) = &self.deps.logon_history {
            notice.push(' ');
            notice.push_str(&history.logon(char_id).await);
        }
        self.announce(conn, notice).await
    }

    async fn on_left(&self, char_id: CharId, name: &str, conn: &ConnectionHandle) -> Result<()> {
        let mut notice = format!("<highlight>{name}</highlight> has left the private channel.");
        if let Some(history) = &self.deps.logon_history {
            notice.push(' ');
            notice.push_str(&history.logoff(char_id).await);
        }
        self.announce(conn, notice).await
    }

    async fn on_command(
        &self,
        sender: Option<MessageSender>,
        message: &MessageBody,
    ) -> Result<()> {
        match message {
            MessageBody::Text(text) => self.publish(sender, text.clone()).await,
            MessageBody::Blob(blob) => {
                let pages = paginate(blob, self.max_page_length().await);
                if pages.len() < MAX_RELAYED_PAGES {
                    for page in pages {
                        self.publish(sender.clone(), page).await?;
                    }
                    Ok(())
                } else {
                    debug!(pages = pages.len(), title = %blob.title, "Relaying blob title only");
                    self.publish(sender, blob.title.clone()).await
                }
            }
        }
    }
}

#[async_trait]
impl HubDestination for PrivateChannelBridge {
    async fn deliver(&self, ctx: &HubContext) -> Result<()> {
        let conn = self.deps.resolver.resolve(None).await;
        self.deps
            .transport
            .send_private_channel_message(&conn, &ctx.formatted_message)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl EventHandler for PrivateChannelBridge {
    fn name(&self) -> &str {
        "private_channel_bridge"
    }

    async fn handle(&self, event: &BotEvent) -> Result<()> {
        match event {
            BotEvent::Connect => self.on_connect().await,
            BotEvent::BanAdded { char_id } => self.on_ban_added(*char_id).await,
            BotEvent::PrivateChannel(event) => match event {
                PrivateChannelEvent::Joined {
                    char_id,
                    name,
                    conn,
                } => self.on_joined(*char_id, name, conn).await,
                PrivateChannelEvent::Left {
                    char_id,
                    name,
                    conn,
                } => self.on_left(*char_id, name, conn).await,
                PrivateChannelEvent::Message {
                    char_id,
                    name,
                    message,
                    ..
                } => self.on_message(*char_id, name, message).await,
                PrivateChannelEvent::Command {
                    sender, message, ..
                } => {
                    let sender = sender
                        .as_ref()
                        .map(|(char_id, name)| MessageSender::new(*char_id, name.clone()));
                    self.on_command(sender, message).await
                }
            },
        }
    }
}
