//! Relay between the hub and an external relay bot reached by tells.
//!
//! Outbound hub traffic is sent to the relay bot as `grc [<prefix>] <text>`.
//! Inbound `grc` commands are accepted only from the configured relay bot.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::commands::{AccessLevel, CommandArgs, CommandHandler, CommandRequest, CommandSpec, ParamSpec};
use crate::conn::Transport;
use crate::error::Result;
use crate::hub::{ChatMessage, HubContext, HubDestination, MessageHub, sources};
use crate::services::CharacterService;
use crate::settings::{Setting, SettingKind, SettingsStore};

/// Name of the relay bot character.
pub const RELAY_BOT_SETTING: &str = "relay_bot";

/// Prefix shown to the other side. Registered by the host.
pub const RELAY_PREFIX_SETTING: &str = "relay_prefix";

const SUBSCRIBED_SOURCES: &[&str] = &[
    sources::PRIVATE_CHANNEL,
    sources::ORG_CHANNEL,
    sources::DISCORD,
    sources::WEBSOCKET_RELAY,
    sources::SHUTDOWN_NOTICE,
];

pub struct TellRelayBridge {
    module: String,
    transport: Arc<dyn Transport>,
    hub: Arc<dyn MessageHub>,
    settings: Arc<dyn SettingsStore>,
    characters: Arc<dyn CharacterService>,
}

impl TellRelayBridge {
    pub fn new(
        module: impl Into<String>,
        transport: Arc<dyn Transport>,
        hub: Arc<dyn MessageHub>,
        settings: Arc<dyn SettingsStore>,
        characters: Arc<dyn CharacterService>,
    ) -> Self {
        Self {
            module: module.into(),
            transport,
            hub,
            settings,
            characters,
        }
    }

    pub async fn pre_start(&self) {
        self.hub.register_source(sources::TELL_RELAY).await;
    }

    pub async fn start(self: &Arc<Self>) -> Result<()> {
        self.hub
            .register_destination(
                sources::TELL_RELAY,
                Arc::clone(self) as Arc<dyn HubDestination>,
                SUBSCRIBED_SOURCES,
                &[sources::TELL_RELAY],
            )
            .await?;

        self.settings
            .register(Setting::new(
                &self.module,
                RELAY_BOT_SETTING,
                "",
                SettingKind::Text { allow_empty: true },
                "Name of bot character for chat relay",
            ))
            .await;
        Ok(())
    }

    /// Configured relay bot name, if set.
    async fn relay_bot(&self) -> Option<String> {
        self.settings
            .get_value(RELAY_BOT_SETTING)
            .await
            .filter(|name| !name.is_empty())
    }

    /// The relay prefix setting, else the primary connection's org name, else
    /// its character name.
    pub async fn outbound_prefix(&self) -> String {
        if let Some(prefix) = self
            .settings
            .get_value(RELAY_PREFIX_SETTING)
            .await
            .filter(|p| !p.is_empty())
        {
            return prefix;
        }
        let conn = self.transport.primary_connection();
        conn.org_name
            .filter(|org| !org.is_empty())
            .unwrap_or(conn.char_name)
    }

    /// Send `message` to the relay bot. A no-op when no relay bot is set.
    pub async fn send_message_to_relay(&self, message: &str) -> Result<()> {
        let Some(relay_bot) = self.relay_bot().await else {
            return Ok(());
        };

        let Some(char_id) = self.characters.resolve_char_to_id(&relay_bot).await else {
            warn!(relay_bot = %relay_bot, "Could not resolve relay bot, message not sent");
            return Ok(());
        };

        let prefix = self.outbound_prefix().await;
        let conn = self.transport.primary_connection();
        self.transport
            .send_private_message(&conn, char_id, &format!("grc [{prefix}] {message}"), false)
            .await?;
        Ok(())
    }

    /// Publish `message` to the hub if `sender_name` is the relay bot.
    /// Returns whether it was relayed.
    pub async fn process_incoming_relay_message(
        &self,
        sender_name: &str,
        message: &str,
    ) -> Result<bool> {
        let Some(relay_bot) = self.relay_bot().await else {
            return Ok(false);
        };
        if sender_name.to_lowercase() != relay_bot.to_lowercase() {
            debug!(sender = %sender_name, "Ignored grc from non-relay character");
            return Ok(false);
        }

        self.hub
            .send_message(ChatMessage::new(sources::TELL_RELAY, message))
            .await?;
        Ok(true)
    }
}

#[async_trait]
impl HubDestination for TellRelayBridge {
    async fn deliver(&self, ctx: &HubContext) -> Result<()> {
        self.send_message_to_relay(&ctx.formatted_message).await
    }
}

#[async_trait]
impl CommandHandler for TellRelayBridge {
    fn commands(&self) -> Vec<CommandSpec> {
        vec![CommandSpec {
            name: "grc",
            param: ParamSpec::Any,
            access_level: AccessLevel::All,
            description: "Accept incoming messages from relay bot",
        }]
    }

    async fn execute(
        &self,
        _command: &str,
        request: &CommandRequest,
        args: CommandArgs,
    ) -> Option<String> {
        let CommandArgs::Text(message) = args else {
            return None;
        };
        if let Err(e) = self
            .process_incoming_relay_message(&request.sender.name, &message)
            .await
        {
            warn!(error = %e, "Failed to relay incoming grc message");
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conn::{CharId, ConnectionHandle, MemoryTransport, TransportCall};
    use crate::hub::{LocalHub, MessageSender};
    use crate::services::CharacterDirectory;
    use crate::settings::InMemorySettings;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Listener {
        received: Mutex<Vec<ChatMessage>>,
    }

    #[async_trait]
    impl HubDestination for Listener {
        async fn deliver(&self, ctx: &HubContext) -> Result<()> {
            self.received.lock().await.push(ctx.message.clone());
            Ok(())
        }
    }

    struct Fixture {
        transport: Arc<MemoryTransport>,
        hub: Arc<LocalHub>,
        settings: Arc<InMemorySettings>,
        relay: Arc<TellRelayBridge>,
        listener: Arc<Listener>,
    }

    async fn fixture(primary: ConnectionHandle) -> Fixture {
        let transport = Arc::new(MemoryTransport::new(vec![primary]));
        let hub = Arc::new(LocalHub::new());
        let settings = Arc::new(InMemorySettings::new());
        let characters = Arc::new(CharacterDirectory::new());
        characters.insert(CharId(500), "Relaybot").await;

        let relay = Arc::new(TellRelayBridge::new(
            "tell_relay",
            transport.clone(),
            hub.clone(),
            settings.clone(),
            characters,
        ));
        relay.pre_start().await;
        relay.start().await.unwrap();

        let listener = Arc::new(Listener::default());
        hub.register_destination("listener", listener.clone(), &[sources::TELL_RELAY], &[])
            .await
            .unwrap();

        Fixture {
            transport,
            hub,
            settings,
            relay,
            listener,
        }
    }

    fn bot() -> ConnectionHandle {
        ConnectionHandle::new("main", CharId(1), "Mybot")
    }

    #[tokio::test]
    async fn unset_relay_bot_is_a_no_op() {
        let f = fixture(bot()).await;
        f.relay.send_message_to_relay("hello").await.unwrap();
        assert!(f.transport.calls().await.is_empty());
    }

    #[tokio::test]
    async fn hub_traffic_is_sent_to_relay_bot_without_color() {
        let f = fixture(bot().with_org_name("Troet")).await;
        f.settings
            .set_value(RELAY_BOT_SETTING, "Relaybot")
            .await
            .unwrap();

        f.hub.register_source(sources::ORG_CHANNEL).await;
        f.hub
            .send_message(
                ChatMessage::new(sources::ORG_CHANNEL, "hi")
                    .with_sender(Some(MessageSender::new(CharId(9), "Bob"))),
            )
            .await
            .unwrap();

        assert_eq!(
            f.transport.calls().await,
            vec![TransportCall::PrivateMessage {
                conn: "main".into(),
                char_id: CharId(500),
                text: "grc [Troet] Bob: hi".into(),
                add_color: false,
            }]
        );
    }

    #[tokio::test]
    async fn unresolvable_relay_bot_sends_nothing() {
        let f = fixture(bot()).await;
        f.settings
            .set_value(RELAY_BOT_SETTING, "Nosuchbot")
            .await
            .unwrap();

        f.relay.send_message_to_relay("hello").await.unwrap();
        assert!(f.transport.calls().await.is_empty());
    }

    #[tokio::test]
    async fn prefix_falls_back_to_character_name() {
        let f = fixture(bot()).await;
        assert_eq!(f.relay.outbound_prefix().await, "Mybot");
    }

    #[tokio::test]
    async fn prefix_setting_wins() {
        let f = fixture(bot().with_org_name("Troet")).await;
        f.settings
            .register(Setting::new(
                "relay",
                RELAY_PREFIX_SETTING,
                "",
                SettingKind::Text { allow_empty: true },
                "Relay prefix",
            ))
            .await;
        assert_eq!(f.relay.outbound_prefix().await, "Troet");

        f.settings
            .set_value(RELAY_PREFIX_SETTING, "TRT")
            .await
            .unwrap();
        assert_eq!(f.relay.outbound_prefix().await, "TRT");
    }

    #[tokio::test]
    async fn incoming_from_relay_bot_ignores_case() {
        let f = fixture(bot()).await;
        f.settings
            .set_value(RELAY_BOT_SETTING, "Relaybot")
            .await
            .unwrap();

        assert!(
            f.relay
                .process_incoming_relay_message("RELAYBOT", "[Other] Carl: yo")
                .await
                .unwrap()
        );

        f.settings
            .set_value(RELAY_BOT_SETTING, "Ærobot")
            .await
            .unwrap();
        assert!(
            f.relay
                .process_incoming_relay_message("ærobot", "[Nord] Åse: hei")
                .await
                .unwrap()
        );

        let received = f.listener.received.lock().await;
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].body, "[Other] Carl: yo");
        assert!(received[0].sender.is_none());
        assert!(received[0].prefix.is_none());
        assert_eq!(received[1].body, "[Nord] Åse: hei");
    }

    #[tokio::test]
    async fn incoming_from_anyone_else_is_ignored() {
        let f = fixture(bot()).await;
        f.settings
            .set_value(RELAY_BOT_SETTING, "Relaybot")
            .await
            .unwrap();

        for sender in ["Relaybot2", "Mallory", ""] {
            assert!(
                !f.relay
                    .process_incoming_relay_message(sender, "spoof")
                    .await
                    .unwrap()
            );
        }
        assert!(f.listener.received.lock().await.is_empty());
    }

    #[tokio::test]
    async fn incoming_without_relay_bot_is_ignored() {
        let f = fixture(bot()).await;
        assert!(
            !f.relay
                .process_incoming_relay_message("", "spoof")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn grc_command_relays() {
        let f = fixture(bot()).await;
        f.settings
            .set_value(RELAY_BOT_SETTING, "Relaybot")
            .await
            .unwrap();

        let request = CommandRequest::new(MessageSender::new(CharId(500), "Relaybot"), None);
        let reply = f
            .relay
            .execute("grc", &request, CommandArgs::Text("hello".into()))
            .await;
        assert!(reply.is_none());
        assert_eq!(f.listener.received.lock().await.len(), 1);
    }
}
