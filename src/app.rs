//! Startup wiring: builds every component from its collaborators and runs the
//! two startup phases.

use std::sync::Arc;

use tracing::info;

use crate::commands::{CommandHandler, CommandRegistry, CommandRequest};
use crate::config::RelayConfig;
use crate::conn::Transport;
use crate::error::Result;
use crate::events::{BotEvent, EventHandler, EventRouter};
use crate::hub::MessageHub;
use crate::private_channel::bridge::MAX_PAGE_LENGTH_SETTING;
use crate::private_channel::{
    ConnectionResolver, MembershipLifecycle, PrivateChannelBridge, PrivateChannelCommands,
    PrivateChannelDeps,
};
use crate::scheduler::JobScheduler;
use crate::services::{AccessService, BanService, CharacterService, LogonHistory, PresenceDisplay};
use crate::settings::{Setting, SettingKind, SettingsStore};
use crate::tell_relay::{RELAY_BOT_SETTING, RELAY_PREFIX_SETTING, TellRelayBridge};

/// Everything the relay needs from the host process.
pub struct RelayDeps {
    pub transport: Arc<dyn Transport>,
    pub hub: Arc<dyn MessageHub>,
    pub settings: Arc<dyn SettingsStore>,
    pub scheduler: Arc<dyn JobScheduler>,
    pub access: Arc<dyn AccessService>,
    pub characters: Arc<dyn CharacterService>,
    pub bans: Arc<dyn BanService>,
    pub presence: Option<Arc<dyn PresenceDisplay>>,
    pub logon_history: Option<Arc<dyn LogonHistory>>,
}

/// The wired relay.
pub struct RelayApp {
    pub resolver: Arc<ConnectionResolver>,
    pub membership: Arc<MembershipLifecycle>,
    pub private_channel: Arc<PrivateChannelBridge>,
    pub tell_relay: Arc<TellRelayBridge>,
    events: EventRouter,
    commands: CommandRegistry,
}

impl RelayApp {
    /// Build all components, register hub sources, then settings, hub
    /// destinations, event handlers and commands.
    pub async fn build(config: &RelayConfig, deps: RelayDeps) -> Result<Self> {
        config.validate()?;

        let resolver = Arc::new(ConnectionResolver::new(
            Arc::clone(&deps.transport),
            Arc::clone(&deps.settings),
        ));
        let membership = Arc::new(MembershipLifecycle::new(
            Arc::clone(&deps.transport),
            Arc::clone(&deps.access),
            Arc::clone(&deps.scheduler),
            config.kick_all_delay,
        ));
        let private_channel = Arc::new(PrivateChannelBridge::new(
            &config.module,
            config.max_page_length,
            PrivateChannelDeps {
                transport: Arc::clone(&deps.transport),
                hub: Arc::clone(&deps.hub),
                settings: Arc::clone(&deps.settings),
                characters: Arc::clone(&deps.characters),
                bans: Arc::clone(&deps.bans),
                resolver: Arc::clone(&resolver),
                membership: Arc::clone(&membership),
                presence: deps.presence.clone(),
                logon_history: deps.logon_history.clone(),
            },
        ));
        let tell_relay = Arc::new(TellRelayBridge::new(
            "tell_relay",
            Arc::clone(&deps.transport),
            Arc::clone(&deps.hub),
            Arc::clone(&deps.settings),
            Arc::clone(&deps.characters),
        ));

        // ── pre_start ───────────────────────────────────────────────────
        private_channel.pre_start().await;
        tell_relay.pre_start().await;

        // ── start ───────────────────────────────────────────────────────
        register_host_settings(config, deps.settings.as_ref()).await;
        private_channel.start().await?;
        tell_relay.start().await?;

        let relay_bot = deps
            .settings
            .get_value(RELAY_BOT_SETTING)
            .await
            .unwrap_or_default();
        if relay_bot.is_empty() && !config.relay_bot.is_empty() {
            deps.settings
                .set_value(RELAY_BOT_SETTING, &config.relay_bot)
                .await?;
        }

        let mut events = EventRouter::new();
        for kind in PrivateChannelBridge::event_kinds() {
            events.register(*kind, Arc::clone(&private_channel) as Arc<dyn EventHandler>);
        }

        let commands = CommandRegistry::new(
            Arc::clone(&deps.access),
            Arc::clone(&deps.characters),
        );
        commands
            .register(Arc::new(PrivateChannelCommands::new(
                Arc::clone(&resolver),
                Arc::clone(&membership),
            )))
            .await;
        commands.register(Arc::clone(&tell_relay) as Arc<dyn CommandHandler>).await;

        info!(commands = ?commands.list().await, "Relay started");

        Ok(Self {
            resolver,
            membership,
            private_channel,
            tell_relay,
            events,
            commands,
        })
    }

    /// Dispatch a transport or system event.
    pub async fn handle_event(&self, event: &BotEvent) {
        self.events.dispatch(event).await;
    }

    /// Run a command line. Returns the reply, if any.
    pub async fn handle_command(&self, request: &CommandRequest, line: &str) -> Option<String> {
        self.commands.dispatch(request, line).await
    }
}

/// Settings normally owned by other modules of the host bot. Registered here
/// only if the host has not done so.
async fn register_host_settings(config: &RelayConfig, settings: &dyn SettingsStore) {
    if settings.get(MAX_PAGE_LENGTH_SETTING).await.is_none() {
        settings
            .register(Setting::new(
                "org_channel",
                MAX_PAGE_LENGTH_SETTING,
                config.max_page_length.to_string(),
                SettingKind::Number,
                "Maximum number of characters per page",
            ))
            .await;
    }
    if settings.get(RELAY_PREFIX_SETTING).await.is_none() {
        settings
            .register(Setting::new(
                "relay",
                RELAY_PREFIX_SETTING,
                config.relay_prefix.clone(),
                SettingKind::Text { allow_empty: true },
                "Name to show for this bot on the relay",
            ))
            .await;
    }
}
