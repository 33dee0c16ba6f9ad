//! Resolves which connection operates the private channel.
//!
//! The first resolution is cached for the life of the process. Changing the
//! `private_channel_conn` setting afterwards has no effect until restart.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::conn::{ConnectionHandle, Transport};
use crate::error::SettingError;
use crate::settings::SettingsStore;

/// Setting holding the connection id or character name to use.
pub const PRIVATE_CHANNEL_CONN_SETTING: &str = "private_channel_conn";

pub struct ConnectionResolver {
    transport: Arc<dyn Transport>,
    settings: Arc<dyn SettingsStore>,
    cached: OnceCell<ConnectionHandle>,
}

impl ConnectionResolver {
    pub fn new(transport: Arc<dyn Transport>, settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            transport,
            settings,
            cached: OnceCell::new(),
        }
    }

    /// Connection for a private channel operation. An explicit connection (the
    /// one a request arrived on) is returned as-is and never cached.
    pub async fn resolve(&self, explicit: Option<&ConnectionHandle>) -> ConnectionHandle {
        if let Some(conn) = explicit {
            return conn.clone();
        }
        self.cached.get_or_init(|| self.lookup()).await.clone()
    }

    /// The cached connection, if one has been resolved.
    pub fn cached(&self) -> Option<&ConnectionHandle> {
        self.cached.get()
    }

    async fn lookup(&self) -> ConnectionHandle {
        let wanted = self
            .settings
            .get_value(PRIVATE_CHANNEL_CONN_SETTING)
            .await
            .unwrap_or_default();
        let primary = self.transport.primary_connection();

        if wanted.is_empty() {
            info!(conn = %primary.id, "Private channel using primary conn");
            return primary;
        }

        let found = self
            .transport
            .connections()
            .into_iter()
            .filter(|conn| conn.is_main)
            .find(|conn| conn.id == wanted || conn.char_name == wanted);

        match found {
            Some(conn) => {
                info!(conn = %conn.id, "Private channel using configured conn");
                conn
            }
            None => {
                warn!(
                    "Could not find conn '{}', defaulting to primary conn",
                    wanted
                );
                primary
            }
        }
    }

    /// Refresh the choice list of the connection setting with the names of all
    /// main connections. Does not touch the cache.
    pub async fn load_connection_choices(&self) -> Result<(), SettingError> {
        let options: Vec<String> = self
            .transport
            .connections()
            .into_iter()
            .filter(|conn| conn.is_main)
            .map(|conn| conn.char_name)
            .collect();
        self.settings
            .set_options(PRIVATE_CHANNEL_CONN_SETTING, options)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conn::{CharId, MemoryTransport};
    use crate::settings::{InMemorySettings, Setting, SettingKind};
    use tracing_test::traced_test;

    fn transport() -> Arc<MemoryTransport> {
        Arc::new(MemoryTransport::new(vec![
            ConnectionHandle::new("main", CharId(1), "Relaybot"),
            ConnectionHandle::new("bot2", CharId(2), "Relaytwo"),
            ConnectionHandle::new("aux", CharId(3), "Relayaux").auxiliary(),
        ]))
    }

    async fn settings(value: &str) -> Arc<InMemorySettings> {
        let settings = Arc::new(InMemorySettings::new());
        settings
            .register(Setting::new(
                "private_channel",
                PRIVATE_CHANNEL_CONN_SETTING,
                "",
                SettingKind::Text { allow_empty: true },
                "conn",
            ))
            .await;
        settings
            .set_value(PRIVATE_CHANNEL_CONN_SETTING, value)
            .await
            .unwrap();
        settings
    }

    #[tokio::test]
    async fn empty_setting_uses_primary() {
        let resolver = ConnectionResolver::new(transport(), settings("").await);
        assert_eq!(resolver.resolve(None).await.id, "main");
    }

    #[tokio::test]
    async fn matches_by_id_or_name() {
        let by_id = ConnectionResolver::new(transport(), settings("bot2").await);
        assert_eq!(by_id.resolve(None).await.id, "bot2");

        let by_name = ConnectionResolver::new(transport(), settings("Relaytwo").await);
        assert_eq!(by_name.resolve(None).await.id, "bot2");
    }

    #[tokio::test]
    async fn auxiliary_connections_are_not_eligible() {
        let resolver = ConnectionResolver::new(transport(), settings("aux").await);
        assert_eq!(resolver.resolve(None).await.id, "main");
    }

    #[traced_test]
    #[tokio::test]
    async fn unknown_conn_falls_back_with_one_warning() {
        let resolver = ConnectionResolver::new(transport(), settings("ghost").await);
        assert_eq!(resolver.resolve(None).await.id, "main");
        assert_eq!(resolver.resolve(None).await.id, "main");

        logs_assert(|lines: &[&str]| {
            let warnings = lines
                .iter()
                .filter(|line| line.contains("Could not find conn 'ghost'"))
                .count();
            if warnings == 1 {
                Ok(())
            } else {
                Err(format!("expected 1 warning, got {warnings}"))
            }
        });
    }

    #[tokio::test]
    async fn resolution_is_cached_across_setting_changes() {
        let settings = settings("").await;
        let resolver = ConnectionResolver::new(transport(), settings.clone());
        let first = resolver.resolve(None).await;

        settings
            .set_value(PRIVATE_CHANNEL_CONN_SETTING, "bot2")
            .await
            .unwrap();
        let second = resolver.resolve(None).await;

        assert_eq!(first, second);
        assert_eq!(resolver.cached().map(|c| c.id.as_str()), Some("main"));
    }

    #[tokio::test]
    async fn explicit_connection_bypasses_cache() {
        let transport = transport();
        let resolver = ConnectionResolver::new(transport.clone(), settings("").await);
        let explicit = transport.connections()[1].clone();

        assert_eq!(resolver.resolve(Some(&explicit)).await.id, "bot2");
        assert!(resolver.cached().is_none());
        assert_eq!(resolver.resolve(None).await.id, "main");
    }

    #[tokio::test]
    async fn connect_refreshes_choices_with_main_names() {
        let settings = settings("").await;
        let resolver = ConnectionResolver::new(transport(), settings.clone());
        resolver.load_connection_choices().await.unwrap();

        let setting = settings.get(PRIVATE_CHANNEL_CONN_SETTING).await.unwrap();
        assert_eq!(setting.options, vec!["Relaybot", "Relaytwo"]);
        assert!(resolver.cached().is_none());
    }
}
