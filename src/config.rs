//! Configuration types.

use std::time::Duration;

use crate::error::ConfigError;

/// Default delay between the kick-all warning and the actual kick.
pub const DEFAULT_KICK_ALL_DELAY_SECS: u64 = 10;

/// Default page length used when the host has not registered
/// `org_channel_max_page_length` itself.
pub const DEFAULT_MAX_PAGE_LENGTH: usize = 7500;

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Scope name used when registering settings.
    pub module: String,
    /// Delay before a scheduled kick-all fires.
    pub kick_all_delay: Duration,
    /// Fallback for the max page length setting.
    pub max_page_length: usize,
    /// Initial value of the `relay_bot` setting.
    pub relay_bot: String,
    /// Initial value of the `relay_prefix` setting.
    pub relay_prefix: String,
    /// Main connection character names for the console runner. The first one
    /// is the primary connection.
    pub connections: Vec<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            module: "private_channel".to_string(),
            kick_all_delay: Duration::from_secs(DEFAULT_KICK_ALL_DELAY_SECS),
            max_page_length: DEFAULT_MAX_PAGE_LENGTH,
            relay_bot: String::new(),
            relay_prefix: String::new(),
            connections: vec!["Relaybot".to_string()],
        }
    }
}

impl RelayConfig {
    /// Build config from environment variables, falling back to defaults for
    /// anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let module = std::env::var("RELAY_MODULE").unwrap_or(defaults.module);

        let kick_all_delay = std::env::var("RELAY_KICK_ALL_DELAY_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.kick_all_delay);

        let max_page_length: usize = std::env::var("RELAY_MAX_PAGE_LENGTH")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_page_length);

        let relay_bot = std::env::var("RELAY_BOT").unwrap_or_default();
        let relay_prefix = std::env::var("RELAY_PREFIX").unwrap_or_default();

        let connections: Vec<String> = std::env::var("RELAY_CONNECTIONS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .ok()
            .filter(|names: &Vec<String>| !names.is_empty())
            .unwrap_or(defaults.connections);

        Self {
            module,
            kick_all_delay,
            max_page_length,
            relay_bot,
            relay_prefix,
            connections,
        }
    }

    /// Reject values the relay cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.module.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "RELAY_MODULE".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if self.kick_all_delay.as_secs() == 0 {
            return Err(ConfigError::InvalidValue {
                key: "RELAY_KICK_ALL_DELAY_SECS".to_string(),
                message: "must be at least one second".to_string(),
            });
        }
        if self.max_page_length == 0 {
            return Err(ConfigError::InvalidValue {
                key: "RELAY_MAX_PAGE_LENGTH".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.connections.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "RELAY_CONNECTIONS".to_string(),
                message: "at least one connection is required".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.kick_all_delay, Duration::from_secs(10));
        assert_eq!(config.max_page_length, 7500);
        assert!(config.relay_bot.is_empty());
        assert_eq!(config.connections, vec!["Relaybot"]);
    }

    #[test]
    fn validate_rejects_unusable_values() {
        assert!(RelayConfig::default().validate().is_ok());

        let config = RelayConfig {
            max_page_length: 0,
            ..RelayConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "RELAY_MAX_PAGE_LENGTH"
        ));

        let config = RelayConfig {
            kick_all_delay: Duration::ZERO,
            ..RelayConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "RELAY_KICK_ALL_DELAY_SECS"
        ));

        let config = RelayConfig {
            connections: Vec::new(),
            ..RelayConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
