//! Error types for the chat relay.

/// Top-level error type for the relay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Setting error: {0}")]
    Setting(#[from] SettingError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Hub error: {0}")]
    Hub(#[from] HubError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Settings store errors.
#[derive(Debug, thiserror::Error)]
pub enum SettingError {
    #[error("Unknown setting: {0}")]
    UnknownKey(String),

    #[error("Setting {key} may not be empty")]
    EmptyNotAllowed { key: String },

    #[error("Invalid value for setting {key}: '{value}' is not one of {options:?}")]
    NotAChoice {
        key: String,
        value: String,
        options: Vec<String>,
    },

    #[error("Invalid value for setting {key}: '{value}' is not a number")]
    NotANumber { key: String, value: String },
}

/// Errors raised by the underlying chat transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection {conn} is not connected")]
    Disconnected { conn: String },
}

/// Message hub errors.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("Message source {0} is not registered")]
    UnknownSource(String),

    #[error("Message destination {0} is already registered")]
    DuplicateDestination(String),
}

/// Private channel membership failures.
///
/// The display strings are sent back verbatim as the command reply.
#[derive(Debug, thiserror::Error)]
pub enum MembershipError {
    #[error("Could not find character <highlight>{name}</highlight>.")]
    CharacterNotFound { name: String },

    #[error("<highlight>{name}</highlight> is already in the private channel.")]
    AlreadyMember { name: String },

    #[error("<highlight>{name}</highlight> is not in the private channel.")]
    NotMember { name: String },

    #[error("You do not have the required access level to kick <highlight>{name}</highlight>.")]
    InsufficientAccess { name: String },

    #[error("{0}")]
    Transport(#[from] TransportError),
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;
