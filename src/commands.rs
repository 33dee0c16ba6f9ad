//! Command registration table and dispatch.
//!
//! Handlers declare their commands as `CommandSpec`s; the registry checks the
//! sender's access level, parses the single declared parameter and hands the
//! typed arguments to the handler.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::conn::{CharId, ConnectionHandle};
use crate::hub::MessageSender;
use crate::services::{AccessService, CharacterService};

/// Reply sent when the sender lacks the command's access level.
pub const ACCESS_DENIED: &str = "Error! Access denied.";

/// Access levels, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    All,
    Member,
    Moderator,
    Admin,
}

/// Parameter a command takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamSpec {
    None,
    /// A character name, resolved to an id before dispatch.
    Character,
    /// The rest of the line, verbatim.
    Any,
}

/// A character named in a command. `char_id` is `None` if the name did not
/// resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterRef {
    pub name: String,
    pub char_id: Option<CharId>,
}

impl CharacterRef {
    pub fn new(name: impl Into<String>, char_id: Option<CharId>) -> Self {
        Self {
            name: name.into(),
            char_id,
        }
    }
}

/// Parsed command arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandArgs {
    None,
    Character(CharacterRef),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub name: &'static str,
    pub param: ParamSpec,
    pub access_level: AccessLevel,
    pub description: &'static str,
}

impl CommandSpec {
    pub fn usage(&self) -> String {
        match self.param {
            ParamSpec::None => format!("Usage: {}", self.name),
            ParamSpec::Character => format!("Usage: {} <character>", self.name),
            ParamSpec::Any => format!("Usage: {} <message>", self.name),
        }
    }
}

/// Who issued a command and on which connection it arrived.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub sender: MessageSender,
    pub conn: Option<ConnectionHandle>,
}

impl CommandRequest {
    pub fn new(sender: MessageSender, conn: Option<ConnectionHandle>) -> Self {
        Self { sender, conn }
    }
}

/// A set of commands served by one component.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    fn commands(&self) -> Vec<CommandSpec>;

    /// Run `command`. Returns the reply to send back, if any.
    async fn execute(
        &self,
        command: &str,
        request: &CommandRequest,
        args: CommandArgs,
    ) -> Option<String>;
}

struct Registered {
    spec: CommandSpec,
    handler: Arc<dyn CommandHandler>,
}

/// Registry of available commands.
pub struct CommandRegistry {
    commands: RwLock<HashMap<String, Registered>>,
    access: Arc<dyn AccessService>,
    characters: Arc<dyn CharacterService>,
}

impl CommandRegistry {
    pub fn new(access: Arc<dyn AccessService>, characters: Arc<dyn CharacterService>) -> Self {
        Self {
            commands: RwLock::new(HashMap::new()),
            access,
            characters,
        }
    }

    /// Register every command `handler` declares. A name that is already
    /// taken keeps its first registration.
    pub async fn register(&self, handler: Arc<dyn CommandHandler>) {
        let mut commands = self.commands.write().await;
        for spec in handler.commands() {
            if commands.contains_key(spec.name) {
                warn!(command = %spec.name, "Rejected duplicate command registration");
                continue;
            }
            debug!(command = %spec.name, "Registered command");
            commands.insert(
                spec.name.to_string(),
                Registered {
                    spec,
                    handler: Arc::clone(&handler),
                },
            );
        }
    }

    /// All command names, sorted.
    pub async fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Parse and run one command line. Returns `None` for unknown commands or
    /// commands that produce no reply.
    pub async fn dispatch(&self, request: &CommandRequest, line: &str) -> Option<String> {
        let line = line.trim();
        let (name, rest) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (line, ""),
        };
        let name = name.to_lowercase();

        let (spec, handler) = {
            let commands = self.commands.read().await;
            let registered = commands.get(&name)?;
            (registered.spec.clone(), Arc::clone(&registered.handler))
        };

        if !self
            .access
            .check_access(request.sender.char_id, spec.access_level)
            .await
        {
            debug!(
                command = %name,
                sender = %request.sender.name,
                "Command access denied"
            );
            return Some(ACCESS_DENIED.to_string());
        }

        let args = match spec.param {
            ParamSpec::None => CommandArgs::None,
            ParamSpec::Any if rest.is_empty() => return Some(spec.usage()),
            ParamSpec::Any => CommandArgs::Text(rest.to_string()),
            ParamSpec::Character => {
                let Some(raw) = rest.split_whitespace().next() else {
                    return Some(spec.usage());
                };
                let name = capitalize(raw);
                let char_id = self.characters.resolve_char_to_id(&name).await;
                CommandArgs::Character(CharacterRef::new(name, char_id))
            }
        };

        handler.execute(&name, request, args).await
    }
}

fn capitalize(name: &str) -> String {
    let lower = name.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
