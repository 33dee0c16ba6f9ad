//! `join`, `leave`, `invite`, `kick` and `kickall`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::commands::{AccessLevel, CommandArgs, CommandHandler, CommandRequest, CommandSpec, ParamSpec};
use crate::private_channel::membership::MembershipLifecycle;
use crate::private_channel::resolver::ConnectionResolver;

pub struct PrivateChannelCommands {
    resolver: Arc<ConnectionResolver>,
    membership: Arc<MembershipLifecycle>,
}

impl PrivateChannelCommands {
    pub fn new(resolver: Arc<ConnectionResolver>, membership: Arc<MembershipLifecycle>) -> Self {
        Self {
            resolver,
            membership,
        }
    }
}

#[async_trait]
impl CommandHandler for PrivateChannelCommands {
    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec {
                name: "join",
                param: ParamSpec::None,
                access_level: AccessLevel::Member,
                description: "Join the private channel",
            },
            CommandSpec {
                name: "leave",
                param: ParamSpec::None,
                access_level: AccessLevel::All,
                description: "Leave the private channel",
            },
            CommandSpec {
                name: "invite",
                param: ParamSpec::Character,
                access_level: AccessLevel::All,
                description: "Invite a character to the private channel",
            },
            CommandSpec {
                name: "kick",
                param: ParamSpec::Character,
                access_level: AccessLevel::Moderator,
                description: "Kick a character from the private channel",
            },
            CommandSpec {
                name: "kickall",
                param: ParamSpec::None,
                access_level: AccessLevel::Moderator,
                description: "Kick all characters from the private channel",
            },
        ]
    }

    async fn execute(
        &self,
        command: &str,
        request: &CommandRequest,
        args: CommandArgs,
    ) -> Option<String> {
        let conn = self.resolver.resolve(request.conn.as_ref()).await;
        let sender = &request.sender;

        let outcome = match (command, args) {
            ("join", _) => self
                .membership
                .join(sender.char_id, &conn)
                .await
                .map(|()| None)
                .map_err(|e| e.to_string()),
            ("leave", _) => self
                .membership
                .leave(sender.char_id, &conn)
                .await
                .map(|()| None)
                .map_err(|e| e.to_string()),
            ("invite", CommandArgs::Character(target)) => self
                .membership
                .invite(&target, &sender.name, &conn)
                .await
                .map(Some)
                .map_err(|e| e.to_string()),
            ("kick", CommandArgs::Character(target)) => self
                .membership
                .kick(&target, sender, &conn)
                .await
                .map(Some)
                .map_err(|e| e.to_string()),
            ("kickall", _) => self
                .membership
                .kick_all(&sender.name, &conn)
                .await
                .map(|()| None)
                .map_err(|e| e.to_string()),
            (other, _) => {
                warn!(command = %other, "Unexpected private channel command");
                Ok(None)
            }
        };

        outcome.unwrap_or_else(Some)
    }
}
