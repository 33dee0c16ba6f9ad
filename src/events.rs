//! Bot events and the handler table they are dispatched through.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::conn::{CharId, ConnectionHandle};
use crate::error::Result;
use crate::text::MessageBody;

/// Something that happened in a private channel.
#[derive(Debug, Clone)]
pub enum PrivateChannelEvent {
    Joined {
        char_id: CharId,
        name: String,
        conn: ConnectionHandle,
    },
    Left {
        char_id: CharId,
        name: String,
        conn: ConnectionHandle,
    },
    /// Chat posted by a member.
    Message {
        char_id: CharId,
        name: String,
        conn: ConnectionHandle,
        message: String,
    },
    /// Output of a command run in the channel. `sender` is `None` when the
    /// bot itself produced it.
    Command {
        sender: Option<(CharId, String)>,
        conn: ConnectionHandle,
        message: MessageBody,
    },
}

/// Events the relay reacts to.
#[derive(Debug, Clone)]
pub enum BotEvent {
    /// The transport's connection inventory is ready.
    Connect,
    BanAdded { char_id: CharId },
    PrivateChannel(PrivateChannelEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connect,
    BanAdded,
    PrivateChannelJoined,
    PrivateChannelLeft,
    PrivateChannelMessage,
    PrivateChannelCommand,
}

impl BotEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            BotEvent::Connect => EventKind::Connect,
            BotEvent::BanAdded { .. } => EventKind::BanAdded,
            BotEvent::PrivateChannel(event) => match event {
                PrivateChannelEvent::Joined { .. } => EventKind::PrivateChannelJoined,
                PrivateChannelEvent::Left { .. } => EventKind::PrivateChannelLeft,
                PrivateChannelEvent::Message { .. } => EventKind::PrivateChannelMessage,
                PrivateChannelEvent::Command { .. } => EventKind::PrivateChannelCommand,
            },
        }
    }
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handler name, for logs.
    fn name(&self) -> &str;

    async fn handle(&self, event: &BotEvent) -> Result<()>;
}

/// Event kind → handlers, built once at startup.
#[derive(Default)]
pub struct EventRouter {
    handlers: HashMap<EventKind, Vec<Arc<dyn EventHandler>>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        debug!(kind = ?kind, handler = %handler.name(), "Registered event handler");
        self.handlers.entry(kind).or_default().push(handler);
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }

    /// Run every handler for `event` in registration order. A failing handler
    /// is logged and does not stop the rest.
    pub async fn dispatch(&self, event: &BotEvent) {
        let kind = event.kind();
        let Some(handlers) = self.handlers.get(&kind) else {
            return;
        };
        for handler in handlers {
            if let Err(e) = handler.handle(event).await {
                warn!(
                    kind = ?kind,
                    handler = %handler.name(),
                    error = %e,
                    "Event handler failed"
                );
            }
        }
    }
}
