//! Message hub: publish/subscribe router between channel types.
//!
//! Bridges register as sources (things that publish) and destinations (things
//! that receive). `LocalHub` is the in-process router used by the binary and
//! tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::conn::CharId;
use crate::error::{HubError, Result};

/// Well-known hub source names.
pub mod sources {
    pub const PRIVATE_CHANNEL: &str = "private_channel";
    pub const TELL_RELAY: &str = "tell_relay";
    pub const ORG_CHANNEL: &str = "org_channel";
    pub const DISCORD: &str = "discord";
    pub const WEBSOCKET_RELAY: &str = "websocket_relay";
    pub const BROADCAST: &str = "broadcast";
    pub const RAFFLE: &str = "raffle";
    pub const SHUTDOWN_NOTICE: &str = "shutdown_notice";
    pub const RAID: &str = "raid";
    pub const TIMERS: &str = "timers";
    pub const ALLIANCE: &str = "alliance";
}

/// Who sent a relayed message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageSender {
    pub char_id: CharId,
    pub name: String,
}

impl MessageSender {
    pub fn new(char_id: CharId, name: impl Into<String>) -> Self {
        Self {
            char_id,
            name: name.into(),
        }
    }
}

/// A unit of hub traffic. `sender` is `None` for system notices.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub source: String,
    pub sender: Option<MessageSender>,
    pub prefix: Option<String>,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(source: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            sender: None,
            prefix: None,
            body: body.into(),
            sent_at: Utc::now(),
        }
    }

    pub fn with_sender(mut self, sender: Option<MessageSender>) -> Self {
        self.sender = sender;
        self
    }

    pub fn with_prefix(mut self, prefix: Option<String>) -> Self {
        self.prefix = prefix;
        self
    }

    /// Render as `"{prefix} {sender}: {body}"`, omitting absent parts.
    pub fn formatted(&self) -> String {
        let mut out = String::new();
        if let Some(prefix) = self.prefix.as_deref().filter(|p| !p.is_empty()) {
            out.push_str(prefix);
            out.push(' ');
        }
        if let Some(sender) = &self.sender {
            out.push_str(&sender.name);
            out.push_str(": ");
        }
        out.push_str(&self.body);
        out
    }
}

/// What a destination receives for each delivered message.
#[derive(Debug, Clone)]
pub struct HubContext {
    pub message: ChatMessage,
    pub formatted_message: String,
}

impl HubContext {
    pub fn new(message: ChatMessage) -> Self {
        let formatted_message = message.formatted();
        Self {
            message,
            formatted_message,
        }
    }
}

/// A hub destination handler.
#[async_trait]
pub trait HubDestination: Send + Sync {
    async fn deliver(&self, ctx: &HubContext) -> Result<()>;
}

/// Registration and publish contract of the hub.
#[async_trait]
pub trait MessageHub: Send + Sync {
    async fn register_source(&self, name: &str);

    /// Register `handler` to receive messages from `sources`. Messages from
    /// `own_sources` are never delivered back to it.
    async fn register_destination(
        &self,
        name: &str,
        handler: Arc<dyn HubDestination>,
        sources: &[&str],
        own_sources: &[&str],
    ) -> std::result::Result<(), HubError>;

    async fn send_message(&self, message: ChatMessage) -> std::result::Result<(), HubError>;
}

struct Destination {
    handler: Arc<dyn HubDestination>,
    sources: HashSet<String>,
    own_sources: HashSet<String>,
}

/// In-process hub. Delivery is sequential, in destination name order.
pub struct LocalHub {
    sources: RwLock<HashSet<String>>,
    destinations: RwLock<BTreeMap<String, Destination>>,
}

impl LocalHub {
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(HashSet::new()),
            destinations: RwLock::new(BTreeMap::new()),
        }
    }

    pub async fn has_source(&self, name: &str) -> bool {
        self.sources.read().await.contains(name)
    }

    pub async fn destination_names(&self) -> Vec<String> {
        self.destinations.read().await.keys().cloned().collect()
    }
}

impl Default for LocalHub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageHub for LocalHub {
    async fn register_source(&self, name: &str) {
        self.sources.write().await.insert(name.to_string());
        debug!(source = %name, "Registered hub source");
    }

    async fn register_destination(
        &self,
        name: &str,
        handler: Arc<dyn HubDestination>,
        sources: &[&str],
        own_sources: &[&str],
    ) -> std::result::Result<(), HubError> {
        let mut destinations = self.destinations.write().await;
        if destinations.contains_key(name) {
            return Err(HubError::DuplicateDestination(name.to_string()));
        }
        destinations.insert(
            name.to_string(),
            Destination {
                handler,
                sources: sources.iter().map(|s| s.to_string()).collect(),
                own_sources: own_sources.iter().map(|s| s.to_string()).collect(),
            },
        );
        debug!(destination = %name, sources = ?sources, "Registered hub destination");
        Ok(())
    }

    async fn send_message(&self, message: ChatMessage) -> std::result::Result<(), HubError> {
        if !self.has_source(&message.source).await {
            return Err(HubError::UnknownSource(message.source));
        }

        // Snapshot handlers so delivery never holds the registry lock.
        let targets: Vec<(String, Arc<dyn HubDestination>)> = self
            .destinations
            .read()
            .await
            .iter()
            .filter(|(_, d)| {
                d.sources.contains(&message.source) && !d.own_sources.contains(&message.source)
            })
            .map(|(name, d)| (name.clone(), Arc::clone(&d.handler)))
            .collect();

        let ctx = HubContext::new(message);
        for (name, handler) in targets {
            if let Err(e) = handler.deliver(&ctx).await {
                warn!(
                    destination = %name,
                    source = %ctx.message.source,
                    error = %e,
                    "Hub delivery failed"
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, TransportError};
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        received: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl HubDestination for Recorder {
        async fn deliver(&self, ctx: &HubContext) -> Result<()> {
            self.received
                .lock()
                .await
                .push(ctx.formatted_message.clone());
            if self.fail {
                return Err(Error::Transport(TransportError::Disconnected {
                    conn: "test".into(),
                }));
            }
            Ok(())
        }
    }

    #[test]
    fn formatting_omits_absent_parts() {
        let plain = ChatMessage::new("raid", "Raid starting");
        assert_eq!(plain.formatted(), "Raid starting");

        let full = ChatMessage::new("private_channel", "hello")
            .with_sender(Some(MessageSender::new(CharId(5), "Alice")))
            .with_prefix(Some("[Priv]".into()));
        assert_eq!(full.formatted(), "[Priv] Alice: hello");

        let empty_prefix = ChatMessage::new("x", "hi").with_prefix(Some(String::new()));
        assert_eq!(empty_prefix.formatted(), "hi");
    }

    #[tokio::test]
    async fn unknown_source_is_rejected() {
        let hub = LocalHub::new();
        let err = hub
            .send_message(ChatMessage::new("nowhere", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::UnknownSource(s) if s == "nowhere"));
    }

    #[tokio::test]
    async fn delivers_only_to_subscribers_and_not_back_to_owner() {
        let hub = LocalHub::new();
        hub.register_source("a").await;
        hub.register_source("b").await;

        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        hub.register_destination("a", a.clone(), &["a", "b"], &["a"])
            .await
            .unwrap();
        hub.register_destination("b", b.clone(), &["a"], &["b"])
            .await
            .unwrap();

        hub.send_message(ChatMessage::new("a", "from a")).await.unwrap();
        hub.send_message(ChatMessage::new("b", "from b")).await.unwrap();

        assert_eq!(*a.received.lock().await, vec!["from b"]);
        assert_eq!(*b.received.lock().await, vec!["from a"]);
    }

    #[tokio::test]
    async fn failing_destination_does_not_block_others() {
        let hub = LocalHub::new();
        hub.register_source("src").await;

        let failing = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let ok = Arc::new(Recorder::default());
        hub.register_destination("1_failing", failing.clone(), &["src"], &[])
            .await
            .unwrap();
        hub.register_destination("2_ok", ok.clone(), &["src"], &[])
            .await
            .unwrap();

        hub.send_message(ChatMessage::new("src", "x")).await.unwrap();
        assert_eq!(ok.received.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_destination_is_rejected() {
        let hub = LocalHub::new();
        let r = Arc::new(Recorder::default());
        hub.register_destination("d", r.clone(), &[], &[]).await.unwrap();
        assert!(matches!(
            hub.register_destination("d", r, &[], &[]).await,
            Err(HubError::DuplicateDestination(_))
        ));
    }

    #[test]
    fn chat_message_serializes_sender_and_timestamp() {
        let msg = ChatMessage::new(sources::PRIVATE_CHANNEL, "hi")
            .with_sender(Some(MessageSender::new(CharId(7), "Bob")));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["source"], "private_channel");
        assert_eq!(json["sender"]["char_id"], 7);
        assert_eq!(json["sender"]["name"], "Bob");
        assert!(json["prefix"].is_null());
        assert!(json["sent_at"].is_string());
    }
}
