//! Connection handles and the chat transport they belong to.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::TransportError;

/// Numeric character id on the chat network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CharId(pub u32);

impl fmt::Display for CharId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One live network connection of the bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionHandle {
    /// Opaque connection id.
    pub id: String,
    /// Character the connection is logged in as.
    pub char_id: CharId,
    /// Display name of that character.
    pub char_name: String,
    /// Whether the connection may operate the private channel.
    pub is_main: bool,
    /// Organization the character belongs to, if any.
    pub org_name: Option<String>,
}

impl ConnectionHandle {
    pub fn new(id: impl Into<String>, char_id: CharId, char_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            char_id,
            char_name: char_name.into(),
            is_main: true,
            org_name: None,
        }
    }

    /// Mark this connection as auxiliary (not eligible for the private channel).
    pub fn auxiliary(mut self) -> Self {
        self.is_main = false;
        self
    }

    pub fn with_org_name(mut self, org_name: impl Into<String>) -> Self {
        self.org_name = Some(org_name.into());
        self
    }
}

/// The underlying chat network, as seen by the relay.
///
/// The connection inventory is fixed once the transport is connected, so it is
/// exposed synchronously. Everything that touches the network is async.
#[async_trait]
pub trait Transport: Send + Sync {
    /// All known connections, in login order.
    fn connections(&self) -> Vec<ConnectionHandle>;

    /// The process's primary connection.
    fn primary_connection(&self) -> ConnectionHandle;

    /// The connection logged in as `char_id`, if that character is one of ours.
    fn connection_by_char_id(&self, char_id: CharId) -> Option<ConnectionHandle> {
        self.connections()
            .into_iter()
            .find(|conn| conn.char_id == char_id)
    }

    /// Current private channel roster of `conn`.
    async fn private_channel_members(&self, conn: &ConnectionHandle) -> Vec<CharId>;

    async fn is_private_channel_member(&self, conn: &ConnectionHandle, char_id: CharId) -> bool {
        self.private_channel_members(conn).await.contains(&char_id)
    }

    /// Post `text` to the private channel of `conn`.
    async fn send_private_channel_message(
        &self,
        conn: &ConnectionHandle,
        text: &str,
    ) -> Result<(), TransportError>;

    /// Send a direct message to `char_id` over `conn`.
    async fn send_private_message(
        &self,
        conn: &ConnectionHandle,
        char_id: CharId,
        text: &str,
        add_color: bool,
    ) -> Result<(), TransportError>;

    async fn private_channel_invite(
        &self,
        conn: &ConnectionHandle,
        char_id: CharId,
    ) -> Result<(), TransportError>;

    async fn private_channel_kick(
        &self,
        conn: &ConnectionHandle,
        char_id: CharId,
    ) -> Result<(), TransportError>;

    async fn private_channel_kick_all(&self, conn: &ConnectionHandle) -> Result<(), TransportError>;
}

/// A transport call recorded by [`MemoryTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    ChannelMessage {
        conn: String,
        text: String,
    },
    PrivateMessage {
        conn: String,
        char_id: CharId,
        text: String,
        add_color: bool,
    },
    Invite {
        conn: String,
        char_id: CharId,
    },
    Kick {
        conn: String,
        char_id: CharId,
    },
    KickAll {
        conn: String,
    },
}

/// In-process transport: keeps rosters in memory and records every call.
///
/// Invites are treated as immediately accepted. Used by the console runner
/// and by tests.
pub struct MemoryTransport {
    connections: Vec<ConnectionHandle>,
    rosters: Mutex<HashMap<String, BTreeSet<CharId>>>,
    calls: Mutex<Vec<TransportCall>>,
    offline: Mutex<HashSet<String>>,
    echo: bool,
}

impl MemoryTransport {
    /// Create a transport over `connections`; the first one is primary.
    ///
    /// # Panics
    ///
    /// Panics if `connections` is empty. `RelayConfig::validate` rejects an
    /// empty connection list before the console runner gets here.
    pub fn new(connections: Vec<ConnectionHandle>) -> Self {
        assert!(
            !connections.is_empty(),
            "a transport needs at least one connection"
        );
        Self {
            connections,
            rosters: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            offline: Mutex::new(HashSet::new()),
            echo: false,
        }
    }

    /// Log every outbound call at info level.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Put `char_id` into the roster of `conn` without recording a call.
    pub async fn add_member(&self, conn: &ConnectionHandle, char_id: CharId) {
        self.rosters
            .lock()
            .await
            .entry(conn.id.clone())
            .or_default()
            .insert(char_id);
    }

    pub async fn remove_member(&self, conn: &ConnectionHandle, char_id: CharId) {
        if let Some(roster) = self.rosters.lock().await.get_mut(&conn.id) {
            roster.remove(&char_id);
        }
    }

    /// Every call recorded so far.
    pub async fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().await.clone()
    }

    /// Mark `conn_id` offline; every call on it then fails with
    /// [`TransportError::Disconnected`].
    pub async fn set_online(&self, conn_id: &str, online: bool) {
        let mut offline = self.offline.lock().await;
        if online {
            offline.remove(conn_id);
        } else {
            offline.insert(conn_id.to_string());
        }
    }

    async fn ensure_online(&self, conn: &ConnectionHandle) -> Result<(), TransportError> {
        if self.offline.lock().await.contains(&conn.id) {
            return Err(TransportError::Disconnected {
                conn: conn.id.clone(),
            });
        }
        Ok(())
    }

    async fn record(&self, call: TransportCall) {
        if self.echo {
            info!(call = ?call, "transport");
        }
        self.calls.lock().await.push(call);
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn connections(&self) -> Vec<ConnectionHandle> {
        self.connections.clone()
    }

    fn primary_connection(&self) -> ConnectionHandle {
        self.connections[0].clone()
    }

    async fn private_channel_members(&self, conn: &ConnectionHandle) -> Vec<CharId> {
        self.rosters
            .lock()
            .await
            .get(&conn.id)
            .map(|roster| roster.iter().copied().collect())
            .unwrap_or_default()
    }

    async fn send_private_channel_message(
        &self,
        conn: &ConnectionHandle,
        text: &str,
    ) -> Result<(), TransportError> {
        self.ensure_online(conn).await?;
        self.record(TransportCall::ChannelMessage {
            conn: conn.id.clone(),
            text: text.to_string(),
        })
        .await;
        Ok(())
    }

    async fn send_private_message(
        &self,
        conn: &ConnectionHandle,
        char_id: CharId,
        text: &str,
        add_color: bool,
    ) -> Result<(), TransportError> {
        self.ensure_online(conn).await?;
        self.record(TransportCall::PrivateMessage {
            conn: conn.id.clone(),
            char_id,
            text: text.to_string(),
            add_color,
        })
        .await;
        Ok(())
    }

    async fn private_channel_invite(
        &self,
        conn: &ConnectionHandle,
        char_id: CharId,
    ) -> Result<(), TransportError> {
        self.ensure_online(conn).await?;
        self.add_member(conn, char_id).await;
        self.record(TransportCall::Invite {
            conn: conn.id.clone(),
            char_id,
        })
        .await;
        Ok(())
    }

    async fn private_channel_kick(
        &self,
        conn: &ConnectionHandle,
        char_id: CharId,
    ) -> Result<(), TransportError> {
        self.ensure_online(conn).await?;
        self.remove_member(conn, char_id).await;
        self.record(TransportCall::Kick {
            conn: conn.id.clone(),
            char_id,
        })
        .await;
        Ok(())
    }

    async fn private_channel_kick_all(&self, conn: &ConnectionHandle) -> Result<(), TransportError> {
        self.ensure_online(conn).await?;
        self.rosters.lock().await.remove(&conn.id);
        self.record(TransportCall::KickAll {
            conn: conn.id.clone(),
        })
        .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> MemoryTransport {
        MemoryTransport::new(vec![
            ConnectionHandle::new("main", CharId(1), "Relaybot"),
            ConnectionHandle::new("slave1", CharId(2), "Relayhelper").auxiliary(),
        ])
    }

    #[test]
    fn first_connection_is_primary() {
        let t = transport();
        assert_eq!(t.primary_connection().id, "main");
        assert_eq!(t.connections().len(), 2);
    }

    #[test]
    fn connection_by_char_id_finds_own_characters() {
        let t = transport();
        assert_eq!(t.connection_by_char_id(CharId(2)).unwrap().id, "slave1");
        assert!(t.connection_by_char_id(CharId(99)).is_none());
    }

    #[tokio::test]
    async fn invite_and_kick_update_roster() {
        let t = transport();
        let conn = t.primary_connection();

        t.private_channel_invite(&conn, CharId(10)).await.unwrap();
        t.private_channel_invite(&conn, CharId(11)).await.unwrap();
        assert!(t.is_private_channel_member(&conn, CharId(10)).await);

        t.private_channel_kick(&conn, CharId(10)).await.unwrap();
        assert_eq!(t.private_channel_members(&conn).await, vec![CharId(11)]);

        t.private_channel_kick_all(&conn).await.unwrap();
        assert!(t.private_channel_members(&conn).await.is_empty());
        assert_eq!(t.calls().await.len(), 4);
    }

    #[tokio::test]
    async fn offline_connection_rejects_calls() {
        let t = transport();
        let conn = t.primary_connection();
        t.set_online("main", false).await;

        let err = t.private_channel_invite(&conn, CharId(10)).await.unwrap_err();
        assert!(matches!(err, TransportError::Disconnected { ref conn } if conn == "main"));
        assert!(t.calls().await.is_empty());
        assert!(!t.is_private_channel_member(&conn, CharId(10)).await);

        t.set_online("main", true).await;
        t.send_private_channel_message(&conn, "back").await.unwrap();
        assert_eq!(t.calls().await.len(), 1);
    }

    #[test]
    #[should_panic(expected = "at least one connection")]
    fn empty_connection_list_panics() {
        MemoryTransport::new(Vec::new());
    }
}
