//! Collaborator services the relay consults: access control, character
//! lookup, bans, and optional presence/history formatting.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::commands::AccessLevel;
use crate::conn::{CharId, ConnectionHandle};

/// Access-control decisions.
#[async_trait]
pub trait AccessService: Send + Sync {
    /// Whether `char_id` holds at least `level`.
    async fn check_access(&self, char_id: CharId, level: AccessLevel) -> bool;

    /// Whether `actor` may act on `target` (e.g. kick them).
    async fn has_sufficient_access_level(&self, actor: CharId, target: CharId) -> bool;
}

/// Character name/id resolution.
#[async_trait]
pub trait CharacterService: Send + Sync {
    async fn resolve_char_to_id(&self, name: &str) -> Option<CharId>;
    async fn resolve_char_to_name(&self, char_id: CharId) -> Option<String>;
}

/// Ban lookups.
#[async_trait]
pub trait BanService: Send + Sync {
    async fn is_banned(&self, char_id: CharId) -> bool;
}

/// Richer "who is this" display used in join notices.
#[async_trait]
pub trait PresenceDisplay: Send + Sync {
    async fn char_info_display(&self, char_id: CharId, conn: &ConnectionHandle) -> String;
}

/// Logon/logoff summaries appended to join/leave notices.
#[async_trait]
pub trait LogonHistory: Send + Sync {
    async fn logon(&self, char_id: CharId) -> String;
    async fn logoff(&self, char_id: CharId) -> String;
}

/// Access levels kept in memory. Unknown characters have `AccessLevel::All`.
#[derive(Default)]
pub struct StaticAccess {
    levels: RwLock<HashMap<CharId, AccessLevel>>,
}

impl StaticAccess {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_level(&self, char_id: CharId, level: AccessLevel) {
        self.levels.write().await.insert(char_id, level);
    }

    pub async fn level(&self, char_id: CharId) -> AccessLevel {
        self.levels
            .read()
            .await
            .get(&char_id)
            .copied()
            .unwrap_or(AccessLevel::All)
    }
}

#[async_trait]
impl AccessService for StaticAccess {
    async fn check_access(&self, char_id: CharId, level: AccessLevel) -> bool {
        self.level(char_id).await >= level
    }

    async fn has_sufficient_access_level(&self, actor: CharId, target: CharId) -> bool {
        self.level(actor).await > self.level(target).await
    }
}

/// Character directory kept in memory. Name lookups are case-insensitive.
#[derive(Default)]
pub struct CharacterDirectory {
    by_name: RwLock<HashMap<String, CharId>>,
    by_id: RwLock<HashMap<CharId, String>>,
}

impl CharacterDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, char_id: CharId, name: impl Into<String>) {
        let name = name.into();
        self.by_name
            .write()
            .await
            .insert(name.to_lowercase(), char_id);
        self.by_id.write().await.insert(char_id, name);
    }

    /// Look up `name`, assigning the next free id if it is new.
    pub async fn get_or_insert(&self, name: &str) -> CharId {
        if let Some(id) = self.resolve_char_to_id(name).await {
            return id;
        }
        let next = self
            .by_id
            .read()
            .await
            .keys()
            .map(|id| id.0)
            .max()
            .unwrap_or(0)
            + 1;
        let id = CharId(next);
        self.insert(id, name).await;
        id
    }
}

#[async_trait]
impl CharacterService for CharacterDirectory {
    async fn resolve_char_to_id(&self, name: &str) -> Option<CharId> {
        self.by_name
            .read()
            .await
            .get(&name.to_lowercase())
            .copied()
    }

    async fn resolve_char_to_name(&self, char_id: CharId) -> Option<String> {
        self.by_id.read().await.get(&char_id).cloned()
    }
}

/// Ban list kept in memory.
#[derive(Default)]
pub struct BanList {
    banned: RwLock<HashSet<CharId>>,
}

impl BanList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ban `char_id`. Returns `false` if they were already banned.
    pub async fn add(&self, char_id: CharId) -> bool {
        self.banned.write().await.insert(char_id)
    }

    pub async fn remove(&self, char_id: CharId) -> bool {
        self.banned.write().await.remove(&char_id)
    }
}

#[async_trait]
impl BanService for BanList {
    async fn is_banned(&self, char_id: CharId) -> bool {
        self.banned.read().await.contains(&char_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn access_levels_compare() {
        let access = StaticAccess::new();
        access.set_level(CharId(1), AccessLevel::Moderator).await;
        access.set_level(CharId(2), AccessLevel::Member).await;

        assert!(access.check_access(CharId(1), AccessLevel::Member).await);
        assert!(!access.check_access(CharId(2), AccessLevel::Moderator).await);
        assert!(access.check_access(CharId(3), AccessLevel::All).await);

        assert!(access.has_sufficient_access_level(CharId(1), CharId(2)).await);
        assert!(!access.has_sufficient_access_level(CharId(2), CharId(1)).await);
        assert!(!access.has_sufficient_access_level(CharId(2), CharId(2)).await);
    }

    #[tokio::test]
    async fn directory_is_case_insensitive() {
        let dir = CharacterDirectory::new();
        dir.insert(CharId(7), "Alice").await;
        assert_eq!(dir.resolve_char_to_id("alice").await, Some(CharId(7)));
        assert_eq!(
            dir.resolve_char_to_name(CharId(7)).await.as_deref(),
            Some("Alice")
        );
        assert_eq!(dir.resolve_char_to_id("bob").await, None);
    }

    #[tokio::test]
    async fn get_or_insert_assigns_new_ids() {
        let dir = CharacterDirectory::new();
        dir.insert(CharId(5), "Alice").await;
        assert_eq!(dir.get_or_insert("Alice").await, CharId(5));
        assert_eq!(dir.get_or_insert("Bob").await, CharId(6));
        assert_eq!(dir.get_or_insert("bob").await, CharId(6));
    }

    #[tokio::test]
    async fn ban_list() {
        let bans = BanList::new();
        assert!(bans.add(CharId(1)).await);
        assert!(!bans.add(CharId(1)).await);
        assert!(bans.is_banned(CharId(1)).await);
        bans.remove(CharId(1)).await;
        assert!(!bans.is_banned(CharId(1)).await);
    }
}
