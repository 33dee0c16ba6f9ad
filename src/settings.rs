//! Bot settings: registration, lookup and validated updates.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::SettingError;

/// How a setting's value is validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SettingKind {
    /// Free text. `options` are suggestions only.
    Text { allow_empty: bool },
    /// Value must be one of `options`.
    Choice,
    /// Non-negative integer.
    Number,
}

/// A registered setting.
#[derive(Debug, Clone, Serialize)]
pub struct Setting {
    pub module: String,
    pub key: String,
    pub kind: SettingKind,
    pub value: String,
    pub default: String,
    /// Valid values for choice settings, suggestions for text settings.
    pub options: Vec<String>,
    pub description: String,
    pub extended_description: Option<String>,
}

impl Setting {
    pub fn new(
        module: impl Into<String>,
        key: impl Into<String>,
        default: impl Into<String>,
        kind: SettingKind,
        description: impl Into<String>,
    ) -> Self {
        let default = default.into();
        Self {
            module: module.into(),
            key: key.into(),
            kind,
            value: default.clone(),
            default,
            options: Vec::new(),
            description: description.into(),
            extended_description: None,
        }
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_extended_description(mut self, text: impl Into<String>) -> Self {
        self.extended_description = Some(text.into());
        self
    }

    /// Check `value` against this setting's kind.
    pub fn validate(&self, value: &str) -> Result<(), SettingError> {
        match &self.kind {
            SettingKind::Text { allow_empty } => {
                if value.is_empty() && !allow_empty {
                    return Err(SettingError::EmptyNotAllowed {
                        key: self.key.clone(),
                    });
                }
            }
            SettingKind::Choice => {
                if !self.options.iter().any(|o| o == value) {
                    return Err(SettingError::NotAChoice {
                        key: self.key.clone(),
                        value: value.to_string(),
                        options: self.options.clone(),
                    });
                }
            }
            SettingKind::Number => {
                if value.parse::<u64>().is_err() {
                    return Err(SettingError::NotANumber {
                        key: self.key.clone(),
                        value: value.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Settings collaborator. Implementations are expected to be safe to share
/// across tasks.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Register a setting. Registering an existing key keeps its current value
    /// and refreshes the metadata.
    async fn register(&self, setting: Setting);

    async fn get(&self, key: &str) -> Option<Setting>;

    /// Current value of `key`, or `None` if it was never registered.
    async fn get_value(&self, key: &str) -> Option<String> {
        self.get(key).await.map(|s| s.value)
    }

    async fn set_value(&self, key: &str, value: &str) -> Result<(), SettingError>;

    /// Replace the option list of `key`.
    async fn set_options(&self, key: &str, options: Vec<String>) -> Result<(), SettingError>;
}

/// In-memory settings store.
pub struct InMemorySettings {
    settings: RwLock<HashMap<String, Setting>>,
}

impl InMemorySettings {
    pub fn new() -> Self {
        Self {
            settings: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemorySettings {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SettingsStore for InMemorySettings {
    async fn register(&self, mut setting: Setting) {
        let mut settings = self.settings.write().await;
        if let Some(existing) = settings.get(&setting.key) {
            setting.value = existing.value.clone();
        }
        debug!(key = %setting.key, module = %setting.module, "Registered setting");
        settings.insert(setting.key.clone(), setting);
    }

    async fn get(&self, key: &str) -> Option<Setting> {
        self.settings.read().await.get(key).cloned()
    }

    async fn set_value(&self, key: &str, value: &str) -> Result<(), SettingError> {
        let mut settings = self.settings.write().await;
        let setting = settings
            .get_mut(key)
            .ok_or_else(|| SettingError::UnknownKey(key.to_string()))?;
        setting.validate(value)?;
        setting.value = value.to_string();
        debug!(key = %key, value = %value, "Setting updated");
        Ok(())
    }

    async fn set_options(&self, key: &str, options: Vec<String>) -> Result<(), SettingError> {
        let mut settings = self.settings.write().await;
        let setting = settings
            .get_mut(key)
            .ok_or_else(|| SettingError::UnknownKey(key.to_string()))?;
        setting.options = options;
        Ok(())
    }
}
