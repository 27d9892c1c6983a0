#![forbid(unsafe_code)]

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, TaskflowError};
use crate::identity::DeviceId;
use crate::store::KeyValueStore;

pub const SETTINGS_KEY: &str = "@taskflow_notifications";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    pub enabled: bool,
    /// Lead time before a due date at which the "upcoming" reminder fires.
    pub reminder_minutes: u32,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            reminder_minutes: 30,
        }
    }
}

/// Whether settings are one blob per installation or one per device id.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SettingsScope {
    #[default]
    Shared,
    PerDevice,
}

pub struct NotificationSettingsStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl NotificationSettingsStore {
    pub fn new(store: Arc<dyn KeyValueStore>, scope: SettingsScope, device: &DeviceId) -> Self {
        let key = match scope {
            SettingsScope::Shared => SETTINGS_KEY.to_owned(),
            SettingsScope::PerDevice => format!("{SETTINGS_KEY}_{device}"),
        };
        Self { store, key }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Stored settings, or `Ok(None)` when nothing was saved yet.
    pub fn try_load(&self) -> Result<Option<NotificationSettings>> {
        let Some(raw) = self.store.get(&self.key)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| TaskflowError::corrupt(&self.key, e))
    }

    /// Stored settings, falling back to defaults (notifications off) when
    /// they are missing or unreadable.
    #[must_use]
    pub fn load(&self) -> NotificationSettings {
        match self.try_load() {
            Ok(Some(settings)) => settings,
            Ok(None) => NotificationSettings::default(),
            Err(e) => {
                warn!("using default notification settings: {e}");
                NotificationSettings::default()
            }
        }
    }

    pub fn save(&self, settings: &NotificationSettings) -> Result<()> {
        let raw =
            serde_json::to_string(settings).map_err(|e| TaskflowError::corrupt(&self.key, e))?;
        self.store.set(&self.key, &raw)
    }

    /// Loads, applies `change`, saves and returns the result. Corrupt
    /// settings are overwritten starting from defaults.
    pub fn update(
        &self,
        change: impl FnOnce(&mut NotificationSettings),
    ) -> Result<NotificationSettings> {
        let mut settings = match self.try_load() {
            Ok(stored) => stored.unwrap_or_default(),
            Err(e @ TaskflowError::CorruptState { .. }) => {
                warn!("replacing unreadable notification settings: {e}");
                NotificationSettings::default()
            }
            Err(e) => return Err(e),
        };
        change(&mut settings);
        self.save(&settings)?;
        Ok(settings)
    }
}
