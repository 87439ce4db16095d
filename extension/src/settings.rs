// Persisted settings: one flag plus install metadata in the host's sync store

use serde::{Deserialize, Serialize};

use crate::error::GuardResult;
use crate::host::SettingsStore;

pub const KEY_ENABLED: &str = "keyBlockerEnabled";
pub const KEY_INSTALL_DATE: &str = "installDate";
pub const KEY_VERSION: &str = "version";

/// Raw record as stored; every field may be absent
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SettingsPatch {
    #[serde(rename = "keyBlockerEnabled", default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(rename = "installDate", default, skip_serializing_if = "Option::is_none")]
    pub install_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl SettingsPatch {
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Self::default()
        }
    }

    pub fn version(version: impl Into<String>) -> Self {
        Self {
            version: Some(version.into()),
            ..Self::default()
        }
    }

    /// Defaults written on first install
    pub fn install_defaults(install_date: i64, version: impl Into<String>) -> Self {
        Self {
            enabled: Some(true),
            install_date: Some(install_date),
            version: Some(version.into()),
        }
    }

    /// Overlay the fields present in `other`
    pub fn merge(&mut self, other: &SettingsPatch) {
        if let Some(enabled) = other.enabled {
            self.enabled = Some(enabled);
        }
        if let Some(install_date) = other.install_date {
            self.install_date = Some(install_date);
        }
        if let Some(version) = &other.version {
            self.version = Some(version.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.is_none() && self.install_date.is_none() && self.version.is_none()
    }
}

/// Resolved view of the singleton setting
#[derive(Clone, Debug, PartialEq)]
pub struct Setting {
    pub enabled: bool,
    pub install_date: Option<i64>,
    pub version: Option<String>,
}

impl Setting {
    /// An unset flag means enabled; only an explicit `false` disables
    pub fn from_record(record: SettingsPatch) -> Self {
        Self {
            enabled: record.enabled != Some(false),
            install_date: record.install_date,
            version: record.version,
        }
    }
}

impl Default for Setting {
    fn default() -> Self {
        Self::from_record(SettingsPatch::default())
    }
}

/// Read the setting, degrading to `Setting::default()` when the store fails
pub async fn load_or_default(store: &dyn SettingsStore) -> Setting {
    match load(store).await {
        Ok(setting) => setting,
        Err(e) => {
            log::warn!("Could not load settings, using defaults: {}", e);
            Setting::default()
        }
    }
}

pub async fn load(store: &dyn SettingsStore) -> GuardResult<Setting> {
    Ok(Setting::from_record(store.load().await?))
}
