// Host facilities the extension logic depends on
// `chrome` binds them to the browser, `fake` provides in-memory doubles for tests

use async_trait::async_trait;
use std::time::Duration;

use crate::error::GuardResult;
use crate::protocol::{Message, Response};
use crate::settings::SettingsPatch;

#[cfg(target_arch = "wasm32")]
pub mod chrome;
#[cfg(test)]
pub mod fake;

pub type TabId = i32;

/// Durable, eventually-synced key-value store holding the settings record
#[async_trait(?Send)]
pub trait SettingsStore {
    async fn load(&self) -> GuardResult<SettingsPatch>;

    /// Write the fields present in `patch`, leaving the others untouched
    async fn merge(&self, patch: &SettingsPatch) -> GuardResult<()>;
}

#[async_trait(?Send)]
pub trait Tabs {
    /// Every currently open tab
    async fn open_tabs(&self) -> GuardResult<Vec<TabId>>;

    async fn send_to_tab(&self, tab: TabId, message: &Message) -> GuardResult<Option<Response>>;

    async fn active_tab(&self) -> GuardResult<Option<TabId>>;

    async fn focus_tab(&self, tab: TabId) -> GuardResult<()>;
}

/// Text, color and tooltip shown on the extension action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadgeState {
    pub text: &'static str,
    pub color: &'static str,
    pub title: &'static str,
}

impl BadgeState {
    pub fn for_enabled(enabled: bool) -> Self {
        if enabled {
            Self {
                text: "ON",
                color: "#4CAF50",
                title: "F1-F12 Key Blocker (ENABLED)",
            }
        } else {
            Self {
                text: "OFF",
                color: "#F44336",
                title: "F1-F12 Key Blocker (DISABLED)",
            }
        }
    }
}

#[async_trait(?Send)]
pub trait Badge {
    async fn render(&self, state: &BadgeState) -> GuardResult<()>;
}

/// Request/response channel from the popup to the background context
#[async_trait(?Send)]
pub trait RuntimeChannel {
    async fn request(&self, message: &Message) -> GuardResult<Option<Response>>;
}

#[async_trait(?Send)]
pub trait Timer {
    async fn sleep(&self, duration: Duration);
}
