// Background relay between persisted settings and every open page
// Owns the install/update lifecycle and the action badge

use crate::error::{GuardError, GuardResult};
use crate::host::{Badge, BadgeState, SettingsStore, Tabs};
use crate::protocol::{Message, Response, StatusSnapshot};
use crate::settings::{self, SettingsPatch};

/// `runtime.onInstalled` reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallReason {
    Install,
    Update,
    /// `chrome_update`, `shared_module_update`, ...
    Other(String),
}

impl InstallReason {
    pub fn parse(reason: &str) -> Self {
        match reason {
            "install" => InstallReason::Install,
            "update" => InstallReason::Update,
            other => InstallReason::Other(other.to_string()),
        }
    }
}

/// Outcome of one best-effort broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

impl BroadcastReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed
    }
}

pub struct Coordinator<S, T, B> {
    store: S,
    tabs: T,
    badge: B,
    version: String,
    fallback_version: String,
}

impl<S: SettingsStore, T: Tabs, B: Badge> Coordinator<S, T, B> {
    pub fn new(
        store: S,
        tabs: T,
        badge: B,
        version: impl Into<String>,
        fallback_version: impl Into<String>,
    ) -> Self {
        Self {
            store,
            tabs,
            badge,
            version: version.into(),
            fallback_version: fallback_version.into(),
        }
    }

    /// Install writes the defaults; update only refreshes the stored version.
    /// `now_ms` is the install timestamp.
    pub async fn on_installed(&self, reason: InstallReason, now_ms: i64) {
        match reason {
            InstallReason::Install => {
                let defaults = SettingsPatch::install_defaults(now_ms, self.version.clone());
                if let Err(e) = self.store.merge(&defaults).await {
                    log::error!("Could not write default settings: {}", e);
                }
                log::info!("Extension installed with default settings");
                self.refresh_badge().await;
                log::info!("Welcome to F1-F12 Key Blocker! Function keys are now blocked by default.");
            }
            InstallReason::Update => {
                log::info!("Extension updated to version: {}", self.version);
                if let Err(e) = self.store.merge(&SettingsPatch::version(self.version.clone())).await {
                    log::warn!("Could not record updated version: {}", e);
                }
                self.refresh_badge().await;
            }
            InstallReason::Other(reason) => {
                log::debug!("Ignoring onInstalled reason: {}", reason);
            }
        }
    }

    pub async fn handle_message(&self, message: Message) -> Response {
        match message {
            Message::Toggle { enabled } => {
                self.set_enabled(enabled).await;
                Response::Toggled {
                    success: true,
                    enabled,
                }
            }
            Message::GetStatus => Response::Status(self.status().await),
            Message::UpdateSettings { settings } => {
                self.update_settings(settings).await;
                Response::Ack { success: true }
            }
            Message::Ping => Response::Ack { success: true },
        }
    }

    /// Entry point for raw JSON payloads; unknown kinds get an error marker
    pub async fn handle_raw(&self, raw: &str) -> Response {
        self.dispatch(Message::from_json(raw)).await
    }

    /// Same as [`Self::handle_raw`] for a payload the host already parsed
    pub async fn handle_value(&self, raw: serde_json::Value) -> Response {
        self.dispatch(Message::from_value(raw)).await
    }

    async fn dispatch(&self, parsed: GuardResult<Message>) -> Response {
        match parsed {
            Ok(message) => self.handle_message(message).await,
            Err(e) => {
                if let GuardError::UnknownMessageKind(kind) = &e {
                    log::warn!("Unknown message type: {}", kind);
                }
                Response::error(&e)
            }
        }
    }

    /// Current `{enabled, version}`; an unreadable store reports the safe
    /// default with the fallback version
    pub async fn status(&self) -> StatusSnapshot {
        match settings::load(&self.store).await {
            Ok(setting) => StatusSnapshot {
                enabled: setting.enabled,
                version: Some(self.version.clone()),
            },
            Err(e) => {
                log::error!("Error getting status: {}", e);
                StatusSnapshot {
                    enabled: true,
                    version: Some(self.fallback_version.clone()),
                }
            }
        }
    }

    /// Persist `enabled`, refresh the badge and relay it to every page
    pub async fn set_enabled(&self, enabled: bool) -> BroadcastReport {
        if let Err(e) = self.store.merge(&SettingsPatch::enabled(enabled)).await {
            log::error!("Could not persist toggle, relaying anyway: {}", e);
        }
        self.refresh_badge().await;
        let report = self.broadcast(&Message::Toggle { enabled }).await;
        log::info!(
            "Key blocker toggled: {} ({}/{} tabs reached)",
            if enabled { "ENABLED" } else { "DISABLED" },
            report.delivered,
            report.attempted()
        );
        report
    }

    async fn update_settings(&self, patch: SettingsPatch) {
        if patch.is_empty() {
            log::debug!("Ignoring empty settings update");
            return;
        }
        if let Err(e) = self.store.merge(&patch).await {
            log::error!("Could not persist settings update: {}", e);
        }
        if let Some(enabled) = patch.enabled {
            self.broadcast(&Message::Toggle { enabled }).await;
            self.refresh_badge().await;
        }
    }

    /// Send `message` to every open tab independently; a tab without a
    /// receiver is counted and skipped
    pub async fn broadcast(&self, message: &Message) -> BroadcastReport {
        let tabs = match self.tabs.open_tabs().await {
            Ok(tabs) => tabs,
            Err(e) => {
                log::error!("Error broadcasting to content scripts: {}", e);
                return BroadcastReport::default();
            }
        };

        let mut report = BroadcastReport::default();
        for tab in tabs {
            match self.tabs.send_to_tab(tab, message).await {
                Ok(_) => report.delivered += 1,
                Err(e) => {
                    log::debug!("Skipping tab {}: {}", tab, e);
                    report.failed += 1;
                }
            }
        }
        report
    }

    pub async fn refresh_badge(&self) {
        let status = self.status().await;
        if let Err(e) = self.badge.render(&BadgeState::for_enabled(status.enabled)).await {
            log::error!("Error updating badge: {}", e);
        }
    }
}
