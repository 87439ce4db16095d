// Popup control surface
// Holds no durable state: everything shown is either what the coordinator
// accepted or a documented fallback

use futures::{Stream, StreamExt};
use std::cell::{Cell, RefCell};

use crate::config::{GuardConfig, MessagingConfig, PanelConfig};
use crate::error::{GuardError, GuardResult};
use crate::host::{RuntimeChannel, SettingsStore, Tabs, Timer};
use crate::page_guard::is_function_key_label;
use crate::protocol::{Message, Response};
use crate::retry::{retry, with_timeout};
use crate::settings;

#[cfg(all(target_arch = "wasm32", feature = "popup"))]
pub mod ui;

pub type NoticeId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Error,
}

/// Transient feedback line; each one lives on its own timer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub id: NoticeId,
    pub text: String,
    pub kind: NoticeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PanelView {
    pub enabled: bool,
    pub version: String,
    pub busy: bool,
    pub notices: Vec<Notice>,
}

impl PanelView {
    pub fn status_text(&self) -> &'static str {
        if self.enabled {
            "Function keys are blocked"
        } else {
            "Function keys are active"
        }
    }

    pub fn version_label(&self) -> String {
        format!("v{}", self.version)
    }

    pub fn test_button_label(&self) -> &'static str {
        if self.busy {
            "Updating..."
        } else if self.enabled {
            "Test on this page"
        } else {
            "Enable first to test"
        }
    }

    pub fn test_button_enabled(&self) -> bool {
        self.enabled && !self.busy
    }
}

/// Which fallback tier produced the displayed status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusSource {
    Coordinator,
    Store,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub accepted: bool,
    pub notice: NoticeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestOutcome {
    pub focused: bool,
    pub notice: NoticeId,
}

pub struct ControlPanel<C, S, T, M> {
    channel: C,
    store: S,
    tabs: T,
    timer: M,
    messaging: MessagingConfig,
    panel: PanelConfig,
    manifest_version: Option<String>,
    view: RefCell<PanelView>,
    next_notice: Cell<NoticeId>,
}

impl<C, S, T, M> ControlPanel<C, S, T, M>
where
    C: RuntimeChannel,
    S: SettingsStore,
    T: Tabs,
    M: Timer,
{
    pub fn new(
        channel: C,
        store: S,
        tabs: T,
        timer: M,
        config: &GuardConfig,
        manifest_version: Option<String>,
    ) -> Self {
        let view = PanelView {
            enabled: true,
            version: config.panel.fallback_version.clone(),
            busy: false,
            notices: Vec::new(),
        };
        Self {
            channel,
            store,
            tabs,
            timer,
            messaging: config.messaging.clone(),
            panel: config.panel.clone(),
            manifest_version,
            view: RefCell::new(view),
            next_notice: Cell::new(1),
        }
    }

    pub fn view(&self) -> PanelView {
        self.view.borrow().clone()
    }

    /// Probe the background, then load the status; never fails
    pub async fn initialize(&self) -> StatusSource {
        self.wait_until_ready().await;
        let source = self.load_status().await;
        log::info!("Popup initialized ({:?})", source);
        source
    }

    /// Round-trip to the coordinator with a hard timeout
    async fn request(&self, message: &Message) -> GuardResult<Response> {
        with_timeout(&self.timer, self.messaging.timeout(), async {
            self.channel
                .request(message)
                .await?
                .ok_or_else(|| GuardError::ChannelUnavailable("empty response".to_string()))
        })
        .await
    }

    /// Bounded liveness probing; any answer counts as ready
    pub async fn wait_until_ready(&self) -> bool {
        let policy = self.messaging.probe_policy();
        let probe = retry(policy, &self.timer, |attempt| async move {
            self.request(&Message::Ping).await.map_err(|e| {
                log::info!(
                    "Background script not ready, attempt {}/{}: {}",
                    attempt,
                    policy.max_attempts,
                    e
                );
                e
            })
        })
        .await;

        match probe {
            Ok(_) => {
                log::info!("Background script is ready");
                true
            }
            Err(_) => {
                log::warn!("Background script may not be fully ready, proceeding anyway");
                false
            }
        }
    }

    /// Coordinator first, then the store directly, then hardcoded defaults
    pub async fn load_status(&self) -> StatusSource {
        let fallback_version = || {
            self.manifest_version
                .clone()
                .unwrap_or_else(|| self.panel.fallback_version.clone())
        };

        let from_coordinator = match self.request(&Message::GetStatus).await {
            Ok(Response::Status(status)) => Ok((status.enabled, status.version)),
            Ok(Response::Toggled { enabled, .. }) => Ok((enabled, None)),
            Ok(other) => Err(GuardError::Malformed(format!("invalid status response: {:?}", other))),
            Err(e) => Err(e),
        };

        let (enabled, version, source) = match from_coordinator {
            Ok((enabled, version)) => (
                enabled,
                version.unwrap_or_else(fallback_version),
                StatusSource::Coordinator,
            ),
            Err(e) => {
                log::error!("Error loading status: {}", e);
                match settings::load(&self.store).await {
                    Ok(setting) => (setting.enabled, fallback_version(), StatusSource::Store),
                    Err(store_err) => {
                        log::error!("Storage fallback also failed: {}", store_err);
                        (true, self.panel.fallback_version.clone(), StatusSource::Default)
                    }
                }
            }
        };

        let mut view = self.view.borrow_mut();
        view.enabled = enabled;
        view.version = version;
        source
    }

    /// Ask the coordinator to switch blocking; the view only changes once the
    /// coordinator has accepted
    pub async fn toggle(&self, enabled: bool) -> ToggleOutcome {
        self.view.borrow_mut().busy = true;

        let result = match self.request(&Message::Toggle { enabled }).await {
            Ok(response) if response.is_success() => Ok(()),
            Ok(Response::Error { error }) => Err(GuardError::Rejected(error)),
            Ok(other) => Err(GuardError::Rejected(format!("{:?}", other))),
            Err(e) => Err(e),
        };

        self.view.borrow_mut().busy = false;

        match result {
            Ok(()) => {
                self.view.borrow_mut().enabled = enabled;
                let text = if enabled {
                    "Function keys blocked"
                } else {
                    "Function keys unblocked"
                };
                ToggleOutcome {
                    accepted: true,
                    notice: self.notify(text, NoticeKind::Info),
                }
            }
            Err(e) => {
                log::error!("Error toggling key blocker: {}", e);
                ToggleOutcome {
                    accepted: false,
                    notice: self.notify("Failed to update settings", NoticeKind::Error),
                }
            }
        }
    }

    /// Focus the active tab so the user can try the keys there
    pub async fn test_on_active_tab(&self) -> TestOutcome {
        let result = async {
            let tab = self
                .tabs
                .active_tab()
                .await?
                .ok_or_else(|| GuardError::ChannelUnavailable("No active tab found".to_string()))?;
            let notice = self.notify("Try pressing F1-F12 keys on the current page", NoticeKind::Info);
            self.tabs.focus_tab(tab).await?;
            Ok::<_, GuardError>(notice)
        }
        .await;

        match result {
            Ok(notice) => TestOutcome {
                focused: true,
                notice,
            },
            Err(e) => {
                log::error!("Error during test: {}", e);
                TestOutcome {
                    focused: false,
                    notice: self.notify("Could not activate test mode", NoticeKind::Error),
                }
            }
        }
    }

    /// Function keys are never blocked inside the popup itself
    pub fn key_pressed(&self, key: &str) -> Option<NoticeId> {
        is_function_key_label(key)
            .then(|| self.notify(&format!("{} pressed in popup (not blocked here)", key), NoticeKind::Info))
    }

    /// Report function keys from `keys` until the stream ends; `on_notice`
    /// runs for each notice raised
    pub async fn watch_keys<K>(&self, mut keys: K, mut on_notice: impl FnMut(NoticeId))
    where
        K: Stream<Item = String> + Unpin,
    {
        while let Some(key) = keys.next().await {
            if let Some(id) = self.key_pressed(&key) {
                on_notice(id);
            }
        }
    }

    pub fn notify(&self, text: &str, kind: NoticeKind) -> NoticeId {
        let id = self.next_notice.get();
        self.next_notice.set(id + 1);
        self.view.borrow_mut().notices.push(Notice {
            id,
            text: text.to_string(),
            kind,
        });
        id
    }

    pub fn dismiss(&self, id: NoticeId) -> bool {
        let mut view = self.view.borrow_mut();
        let before = view.notices.len();
        view.notices.retain(|n| n.id != id);
        view.notices.len() != before
    }

    /// Remove `id` once its own lifetime has elapsed
    pub async fn dismiss_after(&self, id: NoticeId) {
        self.timer.sleep(self.panel.notice_lifetime()).await;
        self.dismiss(id);
    }
}
