// Per-page function key suppression
// One PageGuard per document; state is loaded from the store once and then
// follows toggle broadcasts from the background

use rand::Rng;
use std::cell::Cell;

use crate::config::{ConsistencyModel, PageGuardConfig};
use crate::host::SettingsStore;
use crate::protocol::{Message, Response, StatusSnapshot};
use crate::settings;

#[cfg(target_arch = "wasm32")]
pub mod dom;

/// `keyCode`/`which` of F1 and F12
pub const FUNCTION_KEY_CODES: std::ops::RangeInclusive<u32> = 112..=123;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Active,
    Inactive,
}

impl GuardState {
    pub fn from_enabled(enabled: bool) -> Self {
        if enabled {
            GuardState::Active
        } else {
            GuardState::Inactive
        }
    }

    pub fn is_active(self) -> bool {
        self == GuardState::Active
    }

    pub fn label(self) -> &'static str {
        match self {
            GuardState::Active => "ENABLED",
            GuardState::Inactive => "DISABLED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEventKind {
    KeyDown,
    KeyPress,
    KeyUp,
}

impl KeyEventKind {
    pub const ALL: [KeyEventKind; 3] = [KeyEventKind::KeyDown, KeyEventKind::KeyPress, KeyEventKind::KeyUp];

    pub fn as_str(self) -> &'static str {
        match self {
            KeyEventKind::KeyDown => "keydown",
            KeyEventKind::KeyPress => "keypress",
            KeyEventKind::KeyUp => "keyup",
        }
    }
}

/// The three independent fields browsers use to identify a key.
/// Different event sources fill different subsets, so they are OR-ed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySignals {
    pub key: Option<String>,
    pub key_code: u32,
    pub which: u32,
}

impl KeySignals {
    pub fn is_function_key(&self) -> bool {
        self.key.as_deref().is_some_and(is_function_key_label)
            || FUNCTION_KEY_CODES.contains(&self.key_code)
            || FUNCTION_KEY_CODES.contains(&self.which)
    }
}

/// `F1` through `F12`, exactly
pub fn is_function_key_label(label: &str) -> bool {
    label
        .strip_prefix('F')
        .filter(|n| !n.is_empty() && !n.starts_with('0') && n.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|n| n.parse::<u8>().ok())
        .is_some_and(|n| (1..=12).contains(&n))
}

/// A keyboard event as seen by the capture-phase listener
pub trait InterceptableKey {
    fn signals(&self) -> KeySignals;
    fn target_name(&self) -> Option<String>;
    fn prevent_default(&self);
    fn stop_propagation(&self);
    fn stop_immediate_propagation(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    Blocked,
}

/// Decides which blocked events get logged
#[derive(Debug, Clone, Copy)]
pub struct LogSampler {
    rate: f64,
}

impl LogSampler {
    pub fn new(rate: f64) -> Self {
        Self {
            rate: rate.clamp(0.0, 1.0),
        }
    }

    pub fn should_log(&self) -> bool {
        rand::thread_rng().gen_bool(self.rate)
    }
}

pub struct PageGuard<S> {
    state: Cell<GuardState>,
    store: S,
    consistency: ConsistencyModel,
    sampler: LogSampler,
    page_url: String,
    blocked: Cell<u64>,
}

impl<S: SettingsStore> PageGuard<S> {
    /// Build a guard whose initial state is the persisted flag (Active when
    /// the store cannot be read)
    pub async fn load(store: S, config: &PageGuardConfig, page_url: impl Into<String>) -> Self {
        let setting = settings::load_or_default(&store).await;
        let guard = Self::new(store, config, page_url, GuardState::from_enabled(setting.enabled));
        log::info!("F1-F12 Key Blocker initialized: {}", guard.state().label());
        guard
    }

    pub fn new(store: S, config: &PageGuardConfig, page_url: impl Into<String>, state: GuardState) -> Self {
        Self {
            state: Cell::new(state),
            store,
            consistency: config.consistency,
            sampler: LogSampler::new(config.log_sample_rate),
            page_url: page_url.into(),
            blocked: Cell::new(0),
        }
    }

    pub fn state(&self) -> GuardState {
        self.state.get()
    }

    pub fn blocked_count(&self) -> u64 {
        self.blocked.get()
    }

    /// Capture-phase handler shared by every listener
    pub fn intercept(&self, kind: KeyEventKind, event: &dyn InterceptableKey) -> Verdict {
        if !self.state().is_active() {
            return Verdict::Passed;
        }

        let signals = event.signals();
        if !signals.is_function_key() {
            return Verdict::Passed;
        }

        event.prevent_default();
        event.stop_propagation();
        event.stop_immediate_propagation();
        self.blocked.set(self.blocked.get() + 1);

        if self.sampler.should_log() {
            log::info!(
                "Blocked {} event: key={:?} keyCode={} which={} target={} url={}",
                kind.as_str(),
                signals.key,
                signals.key_code,
                signals.which,
                event.target_name().unwrap_or_else(|| "<none>".to_string()),
                self.page_url
            );
        }

        Verdict::Blocked
    }

    pub async fn handle_message(&self, message: Message) -> Response {
        match message {
            Message::Toggle { enabled } => {
                let enabled = match self.consistency {
                    ConsistencyModel::Message => enabled,
                    ConsistencyModel::Store => self.reread_enabled(enabled).await,
                };
                self.state.set(GuardState::from_enabled(enabled));
                log::info!("Key blocker toggled: {}", self.state().label());
                Response::Toggled {
                    success: true,
                    enabled,
                }
            }
            Message::GetStatus => Response::Status(StatusSnapshot {
                enabled: self.state().is_active(),
                version: None,
            }),
            other => Response::Error {
                error: format!("Unsupported message type: {}", other.kind()),
            },
        }
    }

    async fn reread_enabled(&self, payload: bool) -> bool {
        match settings::load(&self.store).await {
            Ok(setting) => setting.enabled,
            Err(e) => {
                log::warn!("Could not re-read settings, trusting broadcast: {}", e);
                payload
            }
        }
    }

    /// Flip the local state and persist it; a debugging aid exposed to the
    /// page console
    pub async fn toggle_locally(&self) -> bool {
        let enabled = !self.state().is_active();
        self.state.set(GuardState::from_enabled(enabled));
        if let Err(e) = self.store.merge(&settings::SettingsPatch::enabled(enabled)).await {
            log::warn!("Could not persist manual toggle: {}", e);
        }
        log::info!("Key blocker manually toggled: {}", self.state().label());
        enabled
    }
}
