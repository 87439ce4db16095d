//! F1-F12 Key Blocker browser extension.
//!
//! One Rust core serves the three extension contexts:
//!
//! | Context | Entry point | Logic |
//! |---------|-------------|-------|
//! | service worker | `start_background` | [`coordinator::Coordinator`] |
//! | content script | `start_page_guard` | [`page_guard::PageGuard`] |
//! | popup | `run` (feature `popup`) | [`control_panel::ControlPanel`] |
//!
//! Browser APIs are reached only through the traits in [`host`], so every
//! context can be driven natively in tests.

pub mod config;
pub mod control_panel;
pub mod coordinator;
pub mod error;
pub mod host;
pub mod page_guard;
pub mod protocol;
pub mod retry;
pub mod settings;

#[cfg(target_arch = "wasm32")]
mod background;

#[cfg(test)]
mod scenarios;

pub use config::GuardConfig;
pub use error::{GuardError, GuardResult};

#[cfg(target_arch = "wasm32")]
pub(crate) fn init_logging(config: &GuardConfig) {
    let level = config.log_level().unwrap_or(log::Level::Info);
    wasm_logger::init(wasm_logger::Config::new(level));
}

#[cfg(all(target_arch = "wasm32", feature = "popup"))]
#[wasm_bindgen::prelude::wasm_bindgen(start)]
pub fn run() {
    init_logging(&GuardConfig::embedded());
    log::info!("F1-F12 Key Blocker popup starting...");
    dioxus::launch(control_panel::ui::Popup);
}
