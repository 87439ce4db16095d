// Background service worker logic for the F1-F12 Key Blocker
// Built without Dioxus. The JS loader registers the runtime listeners
// synchronously and forwards each event here once the module is ready.

use js_sys::Promise;
use std::cell::OnceCell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

use crate::config::GuardConfig;
use crate::coordinator::{Coordinator, InstallReason};
use crate::host::chrome::{self, ChromeBadge, ChromeStore, ChromeTabs};
use crate::protocol::Response;

type BackgroundCoordinator = Coordinator<ChromeStore, ChromeTabs, ChromeBadge>;

thread_local! {
    static COORDINATOR: OnceCell<Rc<BackgroundCoordinator>> = OnceCell::new();
}

/// Built by whichever entry point runs first in this worker lifetime
fn coordinator() -> Rc<BackgroundCoordinator> {
    COORDINATOR.with(|cell| {
        cell.get_or_init(|| {
            let config = GuardConfig::embedded();
            crate::init_logging(&config);
            let version =
                chrome::manifest_version().unwrap_or_else(|| config.panel.fallback_version.clone());
            Rc::new(Coordinator::new(
                ChromeStore,
                ChromeTabs,
                ChromeBadge,
                version,
                config.panel.fallback_version.clone(),
            ))
        })
        .clone()
    })
}

/// Initialize the background service worker.
/// Called from the service worker loader via wasm_bindgen
#[wasm_bindgen]
pub fn start_background() {
    let coordinator = coordinator();
    wasm_bindgen_futures::spawn_local(async move {
        coordinator.refresh_badge().await;
    });
    log::info!("F1-F12 Key Blocker background script initialized");
}

/// `runtime.onInstalled` forwarded by the loader with `details.reason`
#[wasm_bindgen]
pub fn handle_installed(reason: String) -> Promise {
    let coordinator = coordinator();
    future_to_promise(async move {
        coordinator
            .on_installed(InstallReason::parse(&reason), chrome::now_ms())
            .await;
        Ok(JsValue::UNDEFINED)
    })
}

/// `runtime.onMessage` forwarded by the loader; resolves to the response
#[wasm_bindgen]
pub fn handle_message(raw: JsValue) -> Promise {
    let coordinator = coordinator();
    future_to_promise(async move {
        let response = match chrome::from_js::<serde_json::Value>(&raw) {
            Ok(value) => coordinator.handle_value(value.unwrap_or_default()).await,
            Err(e) => {
                log::warn!("Rejected message: {}", e);
                Response::error(&e)
            }
        };
        chrome::to_js(&response).map_err(|e| JsValue::from_str(&e.to_string()))
    })
}
