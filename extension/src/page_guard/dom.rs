// Content script entry point: capture-phase listeners on document and window

use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{AddEventListenerOptions, EventTarget, KeyboardEvent};

use super::{InterceptableKey, KeyEventKind, KeySignals, PageGuard};
use crate::config::GuardConfig;
use crate::host::chrome::{self, ChromeStore};

impl InterceptableKey for KeyboardEvent {
    #[allow(deprecated)]
    fn signals(&self) -> KeySignals {
        let key = self.key();
        KeySignals {
            key: (!key.is_empty()).then_some(key),
            key_code: self.key_code(),
            which: self.which(),
        }
    }

    fn target_name(&self) -> Option<String> {
        self.target()
            .and_then(|t| t.dyn_into::<web_sys::Element>().ok())
            .map(|el| el.tag_name())
    }

    fn prevent_default(&self) {
        web_sys::Event::prevent_default(self);
    }

    fn stop_propagation(&self) {
        web_sys::Event::stop_propagation(self);
    }

    fn stop_immediate_propagation(&self) {
        web_sys::Event::stop_immediate_propagation(self);
    }
}

/// Register `keydown`, `keypress` and `keyup` capture listeners on `target`
fn attach(target: &EventTarget, guard: &Rc<PageGuard<ChromeStore>>) -> Result<(), JsValue> {
    let options = AddEventListenerOptions::new();
    options.set_capture(true);
    options.set_passive(false);

    for kind in KeyEventKind::ALL {
        let guard = guard.clone();
        let listener = Closure::<dyn FnMut(KeyboardEvent)>::new(move |event: KeyboardEvent| {
            guard.intercept(kind, &event);
        });
        target.add_event_listener_with_callback_and_add_event_listener_options(
            kind.as_str(),
            listener.as_ref().unchecked_ref(),
            &options,
        )?;
        // Listeners live as long as the page
        listener.forget();
    }
    Ok(())
}

async fn run_page_guard() -> Result<(), JsValue> {
    let config = GuardConfig::embedded();
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
    let document = window
        .document()
        .ok_or_else(|| JsValue::from_str("no document"))?;
    let page_url = window.location().href().unwrap_or_default();

    let guard = Rc::new(PageGuard::load(ChromeStore, &config.page_guard, page_url).await);

    attach(document.as_ref(), &guard)?;
    attach(window.as_ref(), &guard)?;

    let listener_guard = guard.clone();
    chrome::listen_for_messages(move |message| {
        let guard = listener_guard.clone();
        async move { guard.handle_message(message).await }
    });

    // Keep a handle reachable from the console for manual toggling
    let manual_guard = guard.clone();
    let toggle = Closure::<dyn FnMut() -> js_sys::Promise>::new(move || {
        let guard = manual_guard.clone();
        wasm_bindgen_futures::future_to_promise(async move {
            Ok(JsValue::from_bool(guard.toggle_locally().await))
        })
    });
    js_sys::Reflect::set(&window, &"f1f12KeyBlockerToggle".into(), toggle.as_ref())?;
    toggle.forget();

    Ok(())
}

/// Called from the content script loader
#[wasm_bindgen]
pub fn start_page_guard() {
    crate::init_logging(&GuardConfig::embedded());
    wasm_bindgen_futures::spawn_local(async {
        if let Err(e) = run_page_guard().await {
            log::error!("F1-F12 Key Blocker failed to start: {:?}", e);
        }
    });
}
