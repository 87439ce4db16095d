use dioxus::prelude::*;
use futures::channel::mpsc::{self, UnboundedReceiver};
use std::rc::Rc;
use wasm_bindgen::prelude::Closure;
use wasm_bindgen::JsCast;

use super::{ControlPanel, NoticeId, NoticeKind, PanelView};
use crate::config::GuardConfig;
use crate::host::chrome::{self, BrowserTimer, ChromeRuntime, ChromeStore, ChromeTabs};

type PopupPanel = ControlPanel<ChromeRuntime, ChromeStore, ChromeTabs, BrowserTimer>;

const TOGGLE_ID: &str = "enableToggle";

/// The browser flips a checkbox before `onchange` runs; put it back to the
/// accepted state when the coordinator refused
fn sync_toggle(enabled: bool) {
    let input = web_sys::window()
        .and_then(|w| w.document())
        .and_then(|d| d.get_element_by_id(TOGGLE_ID))
        .and_then(|el| el.dyn_into::<web_sys::HtmlInputElement>().ok());
    if let Some(input) = input {
        input.set_checked(enabled);
    }
}

fn notice_class(kind: NoticeKind) -> &'static str {
    match kind {
        NoticeKind::Error => "fixed top-2 left-1/2 px-4 py-2 rounded text-xs text-white bg-red-600",
        NoticeKind::Info => "fixed top-2 left-1/2 px-4 py-2 rounded text-xs text-white bg-green-600",
    }
}

/// `KeyboardEvent.key` of every keydown in the popup document, wherever
/// focus is
fn document_keys() -> Option<UnboundedReceiver<String>> {
    let document = web_sys::window()?.document()?;
    let (tx, rx) = mpsc::unbounded();
    let listener = Closure::<dyn FnMut(web_sys::KeyboardEvent)>::new(move |event: web_sys::KeyboardEvent| {
        let _ = tx.unbounded_send(event.key());
    });
    document
        .add_event_listener_with_callback("keydown", listener.as_ref().unchecked_ref())
        .ok()?;
    listener.forget();
    Some(rx)
}

/// Drop a notice after its own lifetime and re-render
fn dismiss_later(panel: Rc<PopupPanel>, mut view: Signal<PanelView>, id: NoticeId) {
    spawn(async move {
        panel.dismiss_after(id).await;
        view.set(panel.view());
    });
}

#[component]
pub fn Popup() -> Element {
    let panel: Rc<PopupPanel> = use_hook(|| {
        Rc::new(ControlPanel::new(
            ChromeRuntime,
            ChromeStore,
            ChromeTabs,
            BrowserTimer,
            &GuardConfig::embedded(),
            chrome::manifest_version(),
        ))
    });
    let mut view = use_signal(|| panel.view());

    let init_panel = panel.clone();
    use_future(move || {
        let panel = init_panel.clone();
        async move {
            panel.initialize().await;
            view.set(panel.view());
        }
    });

    let toggle_panel = panel.clone();
    let on_toggle = move |evt: Event<FormData>| {
        let enabled = evt.value() == "true";
        let panel = toggle_panel.clone();
        spawn(async move {
            view.set(PanelView {
                busy: true,
                ..panel.view()
            });
            let outcome = panel.toggle(enabled).await;
            view.set(panel.view());
            sync_toggle(panel.view().enabled);
            dismiss_later(panel.clone(), view, outcome.notice);
        });
    };

    let test_panel = panel.clone();
    let on_test = move |_: MouseEvent| {
        let panel = test_panel.clone();
        spawn(async move {
            let outcome = panel.test_on_active_tab().await;
            view.set(panel.view());
            if outcome.focused {
                if let Some(window) = web_sys::window() {
                    let _ = window.close();
                }
            } else {
                dismiss_later(panel.clone(), view, outcome.notice);
            }
        });
    };

    let key_panel = panel.clone();
    use_future(move || {
        let panel = key_panel.clone();
        async move {
            let Some(keys) = document_keys() else {
                log::warn!("Popup document unavailable, key notices disabled");
                return;
            };
            panel
                .watch_keys(keys, |id| {
                    view.set(panel.view());
                    dismiss_later(panel.clone(), view, id);
                })
                .await;
        }
    });

    let current = view();
    let dot_class = if current.enabled {
        "w-3 h-3 rounded-full bg-green-600"
    } else {
        "w-3 h-3 rounded-full bg-red-600"
    };
    let status_text = current.status_text();
    let test_label = current.test_button_label();
    let test_enabled = current.test_button_enabled();
    let version_label = current.version_label();

    rsx! {
        div { class: "w-72 p-4 bg-white",
            for notice in current.notices.iter().cloned() {
                div {
                    key: "{notice.id}",
                    class: notice_class(notice.kind),
                    "{notice.text}"
                }
            }

            div { class: "flex items-center justify-between mb-4",
                h1 { class: "text-lg font-bold text-gray-900", "F1-F12 Key Blocker" }
                label { class: "flex items-center cursor-pointer",
                    input {
                        id: TOGGLE_ID,
                        r#type: "checkbox",
                        checked: current.enabled,
                        disabled: current.busy,
                        onchange: on_toggle,
                    }
                }
            }

            div { class: "flex items-center space-x-2 mb-4",
                span { class: dot_class }
                span { class: "text-sm text-gray-700", "{status_text}" }
            }

            button {
                class: "w-full bg-blue-600 text-white py-2 px-4 rounded-lg hover:bg-blue-700 transition disabled:opacity-50",
                disabled: !test_enabled,
                onclick: on_test,
                "{test_label}"
            }

            p { class: "mt-4 text-xs text-gray-400 text-center", "{version_label}" }
        }
    }
}
