// Chrome extension API bindings
// Promise-returning MV3 APIs awaited through JsFuture, JSON bridged with serde_json

use async_trait::async_trait;
use js_sys::Promise;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{spawn_local, JsFuture};

use super::{Badge, BadgeState, RuntimeChannel, SettingsStore, TabId, Tabs, Timer};
use crate::error::{GuardError, GuardResult};
use crate::protocol::{Message, Response};
use crate::settings::{SettingsPatch, KEY_ENABLED, KEY_INSTALL_DATE, KEY_VERSION};

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(catch, js_namespace = ["chrome", "storage", "sync"], js_name = get)]
    fn storage_sync_get(keys: JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "storage", "sync"], js_name = set)]
    fn storage_sync_set(items: JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "tabs"], js_name = query)]
    fn tabs_query(query: JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "tabs"], js_name = sendMessage)]
    fn tabs_send_message(tab_id: i32, message: JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "tabs"], js_name = update)]
    fn tabs_update(tab_id: i32, properties: JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "action"], js_name = setBadgeText)]
    fn action_set_badge_text(details: JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "action"], js_name = setBadgeBackgroundColor)]
    fn action_set_badge_background_color(details: JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "action"], js_name = setTitle)]
    fn action_set_title(details: JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "runtime"], js_name = sendMessage)]
    fn runtime_send_message(message: JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "runtime"], js_name = getManifest)]
    fn runtime_get_manifest() -> Result<JsValue, JsValue>;

    #[wasm_bindgen(js_namespace = ["chrome", "runtime", "onMessage"], js_name = addListener)]
    fn on_message_add_listener(callback: &Closure<dyn FnMut(JsValue, JsValue, js_sys::Function) -> JsValue>);
}

/// Best-effort text of a thrown JS value (`Error.message` when present)
fn describe(err: &JsValue) -> String {
    if let Some(text) = err.as_string() {
        return text;
    }
    js_sys::Reflect::get(err, &"message".into())
        .ok()
        .and_then(|m| m.as_string())
        .unwrap_or_else(|| format!("{:?}", err))
}

pub(crate) fn to_js<T: Serialize>(value: &T) -> GuardResult<JsValue> {
    let json = serde_json::to_string(value)?;
    js_sys::JSON::parse(&json).map_err(|e| GuardError::Malformed(describe(&e)))
}

/// `None` for `undefined`/`null` (e.g. a listener that never answered)
pub(crate) fn from_js<T: DeserializeOwned>(value: &JsValue) -> GuardResult<Option<T>> {
    if value.is_undefined() || value.is_null() {
        return Ok(None);
    }
    let json: String = js_sys::JSON::stringify(value)
        .map_err(|e| GuardError::Malformed(describe(&e)))?
        .into();
    Ok(Some(serde_json::from_str(&json)?))
}

async fn settle(promise: Result<Promise, JsValue>) -> Result<JsValue, JsValue> {
    JsFuture::from(promise?).await
}

fn namespace_present(path: &[&str]) -> bool {
    let mut current: JsValue = js_sys::global().into();
    for name in path {
        match js_sys::Reflect::get(&current, &(*name).into()) {
            Ok(next) if !next.is_undefined() && !next.is_null() => current = next,
            _ => return false,
        }
    }
    true
}

/// Extension version from the manifest, if the runtime is reachable
pub fn manifest_version() -> Option<String> {
    let manifest = runtime_get_manifest().ok()?;
    js_sys::Reflect::get(&manifest, &"version".into()).ok()?.as_string()
}

pub fn now_ms() -> i64 {
    js_sys::Date::now() as i64
}

/// `chrome.storage.sync`
#[derive(Clone, Copy, Default)]
pub struct ChromeStore;

#[async_trait(?Send)]
impl SettingsStore for ChromeStore {
    async fn load(&self) -> GuardResult<SettingsPatch> {
        if !namespace_present(&["chrome", "storage", "sync"]) {
            return Err(GuardError::StoreUnavailable("chrome.storage is not available".into()));
        }
        let keys = js_sys::Array::new();
        for key in [KEY_ENABLED, KEY_INSTALL_DATE, KEY_VERSION] {
            keys.push(&key.into());
        }
        let result = settle(storage_sync_get(keys.into()))
            .await
            .map_err(|e| GuardError::StoreUnavailable(describe(&e)))?;
        Ok(from_js(&result)?.unwrap_or_default())
    }

    async fn merge(&self, patch: &SettingsPatch) -> GuardResult<()> {
        if !namespace_present(&["chrome", "storage", "sync"]) {
            return Err(GuardError::StoreUnavailable("chrome.storage is not available".into()));
        }
        settle(storage_sync_set(to_js(patch)?))
            .await
            .map_err(|e| GuardError::StoreUnavailable(describe(&e)))?;
        Ok(())
    }
}

/// `chrome.tabs`
#[derive(Clone, Copy, Default)]
pub struct ChromeTabs;

impl ChromeTabs {
    async fn query(&self, filter: serde_json::Value) -> GuardResult<Vec<TabId>> {
        let tabs = settle(tabs_query(to_js(&filter)?))
            .await
            .map_err(|e| GuardError::ChannelUnavailable(describe(&e)))?;
        Ok(js_sys::Array::from(&tabs)
            .iter()
            .filter_map(|tab| js_sys::Reflect::get(&tab, &"id".into()).ok()?.as_f64())
            .map(|id| id as TabId)
            .collect())
    }
}

#[async_trait(?Send)]
impl Tabs for ChromeTabs {
    async fn open_tabs(&self) -> GuardResult<Vec<TabId>> {
        self.query(serde_json::json!({})).await
    }

    async fn send_to_tab(&self, tab: TabId, message: &Message) -> GuardResult<Option<Response>> {
        let reply = settle(tabs_send_message(tab, to_js(message)?))
            .await
            .map_err(|e| GuardError::DeliveryFailure {
                tab,
                reason: describe(&e),
            })?;
        from_js(&reply)
    }

    async fn active_tab(&self) -> GuardResult<Option<TabId>> {
        let tabs = self
            .query(serde_json::json!({"active": true, "currentWindow": true}))
            .await?;
        Ok(tabs.first().copied())
    }

    async fn focus_tab(&self, tab: TabId) -> GuardResult<()> {
        settle(tabs_update(tab, to_js(&serde_json::json!({"active": true}))?))
            .await
            .map_err(|e| GuardError::DeliveryFailure {
                tab,
                reason: describe(&e),
            })?;
        Ok(())
    }
}

/// `chrome.action`
#[derive(Clone, Copy, Default)]
pub struct ChromeBadge;

#[async_trait(?Send)]
impl Badge for ChromeBadge {
    async fn render(&self, state: &BadgeState) -> GuardResult<()> {
        let fail = |e: JsValue| GuardError::ChannelUnavailable(describe(&e));
        settle(action_set_badge_text(to_js(&serde_json::json!({"text": state.text}))?))
            .await
            .map_err(fail)?;
        settle(action_set_badge_background_color(to_js(
            &serde_json::json!({"color": state.color}),
        )?))
        .await
        .map_err(fail)?;
        settle(action_set_title(to_js(&serde_json::json!({"title": state.title}))?))
            .await
            .map_err(fail)?;
        Ok(())
    }
}

/// `chrome.runtime.sendMessage` from the popup to the service worker
#[derive(Clone, Copy, Default)]
pub struct ChromeRuntime;

#[async_trait(?Send)]
impl RuntimeChannel for ChromeRuntime {
    async fn request(&self, message: &Message) -> GuardResult<Option<Response>> {
        if !namespace_present(&["chrome", "runtime"]) {
            return Err(GuardError::ChannelUnavailable("Chrome runtime not available".into()));
        }
        let reply = settle(runtime_send_message(to_js(message)?))
            .await
            .map_err(|e| GuardError::ChannelUnavailable(describe(&e)))?;
        from_js(&reply)
    }
}

#[derive(Clone, Copy, Default)]
pub struct BrowserTimer;

#[async_trait(?Send)]
impl Timer for BrowserTimer {
    async fn sleep(&self, duration: Duration) {
        let millis = u32::try_from(duration.as_millis()).unwrap_or(u32::MAX);
        gloo_timers::future::TimeoutFuture::new(millis).await;
    }
}

/// Route `runtime.onMessage` into `handler`.
///
/// The listener returns `true` so the host keeps the channel open until the
/// asynchronous response is sent; every message gets exactly one response.
pub fn listen_for_messages<F, Fut>(handler: F)
where
    F: Fn(Message) -> Fut + 'static,
    Fut: Future<Output = Response> + 'static,
{
    let callback = Closure::<dyn FnMut(JsValue, JsValue, js_sys::Function) -> JsValue>::new(
        move |raw: JsValue, _sender: JsValue, send_response: js_sys::Function| {
            let pending = from_js::<serde_json::Value>(&raw)
                .and_then(|value| Message::from_value(value.unwrap_or_default()))
                .map(&handler);

            spawn_local(async move {
                let response = match pending {
                    Ok(fut) => fut.await,
                    Err(e) => {
                        log::warn!("Rejected message: {}", e);
                        Response::error(&e)
                    }
                };
                match to_js(&response) {
                    Ok(reply) => {
                        if let Err(e) = send_response.call1(&JsValue::NULL, &reply) {
                            log::debug!("Sender went away before the response: {}", describe(&e));
                        }
                    }
                    Err(e) => log::error!("Could not encode response: {}", e),
                }
            });

            JsValue::from_bool(true)
        },
    );
    on_message_add_listener(&callback);
    callback.forget();
}
