// Settings propagation across popup, background and pages

use async_trait::async_trait;
use futures::executor::block_on;
use std::rc::Rc;

use crate::config::{GuardConfig, PageGuardConfig};
use crate::control_panel::{ControlPanel, StatusSource};
use crate::coordinator::{Coordinator, InstallReason};
use crate::error::GuardResult;
use crate::host::fake::{FakeTabs, InstantTimer, MemoryStore, RecordingBadge};
use crate::host::RuntimeChannel;
use crate::page_guard::{GuardState, PageGuard};
use crate::protocol::{Message, Response};
use crate::settings::SettingsPatch;

type Background = Coordinator<MemoryStore, FakeTabs, RecordingBadge>;

/// Popup channel wired straight into a coordinator
struct Direct(Rc<Background>);

#[async_trait(?Send)]
impl RuntimeChannel for Direct {
    async fn request(&self, message: &Message) -> GuardResult<Option<Response>> {
        Ok(Some(self.0.handle_message(message.clone()).await))
    }
}

struct Browser {
    store: MemoryStore,
    tabs: FakeTabs,
    badge: RecordingBadge,
    background: Rc<Background>,
}

impl Browser {
    fn installed() -> Self {
        let browser = Self::cold();
        block_on(
            browser
                .background
                .on_installed(InstallReason::Install, 1_700_000_000_000),
        );
        browser
    }

    /// Worker started by an event: no install has run, no badge yet
    fn cold() -> Self {
        let store = MemoryStore::default();
        let tabs = FakeTabs::default();
        let badge = RecordingBadge::default();
        let background = Rc::new(Coordinator::new(
            store.clone(),
            tabs.clone(),
            badge.clone(),
            "1.4.0",
            "1.0.0",
        ));
        Self {
            store,
            tabs,
            badge,
            background,
        }
    }

    fn open_page(&self, id: i32) -> Rc<PageGuard<MemoryStore>> {
        let config = PageGuardConfig {
            log_sample_rate: 0.0,
            ..PageGuardConfig::default()
        };
        let guard = Rc::new(block_on(PageGuard::load(
            self.store.clone(),
            &config,
            format!("https://site{}.test/", id),
        )));
        self.tabs.open(id, Some(guard.clone()));
        guard
    }

    fn open_privileged_page(&self, id: i32) {
        self.tabs.open(id, None);
    }

    fn popup(&self) -> ControlPanel<Direct, MemoryStore, FakeTabs, InstantTimer> {
        ControlPanel::new(
            Direct(self.background.clone()),
            self.store.clone(),
            self.tabs.clone(),
            InstantTimer::default(),
            &GuardConfig::default(),
            Some("1.4.0".into()),
        )
    }
}

#[test]
fn test_disable_reaches_open_pages_and_new_pages() {
    let browser = Browser::installed();
    let pages: Vec<_> = (1..=3).map(|id| browser.open_page(id)).collect();
    assert!(pages.iter().all(|p| p.state() == GuardState::Active));

    let response = block_on(
        browser
            .background
            .handle_message(Message::Toggle { enabled: false }),
    );
    assert!(response.is_success());

    assert!(pages.iter().all(|p| p.state() == GuardState::Inactive));
    let late_page = browser.open_page(4);
    assert_eq!(late_page.state(), GuardState::Inactive);
    assert_eq!(browser.badge.last().unwrap().text, "OFF");
}

#[test]
fn test_broadcast_skips_tabs_without_receiver() {
    let browser = Browser::installed();
    let first = browser.open_page(1);
    browser.open_privileged_page(2);
    let third = browser.open_page(3);

    let report = block_on(
        browser
            .background
            .broadcast(&Message::Toggle { enabled: false }),
    );

    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(first.state(), GuardState::Inactive);
    assert_eq!(third.state(), GuardState::Inactive);
}

#[test]
fn test_popup_round_trip() {
    let browser = Browser::installed();
    let page = browser.open_page(1);
    let popup = browser.popup();

    assert_eq!(block_on(popup.initialize()), StatusSource::Coordinator);
    assert!(popup.view().enabled);
    assert_eq!(popup.view().version, "1.4.0");

    let outcome = block_on(popup.toggle(false));
    assert!(outcome.accepted);
    assert!(!popup.view().enabled);
    assert_eq!(page.state(), GuardState::Inactive);
    assert_eq!(browser.store.record().enabled, Some(false));

    // a second popup opened later sees the persisted state
    let reopened = browser.popup();
    block_on(reopened.initialize());
    assert!(!reopened.view().enabled);
}

#[test]
fn test_pages_keep_cached_state_while_store_is_down() {
    let browser = Browser::installed();
    let page = browser.open_page(1);
    browser.store.set_fail_reads(true);
    browser.store.set_fail_writes(true);

    block_on(
        browser
            .background
            .handle_message(Message::Toggle { enabled: false }),
    );

    // the broadcast payload is applied even though nothing was persisted
    assert_eq!(page.state(), GuardState::Inactive);
    assert_eq!(browser.store.record(), SettingsPatch::install_defaults(1_700_000_000_000, "1.4.0"));
    let status = block_on(page.handle_message(Message::GetStatus));
    assert_eq!(
        status,
        Response::Status(crate::protocol::StatusSnapshot {
            enabled: false,
            version: None
        })
    );
}

#[test]
fn test_update_settings_toggle_reaches_pages() {
    let browser = Browser::installed();
    let page = browser.open_page(1);

    block_on(browser.background.handle_message(Message::UpdateSettings {
        settings: SettingsPatch::enabled(false),
    }));

    assert_eq!(page.state(), GuardState::Inactive);
}

#[test]
fn test_install_event_is_the_first_thing_a_worker_sees() {
    let browser = Browser::cold();
    assert_eq!(browser.badge.renders(), 0);

    block_on(
        browser
            .background
            .on_installed(InstallReason::parse("install"), 1_700_000_000_123),
    );

    let record = browser.store.record();
    assert_eq!(record.install_date, Some(1_700_000_000_123));
    assert_eq!(record.version.as_deref(), Some("1.4.0"));
    assert_eq!(record.enabled, Some(true));
    assert_eq!(browser.badge.last().unwrap().text, "ON");
}

#[test]
fn test_message_waking_the_worker_is_answered() {
    let browser = Browser::cold();
    let page = browser.open_page(1);

    let response = block_on(browser.background.handle_value(serde_json::json!({
        "type": "TOGGLE_KEY_BLOCKER",
        "enabled": false
    })));

    assert_eq!(
        response,
        Response::Toggled {
            success: true,
            enabled: false
        }
    );
    assert_eq!(page.state(), GuardState::Inactive);
    assert_eq!(browser.store.record().enabled, Some(false));
}
