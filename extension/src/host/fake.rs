// In-memory host doubles for native tests

use async_trait::async_trait;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use super::{Badge, BadgeState, RuntimeChannel, SettingsStore, TabId, Tabs, Timer};
use crate::error::{GuardError, GuardResult};
use crate::page_guard::PageGuard;
use crate::protocol::{Message, Response};
use crate::settings::SettingsPatch;

/// Store shared by every context of a test; clones see the same record
#[derive(Clone, Default)]
pub struct MemoryStore {
    record: Rc<RefCell<SettingsPatch>>,
    fail_reads: Rc<Cell<bool>>,
    fail_writes: Rc<Cell<bool>>,
    writes: Rc<Cell<usize>>,
}

impl MemoryStore {
    pub fn with(record: SettingsPatch) -> Self {
        let store = Self::default();
        *store.record.borrow_mut() = record;
        store
    }

    pub fn record(&self) -> SettingsPatch {
        self.record.borrow().clone()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.set(fail);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    pub fn writes(&self) -> usize {
        self.writes.get()
    }
}

#[async_trait(?Send)]
impl SettingsStore for MemoryStore {
    async fn load(&self) -> GuardResult<SettingsPatch> {
        if self.fail_reads.get() {
            return Err(GuardError::StoreUnavailable("read failed".into()));
        }
        Ok(self.record())
    }

    async fn merge(&self, patch: &SettingsPatch) -> GuardResult<()> {
        if self.fail_writes.get() {
            return Err(GuardError::StoreUnavailable("write failed".into()));
        }
        self.record.borrow_mut().merge(patch);
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }
}

pub struct FakeTab {
    pub id: TabId,
    /// `None` models a page without a content script (chrome://, extension pages)
    pub guard: Option<Rc<PageGuard<MemoryStore>>>,
    pub received: RefCell<Vec<Message>>,
}

/// Tab set routing messages into real page guards; clones share the tabs
#[derive(Clone, Default)]
pub struct FakeTabs {
    tabs: Rc<RefCell<Vec<Rc<FakeTab>>>>,
    active: Rc<Cell<Option<TabId>>>,
    focused: Rc<RefCell<Vec<TabId>>>,
    fail_query: Rc<Cell<bool>>,
}

impl FakeTabs {
    pub fn open(&self, id: TabId, guard: Option<Rc<PageGuard<MemoryStore>>>) -> Rc<FakeTab> {
        let tab = Rc::new(FakeTab {
            id,
            guard,
            received: RefCell::new(Vec::new()),
        });
        self.tabs.borrow_mut().push(tab.clone());
        tab
    }

    pub fn set_active(&self, tab: Option<TabId>) {
        self.active.set(tab);
    }

    pub fn set_fail_query(&self, fail: bool) {
        self.fail_query.set(fail);
    }

    pub fn focused(&self) -> Vec<TabId> {
        self.focused.borrow().clone()
    }
}

#[async_trait(?Send)]
impl Tabs for FakeTabs {
    async fn open_tabs(&self) -> GuardResult<Vec<TabId>> {
        if self.fail_query.get() {
            return Err(GuardError::ChannelUnavailable("tabs.query failed".into()));
        }
        Ok(self.tabs.borrow().iter().map(|t| t.id).collect())
    }

    async fn send_to_tab(&self, tab: TabId, message: &Message) -> GuardResult<Option<Response>> {
        let target = self.tabs.borrow().iter().find(|t| t.id == tab).cloned();
        let target = target.ok_or_else(|| GuardError::DeliveryFailure {
            tab,
            reason: "No tab with id".into(),
        })?;
        let guard = target.guard.clone().ok_or_else(|| GuardError::DeliveryFailure {
            tab,
            reason: "Could not establish connection. Receiving end does not exist.".into(),
        })?;
        target.received.borrow_mut().push(message.clone());
        Ok(Some(guard.handle_message(message.clone()).await))
    }

    async fn active_tab(&self) -> GuardResult<Option<TabId>> {
        if self.fail_query.get() {
            return Err(GuardError::ChannelUnavailable("tabs.query failed".into()));
        }
        Ok(self.active.get())
    }

    async fn focus_tab(&self, tab: TabId) -> GuardResult<()> {
        self.focused.borrow_mut().push(tab);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct RecordingBadge {
    rendered: Rc<RefCell<Vec<BadgeState>>>,
    fail: Rc<Cell<bool>>,
}

impl RecordingBadge {
    pub fn last(&self) -> Option<BadgeState> {
        self.rendered.borrow().last().cloned()
    }

    pub fn renders(&self) -> usize {
        self.rendered.borrow().len()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.set(fail);
    }
}

#[async_trait(?Send)]
impl Badge for RecordingBadge {
    async fn render(&self, state: &BadgeState) -> GuardResult<()> {
        if self.fail.get() {
            return Err(GuardError::ChannelUnavailable("action API missing".into()));
        }
        self.rendered.borrow_mut().push(state.clone());
        Ok(())
    }
}

/// One scripted reaction of the popup's runtime channel
pub enum Reply {
    Respond(Option<Response>),
    Fail(GuardError),
    Hang,
}

/// Runtime channel answering from a script, then from a fallback
pub struct ScriptedChannel {
    script: RefCell<VecDeque<Reply>>,
    fallback: Box<dyn Fn(&Message) -> Reply>,
    sent: RefCell<Vec<Message>>,
}

impl ScriptedChannel {
    pub fn new(fallback: impl Fn(&Message) -> Reply + 'static) -> Self {
        Self {
            script: RefCell::new(VecDeque::new()),
            fallback: Box::new(fallback),
            sent: RefCell::new(Vec::new()),
        }
    }

    pub fn then(self, reply: Reply) -> Self {
        self.script.borrow_mut().push_back(reply);
        self
    }

    pub fn sent(&self) -> Vec<Message> {
        self.sent.borrow().clone()
    }
}

#[async_trait(?Send)]
impl RuntimeChannel for ScriptedChannel {
    async fn request(&self, message: &Message) -> GuardResult<Option<Response>> {
        self.sent.borrow_mut().push(message.clone());
        let reply = self
            .script
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| (self.fallback)(message));
        match reply {
            Reply::Respond(response) => Ok(response),
            Reply::Fail(e) => Err(e),
            Reply::Hang => futures::future::pending().await,
        }
    }
}

/// Timer that completes immediately and records what was requested
#[derive(Default)]
pub struct InstantTimer {
    slept: RefCell<Vec<Duration>>,
}

impl InstantTimer {
    pub fn slept(&self) -> Vec<Duration> {
        self.slept.borrow().clone()
    }
}

#[async_trait(?Send)]
impl Timer for InstantTimer {
    async fn sleep(&self, duration: Duration) {
        self.slept.borrow_mut().push(duration);
    }
}
