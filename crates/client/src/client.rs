use advance_core::{FormName, ShowId, SyncConfig, UserRef};

use crate::autosave::{AutosaveScheduler, FlushOutcome, SaveStatus, UnloadDecision};
use crate::heartbeat::{HeartbeatOutcome, HeartbeatPoller};
use crate::merge::MergeEngine;
use crate::poller::{PollOutcome, SyncPoller};
use crate::session::SessionContext;
use crate::transport::SyncTransport;
use crate::view::FieldView;

/// Results of one [`SyncClient::tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub poll: PollOutcome,
    pub heartbeat: HeartbeatOutcome,
    pub flush: Option<FlushOutcome>,
}

/// One open show page: session state, the view, a transport and every
/// timer-driven component, advanced by the host's event loop.
pub struct SyncClient<T, V> {
    session: SessionContext,
    transport: T,
    view: V,
    merge: MergeEngine,
    poller: SyncPoller,
    heartbeat: HeartbeatPoller,
    autosave: AutosaveScheduler,
}

impl<T: SyncTransport, V: FieldView> SyncClient<T, V> {
    pub fn new(
        config: &SyncConfig,
        show_id: ShowId,
        user: UserRef,
        tab: &str,
        transport: T,
        view: V,
        now_ms: u64,
    ) -> Self {
        Self {
            session: SessionContext::new(show_id, user, tab, now_ms),
            transport,
            view,
            merge: MergeEngine::new(config.flash_ms, config.notice_ms),
            poller: SyncPoller::new(config.poll_interval_ms, &config.live_tab, now_ms),
            heartbeat: HeartbeatPoller::new(config.heartbeat_interval_ms, &config.live_tab, now_ms),
            autosave: AutosaveScheduler::new(
                config.debounce_ms,
                config.safety_flush_ms,
                config.saved_clear_ms,
                now_ms,
            ),
        }
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn poller(&self) -> &SyncPoller {
        &self.poller
    }

    pub fn autosave(&self) -> &AutosaveScheduler {
        &self.autosave
    }

    pub fn status(&self) -> &SaveStatus {
        self.autosave.status()
    }

    pub fn banner_visible(&self) -> bool {
        self.heartbeat.banner_visible()
    }

    pub fn focus(&mut self, key: &str) {
        self.session.focus(key);
    }

    pub fn blur(&mut self, key: &str) {
        self.session.blur(key);
    }

    pub fn switch_tab(&mut self, tab: &str) {
        self.session.set_active_tab(tab);
    }

    /// Local input on `key`: the view already holds the new value.
    pub fn edited(&mut self, form: FormName, key: &str, now_ms: u64) {
        self.autosave
            .on_edit(&mut self.session, &mut self.view, form, key, now_ms);
    }

    pub fn save_shortcut(&mut self, now_ms: u64) -> FlushOutcome {
        self.autosave
            .save_now(&mut self.session, &mut self.transport, &mut self.view, now_ms)
    }

    pub fn dismiss_banner(&mut self) {
        self.heartbeat.dismiss(&mut self.view);
    }

    pub fn before_unload(&self) -> UnloadDecision {
        self.autosave.before_unload(&self.session)
    }

    /// Run every component whose timer is due at `now_ms`.
    pub fn tick(&mut self, now_ms: u64) -> TickReport {
        self.merge.expire(&mut self.view, now_ms);
        let flush = self
            .autosave
            .tick(&mut self.session, &mut self.transport, &mut self.view, now_ms);
        let autosave = &self.autosave;
        let poll = self.poller.tick(
            now_ms,
            &mut self.session,
            &mut self.transport,
            &mut self.view,
            &mut self.merge,
            |key| autosave.is_pending(key),
        );
        let heartbeat = self
            .heartbeat
            .tick(now_ms, &self.session, &mut self.transport, &mut self.view);
        TickReport {
            poll,
            heartbeat,
            flush,
        }
    }
}
