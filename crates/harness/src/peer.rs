use std::str::FromStr;

use advance_client::{FlushOutcome, MemoryView, SyncClient, TickReport, UnloadDecision};
use advance_core::{FormName, ManualTime, ShowId, SyncConfig, UserRef};

use crate::LoopbackTransport;

/// One browser tab on the test network, driven by the shared clock.
pub struct TestPeer {
    pub client: SyncClient<LoopbackTransport, MemoryView>,
    time: ManualTime,
}

impl TestPeer {
    pub(crate) fn new(
        config: &SyncConfig,
        show_id: ShowId,
        user: UserRef,
        tab: &str,
        transport: LoopbackTransport,
        view: MemoryView,
        time: ManualTime,
    ) -> Self {
        let client = SyncClient::new(config, show_id, user, tab, transport, view, time.get());
        Self { client, time }
    }

    pub fn view(&self) -> &MemoryView {
        self.client.view()
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.client.view().value(key)
    }

    pub fn is_dirty(&self) -> bool {
        self.client.session().is_dirty()
    }

    /// Run whatever is due at the shared clock's current time.
    pub fn tick(&mut self) -> TickReport {
        self.client.tick(self.time.get())
    }

    /// Focus `key` and type `value` into it, as the form on the current tab.
    pub fn type_into(&mut self, key: &str, value: &str) {
        let form = FormName::from_str(self.client.session().active_tab()).unwrap_or(FormName::Advance);
        self.client.focus(key);
        self.client.view_mut().type_value(key, value);
        self.client.edited(form, key, self.time.get());
    }

    pub fn blur(&mut self, key: &str) {
        self.client.blur(key);
    }

    pub fn switch_tab(&mut self, tab: &str) {
        self.client.switch_tab(tab);
    }

    pub fn save_shortcut(&mut self) -> FlushOutcome {
        self.client.save_shortcut(self.time.get())
    }

    pub fn before_unload(&self) -> UnloadDecision {
        self.client.before_unload()
    }

    pub fn set_offline(&mut self, offline: bool) {
        self.client.transport_mut().set_offline(offline);
    }

    pub fn set_save_error(&mut self, message: Option<&str>) {
        self.client.transport_mut().set_save_error(message);
    }
}
