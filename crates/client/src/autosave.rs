use std::collections::{BTreeMap, BTreeSet};

use advance_core::{FormName, protocol::{FieldMap, SaveRequest}};
use tracing::{debug, warn};

use crate::session::SessionContext;
use crate::transport::SyncTransport;
use crate::view::FieldView;

/// What the save indicator shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SaveStatus {
    #[default]
    Idle,
    Pending,
    Saved,
    Error(String),
}

/// Answer to the browser's "leave this page?" hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnloadDecision {
    Allow,
    Confirm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushTrigger {
    Debounce,
    Shortcut,
    SafetyNet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    Saved { fields: usize },
    Failed(String),
    /// Nothing was pending.
    Clean,
}

/// Collapses bursts of edits into few save calls.
///
/// Only the keys edited since the last successful save are sent, grouped
/// per form, so a save never rewrites fields this user did not touch.
#[derive(Debug, Clone)]
pub struct AutosaveScheduler {
    debounce_ms: u64,
    safety_flush_ms: u64,
    saved_clear_ms: u64,
    pending: BTreeMap<FormName, BTreeSet<String>>,
    debounce_due_ms: Option<u64>,
    next_safety_ms: u64,
    saved_clear_due_ms: Option<u64>,
    status: SaveStatus,
    saves_issued: u64,
}

impl AutosaveScheduler {
    pub fn new(debounce_ms: u64, safety_flush_ms: u64, saved_clear_ms: u64, start_ms: u64) -> Self {
        Self {
            debounce_ms,
            safety_flush_ms,
            saved_clear_ms,
            pending: BTreeMap::new(),
            debounce_due_ms: None,
            next_safety_ms: start_ms + safety_flush_ms,
            saved_clear_due_ms: None,
            status: SaveStatus::Idle,
            saves_issued: 0,
        }
    }

    pub fn status(&self) -> &SaveStatus {
        &self.status
    }

    pub fn debounce_pending(&self) -> bool {
        self.debounce_due_ms.is_some()
    }

    /// Save requests sent so far, successful or not.
    pub fn saves_issued(&self) -> u64 {
        self.saves_issued
    }

    pub fn pending_keys(&self, form: FormName) -> impl Iterator<Item = &str> {
        self.pending.get(&form).into_iter().flatten().map(String::as_str)
    }

    /// Whether `key` has an edit in any form that the server has not taken yet.
    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.values().any(|keys| keys.contains(key))
    }

    /// Record a local input or change event and restart the debounce timer.
    pub fn on_edit<V: FieldView>(
        &mut self,
        session: &mut SessionContext,
        view: &mut V,
        form: FormName,
        key: &str,
        now_ms: u64,
    ) {
        self.pending.entry(form).or_default().insert(key.to_string());
        session.set_dirty(true);
        self.debounce_due_ms = Some(now_ms + self.debounce_ms);
        self.saved_clear_due_ms = None;
        // A failed save keeps its message up until a save succeeds.
        if !matches!(self.status, SaveStatus::Error(_)) {
            self.set_status(view, SaveStatus::Pending);
        }
    }

    /// The save keyboard shortcut: flush now, bypassing the debounce.
    pub fn save_now<T: SyncTransport, V: FieldView>(
        &mut self,
        session: &mut SessionContext,
        transport: &mut T,
        view: &mut V,
        now_ms: u64,
    ) -> FlushOutcome {
        self.flush(session, transport, view, now_ms, FlushTrigger::Shortcut)
    }

    /// Fire whichever timers are due. Returns the flush performed, if any.
    pub fn tick<T: SyncTransport, V: FieldView>(
        &mut self,
        session: &mut SessionContext,
        transport: &mut T,
        view: &mut V,
        now_ms: u64,
    ) -> Option<FlushOutcome> {
        let mut outcome = None;
        if self.debounce_due_ms.is_some_and(|due| due <= now_ms) {
            outcome = Some(self.flush(session, transport, view, now_ms, FlushTrigger::Debounce));
        }
        if now_ms >= self.next_safety_ms {
            self.next_safety_ms = now_ms + self.safety_flush_ms;
            if outcome.is_none() && session.is_dirty() {
                outcome =
                    Some(self.flush(session, transport, view, now_ms, FlushTrigger::SafetyNet));
            }
        }
        if self.saved_clear_due_ms.is_some_and(|due| due <= now_ms) {
            self.saved_clear_due_ms = None;
            self.set_status(view, SaveStatus::Idle);
        }
        outcome
    }

    pub fn before_unload(&self, session: &SessionContext) -> UnloadDecision {
        if session.is_dirty() {
            UnloadDecision::Confirm
        } else {
            UnloadDecision::Allow
        }
    }

    fn flush<T: SyncTransport, V: FieldView>(
        &mut self,
        session: &mut SessionContext,
        transport: &mut T,
        view: &mut V,
        now_ms: u64,
        trigger: FlushTrigger,
    ) -> FlushOutcome {
        self.debounce_due_ms = None;
        if self.pending.is_empty() {
            return FlushOutcome::Clean;
        }

        let forms: Vec<FormName> = self.pending.keys().copied().collect();
        let mut saved = 0;
        for form in forms {
            let Some(keys) = self.pending.get(&form) else {
                continue;
            };
            let data: FieldMap = keys
                .iter()
                .filter_map(|key| view.read_value(key).map(|value| (key.clone(), value)))
                .collect();
            if data.is_empty() {
                self.pending.remove(&form);
                continue;
            }

            let request = SaveRequest {
                show_id: session.show_id,
                form,
                data,
            };
            self.saves_issued += 1;
            let error = match transport.save_fields(&request) {
                Ok(response) if response.success => None,
                Ok(response) => Some(response.error.unwrap_or_else(|| "Save failed".to_string())),
                Err(e) => Some(e.to_string()),
            };
            if let Some(message) = error {
                warn!(show_id = %session.show_id, form = %form, ?trigger, error = %message, "save failed");
                self.set_status(view, SaveStatus::Error(message.clone()));
                return FlushOutcome::Failed(message);
            }
            debug!(show_id = %session.show_id, form = %form, ?trigger, fields = request.data.len(), "saved");
            saved += request.data.len();
            self.pending.remove(&form);
        }

        session.set_dirty(false);
        self.set_status(view, SaveStatus::Saved);
        self.saved_clear_due_ms = Some(now_ms + self.saved_clear_ms);
        FlushOutcome::Saved { fields: saved }
    }

    fn set_status<V: FieldView>(&mut self, view: &mut V, status: SaveStatus) {
        view.set_status(&status);
        self.status = status;
    }
}
