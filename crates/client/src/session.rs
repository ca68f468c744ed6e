use advance_core::{SessionId, ShowId, SyncCursor, UserRef, protocol::focus_param};

/// Everything one open show page knows about itself. Passed explicitly to
/// every poller, merge and save step; nothing here is shared with other
/// tabs.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub show_id: ShowId,
    pub user: UserRef,
    pub session: SessionId,
    active_tab: String,
    focused_field: Option<String>,
    cursor: SyncCursor,
    dirty: bool,
    started_at_ms: u64,
}

impl SessionContext {
    pub fn new(show_id: ShowId, user: UserRef, tab: &str, started_at_ms: u64) -> Self {
        Self {
            show_id,
            user,
            session: SessionId::new(),
            active_tab: tab.to_string(),
            focused_field: None,
            cursor: SyncCursor::BEGINNING,
            dirty: false,
            started_at_ms,
        }
    }

    pub fn active_tab(&self) -> &str {
        &self.active_tab
    }

    pub fn set_active_tab(&mut self, tab: &str) {
        self.active_tab = tab.to_string();
    }

    pub fn focused_field(&self) -> Option<&str> {
        self.focused_field.as_deref()
    }

    /// Focus moved to `key`. Replaces any previous focus.
    pub fn focus(&mut self, key: &str) {
        self.focused_field = Some(key.to_string());
    }

    /// Focus left `key`. A blur for a field that is no longer focused is
    /// ignored, since the next focus event may already have arrived.
    pub fn blur(&mut self, key: &str) {
        if self.focused_field.as_deref() == Some(key) {
            self.focused_field = None;
        }
    }

    pub fn is_focused(&self, key: &str) -> bool {
        self.focused_field.as_deref() == Some(key)
    }

    pub(crate) fn focus_param(&self) -> String {
        focus_param(self.focused_field())
    }

    pub fn cursor(&self) -> SyncCursor {
        self.cursor
    }

    /// Adopt the cursor from a successful poll. Never moves backwards.
    pub fn advance_cursor(&mut self, cursor: SyncCursor) {
        if cursor > self.cursor {
            self.cursor = cursor;
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    /// Wall-clock ms when this page was opened; the reference point for
    /// "has someone else saved since".
    pub fn started_at_ms(&self) -> u64 {
        self.started_at_ms
    }
}
