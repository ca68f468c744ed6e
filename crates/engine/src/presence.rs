use advance_core::{ActiveUser, ShowId, UserRef};
use advance_storage::{PresenceRecord, Storage};

use crate::EngineError;

/// Who is looking at which show, on which tab, with which field focused.
///
/// Writes are plain upserts keyed by `(show, user)`; a browser tab issues
/// one request at a time, so the last write for a key is always the
/// freshest. Expiry is decided when listing, nothing is ever swept.
#[derive(Debug, Clone)]
pub struct PresenceTracker {
    expiry_ms: u64,
}

impl PresenceTracker {
    pub fn new(expiry_ms: u64) -> Self {
        Self { expiry_ms }
    }

    pub fn expiry_ms(&self) -> u64 {
        self.expiry_ms
    }

    pub fn touch<S: Storage>(
        &self,
        storage: &mut S,
        show_id: ShowId,
        user: &UserRef,
        tab: &str,
        focused_field: Option<&str>,
        now_ms: u64,
    ) -> Result<(), EngineError> {
        if tab.is_empty() {
            return Err(EngineError::InvalidRequest("tab must not be empty".into()));
        }
        storage.upsert_presence(&PresenceRecord {
            show_id,
            user_id: user.id,
            display_name: user.name.clone(),
            tab: tab.to_string(),
            focused_field: focused_field.map(str::to_string),
            last_seen_ms: now_ms,
        })?;
        Ok(())
    }

    /// Entries seen within the expiry window, annotated for display.
    pub fn list_active<S: Storage>(
        &self,
        storage: &S,
        show_id: ShowId,
        now_ms: u64,
    ) -> Result<Vec<ActiveUser>, EngineError> {
        let after_ms = now_ms as i64 - self.expiry_ms as i64;
        let records = storage.get_presence_after(show_id, after_ms)?;
        Ok(records
            .iter()
            .map(|r| {
                ActiveUser::new(
                    r.user_id,
                    &r.display_name,
                    &r.tab,
                    r.focused_field.as_deref(),
                    r.last_seen_ms,
                )
            })
            .collect())
    }
}
