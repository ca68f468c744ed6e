pub mod error;
pub mod presence;

pub use error::EngineError;
pub use presence::PresenceTracker;

use advance_core::{
    ActiveUser, FormName, ShowId, SyncConfig, SyncCursor, TimeSource, UserId, UserRef,
    hlc::HlcClock,
    protocol::{
        FieldMap, HeartbeatRequest, HeartbeatResponse, PollRequest, PollResponse, SaveRequest,
        SaveResponse, parse_focus,
    },
    time::SystemClock,
};
use advance_storage::{FieldWrite, SaveRecord, SqliteStorage, Storage};
use tracing::{debug, info, warn};

/// The form whose field changes are delivered by `poll_delta`.
pub const LIVE_FORM: FormName = FormName::Advance;

/// Answer to "has anyone else saved this show since I opened it?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtherSaved {
    pub flag: bool,
    pub saved_at_ms: Option<u64>,
}

/// Server side of field sync: the per-show cursor store, presence
/// tracking, and the save path that advances cursors.
///
/// Each method is one independent request. The engine is `&mut` for every
/// write, so a host serving several clients wraps it in a mutex; the only
/// state it keeps outside storage is the cursor clock.
pub struct SyncEngine {
    clock: HlcClock,
    storage: SqliteStorage,
    time: Box<dyn TimeSource>,
    config: SyncConfig,
    presence: PresenceTracker,
}

impl SyncEngine {
    pub fn new(storage: SqliteStorage, config: SyncConfig) -> Result<Self, EngineError> {
        Self::with_time_source(storage, config, Box::new(SystemClock))
    }

    pub fn with_time_source(
        storage: SqliteStorage,
        config: SyncConfig,
        time: Box<dyn TimeSource>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        // Cursors handed out before a restart must stay below new ones.
        let clock = match storage.get_max_cursor()? {
            Some(last) => HlcClock::resume_from(last),
            None => HlcClock::new(),
        };
        let presence = PresenceTracker::new(config.presence_expiry_ms);
        Ok(Self {
            clock,
            storage,
            time,
            config,
            presence,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    fn now_ms(&self) -> Result<u64, EngineError> {
        Ok(self.time.now_ms()?)
    }

    // ========================================================================
    // Change Cursor Store
    // ========================================================================

    /// Field changes on the live form newer than `since`, and the cursor the
    /// caller should present next time.
    ///
    /// The returned cursor is never below `since`. A show that has never been
    /// saved still gets a real timestamp back, so a client's second poll
    /// never starts from the beginning again. That timestamp is recorded as
    /// the show's cursor.
    pub fn get_field_deltas_since(
        &mut self,
        show_id: ShowId,
        since: SyncCursor,
    ) -> Result<(SyncCursor, FieldMap), EngineError> {
        let changes = self.storage.get_field_changes_since(show_id, LIVE_FORM, since)?;
        let mut fields = FieldMap::new();
        for change in changes {
            fields.insert(change.field_key, change.value);
        }

        let latest = self.storage.get_show_cursor(show_id)?;
        let cursor = if latest.is_beginning() && since.is_beginning() {
            let now = self.now_ms()?;
            let issued = self.clock.tick_at(now);
            // Persist it so a restarted clock resumes above it.
            self.storage.advance_show_cursor(show_id, issued)?;
            SyncCursor::at(issued)
        } else {
            latest.max(since)
        };
        Ok((cursor, fields))
    }

    // ========================================================================
    // Presence
    // ========================================================================

    pub fn touch_presence(
        &mut self,
        show_id: ShowId,
        user: &UserRef,
        tab: &str,
        focused_field: Option<&str>,
    ) -> Result<(), EngineError> {
        let now = self.now_ms()?;
        self.presence
            .touch(&mut self.storage, show_id, user, tab, focused_field, now)
    }

    pub fn list_active(&self, show_id: ShowId) -> Result<Vec<ActiveUser>, EngineError> {
        let now = self.now_ms()?;
        self.presence.list_active(&self.storage, show_id, now)
    }

    /// Refresh the caller's presence and return everyone currently active.
    pub fn record_presence(
        &mut self,
        show_id: ShowId,
        user: &UserRef,
        tab: &str,
        focused_field: Option<&str>,
    ) -> Result<Vec<ActiveUser>, EngineError> {
        self.touch_presence(show_id, user, tab, focused_field)?;
        self.list_active(show_id)
    }

    // ========================================================================
    // Client Endpoints
    // ========================================================================

    /// One Sync Poller cycle: refresh presence, collect deltas, list presence.
    pub fn poll_delta(
        &mut self,
        user: &UserRef,
        request: &PollRequest,
    ) -> Result<PollResponse, EngineError> {
        let show_id = request.show_id;
        self.touch_presence(
            show_id,
            user,
            &request.tab,
            parse_focus(&request.focused_field),
        )?;

        let since = SyncCursor::parse_lenient(&request.since);
        let (cursor, fields) = self.get_field_deltas_since(show_id, since)?;
        let active_users = self.list_active(show_id)?;

        debug!(
            show_id = %show_id,
            session = %request.session,
            since = %since,
            cursor = %cursor,
            changed = fields.len(),
            active = active_users.len(),
            "poll delta"
        );

        Ok(PollResponse {
            cursor,
            fields,
            active_users,
        })
    }

    /// One Heartbeat cycle for tabs that do not live-sync fields.
    pub fn heartbeat(
        &mut self,
        user: &UserRef,
        request: &HeartbeatRequest,
    ) -> Result<HeartbeatResponse, EngineError> {
        let show_id = request.show_id;
        let active_users = self.record_presence(
            show_id,
            user,
            &request.tab,
            parse_focus(&request.focused_field),
        )?;
        let other = self.has_other_user_saved_since(show_id, user.id, request.since_ms)?;

        debug!(
            show_id = %show_id,
            session = %request.session,
            other_saved = other.flag,
            active = active_users.len(),
            "heartbeat"
        );

        Ok(HeartbeatResponse {
            active_users,
            other_saved: other.flag,
            saved_at_ms: other.saved_at_ms,
        })
    }

    /// Persist `data` into `form`, stamping every field with one fresh
    /// timestamp and advancing the show cursor to it. Returns the show's
    /// cursor after the save; an empty save writes nothing.
    pub fn save_fields(
        &mut self,
        user: &UserRef,
        show_id: ShowId,
        form: FormName,
        data: &FieldMap,
    ) -> Result<SyncCursor, EngineError> {
        if data.keys().any(|k| k.is_empty()) {
            return Err(EngineError::InvalidRequest("field key must not be empty".into()));
        }
        if data.is_empty() {
            return Ok(self.storage.get_show_cursor(show_id)?);
        }

        let now = self.now_ms()?;
        let revision = self.clock.tick_at(now);
        self.storage.write_fields(&FieldWrite {
            show_id,
            form,
            fields: data,
            revision,
            saved_by: user.id,
            saved_at_ms: now,
        })?;

        info!(
            show_id = %show_id,
            form = %form,
            user = %user.id,
            fields = data.len(),
            "fields saved"
        );
        Ok(SyncCursor::at(revision))
    }

    /// `save_fields` with failures folded into the wire response.
    pub fn save_fields_response(&mut self, user: &UserRef, request: &SaveRequest) -> SaveResponse {
        match self.save_fields(user, request.show_id, request.form, &request.data) {
            Ok(_) => SaveResponse::ok(),
            Err(e) => {
                warn!(show_id = %request.show_id, form = %request.form, error = %e, "save failed");
                SaveResponse::failed(e.to_string())
            }
        }
    }

    pub fn has_other_user_saved_since(
        &self,
        show_id: ShowId,
        user_id: UserId,
        since_ms: u64,
    ) -> Result<OtherSaved, EngineError> {
        let saved_at_ms = self
            .storage
            .get_latest_save_by_others(show_id, user_id, since_ms)?;
        Ok(OtherSaved {
            flag: saved_at_ms.is_some(),
            saved_at_ms,
        })
    }

    // ========================================================================
    // Query Pass-Through
    // ========================================================================

    pub fn read_fields(&self, show_id: ShowId, form: FormName) -> Result<FieldMap, EngineError> {
        Ok(self.storage.get_fields(show_id, form)?)
    }

    pub fn form_history(
        &self,
        show_id: ShowId,
        form: FormName,
        limit: usize,
    ) -> Result<Vec<SaveRecord>, EngineError> {
        Ok(self.storage.get_save_history(show_id, form, limit)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use advance_core::{ManualTime, SessionId};

    const T0: u64 = 1_700_000_000_000;

    fn engine() -> (SyncEngine, ManualTime) {
        let time = ManualTime::new(T0);
        let engine = SyncEngine::with_time_source(
            SqliteStorage::open_in_memory().unwrap(),
            SyncConfig::default(),
            Box::new(time.clone()),
        )
        .unwrap();
        (engine, time)
    }

    fn data(pairs: &[(&str, &str)]) -> FieldMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn poll(show: ShowId, since: &SyncCursor, focus: &str) -> PollRequest {
        PollRequest {
            show_id: show,
            session: SessionId::new(),
            since: since.to_string(),
            tab: "advance".into(),
            focused_field: focus.into(),
        }
    }

    #[test]
    fn first_poll_delivers_everything_with_cursor() {
        let (mut engine, _) = engine();
        let show = ShowId::new(1);
        let ann = UserRef::new(1, "Ann Lee");
        engine.save_fields(&ann, show, FormName::Advance, &data(&[("arrival_time", "3:00pm")])).unwrap();

        let resp = engine.poll_delta(&ann, &poll(show, &SyncCursor::BEGINNING, "")).unwrap();
        assert_eq!(resp.fields.get("arrival_time").map(String::as_str), Some("3:00pm"));
        assert!(!resp.cursor.is_beginning());

        let again = engine.poll_delta(&ann, &poll(show, &resp.cursor, "")).unwrap();
        assert!(again.fields.is_empty());
        assert!(again.cursor >= resp.cursor);
    }

    #[test]
    fn never_saved_show_still_gets_a_cursor() {
        let (mut engine, time) = engine();
        let show = ShowId::new(5);
        let bo = UserRef::new(2, "Bo");
        let resp = engine.poll_delta(&bo, &poll(show, &SyncCursor::BEGINNING, "")).unwrap();
        assert!(resp.fields.is_empty());
        assert!(!resp.cursor.is_beginning());

        time.advance(10);
        engine.save_fields(&bo, show, FormName::Advance, &data(&[("venue", "Hall")])).unwrap();
        let next = engine.poll_delta(&bo, &poll(show, &resp.cursor, "")).unwrap();
        assert_eq!(next.fields.len(), 1);
        assert!(next.cursor > resp.cursor);
    }

    #[test]
    fn cursor_for_never_saved_show_is_stored() {
        let (mut engine, _) = engine();
        let show = ShowId::new(5);
        let bo = UserRef::new(2, "Bo");
        let resp = engine.poll_delta(&bo, &poll(show, &SyncCursor::BEGINNING, "")).unwrap();
        let issued = resp.cursor.hlc().unwrap();
        assert_eq!(engine.storage().get_max_cursor().unwrap(), Some(issued));
        assert_eq!(engine.storage().get_show_cursor(show).unwrap(), resp.cursor);

        // A second fresh page gets the same cursor instead of a new tick.
        let again = engine.poll_delta(&bo, &poll(show, &SyncCursor::BEGINNING, "")).unwrap();
        assert_eq!(again.cursor, resp.cursor);
    }

    #[test]
    fn later_saves_only_deliver_new_fields() {
        let (mut engine, _) = engine();
        let show = ShowId::new(1);
        let ann = UserRef::new(1, "Ann");
        engine.save_fields(&ann, show, FormName::Advance, &data(&[("a", "1"), ("b", "2")])).unwrap();
        let first = engine.poll_delta(&ann, &poll(show, &SyncCursor::BEGINNING, "")).unwrap();

        // Same wall-clock millisecond; the counter still orders it after.
        engine.save_fields(&ann, show, FormName::Advance, &data(&[("b", "3")])).unwrap();
        let second = engine.poll_delta(&ann, &poll(show, &first.cursor, "")).unwrap();
        assert_eq!(second.fields, data(&[("b", "3")]));
    }

    #[test]
    fn other_forms_do_not_appear_in_deltas() {
        let (mut engine, _) = engine();
        let show = ShowId::new(1);
        let ann = UserRef::new(1, "Ann");
        engine.save_fields(&ann, show, FormName::PostNotes, &data(&[("notes", "ok")])).unwrap();
        let resp = engine.poll_delta(&ann, &poll(show, &SyncCursor::BEGINNING, "")).unwrap();
        assert!(resp.fields.is_empty());
        assert_eq!(engine.read_fields(show, FormName::PostNotes).unwrap(), data(&[("notes", "ok")]));
    }

    #[test]
    fn garbage_cursor_resyncs_from_beginning() {
        let (mut engine, _) = engine();
        let show = ShowId::new(1);
        let ann = UserRef::new(1, "Ann");
        engine.save_fields(&ann, show, FormName::Advance, &data(&[("a", "1")])).unwrap();
        let mut req = poll(show, &SyncCursor::BEGINNING, "");
        req.since = "not-a-cursor".into();
        let resp = engine.poll_delta(&ann, &req).unwrap();
        assert_eq!(resp.fields.len(), 1);
    }

    #[test]
    fn poll_records_focus_in_presence() {
        let (mut engine, _) = engine();
        let show = ShowId::new(1);
        let ann = UserRef::new(1, "Ann Lee");
        let resp = engine.poll_delta(&ann, &poll(show, &SyncCursor::BEGINNING, "runner_name")).unwrap();
        assert_eq!(resp.active_users.len(), 1);
        assert_eq!(resp.active_users[0].focused_field.as_deref(), Some("runner_name"));
        assert_eq!(resp.active_users[0].initials, "AL");
    }

    #[test]
    fn heartbeat_reports_other_users_saves_only() {
        let (mut engine, time) = engine();
        let show = ShowId::new(1);
        let ann = UserRef::new(1, "Ann");
        let bo = UserRef::new(2, "Bo");
        let opened_at = time.get();
        let hb = HeartbeatRequest {
            show_id: show,
            session: SessionId::new(),
            tab: "schedule".into(),
            focused_field: String::new(),
            since_ms: opened_at,
        };

        time.advance(1_000);
        engine.save_fields(&ann, show, FormName::Schedule, &data(&[("load_in", "9am")])).unwrap();
        let resp = engine.heartbeat(&ann, &hb).unwrap();
        assert!(!resp.other_saved);

        time.advance(1_000);
        engine.save_fields(&bo, show, FormName::Advance, &data(&[("venue", "Hall")])).unwrap();
        let resp = engine.heartbeat(&ann, &hb).unwrap();
        assert!(resp.other_saved);
        assert_eq!(resp.saved_at_ms, Some(opened_at + 2_000));
        assert_eq!(resp.active_users.len(), 1);
    }

    #[test]
    fn save_rejects_empty_key_in_response() {
        let (mut engine, _) = engine();
        let req = SaveRequest {
            show_id: ShowId::new(1),
            form: FormName::Advance,
            data: data(&[("", "x")]),
        };
        let resp = engine.save_fields_response(&UserRef::new(1, "Ann"), &req);
        assert!(!resp.success);
        assert!(resp.error.unwrap().contains("field key"));
    }

    #[test]
    fn empty_save_writes_nothing() {
        let (mut engine, _) = engine();
        let show = ShowId::new(1);
        let cursor = engine.save_fields(&UserRef::new(1, "Ann"), show, FormName::Advance, &FieldMap::new()).unwrap();
        assert!(cursor.is_beginning());
        assert!(engine.form_history(show, FormName::Advance, 10).unwrap().is_empty());
    }

    #[test]
    fn history_lists_newest_first() {
        let (mut engine, time) = engine();
        let show = ShowId::new(1);
        let ann = UserRef::new(1, "Ann");
        engine.save_fields(&ann, show, FormName::Advance, &data(&[("a", "1")])).unwrap();
        time.advance(5);
        engine.save_fields(&ann, show, FormName::Advance, &data(&[("a", "2")])).unwrap();
        let history = engine.form_history(show, FormName::Advance, 10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].snapshot, data(&[("a", "2")]));
        assert_eq!(history[0].saved_at_ms, T0 + 5);
    }

    #[test]
    fn clock_resumes_above_persisted_cursors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("advance.db");
        let path = path.to_str().unwrap().to_string();
        let show = ShowId::new(1);
        let ann = UserRef::new(1, "Ann");

        let first = {
            let time = ManualTime::new(T0 + 60_000);
            let mut engine = SyncEngine::with_time_source(
                SqliteStorage::open(&path).unwrap(),
                SyncConfig::default(),
                Box::new(time),
            )
            .unwrap();
            engine.save_fields(&ann, show, FormName::Advance, &data(&[("a", "1")])).unwrap()
        };

        // Restart with a wall clock that is behind the stored cursor.
        let time = ManualTime::new(T0);
        let mut engine = SyncEngine::with_time_source(
            SqliteStorage::open(&path).unwrap(),
            SyncConfig::default(),
            Box::new(time),
        )
        .unwrap();
        let second = engine.save_fields(&ann, show, FormName::Advance, &data(&[("a", "2")])).unwrap();
        assert!(second > first);
    }
}
