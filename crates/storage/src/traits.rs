use std::collections::BTreeMap;

use advance_core::{FormName, Hlc, ShowId, SyncCursor, UserId};

use crate::error::StorageError;

/// One stored field value. Last writer wins per `(show, form, field_key)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRecord {
    pub show_id: ShowId,
    pub form: FormName,
    pub field_key: String,
    pub value: String,
    pub updated_at: Hlc,
    pub updated_by: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceRecord {
    pub show_id: ShowId,
    pub user_id: UserId,
    pub display_name: String,
    pub tab: String,
    pub focused_field: Option<String>,
    pub last_seen_ms: u64,
}

/// A successful save, with the values it wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveRecord {
    pub id: i64,
    pub show_id: ShowId,
    pub form: FormName,
    pub saved_by: UserId,
    pub saved_at_ms: u64,
    pub revision: Hlc,
    pub snapshot: BTreeMap<String, String>,
}

/// Everything one save writes, applied atomically by [`Storage::write_fields`].
#[derive(Debug, Clone)]
pub struct FieldWrite<'a> {
    pub show_id: ShowId,
    pub form: FormName,
    pub fields: &'a BTreeMap<String, String>,
    pub revision: Hlc,
    pub saved_by: UserId,
    pub saved_at_ms: u64,
}

pub trait Storage {
    /// Upsert the fields, advance the show cursor to `revision` and append a
    /// history row, all in one transaction.
    fn write_fields(&mut self, write: &FieldWrite<'_>) -> Result<(), StorageError>;

    fn get_fields(
        &self,
        show_id: ShowId,
        form: FormName,
    ) -> Result<BTreeMap<String, String>, StorageError>;

    fn get_field(
        &self,
        show_id: ShowId,
        form: FormName,
        field_key: &str,
    ) -> Result<Option<FieldRecord>, StorageError>;

    /// Fields with `updated_at` strictly after `since`, oldest first.
    fn get_field_changes_since(
        &self,
        show_id: ShowId,
        form: FormName,
        since: SyncCursor,
    ) -> Result<Vec<FieldRecord>, StorageError>;

    fn get_show_cursor(&self, show_id: ShowId) -> Result<SyncCursor, StorageError>;

    /// Raise a show's cursor to `cursor` without writing any field. Used
    /// when a cursor is handed out for a show that has never been saved.
    fn advance_show_cursor(&mut self, show_id: ShowId, cursor: Hlc) -> Result<(), StorageError>;

    /// Highest cursor across all shows, used to resume the server clock.
    fn get_max_cursor(&self) -> Result<Option<Hlc>, StorageError>;

    fn upsert_presence(&mut self, record: &PresenceRecord) -> Result<(), StorageError>;

    /// Presence rows for the show whose `last_seen_ms` is strictly after `after_ms`,
    /// ordered by display name then user id.
    fn get_presence_after(
        &self,
        show_id: ShowId,
        after_ms: i64,
    ) -> Result<Vec<PresenceRecord>, StorageError>;

    /// Latest `saved_at_ms` of any save on the show by someone other than
    /// `user_id` strictly after `since_ms`.
    fn get_latest_save_by_others(
        &self,
        show_id: ShowId,
        user_id: UserId,
        since_ms: u64,
    ) -> Result<Option<u64>, StorageError>;

    /// Most recent saves for the form, newest first.
    fn get_save_history(
        &self,
        show_id: ShowId,
        form: FormName,
        limit: usize,
    ) -> Result<Vec<SaveRecord>, StorageError>;
}
