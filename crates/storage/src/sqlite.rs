use std::collections::BTreeMap;

use rusqlite::{Connection, OptionalExtension};

use advance_core::{FormName, Hlc, ShowId, SyncCursor, UserId};

use crate::error::StorageError;
use crate::traits::{FieldRecord, FieldWrite, PresenceRecord, SaveRecord, Storage};

/// Convert Vec<u8> to fixed-size array with proper error handling.
fn to_array<const N: usize>(v: Vec<u8>, label: &str) -> Result<[u8; N], StorageError> {
    v.try_into()
        .map_err(|_| StorageError::Serialization(format!("invalid {label} length")))
}

fn to_hlc(v: Vec<u8>, label: &str) -> Result<Hlc, StorageError> {
    Ok(Hlc::from_bytes(&to_array::<12>(v, label)?))
}

fn to_form(s: &str) -> Result<FormName, StorageError> {
    Ok(s.parse::<FormName>()?)
}

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

type FieldRow = (String, String, String, Vec<u8>, i64);

fn field_record(show_id: ShowId, row: FieldRow) -> Result<FieldRecord, StorageError> {
    let (form, field_key, value, updated_at, updated_by) = row;
    Ok(FieldRecord {
        show_id,
        form: to_form(&form)?,
        field_key,
        value,
        updated_at: to_hlc(updated_at, "updated_at")?,
        updated_by: UserId::new(updated_by),
    })
}

/// Move a show's cursor up to `revision`; a lower revision is a no-op.
fn raise_show_cursor(conn: &Connection, show_id: ShowId, revision: &[u8; 12]) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO show_cursors (show_id, cursor) VALUES (?1, ?2)
         ON CONFLICT(show_id) DO UPDATE SET cursor = excluded.cursor
         WHERE excluded.cursor > show_cursors.cursor",
        rusqlite::params![show_id.get(), &revision[..]],
    )?;
    Ok(())
}

impl Storage for SqliteStorage {
    fn write_fields(&mut self, write: &FieldWrite<'_>) -> Result<(), StorageError> {
        let snapshot = rmp_serde::to_vec(write.fields)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let revision = write.revision.to_bytes();

        let tx = self.conn.transaction()?;

        for (field_key, value) in write.fields {
            tx.execute(
                "INSERT INTO field_values (show_id, form, field_key, value, updated_at, updated_by)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(show_id, form, field_key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at,
                    updated_by = excluded.updated_by",
                rusqlite::params![
                    write.show_id.get(),
                    write.form.as_str(),
                    field_key,
                    value,
                    &revision[..],
                    write.saved_by.get(),
                ],
            )?;
        }

        raise_show_cursor(&tx, write.show_id, &revision)?;

        tx.execute(
            "INSERT INTO save_history (show_id, form, saved_by, saved_at_ms, revision, snapshot)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                write.show_id.get(),
                write.form.as_str(),
                write.saved_by.get(),
                write.saved_at_ms as i64,
                &revision[..],
                snapshot,
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn get_fields(
        &self,
        show_id: ShowId,
        form: FormName,
    ) -> Result<BTreeMap<String, String>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT field_key, value FROM field_values WHERE show_id = ?1 AND form = ?2")?;
        let fields = stmt
            .query_map(rusqlite::params![show_id.get(), form.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Ok(fields)
    }

    fn get_field(
        &self,
        show_id: ShowId,
        form: FormName,
        field_key: &str,
    ) -> Result<Option<FieldRecord>, StorageError> {
        let row: Option<FieldRow> = self
            .conn
            .query_row(
                "SELECT form, field_key, value, updated_at, updated_by FROM field_values
                 WHERE show_id = ?1 AND form = ?2 AND field_key = ?3",
                rusqlite::params![show_id.get(), form.as_str(), field_key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()?;
        row.map(|r| field_record(show_id, r)).transpose()
    }

    fn get_field_changes_since(
        &self,
        show_id: ShowId,
        form: FormName,
        since: SyncCursor,
    ) -> Result<Vec<FieldRecord>, StorageError> {
        // The zero blob sorts below every issued HLC.
        let since_bytes = since.hlc().unwrap_or(Hlc::new(0, 0)).to_bytes();
        let inclusive = since.is_beginning();
        let mut stmt = self.conn.prepare(
            "SELECT form, field_key, value, updated_at, updated_by FROM field_values
             WHERE show_id = ?1 AND form = ?2 AND (updated_at > ?3 OR ?4)
             ORDER BY updated_at, field_key",
        )?;
        let rows = stmt
            .query_map(
                rusqlite::params![show_id.get(), form.as_str(), &since_bytes[..], inclusive],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )?
            .collect::<Result<Vec<FieldRow>, _>>()?;

        rows.into_iter().map(|r| field_record(show_id, r)).collect()
    }

    fn get_show_cursor(&self, show_id: ShowId) -> Result<SyncCursor, StorageError> {
        let bytes: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT cursor FROM show_cursors WHERE show_id = ?1",
                rusqlite::params![show_id.get()],
                |row| row.get(0),
            )
            .optional()?;
        match bytes {
            Some(b) => Ok(SyncCursor::at(to_hlc(b, "cursor")?)),
            None => Ok(SyncCursor::BEGINNING),
        }
    }

    fn advance_show_cursor(&mut self, show_id: ShowId, cursor: Hlc) -> Result<(), StorageError> {
        raise_show_cursor(&self.conn, show_id, &cursor.to_bytes())
    }

    fn get_max_cursor(&self) -> Result<Option<Hlc>, StorageError> {
        let bytes: Option<Vec<u8>> =
            self.conn
                .query_row("SELECT MAX(cursor) FROM show_cursors", [], |row| row.get(0))?;
        bytes.map(|b| to_hlc(b, "cursor")).transpose()
    }

    fn upsert_presence(&mut self, record: &PresenceRecord) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO presence (show_id, user_id, display_name, tab, focused_field, last_seen_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(show_id, user_id) DO UPDATE SET
                display_name = excluded.display_name,
                tab = excluded.tab,
                focused_field = excluded.focused_field,
                last_seen_ms = excluded.last_seen_ms",
            rusqlite::params![
                record.show_id.get(),
                record.user_id.get(),
                record.display_name,
                record.tab,
                record.focused_field,
                record.last_seen_ms as i64,
            ],
        )?;
        Ok(())
    }

    fn get_presence_after(
        &self,
        show_id: ShowId,
        after_ms: i64,
    ) -> Result<Vec<PresenceRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, display_name, tab, focused_field, last_seen_ms FROM presence
             WHERE show_id = ?1 AND last_seen_ms > ?2
             ORDER BY display_name, user_id",
        )?;
        let records = stmt
            .query_map(rusqlite::params![show_id.get(), after_ms], |row| {
                Ok(PresenceRecord {
                    show_id,
                    user_id: UserId::new(row.get(0)?),
                    display_name: row.get(1)?,
                    tab: row.get(2)?,
                    focused_field: row.get(3)?,
                    last_seen_ms: row.get::<_, i64>(4)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn get_latest_save_by_others(
        &self,
        show_id: ShowId,
        user_id: UserId,
        since_ms: u64,
    ) -> Result<Option<u64>, StorageError> {
        let latest: Option<i64> = self.conn.query_row(
            "SELECT MAX(saved_at_ms) FROM save_history
             WHERE show_id = ?1 AND saved_by != ?2 AND saved_at_ms > ?3",
            rusqlite::params![show_id.get(), user_id.get(), since_ms as i64],
            |row| row.get(0),
        )?;
        Ok(latest.map(|ms| ms as u64))
    }

    fn get_save_history(
        &self,
        show_id: ShowId,
        form: FormName,
        limit: usize,
    ) -> Result<Vec<SaveRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, saved_by, saved_at_ms, revision, snapshot FROM save_history
             WHERE show_id = ?1 AND form = ?2
             ORDER BY id DESC LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(
                rusqlite::params![show_id.get(), form.as_str(), limit as i64],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, Vec<u8>>(3)?,
                        row.get::<_, Vec<u8>>(4)?,
                    ))
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;

        let mut result = Vec::with_capacity(rows.len());
        for (id, saved_by, saved_at_ms, revision, snapshot) in rows {
            let snapshot: BTreeMap<String, String> = rmp_serde::from_slice(&snapshot)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            result.push(SaveRecord {
                id,
                show_id,
                form,
                saved_by: UserId::new(saved_by),
                saved_at_ms: saved_at_ms as u64,
                revision: to_hlc(revision, "revision")?,
                snapshot,
            });
        }
        Ok(result)
    }
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn save(
        storage: &mut SqliteStorage,
        show: i64,
        data: &BTreeMap<String, String>,
        revision: Hlc,
        by: i64,
        at_ms: u64,
    ) {
        storage
            .write_fields(&FieldWrite {
                show_id: ShowId::new(show),
                form: FormName::Advance,
                fields: data,
                revision,
                saved_by: UserId::new(by),
                saved_at_ms: at_ms,
            })
            .unwrap();
    }

    #[test]
    fn write_then_read_fields() {
        let mut s = SqliteStorage::open_in_memory().unwrap();
        let show = ShowId::new(1);
        save(&mut s, 1, &fields(&[("venue", "Main Hall"), ("radio_channel", "16")]), Hlc::new(10, 0), 7, 10);

        let all = s.get_fields(show, FormName::Advance).unwrap();
        assert_eq!(all.get("venue").map(String::as_str), Some("Main Hall"));
        assert_eq!(all.len(), 2);
        assert!(s.get_fields(show, FormName::PostNotes).unwrap().is_empty());

        let rec = s.get_field(show, FormName::Advance, "venue").unwrap().unwrap();
        assert_eq!(rec.updated_at, Hlc::new(10, 0));
        assert_eq!(rec.updated_by, UserId::new(7));
        assert!(s.get_field(show, FormName::Advance, "nope").unwrap().is_none());
    }

    #[test]
    fn changes_since_is_strict() {
        let mut s = SqliteStorage::open_in_memory().unwrap();
        let show = ShowId::new(1);
        save(&mut s, 1, &fields(&[("a", "1")]), Hlc::new(10, 0), 1, 10);
        save(&mut s, 1, &fields(&[("b", "2")]), Hlc::new(20, 0), 1, 20);

        let all = s.get_field_changes_since(show, FormName::Advance, SyncCursor::BEGINNING).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].field_key, "a");

        let after_first = s
            .get_field_changes_since(show, FormName::Advance, SyncCursor::at(Hlc::new(10, 0)))
            .unwrap();
        assert_eq!(after_first.len(), 1);
        assert_eq!(after_first[0].field_key, "b");

        let none = s
            .get_field_changes_since(show, FormName::Advance, SyncCursor::at(Hlc::new(20, 0)))
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn show_cursor_only_moves_forward() {
        let mut s = SqliteStorage::open_in_memory().unwrap();
        let show = ShowId::new(4);
        assert_eq!(s.get_show_cursor(show).unwrap(), SyncCursor::BEGINNING);
        save(&mut s, 4, &fields(&[("a", "1")]), Hlc::new(30, 0), 1, 30);
        save(&mut s, 4, &fields(&[("a", "2")]), Hlc::new(25, 0), 1, 31);
        assert_eq!(s.get_show_cursor(show).unwrap(), SyncCursor::at(Hlc::new(30, 0)));
        assert_eq!(s.get_max_cursor().unwrap(), Some(Hlc::new(30, 0)));
    }

    #[test]
    fn issued_cursor_is_kept_and_never_lowered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("advance.db");
        let path = path.to_str().unwrap();
        {
            let mut s = SqliteStorage::open(path).unwrap();
            s.advance_show_cursor(ShowId::new(5), Hlc::new(40, 0)).unwrap();
            s.advance_show_cursor(ShowId::new(5), Hlc::new(35, 2)).unwrap();
            assert!(s.get_fields(ShowId::new(5), FormName::Advance).unwrap().is_empty());
        }
        let mut s = SqliteStorage::open(path).unwrap();
        assert_eq!(s.get_max_cursor().unwrap(), Some(Hlc::new(40, 0)));
        save(&mut s, 5, &fields(&[("a", "1")]), Hlc::new(38, 0), 1, 38);
        assert_eq!(s.get_show_cursor(ShowId::new(5)).unwrap(), SyncCursor::at(Hlc::new(40, 0)));
    }

    #[test]
    fn presence_upsert_keeps_one_row_per_user() {
        let mut s = SqliteStorage::open_in_memory().unwrap();
        let show = ShowId::new(1);
        let mut rec = PresenceRecord {
            show_id: show,
            user_id: UserId::new(2),
            display_name: "Bo".into(),
            tab: "advance".into(),
            focused_field: Some("venue".into()),
            last_seen_ms: 1_000,
        };
        s.upsert_presence(&rec).unwrap();
        rec.tab = "schedule".into();
        rec.focused_field = None;
        rec.last_seen_ms = 2_000;
        s.upsert_presence(&rec).unwrap();

        let rows = s.get_presence_after(show, 0).unwrap();
        assert_eq!(rows, vec![rec]);
        assert!(s.get_presence_after(show, 2_000).unwrap().is_empty());
    }

    #[test]
    fn saves_by_others_ignore_own_saves() {
        let mut s = SqliteStorage::open_in_memory().unwrap();
        let show = ShowId::new(1);
        save(&mut s, 1, &fields(&[("a", "1")]), Hlc::new(10, 0), 1, 100);
        assert_eq!(s.get_latest_save_by_others(show, UserId::new(1), 0).unwrap(), None);
        save(&mut s, 1, &fields(&[("a", "2")]), Hlc::new(11, 0), 2, 200);
        save(&mut s, 1, &fields(&[("a", "3")]), Hlc::new(12, 0), 1, 300);
        assert_eq!(s.get_latest_save_by_others(show, UserId::new(1), 0).unwrap(), Some(200));
        assert_eq!(s.get_latest_save_by_others(show, UserId::new(1), 200).unwrap(), None);
    }

    #[test]
    fn history_round_trips_snapshot() {
        let mut s = SqliteStorage::open_in_memory().unwrap();
        let data = fields(&[("runner_name", "Sam")]);
        save(&mut s, 1, &data, Hlc::new(10, 0), 3, 100);
        save(&mut s, 1, &fields(&[("runner_name", "Sasha")]), Hlc::new(11, 0), 3, 110);

        let history = s.get_save_history(ShowId::new(1), FormName::Advance, 10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].snapshot, data);
        assert_eq!(history[0].revision, Hlc::new(11, 0));
        assert_eq!(s.get_save_history(ShowId::new(1), FormName::Advance, 1).unwrap().len(), 1);
    }

    #[test]
    fn file_backed_storage_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("advance.db");
        let path = path.to_str().unwrap();
        {
            let mut s = SqliteStorage::open(path).unwrap();
            save(&mut s, 9, &fields(&[("venue", "Studio")]), Hlc::new(50, 1), 1, 50);
        }
        let s = SqliteStorage::open(path).unwrap();
        assert_eq!(s.get_show_cursor(ShowId::new(9)).unwrap(), SyncCursor::at(Hlc::new(50, 1)));
        assert_eq!(
            s.get_fields(ShowId::new(9), FormName::Advance).unwrap().get("venue").map(String::as_str),
            Some("Studio")
        );
    }
}
