//! SQLite-backed session index

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params, params_from_iter};
use tracing::{debug, info, instrument};

use rewind_core::{
    Browser, Clock, Os, SessionId, SessionIndex, SessionRecord, StorageError, SystemClock, User,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    id              TEXT PRIMARY KEY NOT NULL,
    client_id       TEXT NOT NULL DEFAULT '',
    user_agent      TEXT NOT NULL DEFAULT '',
    os              TEXT NOT NULL DEFAULT '',
    os_version      TEXT NOT NULL DEFAULT '',
    browser         TEXT NOT NULL DEFAULT '',
    browser_version TEXT NOT NULL DEFAULT '',
    device          TEXT NOT NULL DEFAULT '',
    user_id         TEXT NOT NULL DEFAULT '',
    user_email      TEXT NOT NULL DEFAULT '',
    user_name       TEXT NOT NULL DEFAULT '',
    updated_at      INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS sessions_updated_at_idx ON sessions (updated_at);
CREATE TABLE IF NOT EXISTS meta (
    session_id TEXT NOT NULL,
    key        TEXT NOT NULL,
    value      TEXT NOT NULL,
    PRIMARY KEY (session_id, key)
);
";

// Column order read by `row_to_record`
const SESSION_COLUMNS: &str = "s.id, s.client_id, s.user_agent, s.os, s.os_version, \
     s.browser, s.browser_version, s.device, s.user_id, s.user_email, s.user_name, s.updated_at";

/// Configuration for the session index
#[derive(Debug, Clone)]
pub struct SessionIndexConfig {
    /// Path to the SQLite database file
    pub db_path: PathBuf,
    /// How long a statement waits on a locked database before failing
    pub busy_timeout: Duration,
}

impl Default for SessionIndexConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/sessions.db"),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Session metadata index on SQLite
///
/// `updated_at` is stored as unix milliseconds and always comes from the
/// index's own [`Clock`].
pub struct SqliteSessionIndex {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl SqliteSessionIndex {
    /// Open or create the index file
    #[instrument(skip(config), fields(path = %config.db_path.display()))]
    pub fn open(config: &SessionIndexConfig) -> Result<Self, StorageError> {
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&config.db_path).map_err(sql_err)?;
        conn.busy_timeout(config.busy_timeout).map_err(sql_err)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(sql_err)?;

        let index = Self::init(conn)?;
        info!("Opened session index");
        Ok(index)
    }

    /// Open a private in-memory index
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory().map_err(sql_err)?)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA).map_err(sql_err)?;
        debug!("Initialized session index schema");
        Ok(Self {
            conn: Mutex::new(conn),
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the clock used to stamp `updated_at`
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Number of sessions in the index
    pub fn count(&self) -> Result<u64, StorageError> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))
            .map_err(sql_err)?;
        Ok(count.max(0) as u64)
    }

    fn load_meta(
        conn: &Connection,
        id: &SessionId,
    ) -> Result<BTreeMap<String, String>, StorageError> {
        let mut stmt = conn
            .prepare_cached("SELECT key, value FROM meta WHERE session_id = ?1")
            .map_err(sql_err)?;
        let rows = stmt
            .query_map([id.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(sql_err)?;
        rows.collect::<Result<_, _>>().map_err(sql_err)
    }
}

impl SessionIndex for SqliteSessionIndex {
    fn get(&self, id: &SessionId) -> Result<SessionRecord, StorageError> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions s WHERE s.id = ?1");
        let mut record = conn
            .query_row(&sql, [id.as_str()], row_to_record)
            .optional()
            .map_err(sql_err)?
            .ok_or_else(|| StorageError::not_found(format!("session {id}")))?;
        record.meta = Self::load_meta(&conn, id)?;
        Ok(record)
    }

    #[instrument(skip(self, params))]
    fn list(
        &self,
        filter: &str,
        params: &[String],
        offset: usize,
        limit: usize,
    ) -> Result<Vec<SessionRecord>, StorageError> {
        let mut sql = format!(
            "SELECT DISTINCT {SESSION_COLUMNS} FROM sessions s \
             LEFT JOIN meta ON meta.session_id = s.id"
        );
        if !filter.trim().is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(filter);
        }
        sql.push_str(" ORDER BY s.updated_at DESC, s.id DESC LIMIT ? OFFSET ?");

        let mut values: Vec<Value> = params.iter().cloned().map(Value::Text).collect();
        values.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
        values.push(Value::Integer(i64::try_from(offset).unwrap_or(i64::MAX)));

        let conn = self.conn.lock();
        let mut records: Vec<SessionRecord> = {
            let mut stmt = conn.prepare(&sql).map_err(sql_err)?;
            let rows = stmt
                .query_map(params_from_iter(values), row_to_record)
                .map_err(sql_err)?;
            rows.collect::<Result<_, _>>().map_err(sql_err)?
        };
        for record in &mut records {
            record.meta = Self::load_meta(&conn, &record.id)?;
        }

        debug!(found = records.len(), "Listed sessions");
        Ok(records)
    }

    #[instrument(skip(self, record), fields(session = %record.id))]
    fn upsert(&self, record: &SessionRecord) -> Result<(), StorageError> {
        let now = self.clock.now_utc().timestamp_millis();
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(sql_err)?;

        tx.execute(
            "INSERT INTO sessions (id, client_id, user_agent, os, os_version, browser,
                 browser_version, device, user_id, user_email, user_name, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(id) DO UPDATE SET
                 client_id = excluded.client_id,
                 user_agent = excluded.user_agent,
                 os = excluded.os,
                 os_version = excluded.os_version,
                 browser = excluded.browser,
                 browser_version = excluded.browser_version,
                 device = excluded.device,
                 user_id = excluded.user_id,
                 user_email = excluded.user_email,
                 user_name = excluded.user_name,
                 updated_at = excluded.updated_at",
            params![
                record.id.as_str(),
                record.client_id,
                record.user_agent,
                record.os.name,
                record.os.version,
                record.browser.name,
                record.browser.version,
                record.device,
                record.user.id,
                record.user.email,
                record.user.name,
                now,
            ],
        )
        .map_err(sql_err)?;

        tx.execute("DELETE FROM meta WHERE session_id = ?1", [record.id.as_str()])
            .map_err(sql_err)?;
        {
            let mut insert = tx
                .prepare_cached("INSERT INTO meta (session_id, key, value) VALUES (?1, ?2, ?3)")
                .map_err(sql_err)?;
            for (key, value) in &record.meta {
                insert
                    .execute(params![record.id.as_str(), key, value])
                    .map_err(sql_err)?;
            }
        }

        tx.commit().map_err(sql_err)?;
        debug!(meta = record.meta.len(), "Upserted session");
        Ok(())
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    fn delete(&self, ids: &[SessionId]) -> Result<(), StorageError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(sql_err)?;
        let mut removed = 0;
        {
            let mut meta = tx
                .prepare_cached("DELETE FROM meta WHERE session_id = ?1")
                .map_err(sql_err)?;
            let mut sessions = tx
                .prepare_cached("DELETE FROM sessions WHERE id = ?1")
                .map_err(sql_err)?;
            for id in ids {
                meta.execute([id.as_str()]).map_err(sql_err)?;
                removed += sessions.execute([id.as_str()]).map_err(sql_err)?;
            }
        }
        tx.commit().map_err(sql_err)?;

        debug!(removed, "Deleted sessions");
        Ok(())
    }

    fn expired(&self, cutoff: DateTime<Utc>) -> Result<Vec<SessionId>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT id FROM sessions WHERE updated_at <= ?1 ORDER BY updated_at")
            .map_err(sql_err)?;
        let rows = stmt
            .query_map([cutoff.timestamp_millis()], |row| {
                let id: String = row.get(0)?;
                SessionId::new(id).map_err(|e| conversion_err(0, e))
            })
            .map_err(sql_err)?;
        rows.collect::<Result<_, _>>().map_err(sql_err)
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    let id: String = row.get(0)?;
    let id = SessionId::new(id).map_err(|e| conversion_err(0, e))?;
    let millis: i64 = row.get(11)?;
    let updated_at = DateTime::from_timestamp_millis(millis)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(11, millis))?;

    Ok(SessionRecord {
        id,
        client_id: row.get(1)?,
        user_agent: row.get(2)?,
        os: Os {
            name: row.get(3)?,
            version: row.get(4)?,
        },
        browser: Browser {
            name: row.get(5)?,
            version: row.get(6)?,
        },
        device: row.get(7)?,
        user: User {
            id: row.get(8)?,
            email: row.get(9)?,
            name: row.get(10)?,
        },
        meta: BTreeMap::new(),
        updated_at,
    })
}

fn conversion_err(column: usize, err: rewind_core::IdError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

fn sql_err(err: rusqlite::Error) -> StorageError {
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
            StorageError::transaction(err.to_string())
        }
        _ => StorageError::database(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewind_core::ManualClock;

    fn sid(id: &str) -> SessionId {
        SessionId::new(id).unwrap()
    }

    fn start() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn create_index() -> (SqliteSessionIndex, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        let index = SqliteSessionIndex::open_in_memory()
            .unwrap()
            .with_clock(clock.clone());
        (index, clock)
    }

    #[test]
    fn test_get_unknown_is_not_found() {
        let (index, _) = create_index();
        let err = index.get(&sid("ghost")).unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_upsert_twice_keeps_one_row() {
        let (index, clock) = create_index();
        let record = SessionRecord::new(sid("s1"))
            .with_client_id("web")
            .with_meta("plan", "free")
            .with_meta("team", "a");
        index.upsert(&record).unwrap();

        clock.advance(chrono::Duration::minutes(5));
        let record = SessionRecord::new(sid("s1"))
            .with_client_id("web")
            .with_meta("plan", "pro");
        index.upsert(&record).unwrap();

        assert_eq!(index.count().unwrap(), 1);
        let stored = index.get(&sid("s1")).unwrap();
        assert_eq!(stored.updated_at, start() + chrono::Duration::minutes(5));
        assert_eq!(stored.meta.len(), 1);
        assert_eq!(stored.meta.get("plan").map(String::as_str), Some("pro"));
    }

    #[test]
    fn test_list_newest_first_with_paging() {
        let (index, clock) = create_index();
        for id in ["a", "b", "c"] {
            index.upsert(&SessionRecord::new(sid(id))).unwrap();
            clock.advance(chrono::Duration::seconds(1));
        }

        let ids = |records: Vec<SessionRecord>| {
            records
                .into_iter()
                .map(|r| r.id.to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(index.list("", &[], 0, 10).unwrap()), ["c", "b", "a"]);
        assert_eq!(ids(index.list("", &[], 1, 1).unwrap()), ["b"]);
        assert!(index.list("", &[], 5, 10).unwrap().is_empty());
    }

    #[test]
    fn test_list_does_not_repeat_sessions_with_many_meta() {
        let (index, _) = create_index();
        let record = SessionRecord::new(sid("s1"))
            .with_meta("a", "1")
            .with_meta("b", "2")
            .with_meta("c", "3");
        index.upsert(&record).unwrap();
        assert_eq!(index.list("", &[], 0, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_list_with_column_filter() {
        let (index, _) = create_index();
        let mut firefox = SessionRecord::new(sid("ff"));
        firefox.browser.name = "Firefox".into();
        let mut chrome = SessionRecord::new(sid("ch"));
        chrome.browser.name = "Chrome".into();
        index.upsert(&firefox).unwrap();
        index.upsert(&chrome).unwrap();

        let found = index
            .list("browser = ?", &["Firefox".to_string()], 0, 10)
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, sid("ff"));
    }

    #[test]
    fn test_expired_uses_inclusive_cutoff() {
        let (index, clock) = create_index();
        index.upsert(&SessionRecord::new(sid("old"))).unwrap();
        let old_at = clock.now_utc();
        clock.advance(chrono::Duration::milliseconds(1));
        index.upsert(&SessionRecord::new(sid("new"))).unwrap();

        assert_eq!(index.expired(old_at).unwrap(), vec![sid("old")]);
        assert!(
            index
                .expired(old_at - chrono::Duration::milliseconds(1))
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (index, _) = create_index();
        index
            .upsert(&SessionRecord::new(sid("s1")).with_meta("k", "v"))
            .unwrap();

        index.delete(&[sid("s1"), sid("ghost")]).unwrap();
        index.delete(&[sid("s1")]).unwrap();

        assert_eq!(index.count().unwrap(), 0);
        assert!(index.list("", &[], 0, 10).unwrap().is_empty());
    }

    #[test]
    fn test_open_file_database() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = SessionIndexConfig {
            db_path: temp_dir.path().join("idx").join("sessions.db"),
            ..Default::default()
        };
        {
            let index = SqliteSessionIndex::open(&config).unwrap();
            index.upsert(&SessionRecord::new(sid("s1"))).unwrap();
        }
        let index = SqliteSessionIndex::open(&config).unwrap();
        assert_eq!(index.get(&sid("s1")).unwrap().id, sid("s1"));
    }
}
