//! Per-session sequence allocation
//!
//! Every session log starts with a sentinel entry at sequence 0 holding an
//! empty payload, so "the log exists" is the same as "some key has the
//! session prefix". Real events start at sequence 1.

use redb::{ReadableTable, Table};
use tracing::debug;

use rewind_core::{SessionId, StorageError};

use super::keys;

/// The events table as opened inside a write transaction
pub(crate) type EventsTable<'txn> = Table<'txn, &'static [u8], &'static [u8]>;

/// Highest sequence currently stored for `session`, if its log exists
///
/// Scans backwards from the largest possible key of the session. Never
/// writes, so it is safe inside read transactions.
pub(crate) fn peek_last_sequence<T>(
    table: &T,
    session: &SessionId,
) -> Result<Option<u64>, StorageError>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    let (start, end) = keys::session_bounds(session);
    let mut range = table
        .range(start.as_slice()..=end.as_slice())
        .map_err(|e| StorageError::database(e.to_string()))?;

    let Some(entry) = range.next_back() else {
        return Ok(None);
    };
    let (key, _) = entry.map_err(|e| StorageError::database(e.to_string()))?;
    keys::decode_sequence(session, key.value())
        .map(Some)
        .ok_or_else(|| StorageError::invariant(format!("malformed event key in log of {session}")))
}

/// Highest sequence of `session`, creating its log if needed
///
/// Must be called with the table of an open write transaction; the sentinel
/// write becomes visible only if that transaction commits. Callers increment
/// the returned value before writing.
///
/// # Errors
///
/// Returns [`StorageError::Invariant`] if the log is still empty right after
/// the sentinel was written. That is never retried.
pub(crate) fn last_sequence(
    table: &mut EventsTable<'_>,
    session: &SessionId,
) -> Result<u64, StorageError> {
    if let Some(sequence) = peek_last_sequence(&*table, session)? {
        return Ok(sequence);
    }

    let sentinel: &[u8] = &[];
    table
        .insert(keys::event_key(session, 0).as_slice(), sentinel)
        .map_err(|e| StorageError::database(e.to_string()))?;
    debug!(session = %session, "Initialized event log");

    peek_last_sequence(&*table, session)?.ok_or_else(|| {
        StorageError::invariant(format!("log of {session} is empty after sentinel write"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event_log::EVENTS;
    use redb::Database;
    use tempfile::TempDir;

    fn sid(id: &str) -> SessionId {
        SessionId::new(id).unwrap()
    }

    fn create_db() -> (Database, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::create(temp_dir.path().join("alloc.redb")).unwrap();
        (db, temp_dir)
    }

    #[test]
    fn test_first_call_writes_sentinel() {
        let (db, _temp) = create_db();
        let txn = db.begin_write().unwrap();
        {
            let mut table = txn.open_table(EVENTS).unwrap();
            assert_eq!(peek_last_sequence(&table, &sid("s1")).unwrap(), None);
            assert_eq!(last_sequence(&mut table, &sid("s1")).unwrap(), 0);

            let sentinel = table
                .get(keys::event_key(&sid("s1"), 0).as_slice())
                .unwrap()
                .unwrap();
            assert!(sentinel.value().is_empty());
        }
        txn.commit().unwrap();
    }

    #[test]
    fn test_returns_highest_sequence() {
        let (db, _temp) = create_db();
        let txn = db.begin_write().unwrap();
        {
            let mut table = txn.open_table(EVENTS).unwrap();
            let s = sid("s1");
            for seq in 0..=300u64 {
                table
                    .insert(keys::event_key(&s, seq).as_slice(), b"x".as_slice())
                    .unwrap();
            }
            assert_eq!(last_sequence(&mut table, &s).unwrap(), 300);
        }
        txn.commit().unwrap();
    }

    #[test]
    fn test_neighbouring_sessions_are_independent() {
        let (db, _temp) = create_db();
        let txn = db.begin_write().unwrap();
        {
            let mut table = txn.open_table(EVENTS).unwrap();
            for seq in 0..5u64 {
                table
                    .insert(keys::event_key(&sid("abc"), seq).as_slice(), b"x".as_slice())
                    .unwrap();
            }
            assert_eq!(peek_last_sequence(&table, &sid("ab")).unwrap(), None);
            assert_eq!(peek_last_sequence(&table, &sid("abd")).unwrap(), None);
            assert_eq!(last_sequence(&mut table, &sid("ab")).unwrap(), 0);
            assert_eq!(peek_last_sequence(&table, &sid("abc")).unwrap(), Some(4));
        }
        txn.commit().unwrap();
    }

    #[test]
    fn test_sentinel_discarded_with_aborted_transaction() {
        let (db, _temp) = create_db();
        {
            let txn = db.begin_write().unwrap();
            txn.open_table(EVENTS).unwrap();
            txn.commit().unwrap();
        }
        {
            let txn = db.begin_write().unwrap();
            {
                let mut table = txn.open_table(EVENTS).unwrap();
                last_sequence(&mut table, &sid("s1")).unwrap();
            }
            txn.abort().unwrap();
        }
        let txn = db.begin_read().unwrap();
        let table = txn.open_table(EVENTS).unwrap();
        assert_eq!(peek_last_sequence(&table, &sid("s1")).unwrap(), None);
    }
}
