//! Read helpers and flusher bookkeeping.
//!
//! Each function takes a `&Connection` as its first parameter so it works
//! on a plain connection, inside a transaction, or inside
//! `AsyncDatabase::call`.

use crate::mutations::count_rows;
use crate::schema::ALL_TABLES;
use crate::DatabaseResult;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};

/// The last block the flusher committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitMarker {
    pub height: i64,
    pub committed_at: DateTime<Utc>,
}

/// Height of the last committed block, `None` on a fresh database.
pub fn last_commit_height(conn: &Connection) -> DatabaseResult<Option<i64>> {
    Ok(last_commit(conn)?.map(|marker| marker.height))
}

/// The full tracking row.
pub fn last_commit(conn: &Connection) -> DatabaseResult<Option<CommitMarker>> {
    let marker = conn
        .prepare_cached("SELECT last_commit_height, committed_at FROM tracking WHERE id = 1")?
        .query_row([], |row| {
            Ok(CommitMarker {
                height: row.get(0)?,
                committed_at: parse_datetime(row.get::<_, String>(1)?),
            })
        })
        .optional()?;
    Ok(marker)
}

/// Record `height` as the last committed block. The tracked height only
/// moves forward; returns false when `height` is not above it.
///
/// Callers run this in the same transaction as the block's mutations.
pub fn record_commit(conn: &Connection, height: i64) -> DatabaseResult<bool> {
    let now = Utc::now().to_rfc3339();
    let count = conn
        .prepare_cached(
            "INSERT INTO tracking (id, last_commit_height, committed_at) VALUES (1, ?1, ?2)
             ON CONFLICT (id) DO UPDATE SET
                last_commit_height = excluded.last_commit_height,
                committed_at = excluded.committed_at
             WHERE excluded.last_commit_height > tracking.last_commit_height",
        )?
        .execute(params![height, now])?;

    if count == 0 {
        warn!(height, "Commit height not above tracked height; tracking unchanged");
        return Ok(false);
    }
    debug!(height, "Recorded commit height");
    Ok(true)
}

/// Row count of every entity table, in schema order.
pub fn table_counts(conn: &Connection) -> DatabaseResult<Vec<(&'static str, i64)>> {
    ALL_TABLES
        .iter()
        .map(|table| Ok((table.name, count_rows(conn, table)?)))
        .collect()
}

/// Addresses linked to a transaction, sorted.
pub fn transaction_addresses(conn: &Connection, transaction_id: i64) -> DatabaseResult<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT address FROM account_transactions WHERE transaction_id = ?1 ORDER BY address",
    )?;
    let addresses = stmt
        .query_map(params![transaction_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(addresses)
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    #[test]
    fn test_fresh_database_has_no_commit() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(last_commit_height(db.connection()).unwrap(), None);
    }

    #[test]
    fn test_record_commit_overwrites_single_row() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();

        record_commit(conn, 5).unwrap();
        record_commit(conn, 6).unwrap();

        assert_eq!(last_commit_height(conn).unwrap(), Some(6));
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM tracking", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_record_commit_never_moves_backwards() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();

        assert!(record_commit(conn, 5).unwrap());
        assert!(!record_commit(conn, 3).unwrap());
        assert!(!record_commit(conn, 5).unwrap());

        assert_eq!(last_commit_height(conn).unwrap(), Some(5));
    }

    #[test]
    fn test_commit_marker_timestamp_is_recent() {
        let db = Database::open_in_memory().unwrap();
        let before = Utc::now() - chrono::Duration::seconds(1);

        record_commit(db.connection(), 1).unwrap();

        let marker = last_commit(db.connection()).unwrap().unwrap();
        assert!(marker.committed_at >= before);
    }

    #[test]
    fn test_table_counts_lists_every_table() {
        let db = Database::open_in_memory().unwrap();
        db.connection()
            .execute("INSERT INTO blocks (height) VALUES (1)", [])
            .unwrap();

        let counts = table_counts(db.connection()).unwrap();

        assert_eq!(counts.len(), ALL_TABLES.len());
        assert!(counts.contains(&("blocks", 1)));
        assert!(counts.contains(&("accounts", 0)));
    }

    #[test]
    fn test_transaction_addresses_sorted() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();
        conn.execute("INSERT INTO transactions (id, hash) VALUES (1, 'h')", [])
            .unwrap();
        for address in ["b", "a"] {
            conn.execute(
                "INSERT INTO account_transactions (transaction_id, address) VALUES (1, ?1)",
                [address],
            )
            .unwrap();
        }

        assert_eq!(transaction_addresses(conn, 1).unwrap(), vec!["a", "b"]);
        assert!(transaction_addresses(conn, 2).unwrap().is_empty());
    }
}
