#![allow(dead_code)]

use mirror_database::Database;
use mirror_flusher::{MessageKind, Notification};
use serde_json::{json, Value};
use std::path::PathBuf;
use tempfile::TempDir;

/// Open a fresh on-disk mirror and return (TempDir, db, path).
pub fn open_temp_db() -> (TempDir, Database, PathBuf) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let path = dir.path().join("mirror.sqlite");
    let db = Database::open(&path).expect("failed to open database");
    (dir, db, path)
}

pub fn notification(kind: MessageKind, payload: Value) -> Notification {
    Notification::from_value(kind, payload).expect("payload must be an object")
}

/// Row count of `table`.
pub fn count(db: &Database, table: &str) -> i64 {
    db.connection()
        .query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| {
            row.get(0)
        })
        .expect("count query failed")
}

/// Builds a JSONL stream the way the chain emitter writes it.
#[derive(Default)]
pub struct StreamBuilder {
    lines: Vec<String>,
}

impl StreamBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(mut self, key: &str, value: Value) -> Self {
        self.lines.push(json!({"key": key, "value": value}).to_string());
        self
    }

    pub fn raw(mut self, line: &str) -> Self {
        self.lines.push(line.to_string());
        self
    }

    /// NEW_BLOCK, one SET_ACCOUNT, then COMMIT.
    pub fn block(self, height: i64) -> Self {
        self.message(
            "NEW_BLOCK",
            json!({
                "height": height,
                "timestamp": 1_600_000_000_000_000_000i64 + height,
                "proposer": "bandvalcons1proposer",
                "hash": format!("hash-{height}"),
                "inflation": "0.130000000000000000",
                "supply": "100000000uband",
            }),
        )
        .message(
            "SET_ACCOUNT",
            json!({"address": "band1proposer", "balance": format!("{height}uband")}),
        )
        .commit(height)
    }

    pub fn commit(self, height: i64) -> Self {
        self.message("COMMIT", json!({"height": height}))
    }

    pub fn build(self) -> String {
        let mut stream = self.lines.join("\n");
        stream.push('\n');
        stream
    }
}
