// src/client/kv.rs

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, params};

use super::error::ClientError;

// Namespaced keys of the durable key-value tier.
pub const CACHED_USER: &str = "cached_user";
pub const CACHED_AGENDA: &str = "cached_agenda";

pub fn mapels_key(id_agenda: i64) -> String {
    format!("mapels_{}", id_agenda)
}

pub fn soal_key(id_mapel: i64) -> String {
    format!("soal_{}", id_mapel)
}

pub fn jawaban_key(id_mapel: i64) -> String {
    format!("jawaban_{}", id_mapel)
}

/// Durable key-value tier (tier 2): small values, synchronous API,
/// survives reload. Backed by a single-table SQLite file.
pub struct KvStore {
    conn: Mutex<Connection>,
}

impl KvStore {
    pub fn open(path: &Path) -> Result<Self, ClientError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Completes before returning; the caller may treat the value as
    /// durable the instant this returns.
    pub fn put(&self, key: &str, value: &serde_json::Value) -> Result<(), ClientError> {
        let conn = self.conn.lock().expect("kv mutex poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value.to_string()],
        )?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<serde_json::Value>, ClientError> {
        let conn = self.conn.lock().expect("kv mutex poisoned");
        let raw: Option<String> = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;

        match raw {
            None => Ok(None),
            Some(s) => match serde_json::from_str(&s) {
                Ok(v) => Ok(Some(v)),
                // One corrupt entry fails softly; siblings stay usable.
                Err(e) => {
                    tracing::warn!("Corrupt kv entry '{}' (skipped): {}", key, e);
                    Ok(None)
                }
            },
        }
    }

    pub fn remove(&self, key: &str) -> Result<(), ClientError> {
        let conn = self.conn.lock().expect("kv mutex poisoned");
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}
