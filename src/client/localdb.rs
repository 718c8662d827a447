// src/client/localdb.rs

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};

use crate::models::{paket::PaketUjian, soal::SoalPublic};

use super::error::ClientError;

/// Default byte budget of the image cache.
const DEFAULT_IMAGE_BUDGET: i64 = 50 * 1024 * 1024;

/// Log row-parse errors instead of silently discarding them.
fn log_and_skip_err<T>(result: Result<T, rusqlite::Error>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!("Local db row parse error (skipped): {}", e);
            None
        }
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// One locally saved per-question answer awaiting server confirmation.
/// Never deleted until the server confirms receipt; only `synced` flips.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TempAnswer {
    pub id_agenda: i64,
    pub id_mapel: i64,
    pub id_soal: i64,
    pub jawaban: String,
    pub synced: bool,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    Save,
    Finish,
}

impl QueueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueKind::Save => "save",
            QueueKind::Finish => "finish",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "save" => Some(QueueKind::Save),
            "finish" => Some(QueueKind::Finish),
            _ => None,
        }
    }
}

/// One durably queued outbound mutation.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub id: i64,
    pub kind: QueueKind,
    pub payload: serde_json::Value,
    pub status: String,
    pub retry_count: i64,
    pub created_at: i64,
}

/// Structured local database tier (tier 3): question sets, per-question
/// answers with sync flags, cached images and the outbound submission
/// queue.
pub struct LocalDb {
    conn: Mutex<Connection>,
    image_budget: i64,
}

impl LocalDb {
    pub fn open(path: &Path) -> Result<Self, ClientError> {
        Self::open_with_budget(path, DEFAULT_IMAGE_BUDGET)
    }

    pub fn open_with_budget(path: &Path, image_budget: i64) -> Result<Self, ClientError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS exam_packages (
                agenda_id INTEGER PRIMARY KEY,
                data TEXT NOT NULL,
                saved_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS questions (
                agenda_id INTEGER NOT NULL,
                mapel_id INTEGER NOT NULL,
                soal_id INTEGER NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (agenda_id, mapel_id, soal_id)
            );
            CREATE INDEX IF NOT EXISTS idx_questions_mapel
                ON questions(agenda_id, mapel_id);
            CREATE TABLE IF NOT EXISTS temp_answers (
                agenda_id INTEGER NOT NULL,
                mapel_id INTEGER NOT NULL,
                soal_id INTEGER NOT NULL,
                jawaban TEXT NOT NULL,
                synced INTEGER NOT NULL DEFAULT 0,
                timestamp INTEGER NOT NULL,
                PRIMARY KEY (agenda_id, mapel_id, soal_id)
            );
            CREATE INDEX IF NOT EXISTS idx_temp_answers_mapel
                ON temp_answers(agenda_id, mapel_id);
            CREATE INDEX IF NOT EXISTS idx_temp_answers_ts
                ON temp_answers(timestamp);
            CREATE TABLE IF NOT EXISTS images (
                url TEXT PRIMARY KEY,
                blob BLOB NOT NULL,
                size INTEGER NOT NULL,
                last_access INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS submission_queue (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                payload TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                retry_count INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_queue_status
                ON submission_queue(status);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            image_budget,
        })
    }

    // ------------------------------------------------------------------
    // Exam packages
    // ------------------------------------------------------------------

    /// Stores one agenda's package as a single atomic unit: the package
    /// row and every question row commit together or not at all, so a
    /// failed download never clobbers a previously good package.
    pub fn save_paket(&self, paket: &PaketUjian) -> Result<(), ClientError> {
        let conn = self.conn.lock().expect("local db mutex poisoned");
        conn.execute("BEGIN IMMEDIATE", [])?;

        let result = (|| -> Result<(), ClientError> {
            let id_agenda = paket.agenda.id;
            conn.execute(
                "INSERT OR REPLACE INTO exam_packages (agenda_id, data, saved_at) \
                 VALUES (?1, ?2, ?3)",
                params![id_agenda, serde_json::to_string(paket)?, now_millis()],
            )?;

            conn.execute("DELETE FROM questions WHERE agenda_id = ?1", params![id_agenda])?;
            for soal in &paket.soal {
                conn.execute(
                    "INSERT INTO questions (agenda_id, mapel_id, soal_id, data) \
                     VALUES (?1, ?2, ?3, ?4)",
                    params![id_agenda, soal.id_mapel, soal.id, serde_json::to_string(soal)?],
                )?;
            }
            Ok(())
        })();

        match result {
            Ok(()) => {
                conn.execute("COMMIT", [])?;
                Ok(())
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", []);
                Err(e)
            }
        }
    }

    pub fn load_paket(&self, id_agenda: i64) -> Result<Option<PaketUjian>, ClientError> {
        let conn = self.conn.lock().expect("local db mutex poisoned");
        let raw: Option<String> = conn
            .query_row(
                "SELECT data FROM exam_packages WHERE agenda_id = ?1",
                params![id_agenda],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            None => Ok(None),
            Some(s) => match serde_json::from_str(&s) {
                Ok(p) => Ok(Some(p)),
                Err(e) => {
                    tracing::warn!("Corrupt exam package {} (skipped): {}", id_agenda, e);
                    Ok(None)
                }
            },
        }
    }

    // ------------------------------------------------------------------
    // Questions
    // ------------------------------------------------------------------

    pub fn put_questions(
        &self,
        id_agenda: i64,
        id_mapel: i64,
        soal: &[SoalPublic],
    ) -> Result<(), ClientError> {
        let conn = self.conn.lock().expect("local db mutex poisoned");
        conn.execute("BEGIN IMMEDIATE", [])?;
        let result = (|| -> Result<(), ClientError> {
            conn.execute(
                "DELETE FROM questions WHERE agenda_id = ?1 AND mapel_id = ?2",
                params![id_agenda, id_mapel],
            )?;
            for s in soal {
                conn.execute(
                    "INSERT INTO questions (agenda_id, mapel_id, soal_id, data) \
                     VALUES (?1, ?2, ?3, ?4)",
                    params![id_agenda, id_mapel, s.id, serde_json::to_string(s)?],
                )?;
            }
            Ok(())
        })();
        match result {
            Ok(()) => {
                conn.execute("COMMIT", [])?;
                Ok(())
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", []);
                Err(e)
            }
        }
    }

    /// Indexed range query: all questions for one (agenda, mapel), in
    /// insertion order. A corrupt row is skipped, not fatal.
    pub fn questions_for(
        &self,
        id_agenda: i64,
        id_mapel: i64,
    ) -> Result<Vec<SoalPublic>, ClientError> {
        let conn = self.conn.lock().expect("local db mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT data FROM questions \
             WHERE agenda_id = ?1 AND mapel_id = ?2 ORDER BY rowid ASC",
        )?;
        let rows = stmt.query_map(params![id_agenda, id_mapel], |row| {
            row.get::<_, String>(0)
        })?;

        let mut out = Vec::new();
        for raw in rows.filter_map(log_and_skip_err) {
            match serde_json::from_str::<SoalPublic>(&raw) {
                Ok(s) => out.push(s),
                Err(e) => tracing::warn!("Corrupt question row (skipped): {}", e),
            }
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Temp answers
    // ------------------------------------------------------------------

    pub fn put_temp_answer(&self, ans: &TempAnswer) -> Result<(), ClientError> {
        let conn = self.conn.lock().expect("local db mutex poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO temp_answers \
             (agenda_id, mapel_id, soal_id, jawaban, synced, timestamp) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                ans.id_agenda,
                ans.id_mapel,
                ans.id_soal,
                ans.jawaban,
                ans.synced as i64,
                ans.timestamp
            ],
        )?;
        Ok(())
    }

    pub fn temp_answers_for(
        &self,
        id_agenda: i64,
        id_mapel: i64,
    ) -> Result<Vec<TempAnswer>, ClientError> {
        let conn = self.conn.lock().expect("local db mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT agenda_id, mapel_id, soal_id, jawaban, synced, timestamp \
             FROM temp_answers WHERE agenda_id = ?1 AND mapel_id = ?2 \
             ORDER BY soal_id ASC",
        )?;
        let rows = stmt.query_map(params![id_agenda, id_mapel], |row| {
            Ok(TempAnswer {
                id_agenda: row.get(0)?,
                id_mapel: row.get(1)?,
                id_soal: row.get(2)?,
                jawaban: row.get(3)?,
                synced: row.get::<_, i64>(4)? != 0,
                timestamp: row.get(5)?,
            })
        })?;
        Ok(rows.filter_map(log_and_skip_err).collect())
    }

    pub fn mark_temp_synced(&self, id_agenda: i64, id_mapel: i64) -> Result<(), ClientError> {
        let conn = self.conn.lock().expect("local db mutex poisoned");
        conn.execute(
            "UPDATE temp_answers SET synced = 1 \
             WHERE agenda_id = ?1 AND mapel_id = ?2",
            params![id_agenda, id_mapel],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Submission queue
    // ------------------------------------------------------------------

    /// Appends a mutation to the durable FIFO queue, before any network
    /// attempt is made.
    pub fn enqueue(
        &self,
        kind: QueueKind,
        payload: &serde_json::Value,
    ) -> Result<i64, ClientError> {
        let conn = self.conn.lock().expect("local db mutex poisoned");
        conn.execute(
            "INSERT INTO submission_queue (kind, payload, status, retry_count, created_at) \
             VALUES (?1, ?2, 'pending', 0, ?3)",
            params![kind.as_str(), payload.to_string(), now_millis()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Deliverable entries in strict enqueue order: pending ones plus
    /// failed ones still under the retry ceiling.
    pub fn deliverable_entries(&self, retry_ceiling: i64) -> Result<Vec<QueueEntry>, ClientError> {
        let conn = self.conn.lock().expect("local db mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, kind, payload, status, retry_count, created_at \
             FROM submission_queue \
             WHERE status = 'pending' OR (status = 'failed' AND retry_count < ?1) \
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![retry_ceiling], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?;

        let mut out = Vec::new();
        for (id, kind, payload, status, retry_count, created_at) in
            rows.filter_map(log_and_skip_err)
        {
            let Some(kind) = QueueKind::from_str(&kind) else {
                tracing::warn!("Unknown queue kind '{}' for entry {}, skipping", kind, id);
                continue;
            };
            let payload = match serde_json::from_str(&payload) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!("Corrupt queue payload for entry {} (skipped): {}", id, e);
                    continue;
                }
            };
            out.push(QueueEntry {
                id,
                kind,
                payload,
                status,
                retry_count,
                created_at,
            });
        }
        Ok(out)
    }

    /// Entries that exhausted their retries; kept for inspection, never
    /// silently dropped.
    pub fn failed_entries(&self, retry_ceiling: i64) -> Result<Vec<i64>, ClientError> {
        let conn = self.conn.lock().expect("local db mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT id FROM submission_queue \
             WHERE status = 'failed' AND retry_count >= ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![retry_ceiling], |row| row.get::<_, i64>(0))?;
        Ok(rows.filter_map(log_and_skip_err).collect())
    }

    /// Confirmed delivery: the entry has served its purpose and is
    /// removed.
    pub fn mark_completed(&self, id: i64) -> Result<(), ClientError> {
        let conn = self.conn.lock().expect("local db mutex poisoned");
        conn.execute("DELETE FROM submission_queue WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn mark_failed(&self, id: i64, retry_count: i64) -> Result<(), ClientError> {
        let conn = self.conn.lock().expect("local db mutex poisoned");
        conn.execute(
            "UPDATE submission_queue SET status = 'failed', retry_count = ?2 WHERE id = ?1",
            params![id, retry_count],
        )?;
        Ok(())
    }

    pub fn pending_count(&self) -> Result<i64, ClientError> {
        let conn = self.conn.lock().expect("local db mutex poisoned");
        let count = conn.query_row(
            "SELECT COUNT(*) FROM submission_queue WHERE status != 'completed'",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Image cache
    // ------------------------------------------------------------------

    /// Fetches a cached image and refreshes its LRU timestamp.
    pub fn get_image(&self, url: &str) -> Result<Option<Vec<u8>>, ClientError> {
        let conn = self.conn.lock().expect("local db mutex poisoned");
        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT blob FROM images WHERE url = ?1",
                params![url],
                |row| row.get(0),
            )
            .optional()?;
        if blob.is_some() {
            conn.execute(
                "UPDATE images SET last_access = ?2 WHERE url = ?1",
                params![url, now_millis()],
            )?;
        }
        Ok(blob)
    }

    /// Stores an image under the byte budget, evicting least-recently
    /// accessed entries first. Images pinned by the currently open
    /// question set are never evicted; if pinned entries alone exhaust
    /// the budget, only this one write fails.
    pub fn put_image(
        &self,
        url: &str,
        bytes: &[u8],
        pinned: &HashSet<String>,
    ) -> Result<(), ClientError> {
        let size = bytes.len() as i64;
        if size > self.image_budget {
            return Err(ClientError::Storage(format!(
                "image '{}' ({} bytes) exceeds the cache budget",
                url, size
            )));
        }

        let conn = self.conn.lock().expect("local db mutex poisoned");

        let mut used: i64 = conn.query_row(
            "SELECT COALESCE(SUM(size), 0) FROM images WHERE url != ?1",
            params![url],
            |row| row.get(0),
        )?;

        while used + size > self.image_budget {
            let victim: Option<(String, i64)> = {
                let mut stmt = conn.prepare(
                    "SELECT url, size FROM images WHERE url != ?1 \
                     ORDER BY last_access ASC",
                )?;
                let rows = stmt.query_map(params![url], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?;
                rows.filter_map(log_and_skip_err)
                    .find(|(u, _)| !pinned.contains(u))
            };

            match victim {
                Some((victim_url, victim_size)) => {
                    conn.execute("DELETE FROM images WHERE url = ?1", params![victim_url])?;
                    used -= victim_size;
                }
                None => {
                    return Err(ClientError::Storage(format!(
                        "image cache budget exhausted by pinned entries, cannot store '{}'",
                        url
                    )));
                }
            }
        }

        conn.execute(
            "INSERT OR REPLACE INTO images (url, blob, size, last_access) \
             VALUES (?1, ?2, ?3, ?4)",
            params![url, bytes, size, now_millis()],
        )?;
        Ok(())
    }

    pub fn cached_image_urls(&self) -> Result<Vec<String>, ClientError> {
        let conn = self.conn.lock().expect("local db mutex poisoned");
        let mut stmt = conn.prepare("SELECT url FROM images ORDER BY last_access ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.filter_map(log_and_skip_err).collect())
    }
}
