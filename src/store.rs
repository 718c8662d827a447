// src/store.rs

use std::future::Future;
use std::time::Duration;

use sqlx::SqlitePool;

use crate::models::{mapel::Mapel, soal::Soal};

const MAX_ATTEMPTS: u32 = 3;

fn is_transient(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
    )
}

/// Retries a store operation on transient errors with doubling backoff.
///
/// Non-transient errors and retry exhaustion return the original error,
/// which surfaces to callers as a 5xx.
pub async fn with_retry<T, F, Fut>(mut op: F) -> Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt + 1 < MAX_ATTEMPTS && is_transient(&e) => {
                attempt += 1;
                tracing::warn!(
                    "Transient store error (attempt {}): {}, retrying",
                    attempt,
                    e
                );
                tokio::time::sleep(Duration::from_millis(100 * (1 << attempt))).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Fetches a mapel's questions in the canonical ordering.
///
/// This single ordering backs both mapping generation and answer-token
/// zipping, so the positional contract between the per-subject answer
/// string and the global mapping cannot drift: numbered questions first
/// by `no_soal`, then unnumbered ones in stable id order.
pub async fn fetch_soal_ordered(
    pool: &SqlitePool,
    id_mapel: i64,
) -> Result<Vec<Soal>, sqlx::Error> {
    sqlx::query_as::<_, Soal>(
        r#"
        SELECT id, id_mapel, no_soal, pertanyaan, pilihan, kunci
        FROM soal
        WHERE id_mapel = ?
        ORDER BY (no_soal IS NULL), no_soal ASC, id ASC
        "#,
    )
    .bind(id_mapel)
    .fetch_all(pool)
    .await
}

/// Fetches an agenda's ready mapel in ascending id order, the fixed
/// iteration order of mapping generation.
pub async fn fetch_ready_mapel(
    pool: &SqlitePool,
    id_agenda: i64,
) -> Result<Vec<Mapel>, sqlx::Error> {
    sqlx::query_as::<_, Mapel>(
        r#"
        SELECT id, id_agenda, nama, durasi_menit, status
        FROM mapel
        WHERE id_agenda = ? AND status = 'siap'
        ORDER BY id ASC
        "#,
    )
    .bind(id_agenda)
    .fetch_all(pool)
    .await
}

/// Fetches one mapel by id.
pub async fn fetch_mapel(pool: &SqlitePool, id_mapel: i64) -> Result<Option<Mapel>, sqlx::Error> {
    sqlx::query_as::<_, Mapel>(
        "SELECT id, id_agenda, nama, durasi_menit, status FROM mapel WHERE id = ?",
    )
    .bind(id_mapel)
    .fetch_optional(pool)
    .await
}
