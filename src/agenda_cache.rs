// src/agenda_cache.rs

use std::time::{Duration, Instant};

use sqlx::SqlitePool;
use tokio::sync::RwLock;

use crate::{error::AppError, models::agenda::Agenda};

/// Time-boxed, read-only cache of the active agenda list.
///
/// Read-mostly and eventually consistent: a stale list is acceptable
/// within the TTL. Owned by the process state rather than living as a
/// module-level global.
pub struct AgendaCache {
    ttl: Duration,
    inner: RwLock<Option<(Instant, Vec<Agenda>)>>,
}

impl AgendaCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: RwLock::new(None),
        }
    }

    /// Returns the cached active agendas, re-reading after TTL expiry.
    pub async fn active(&self, pool: &SqlitePool) -> Result<Vec<Agenda>, AppError> {
        if let Some((at, agendas)) = self.inner.read().await.as_ref() {
            if at.elapsed() < self.ttl {
                return Ok(agendas.clone());
            }
        }

        let agendas = sqlx::query_as::<_, Agenda>(
            "SELECT id, nama, token, mulai, selesai, status \
             FROM agenda WHERE status = 'aktif' ORDER BY mulai ASC",
        )
        .fetch_all(pool)
        .await?;

        *self.inner.write().await = Some((Instant::now(), agendas.clone()));
        Ok(agendas)
    }

    /// Drops the cached list, forcing the next read to hit the store.
    pub async fn invalidate(&self) {
        *self.inner.write().await = None;
    }
}
