// src/client/sync.rs

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, watch};

use crate::models::jawaban::SaveJawabanRequest;

use super::{
    api::ExamApi,
    error::ClientError,
    localdb::{LocalDb, QueueKind},
};

const RETRY_CEILING: i64 = 5;
const POLL_INTERVAL: Duration = Duration::from_secs(15);
const MAX_BACKOFF: Duration = Duration::from_secs(120);

/// Outcome of one drain pass.
#[derive(Debug, Default, PartialEq)]
pub struct DrainReport {
    pub delivered: usize,
    pub failed: usize,
    /// Entries held back this pass (offline, or behind a failed entry
    /// for the same subject).
    pub held: usize,
}

/// Reconciles the durable submission queue with the backend: no data
/// loss, idempotent overwrite semantics on the authoritative store, and
/// strict enqueue order within one (peserta, mapel).
pub struct SyncEngine {
    db: Arc<LocalDb>,
    api: Arc<dyn ExamApi>,
    online: watch::Receiver<bool>,
    notify: Arc<Notify>,
    retry_ceiling: i64,
    poll_interval: Duration,
}

impl SyncEngine {
    pub fn new(db: Arc<LocalDb>, api: Arc<dyn ExamApi>, online: watch::Receiver<bool>) -> Self {
        Self {
            db,
            api,
            online,
            notify: Arc::new(Notify::new()),
            retry_ceiling: RETRY_CEILING,
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Handle for nudging the engine after a local save.
    pub fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    /// One drain pass over the queue, in strict enqueue order.
    ///
    /// A failed entry blocks every later entry for the same
    /// (peserta, mapel) within the pass, so a finish can never overtake
    /// the save it follows. Other subjects keep draining.
    pub async fn drain_once(&self) -> Result<DrainReport, ClientError> {
        let mut report = DrainReport::default();

        if !self.is_online() {
            report.held = self.db.pending_count()? as usize;
            return Ok(report);
        }

        let entries = self.db.deliverable_entries(self.retry_ceiling)?;
        let mut blocked: HashSet<(i64, i64)> = HashSet::new();

        for entry in entries {
            let payload: SaveJawabanRequest = match serde_json::from_value(entry.payload.clone()) {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(
                        "Queue entry {} has undecodable payload, parking as failed: {}",
                        entry.id,
                        e
                    );
                    self.db.mark_failed(entry.id, self.retry_ceiling)?;
                    continue;
                }
            };

            let key = (payload.id_peserta, payload.id_mapel);
            if blocked.contains(&key) {
                report.held += 1;
                continue;
            }

            let result = match entry.kind {
                QueueKind::Save => self.api.save_jawaban(&payload).await,
                QueueKind::Finish => self.api.finish_ujian(&payload).await,
            };

            match result {
                Ok(()) => {
                    self.db.mark_completed(entry.id)?;
                    self.db
                        .mark_temp_synced(payload.id_agenda, payload.id_mapel)?;
                    report.delivered += 1;
                }
                Err(ClientError::Rejected(msg)) => {
                    // Validation rejections are never retried; the entry
                    // stays parked in 'failed' for inspection.
                    tracing::warn!(
                        "Queue entry {} rejected by server, parking: {}",
                        entry.id,
                        msg
                    );
                    self.db.mark_failed(entry.id, self.retry_ceiling)?;
                    blocked.insert(key);
                    report.failed += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        "Queue entry {} delivery failed (attempt {}): {}",
                        entry.id,
                        entry.retry_count + 1,
                        e
                    );
                    self.db.mark_failed(entry.id, entry.retry_count + 1)?;
                    blocked.insert(key);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Drives drains from connectivity edges, save nudges and a periodic
    /// tick, with doubling backoff while deliveries keep failing. Exits
    /// when the connectivity channel closes.
    pub async fn run(mut self) {
        let mut backoff = self.poll_interval;

        loop {
            tokio::select! {
                changed = self.online.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if !*self.online.borrow() {
                        continue;
                    }
                }
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(backoff) => {}
            }

            match self.drain_once().await {
                Ok(report) => {
                    backoff = if report.failed > 0 {
                        MAX_BACKOFF.min(backoff * 2)
                    } else {
                        self.poll_interval
                    };
                }
                Err(e) => {
                    tracing::warn!("Drain pass failed: {}", e);
                    backoff = MAX_BACKOFF.min(backoff * 2);
                }
            }
        }
    }
}
