// src/aggregator.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crate::{
    error::AppError,
    mapping::{MappingOutcome, SoalMappingIndex},
    models::jawaban::{GabunganDetail, JawabanGabungan, SoalMapping},
    store::{fetch_soal_ordered, with_retry},
};

/// Per-(peserta, agenda) async locks serializing the combined-answer
/// read-modify-write. Overlapping auto-save and finish requests for the
/// same participant would otherwise silently drop one update.
#[derive(Default)]
pub struct KeyedLocks {
    inner: StdMutex<HashMap<(i64, i64), Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn lock_for(&self, key: (i64, i64)) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().expect("keyed lock map poisoned");
        map.entry(key).or_default().clone()
    }
}

/// Read-only view of one combined answer.
#[derive(Debug)]
pub struct GabunganView {
    pub jawaban: String,
    pub tokens: Vec<String>,
    pub total_soal: i64,
    pub diperbarui_pada: Option<chrono::DateTime<chrono::Utc>>,
    pub detail: Option<Vec<GabunganDetail>>,
}

/// Maintains one agenda-wide answer sequence per participant, kept
/// consistent with the per-subject answer strings via `SoalMappingIndex`.
#[derive(Clone)]
pub struct CombinedAnswerAggregator {
    pool: SqlitePool,
    index: SoalMappingIndex,
    locks: Arc<KeyedLocks>,
}

impl CombinedAnswerAggregator {
    pub fn new(pool: SqlitePool) -> Self {
        let index = SoalMappingIndex::new(pool.clone());
        Self {
            pool,
            index,
            locks: Arc::new(KeyedLocks::default()),
        }
    }

    pub fn index(&self) -> &SoalMappingIndex {
        &self.index
    }

    /// Idempotently creates the all-'-' combined row for a participant,
    /// generating the mapping first when absent.
    ///
    /// Multiple trigger points (registration, first get-soal, explicit
    /// init) may race; INSERT OR IGNORE plus the existence check keeps
    /// re-invocation a no-op. Returns the agenda's total question count.
    pub async fn ensure_initialized(
        &self,
        id_peserta: i64,
        id_agenda: i64,
    ) -> Result<i64, AppError> {
        if let Some(row) = self.fetch_row(id_peserta, id_agenda).await? {
            return Ok(row.total_soal);
        }

        let mut total = self.index.total_soal(id_agenda).await?;
        if total == 0 {
            match self.index.generate_mapping(id_agenda).await? {
                MappingOutcome::NoMapel => {
                    return Err(AppError::NotFound(format!(
                        "Agenda {} has no ready mapel, cannot initialize combined answer",
                        id_agenda
                    )));
                }
                MappingOutcome::Generated { total_soal, .. } => total = total_soal,
            }
        }

        let blank = vec!["-"; total as usize].join("|");
        sqlx::query(
            "INSERT OR IGNORE INTO jawaban_gabungan \
             (id_peserta, id_agenda, jawaban, total_soal, version, diperbarui_pada) \
             VALUES (?, ?, ?, ?, 0, ?)",
        )
        .bind(id_peserta)
        .bind(id_agenda)
        .bind(&blank)
        .bind(total)
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(total)
    }

    /// The core write path: folds one per-subject answer string into the
    /// combined sequence.
    ///
    /// Token at subject-local index i (0-based) corresponds to the
    /// question at canonical position i+1; tokens beyond the question
    /// count are ignored, missing tokens default to '-'. A question whose
    /// mapping row is still missing after one regenerate attempt is
    /// skipped with a warning rather than failing the whole save.
    pub async fn apply_subject_answers(
        &self,
        id_peserta: i64,
        id_agenda: i64,
        id_mapel: i64,
        jawaban: &str,
    ) -> Result<(), AppError> {
        let lock = self.locks.lock_for((id_peserta, id_agenda));
        let _guard = lock.lock().await;

        let tokens: Vec<&str> = jawaban.split('|').collect();
        let soals = with_retry(|| fetch_soal_ordered(&self.pool, id_mapel)).await?;

        self.ensure_initialized(id_peserta, id_agenda).await?;

        let mut updates: Vec<(i64, String)> = Vec::with_capacity(soals.len());
        let mut regenerated = false;
        for (i, soal) in soals.iter().enumerate() {
            let token = tokens.get(i).copied().unwrap_or("-");

            let mut urutan = self.index.lookup(id_agenda, id_mapel, soal.id).await?;
            if urutan.is_none() && !regenerated {
                // Mapping predates this soal: regenerate once, in full.
                self.index.generate_mapping(id_agenda).await?;
                regenerated = true;
                urutan = self.index.lookup(id_agenda, id_mapel, soal.id).await?;
            }

            match urutan {
                Some(g) => updates.push((g, token.to_string())),
                None => {
                    tracing::warn!(
                        "Soal {} (mapel {}, agenda {}) unresolvable after regenerate, skipping",
                        soal.id,
                        id_mapel,
                        id_agenda
                    );
                }
            }
        }

        // Read-modify-write under the keyed lock; the version check is a
        // second guard against writers outside this process.
        for _ in 0..5 {
            let row = self
                .fetch_row(id_peserta, id_agenda)
                .await?
                .ok_or_else(|| {
                    AppError::InternalServerError(format!(
                        "Combined answer row missing after init for peserta {} agenda {}",
                        id_peserta, id_agenda
                    ))
                })?;

            let mut toks: Vec<String> = row.jawaban.split('|').map(String::from).collect();
            for (g, token) in &updates {
                let idx = (*g - 1) as usize;
                if idx >= toks.len() {
                    // A regenerate may have grown the agenda.
                    toks.resize(idx + 1, "-".to_string());
                }
                toks[idx] = token.clone();
            }
            let updated = toks.join("|");

            let result = sqlx::query(
                "UPDATE jawaban_gabungan \
                 SET jawaban = ?, total_soal = ?, version = version + 1, diperbarui_pada = ? \
                 WHERE id = ? AND version = ?",
            )
            .bind(&updated)
            .bind(toks.len() as i64)
            .bind(chrono::Utc::now())
            .bind(row.id)
            .bind(row.version)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 1 {
                return Ok(());
            }
            tracing::warn!(
                "Combined answer version conflict for peserta {} agenda {}, retrying",
                id_peserta,
                id_agenda
            );
        }

        Err(AppError::Conflict(format!(
            "Combined answer for peserta {} agenda {} kept changing concurrently",
            id_peserta, id_agenda
        )))
    }

    /// Read-only view; `None` when nothing has been initialized yet.
    pub async fn get_combined(
        &self,
        id_peserta: i64,
        id_agenda: i64,
        detail: bool,
    ) -> Result<Option<GabunganView>, AppError> {
        let Some(row) = self.fetch_row(id_peserta, id_agenda).await? else {
            return Ok(None);
        };

        let tokens: Vec<String> = row.jawaban.split('|').map(String::from).collect();

        let detail = if detail {
            let mappings = sqlx::query_as::<_, SoalMapping>(
                "SELECT id, id_agenda, id_mapel, id_soal, urutan_mapel, urutan_global \
                 FROM soal_mapping WHERE id_agenda = ? ORDER BY urutan_global ASC",
            )
            .bind(id_agenda)
            .fetch_all(&self.pool)
            .await?;

            Some(
                mappings
                    .into_iter()
                    .map(|m| {
                        let jawaban = tokens
                            .get((m.urutan_global - 1) as usize)
                            .cloned()
                            .unwrap_or_else(|| "-".to_string());
                        GabunganDetail {
                            urutan_global: m.urutan_global,
                            id_mapel: m.id_mapel,
                            id_soal: m.id_soal,
                            urutan_mapel: m.urutan_mapel,
                            jawaban,
                        }
                    })
                    .collect(),
            )
        } else {
            None
        };

        Ok(Some(GabunganView {
            jawaban: row.jawaban,
            tokens,
            total_soal: row.total_soal,
            diperbarui_pada: row.diperbarui_pada,
            detail,
        }))
    }

    async fn fetch_row(
        &self,
        id_peserta: i64,
        id_agenda: i64,
    ) -> Result<Option<JawabanGabungan>, AppError> {
        let row = sqlx::query_as::<_, JawabanGabungan>(
            "SELECT id, id_peserta, id_agenda, jawaban, total_soal, version, diperbarui_pada \
             FROM jawaban_gabungan WHERE id_peserta = ? AND id_agenda = ?",
        )
        .bind(id_peserta)
        .bind(id_agenda)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}
