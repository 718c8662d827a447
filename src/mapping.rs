// src/mapping.rs

use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::{
    error::AppError,
    store::{fetch_ready_mapel, fetch_soal_ordered, with_retry},
};

/// One freshly computed mapping row, before insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingRow {
    pub id_agenda: i64,
    pub id_mapel: i64,
    pub id_soal: i64,
    /// Subject-local position (1-based, dense) in the canonical ordering.
    pub urutan_mapel: i64,
    pub urutan_global: i64,
}

/// Result of a mapping generation attempt.
#[derive(Debug)]
pub enum MappingOutcome {
    /// The agenda has no ready mapel; storage was not touched.
    NoMapel,
    Generated { total_soal: i64, rows: Vec<MappingRow> },
}

/// Deterministic mapping from (agenda, mapel, subject-local question)
/// to a dense 1-based global sequence position.
///
/// The mapping is only ever replaced wholesale: a partial update would
/// desynchronize combined answers already written against the old
/// numbering.
#[derive(Clone)]
pub struct SoalMappingIndex {
    pool: SqlitePool,
}

impl SoalMappingIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Recomputes and fully replaces the mapping for one agenda.
    ///
    /// Ready mapel are iterated in ascending id order; within each, the
    /// canonical question ordering assigns global positions 1..N by
    /// concatenation. Calling twice without intervening mapel/soal
    /// changes yields bit-identical assignment.
    pub async fn generate_mapping(&self, id_agenda: i64) -> Result<MappingOutcome, AppError> {
        let mapels = with_retry(|| fetch_ready_mapel(&self.pool, id_agenda)).await?;

        if mapels.is_empty() {
            tracing::warn!("No ready mapel for agenda {}, mapping not generated", id_agenda);
            return Ok(MappingOutcome::NoMapel);
        }

        let mut rows = Vec::new();
        let mut urutan_global = 0i64;
        for mapel in &mapels {
            let soals = with_retry(|| fetch_soal_ordered(&self.pool, mapel.id)).await?;
            for (i, soal) in soals.iter().enumerate() {
                urutan_global += 1;
                rows.push(MappingRow {
                    id_agenda,
                    id_mapel: mapel.id,
                    id_soal: soal.id,
                    urutan_mapel: (i + 1) as i64,
                    urutan_global,
                });
            }
        }

        // Full replace in one transaction.
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM soal_mapping WHERE id_agenda = ?")
            .bind(id_agenda)
            .execute(&mut *tx)
            .await?;

        // Chunked inserts to stay under SQLite's bind variable limit.
        for chunk in rows.chunks(100) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO soal_mapping \
                 (id_agenda, id_mapel, id_soal, urutan_mapel, urutan_global) ",
            );
            builder.push_values(chunk, |mut b, row| {
                b.push_bind(row.id_agenda)
                    .push_bind(row.id_mapel)
                    .push_bind(row.id_soal)
                    .push_bind(row.urutan_mapel)
                    .push_bind(row.urutan_global);
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;

        tracing::info!(
            "Generated soal mapping for agenda {}: {} soal across {} mapel",
            id_agenda,
            rows.len(),
            mapels.len()
        );

        Ok(MappingOutcome::Generated {
            total_soal: rows.len() as i64,
            rows,
        })
    }

    /// Point lookup of the global position for one question.
    pub async fn lookup(
        &self,
        id_agenda: i64,
        id_mapel: i64,
        id_soal: i64,
    ) -> Result<Option<i64>, AppError> {
        let urutan = sqlx::query_scalar::<_, i64>(
            "SELECT urutan_global FROM soal_mapping \
             WHERE id_agenda = ? AND id_mapel = ? AND id_soal = ?",
        )
        .bind(id_agenda)
        .bind(id_mapel)
        .bind(id_soal)
        .fetch_optional(&self.pool)
        .await?;

        Ok(urutan)
    }

    /// Number of mapping rows (= total questions) for an agenda.
    /// Zero means the mapping has not been generated yet.
    pub async fn total_soal(&self, id_agenda: i64) -> Result<i64, AppError> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM soal_mapping WHERE id_agenda = ?",
        )
        .bind(id_agenda)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }
}
