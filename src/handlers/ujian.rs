// src/handlers/ujian.rs

use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        jawaban::{GetSoalRequest, JawabanMapel, SaveJawabanRequest},
        soal::SoalPublic,
    },
    state::AppState,
    store::{fetch_mapel, fetch_soal_ordered, with_retry},
};

async fn fetch_jawaban_row(
    pool: &sqlx::SqlitePool,
    id_peserta: i64,
    id_mapel: i64,
) -> Result<Option<JawabanMapel>, AppError> {
    let row = sqlx::query_as::<_, JawabanMapel>(
        "SELECT id, id_peserta, id_mapel, id_agenda, jawaban, status, \
                mulai_pada, selesai_pada, diperbarui_pada \
         FROM jawaban_mapel WHERE id_peserta = ? AND id_mapel = ?",
    )
    .bind(id_peserta)
    .bind(id_mapel)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Fetches one mapel's question set and the participant's progress.
///
/// Idempotent: the first call creates a fresh all-'-' answer row and
/// reports status "New"; later calls return the existing progress as
/// "Resume", or "Done" once the subject session is terminal. Also one of
/// the lazy trigger points for combined-answer initialization.
pub async fn get_soal(
    State(state): State<AppState>,
    Json(payload): Json<GetSoalRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(e) = payload.validate() {
        return Err(AppError::BadRequest(e.to_string()));
    }

    let mapel = fetch_mapel(&state.pool, payload.id_mapel)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Mapel {} not found", payload.id_mapel)))?;

    if mapel.id_agenda != payload.id_agenda {
        return Err(AppError::BadRequest(format!(
            "Mapel {} does not belong to agenda {}",
            payload.id_mapel, payload.id_agenda
        )));
    }
    if mapel.status != "siap" {
        return Err(AppError::BadRequest(format!(
            "Mapel {} is not ready",
            payload.id_mapel
        )));
    }

    let soals = with_retry(|| fetch_soal_ordered(&state.pool, payload.id_mapel)).await?;

    let existing = fetch_jawaban_row(&state.pool, payload.id_peserta, payload.id_mapel).await?;

    let (status, row) = match existing {
        None => {
            let blank = vec!["-"; soals.len()].join("|");
            let now = chrono::Utc::now();
            sqlx::query(
                "INSERT INTO jawaban_mapel \
                 (id_peserta, id_mapel, id_agenda, jawaban, status, mulai_pada, diperbarui_pada) \
                 VALUES (?, ?, ?, ?, 'mengerjakan', ?, ?) \
                 ON CONFLICT(id_peserta, id_mapel) DO NOTHING",
            )
            .bind(payload.id_peserta)
            .bind(payload.id_mapel)
            .bind(mapel.id_agenda)
            .bind(&blank)
            .bind(now)
            .bind(now)
            .execute(&state.pool)
            .await?;

            // Re-read: a concurrent first call may have won the insert.
            let row = fetch_jawaban_row(&state.pool, payload.id_peserta, payload.id_mapel)
                .await?
                .ok_or_else(|| {
                    AppError::InternalServerError("jawaban_mapel row missing after insert".into())
                })?;
            ("New", row)
        }
        Some(row) if row.status == "selesai" => ("Done", row),
        Some(row) => ("Resume", row),
    };

    // Lazy init trigger; failure here must not block the question fetch.
    if let Err(e) = state
        .aggregator
        .ensure_initialized(payload.id_peserta, payload.id_agenda)
        .await
    {
        tracing::warn!("Combined answer init during get-soal failed: {}", e);
    }

    let soal: Vec<SoalPublic> = soals.into_iter().map(SoalPublic::from).collect();

    Ok(Json(json!({
        "success": true,
        "status": status,
        "mulai_pada": row.mulai_pada,
        "jawaban": row.jawaban,
        "mapel": mapel,
        "soal": soal,
    })))
}

async fn upsert_jawaban(
    state: &AppState,
    payload: &SaveJawabanRequest,
    finish: bool,
) -> Result<(), AppError> {
    let existing = fetch_jawaban_row(&state.pool, payload.id_peserta, payload.id_mapel).await?;

    if let Some(row) = &existing {
        if row.status == "selesai" && !finish {
            return Err(AppError::Conflict(format!(
                "Mapel {} already finished for peserta {}",
                payload.id_mapel, payload.id_peserta
            )));
        }
    }

    let now = chrono::Utc::now();
    let status = if finish { "selesai" } else { "mengerjakan" };
    let selesai_pada = finish.then_some(now);

    sqlx::query(
        "INSERT INTO jawaban_mapel \
         (id_peserta, id_mapel, id_agenda, jawaban, status, mulai_pada, selesai_pada, diperbarui_pada) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(id_peserta, id_mapel) DO UPDATE SET \
             jawaban = excluded.jawaban, \
             status = excluded.status, \
             selesai_pada = COALESCE(excluded.selesai_pada, jawaban_mapel.selesai_pada), \
             diperbarui_pada = excluded.diperbarui_pada",
    )
    .bind(payload.id_peserta)
    .bind(payload.id_mapel)
    .bind(payload.id_agenda)
    .bind(&payload.jawaban)
    .bind(status)
    .bind(now)
    .bind(selesai_pada)
    .bind(now)
    .execute(&state.pool)
    .await?;

    Ok(())
}

/// Consolidation runs after the per-subject save; its failure degrades
/// to a warning so the student's save is never blocked.
async fn consolidate(state: &AppState, payload: &SaveJawabanRequest) {
    if let Err(e) = state
        .aggregator
        .apply_subject_answers(
            payload.id_peserta,
            payload.id_agenda,
            payload.id_mapel,
            &payload.jawaban,
        )
        .await
    {
        tracing::warn!(
            "Combined answer update failed for peserta {} mapel {}: {}",
            payload.id_peserta,
            payload.id_mapel,
            e
        );
    }
}

/// Replaces the per-subject answer string wholesale, then folds it into
/// the combined answer.
pub async fn save_jawaban(
    State(state): State<AppState>,
    Json(payload): Json<SaveJawabanRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(e) = payload.validate() {
        return Err(AppError::BadRequest(e.to_string()));
    }

    upsert_jawaban(&state, &payload, false).await?;
    consolidate(&state, &payload).await;

    Ok(Json(json!({ "success": true })))
}

/// Same write path as save, plus marks the subject session terminal.
/// Idempotent: a retried finish succeeds again with the same answers.
pub async fn finish_ujian(
    State(state): State<AppState>,
    Json(payload): Json<SaveJawabanRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(e) = payload.validate() {
        return Err(AppError::BadRequest(e.to_string()));
    }

    upsert_jawaban(&state, &payload, true).await?;
    consolidate(&state, &payload).await;

    Ok(Json(json!({ "success": true })))
}
