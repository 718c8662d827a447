// src/handlers/agenda.rs

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::json;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        agenda::{Agenda, MasukAgendaRequest},
        paket::PaketUjian,
        peserta::Peserta,
        soal::SoalPublic,
    },
    state::AppState,
    store::{fetch_ready_mapel, fetch_soal_ordered, with_retry},
};

/// Lists active agendas through the time-boxed cache.
pub async fn list_aktif(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let agendas = state.agenda_cache.active(&state.pool).await?;
    Ok(Json(json!({ "success": true, "agenda": agendas })))
}

/// Validates an agenda access token and the session time window.
pub async fn masuk(
    State(state): State<AppState>,
    Json(payload): Json<MasukAgendaRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(e) = payload.validate() {
        return Err(AppError::BadRequest(e.to_string()));
    }

    let agenda = sqlx::query_as::<_, Agenda>(
        "SELECT id, nama, token, mulai, selesai, status \
         FROM agenda WHERE token = ? AND status = 'aktif'",
    )
    .bind(&payload.token)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::AuthError("Invalid agenda token".to_string()))?;

    let now = chrono::Utc::now();
    if now < agenda.mulai {
        return Err(AppError::AuthError("Exam has not started yet".to_string()));
    }
    if now > agenda.selesai {
        return Err(AppError::AuthError("Exam window has ended".to_string()));
    }

    Ok(Json(json!({ "success": true, "agenda": agenda })))
}

/// The bulk offline-package fetch: one agenda's ready mapel, every
/// question across them (answer keys stripped) and the participant
/// roster, in a single response.
pub async fn paket(
    State(state): State<AppState>,
    Path(id_agenda): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let agenda = sqlx::query_as::<_, Agenda>(
        "SELECT id, nama, token, mulai, selesai, status FROM agenda WHERE id = ?",
    )
    .bind(id_agenda)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Agenda {} not found", id_agenda)))?;

    let mapels = with_retry(|| fetch_ready_mapel(&state.pool, id_agenda)).await?;

    let mut soal: Vec<SoalPublic> = Vec::new();
    for mapel in &mapels {
        let batch = with_retry(|| fetch_soal_ordered(&state.pool, mapel.id)).await?;
        soal.extend(batch.into_iter().map(SoalPublic::from));
    }

    let peserta = sqlx::query_as::<_, Peserta>(
        "SELECT id, id_agenda, nomor, nama, kata_sandi FROM peserta \
         WHERE id_agenda = ? ORDER BY nomor ASC",
    )
    .bind(id_agenda)
    .fetch_all(&state.pool)
    .await?;

    let paket = PaketUjian {
        agenda,
        mapels,
        soal,
        peserta,
    };

    Ok(Json(json!({ "success": true, "paket": paket })))
}
