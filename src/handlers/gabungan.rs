// src/handlers/gabungan.rs

use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use serde_json::json;
use validator::Validate;

use crate::{
    error::AppError,
    models::jawaban::{GabunganQuery, InitGabunganRequest},
    state::AppState,
};

/// Reads the combined answer. An uninitialized participant yields a
/// `jawaban: null` body, not an error.
pub async fn get_gabungan(
    State(state): State<AppState>,
    Query(q): Query<GabunganQuery>,
) -> Result<impl IntoResponse, AppError> {
    let view = state
        .aggregator
        .get_combined(q.id_peserta, q.id_agenda, q.detail)
        .await?;

    let body = match view {
        None => json!({
            "success": true,
            "jawaban": serde_json::Value::Null,
            "total_soal": 0,
        }),
        Some(v) => json!({
            "success": true,
            "jawaban": v.jawaban,
            "total_soal": v.total_soal,
            "diperbarui_pada": v.diperbarui_pada,
            "detail": v.detail,
        }),
    };

    Ok(Json(body))
}

/// Explicit manual trigger for combined-answer initialization (and the
/// mapping generation it implies).
pub async fn init_gabungan(
    State(state): State<AppState>,
    Json(payload): Json<InitGabunganRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(e) = payload.validate() {
        return Err(AppError::BadRequest(e.to_string()));
    }

    let total = state
        .aggregator
        .ensure_initialized(payload.id_peserta, payload.id_agenda)
        .await?;

    let view = state
        .aggregator
        .get_combined(payload.id_peserta, payload.id_agenda, false)
        .await?
        .ok_or_else(|| {
            AppError::InternalServerError("Combined answer missing after init".to_string())
        })?;

    Ok(Json(json!({
        "success": true,
        "total_soal": total,
        "jawaban": view.jawaban,
    })))
}
