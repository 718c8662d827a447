// src/models/jawaban.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'jawaban_mapel' table: the per-subject answer string
/// for one (peserta, mapel).
///
/// `jawaban` is a '|'-delimited token list, one token per subject-local
/// question position, '-' meaning unanswered. It is only ever replaced
/// wholesale, never partially rewritten.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct JawabanMapel {
    pub id: i64,
    pub id_peserta: i64,
    pub id_mapel: i64,
    pub id_agenda: i64,
    pub jawaban: String,

    /// 'mengerjakan' or 'selesai'. Finality lives here, not on the
    /// combined answer.
    pub status: String,

    pub mulai_pada: Option<chrono::DateTime<chrono::Utc>>,
    pub selesai_pada: Option<chrono::DateTime<chrono::Utc>>,
    pub diperbarui_pada: Option<chrono::DateTime<chrono::Utc>>,
}

/// Represents the 'soal_mapping' table: one row per (agenda, mapel, soal).
///
/// `urutan_global` is the dense 1-based position of the question in the
/// agenda-wide combined ordering. Rows are regenerated only by full
/// replace.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct SoalMapping {
    pub id: i64,
    pub id_agenda: i64,
    pub id_mapel: i64,
    pub id_soal: i64,

    /// Subject-local position (1-based, dense) within the canonical
    /// question ordering.
    pub urutan_mapel: i64,

    pub urutan_global: i64,
}

/// Represents the 'jawaban_gabungan' table: the agenda-wide combined
/// answer string for one (peserta, agenda).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct JawabanGabungan {
    pub id: i64,
    pub id_peserta: i64,
    pub id_agenda: i64,
    pub jawaban: String,
    pub total_soal: i64,

    /// Optimistic write guard; bumped on every replace.
    pub version: i64,

    pub diperbarui_pada: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for the get-soal endpoint.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct GetSoalRequest {
    #[validate(range(min = 1))]
    pub id_agenda: i64,
    #[validate(range(min = 1))]
    pub id_peserta: i64,
    #[validate(range(min = 1))]
    pub id_mapel: i64,
}

/// DTO for save-answer and finish-exam. Also the payload of a queued
/// client submission.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct SaveJawabanRequest {
    #[validate(range(min = 1))]
    pub id_peserta: i64,
    #[validate(range(min = 1))]
    pub id_agenda: i64,
    #[validate(range(min = 1))]
    pub id_mapel: i64,
    #[validate(length(max = 65536))]
    pub jawaban: String,
}

/// DTO for the explicit combined-answer init endpoint.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct InitGabunganRequest {
    #[validate(range(min = 1))]
    pub id_peserta: i64,
    #[validate(range(min = 1))]
    pub id_agenda: i64,
}

/// Query parameters for reading the combined answer.
#[derive(Debug, Deserialize)]
pub struct GabunganQuery {
    pub id_peserta: i64,
    pub id_agenda: i64,
    #[serde(default)]
    pub detail: bool,
}

/// One per-question row of the detailed combined-answer view.
#[derive(Debug, Serialize, Deserialize)]
pub struct GabunganDetail {
    pub urutan_global: i64,
    pub id_mapel: i64,
    pub id_soal: i64,
    pub urutan_mapel: i64,
    pub jawaban: String,
}
