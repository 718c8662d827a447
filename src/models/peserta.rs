// src/models/peserta.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'peserta' table: one student taking the exam.
///
/// The roster (including `kata_sandi`) ships inside the offline exam
/// package so the client can validate logins without connectivity.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Peserta {
    pub id: i64,
    pub id_agenda: i64,

    /// Exam registration number, unique within an agenda.
    pub nomor: String,

    pub nama: String,

    pub kata_sandi: String,
}
