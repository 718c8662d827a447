// src/models/soal.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};

/// Represents the 'soal' table: one test item within a mapel.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Soal {
    pub id: i64,
    pub id_mapel: i64,

    /// Per-mapel 1-based sequence number. May have gaps; may be NULL for
    /// legacy imports. Questions without a number sort after numbered
    /// ones, in id order (see `store::fetch_soal_ordered`).
    pub no_soal: Option<i64>,

    pub pertanyaan: String,

    /// Answer options, stored as a JSON array.
    pub pilihan: Json<Vec<String>>,

    /// The answer key. Never sent to clients; stripped by `SoalPublic`.
    pub kunci: String,
}

/// DTO for sending a question to clients (excludes the answer key).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SoalPublic {
    pub id: i64,
    pub id_mapel: i64,
    pub no_soal: Option<i64>,
    pub pertanyaan: String,
    pub pilihan: Vec<String>,
}

impl From<Soal> for SoalPublic {
    fn from(s: Soal) -> Self {
        SoalPublic {
            id: s.id,
            id_mapel: s.id_mapel,
            no_soal: s.no_soal,
            pertanyaan: s.pertanyaan,
            pilihan: s.pilihan.0,
        }
    }
}
