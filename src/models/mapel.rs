// src/models/mapel.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'mapel' table: one exam paper/course within an agenda.
///
/// A mapel is immutable during a session once its status is 'siap'.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Mapel {
    pub id: i64,
    pub id_agenda: i64,
    pub nama: String,
    pub durasi_menit: i64,

    /// 'draf' or 'siap'. Only 'siap' mapel take part in the combined
    /// answer mapping.
    pub status: String,
}
