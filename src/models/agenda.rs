// src/models/agenda.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'agenda' table: one scheduled exam session.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Agenda {
    pub id: i64,

    pub nama: String,

    /// Access token participants present to enter the session.
    pub token: String,

    /// Session window. A participant may only enter between `mulai`
    /// and `selesai`.
    pub mulai: chrono::DateTime<chrono::Utc>,
    pub selesai: chrono::DateTime<chrono::Utc>,

    /// 'aktif' or 'arsip'.
    pub status: String,
}

/// DTO for entering an agenda with its access token.
#[derive(Debug, Deserialize, Validate)]
pub struct MasukAgendaRequest {
    #[validate(length(min = 1, max = 64, message = "Token must not be empty."))]
    pub token: String,
}
