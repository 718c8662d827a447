// src/models/paket.rs

use serde::{Deserialize, Serialize};

use crate::models::{agenda::Agenda, mapel::Mapel, peserta::Peserta, soal::SoalPublic};

/// One agenda's full offline exam package: the ready subjects, every
/// question across them (answer keys stripped) and the participant
/// roster for offline login validation.
///
/// The client stores a package as one atomic unit keyed by agenda id;
/// a partially downloaded package is never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaketUjian {
    pub agenda: Agenda,
    pub mapels: Vec<Mapel>,
    pub soal: Vec<SoalPublic>,
    pub peserta: Vec<Peserta>,
}
