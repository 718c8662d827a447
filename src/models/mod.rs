// src/models/mod.rs

pub mod agenda;
pub mod jawaban;
pub mod mapel;
pub mod paket;
pub mod peserta;
pub mod soal;
