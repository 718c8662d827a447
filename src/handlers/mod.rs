// src/handlers/mod.rs

pub mod agenda;
pub mod gabungan;
pub mod ujian;
