// src/lib.rs

pub mod agenda_cache;
pub mod aggregator;
pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod mapping;
pub mod models;
pub mod routes;
pub mod state;
pub mod store;

// Re-export specific items for convenience if needed
pub use routes::create_router;
