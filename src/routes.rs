// src/routes.rs

use axum::{
    Router,
    http::Method,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    handlers::{agenda, gabungan, ujian},
    state::AppState,
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (ujian, gabungan, agenda).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (pool, aggregator, agenda cache).
pub fn create_router(state: AppState) -> Router {
    // Exam clients run from school LANs and file:// wrappers; origins
    // cannot be enumerated up front.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let ujian_routes = Router::new()
        .route("/get-soal", post(ujian::get_soal))
        .route("/save-answer", post(ujian::save_jawaban))
        .route("/finish-exam", post(ujian::finish_ujian));

    let gabungan_routes = Router::new()
        .route("/", get(gabungan::get_gabungan))
        .route("/init", post(gabungan::init_gabungan));

    let agenda_routes = Router::new()
        .route("/aktif", get(agenda::list_aktif))
        .route("/masuk", post(agenda::masuk))
        .route("/{id}/paket", get(agenda::paket));

    Router::new()
        .nest("/api/ujian", ujian_routes)
        .nest("/api/gabungan", gabungan_routes)
        .nest("/api/agenda", agenda_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
