// tests/api_tests.rs

use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use ujian::{config::Config, routes, state::AppState};

/// Helper to spawn the app on a random port for testing.
/// Returns the base URL and the pool for seeding.
async fn spawn_app() -> (String, SqlitePool) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory sqlite");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: "sqlite::memory:".to_string(),
        rust_log: "error".to_string(),
        agenda_cache_ttl_secs: 1,
        bind_addr: "127.0.0.1:0".to_string(),
    };

    let state = AppState::new(pool.clone(), config);
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (address, pool)
}

async fn seed_agenda(pool: &SqlitePool, token: &str) -> i64 {
    sqlx::query("INSERT INTO agenda (nama, token, mulai, selesai, status) VALUES (?, ?, ?, ?, 'aktif')")
        .bind("Ujian Semester")
        .bind(token)
        .bind(chrono::Utc::now() - chrono::Duration::hours(1))
        .bind(chrono::Utc::now() + chrono::Duration::hours(1))
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
}

async fn seed_mapel_with_soal(pool: &SqlitePool, id_agenda: i64, count: usize) -> i64 {
    let id_mapel =
        sqlx::query("INSERT INTO mapel (id_agenda, nama, durasi_menit, status) VALUES (?, ?, 60, 'siap')")
            .bind(id_agenda)
            .bind("Mapel")
            .execute(pool)
            .await
            .unwrap()
            .last_insert_rowid();

    for n in 1..=count {
        sqlx::query(
            "INSERT INTO soal (id_mapel, no_soal, pertanyaan, pilihan, kunci) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id_mapel)
        .bind(n as i64)
        .bind(format!("Soal {}", n))
        .bind(r#"["A","B","C","D"]"#)
        .bind("A")
        .execute(pool)
        .await
        .unwrap();
    }

    id_mapel
}

async fn seed_peserta(pool: &SqlitePool, id_agenda: i64) -> i64 {
    sqlx::query("INSERT INTO peserta (id_agenda, nomor, nama, kata_sandi) VALUES (?, ?, ?, '')")
        .bind(id_agenda)
        .bind(uuid::Uuid::new_v4().to_string())
        .bind("Peserta")
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
}

#[tokio::test]
async fn get_soal_reports_new_then_resume_then_done() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let agenda = seed_agenda(&pool, "token-a").await;
    let mapel = seed_mapel_with_soal(&pool, agenda, 3).await;
    let peserta = seed_peserta(&pool, agenda).await;

    let body = serde_json::json!({
        "id_agenda": agenda, "id_peserta": peserta, "id_mapel": mapel
    });

    // First fetch creates the fresh all-'-' row.
    let resp: serde_json::Value = client
        .post(format!("{}/api/ujian/get-soal", address))
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resp["success"], true);
    assert_eq!(resp["status"], "New");
    assert_eq!(resp["jawaban"], "-|-|-");
    assert_eq!(resp["soal"].as_array().unwrap().len(), 3);
    // Answer keys never leave the server.
    assert!(resp["soal"][0].get("kunci").is_none());

    // A save, then the second fetch resumes with the saved progress.
    let save: serde_json::Value = client
        .post(format!("{}/api/ujian/save-answer", address))
        .json(&serde_json::json!({
            "id_peserta": peserta, "id_agenda": agenda, "id_mapel": mapel,
            "jawaban": "A|-|B"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(save["success"], true);

    let resp: serde_json::Value = client
        .post(format!("{}/api/ujian/get-soal", address))
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resp["status"], "Resume");
    assert_eq!(resp["jawaban"], "A|-|B");

    // Finishing makes the subject terminal.
    client
        .post(format!("{}/api/ujian/finish-exam", address))
        .json(&serde_json::json!({
            "id_peserta": peserta, "id_agenda": agenda, "id_mapel": mapel,
            "jawaban": "A|C|B"
        }))
        .send()
        .await
        .unwrap();

    let resp: serde_json::Value = client
        .post(format!("{}/api/ujian/get-soal", address))
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resp["status"], "Done");
    assert_eq!(resp["jawaban"], "A|C|B");
}

#[tokio::test]
async fn save_after_finish_is_rejected_but_finish_is_idempotent() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let agenda = seed_agenda(&pool, "token-b").await;
    let mapel = seed_mapel_with_soal(&pool, agenda, 2).await;
    let peserta = seed_peserta(&pool, agenda).await;

    let finish_body = serde_json::json!({
        "id_peserta": peserta, "id_agenda": agenda, "id_mapel": mapel,
        "jawaban": "A|B"
    });

    let first = client
        .post(format!("{}/api/ujian/finish-exam", address))
        .json(&finish_body)
        .send()
        .await
        .unwrap();
    assert_eq!(first.status().as_u16(), 200);

    // Retried finish (sync-engine replay) succeeds again.
    let second = client
        .post(format!("{}/api/ujian/finish-exam", address))
        .json(&finish_body)
        .send()
        .await
        .unwrap();
    assert_eq!(second.status().as_u16(), 200);

    // A late save against the terminal subject is a conflict.
    let save = client
        .post(format!("{}/api/ujian/save-answer", address))
        .json(&serde_json::json!({
            "id_peserta": peserta, "id_agenda": agenda, "id_mapel": mapel,
            "jawaban": "C|D"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(save.status().as_u16(), 409);
    let body: serde_json::Value = save.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("finished"));
}

#[tokio::test]
async fn validation_errors_carry_the_success_flag() {
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/ujian/get-soal", address))
        .json(&serde_json::json!({
            "id_agenda": 0, "id_peserta": 0, "id_mapel": 0
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn combined_answer_endpoints_roundtrip() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let agenda = seed_agenda(&pool, "token-c").await;
    let s1 = seed_mapel_with_soal(&pool, agenda, 2).await;
    let s2 = seed_mapel_with_soal(&pool, agenda, 2).await;
    let peserta = seed_peserta(&pool, agenda).await;

    // Unknown participant reads as null, not as an error.
    let empty: serde_json::Value = client
        .get(format!(
            "{}/api/gabungan?id_peserta={}&id_agenda={}",
            address, peserta, agenda
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(empty["success"], true);
    assert!(empty["jawaban"].is_null());

    // Explicit init builds the mapping and the blank string.
    let init: serde_json::Value = client
        .post(format!("{}/api/gabungan/init", address))
        .json(&serde_json::json!({ "id_peserta": peserta, "id_agenda": agenda }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(init["success"], true);
    assert_eq!(init["total_soal"], 4);
    assert_eq!(init["jawaban"], "-|-|-|-");

    for (mapel, jawaban) in [(s1, "B|-"), (s2, "-|D")] {
        client
            .post(format!("{}/api/ujian/save-answer", address))
            .json(&serde_json::json!({
                "id_peserta": peserta, "id_agenda": agenda, "id_mapel": mapel,
                "jawaban": jawaban
            }))
            .send()
            .await
            .unwrap();
    }

    let combined: serde_json::Value = client
        .get(format!(
            "{}/api/gabungan?id_peserta={}&id_agenda={}&detail=true",
            address, peserta, agenda
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(combined["jawaban"], "B|-|-|D");
    assert_eq!(combined["total_soal"], 4);
    assert_eq!(combined["detail"].as_array().unwrap().len(), 4);
    assert_eq!(combined["detail"][3]["jawaban"], "D");
}

#[tokio::test]
async fn agenda_token_and_window_are_checked() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    seed_agenda(&pool, "rahasia").await;

    let bad = client
        .post(format!("{}/api/agenda/masuk", address))
        .json(&serde_json::json!({ "token": "salah" }))
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status().as_u16(), 401);
    let body: serde_json::Value = bad.json().await.unwrap();
    assert_eq!(body["success"], false);

    let ok: serde_json::Value = client
        .post(format!("{}/api/agenda/masuk", address))
        .json(&serde_json::json!({ "token": "rahasia" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(ok["success"], true);
    assert_eq!(ok["agenda"]["token"], "rahasia");
}

#[tokio::test]
async fn paket_bundles_mapels_soal_and_roster() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let agenda = seed_agenda(&pool, "token-d").await;
    seed_mapel_with_soal(&pool, agenda, 2).await;
    seed_mapel_with_soal(&pool, agenda, 3).await;
    seed_peserta(&pool, agenda).await;
    seed_peserta(&pool, agenda).await;

    let resp: serde_json::Value = client
        .get(format!("{}/api/agenda/{}/paket", address, agenda))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(resp["success"], true);
    let paket = &resp["paket"];
    assert_eq!(paket["agenda"]["id"], agenda);
    assert_eq!(paket["mapels"].as_array().unwrap().len(), 2);
    assert_eq!(paket["soal"].as_array().unwrap().len(), 5);
    assert_eq!(paket["peserta"].as_array().unwrap().len(), 2);
    assert!(paket["soal"][0].get("kunci").is_none());
}
