// tests/mapping_tests.rs

use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use ujian::mapping::{MappingOutcome, SoalMappingIndex};

async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory sqlite");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    pool
}

async fn seed_agenda(pool: &SqlitePool) -> i64 {
    sqlx::query("INSERT INTO agenda (nama, token, mulai, selesai, status) VALUES (?, ?, ?, ?, 'aktif')")
        .bind("Ujian Semester")
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(chrono::Utc::now() - chrono::Duration::hours(1))
        .bind(chrono::Utc::now() + chrono::Duration::hours(1))
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
}

async fn seed_mapel(pool: &SqlitePool, id_agenda: i64, status: &str) -> i64 {
    sqlx::query("INSERT INTO mapel (id_agenda, nama, durasi_menit, status) VALUES (?, ?, 60, ?)")
        .bind(id_agenda)
        .bind("Matematika")
        .bind(status)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
}

async fn seed_soal(pool: &SqlitePool, id_mapel: i64, no_soal: Option<i64>) -> i64 {
    sqlx::query(
        "INSERT INTO soal (id_mapel, no_soal, pertanyaan, pilihan, kunci) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(id_mapel)
    .bind(no_soal)
    .bind("Berapa 2 + 2?")
    .bind(r#"["A","B","C","D"]"#)
    .bind("A")
    .execute(pool)
    .await
    .unwrap()
    .last_insert_rowid()
}

async fn mapping_rows(pool: &SqlitePool, id_agenda: i64) -> Vec<(i64, i64, i64, i64)> {
    sqlx::query_as::<_, (i64, i64, i64, i64)>(
        "SELECT id_mapel, id_soal, urutan_mapel, urutan_global FROM soal_mapping \
         WHERE id_agenda = ? ORDER BY urutan_global ASC",
    )
    .bind(id_agenda)
    .fetch_all(pool)
    .await
    .unwrap()
}

#[tokio::test]
async fn generate_is_deterministic_and_dense() {
    let pool = memory_pool().await;
    let agenda = seed_agenda(&pool).await;

    // Two ready mapel; the first has a gap in no_soal (1, 2, 5).
    let m1 = seed_mapel(&pool, agenda, "siap").await;
    seed_soal(&pool, m1, Some(1)).await;
    seed_soal(&pool, m1, Some(2)).await;
    seed_soal(&pool, m1, Some(5)).await;
    let m2 = seed_mapel(&pool, agenda, "siap").await;
    seed_soal(&pool, m2, Some(1)).await;
    seed_soal(&pool, m2, Some(2)).await;

    let index = SoalMappingIndex::new(pool.clone());

    match index.generate_mapping(agenda).await.unwrap() {
        MappingOutcome::Generated { total_soal, .. } => assert_eq!(total_soal, 5),
        MappingOutcome::NoMapel => panic!("expected a generated mapping"),
    }
    let first = mapping_rows(&pool, agenda).await;

    // Regenerating without data changes yields bit-identical assignment.
    index.generate_mapping(agenda).await.unwrap();
    let second = mapping_rows(&pool, agenda).await;
    assert_eq!(first, second);

    // Coverage: global positions are exactly {1..=5}.
    let globals: Vec<i64> = first.iter().map(|r| r.3).collect();
    assert_eq!(globals, vec![1, 2, 3, 4, 5]);

    // Mapel iterated in ascending id order: m1 occupies 1..=3, m2 4..=5.
    assert!(first[..3].iter().all(|r| r.0 == m1));
    assert!(first[3..].iter().all(|r| r.0 == m2));
}

#[tokio::test]
async fn unnumbered_soal_sort_after_numbered_in_id_order() {
    let pool = memory_pool().await;
    let agenda = seed_agenda(&pool).await;
    let mapel = seed_mapel(&pool, agenda, "siap").await;

    let s_null_a = seed_soal(&pool, mapel, None).await;
    let s_two = seed_soal(&pool, mapel, Some(2)).await;
    let s_one = seed_soal(&pool, mapel, Some(1)).await;
    let s_null_b = seed_soal(&pool, mapel, None).await;

    let index = SoalMappingIndex::new(pool.clone());
    index.generate_mapping(agenda).await.unwrap();

    let rows = mapping_rows(&pool, agenda).await;
    let order: Vec<i64> = rows.iter().map(|r| r.1).collect();
    // Numbered first (by no_soal), then the unnumbered two in id order,
    // each with its own slot.
    assert_eq!(order, vec![s_one, s_two, s_null_a, s_null_b]);
    assert_eq!(rows.iter().map(|r| r.2).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn no_ready_mapel_is_a_noop() {
    let pool = memory_pool().await;
    let agenda = seed_agenda(&pool).await;
    let draf = seed_mapel(&pool, agenda, "draf").await;
    seed_soal(&pool, draf, Some(1)).await;

    let index = SoalMappingIndex::new(pool.clone());
    assert!(matches!(
        index.generate_mapping(agenda).await.unwrap(),
        MappingOutcome::NoMapel
    ));
    assert_eq!(index.total_soal(agenda).await.unwrap(), 0);
}

#[tokio::test]
async fn regenerate_fully_replaces_the_mapping() {
    let pool = memory_pool().await;
    let agenda = seed_agenda(&pool).await;
    let mapel = seed_mapel(&pool, agenda, "siap").await;
    seed_soal(&pool, mapel, Some(1)).await;
    seed_soal(&pool, mapel, Some(2)).await;

    let index = SoalMappingIndex::new(pool.clone());
    index.generate_mapping(agenda).await.unwrap();
    assert_eq!(index.total_soal(agenda).await.unwrap(), 2);

    // A new question appears; the regenerate replaces every row and the
    // numbering stays dense.
    seed_soal(&pool, mapel, Some(3)).await;
    index.generate_mapping(agenda).await.unwrap();

    let rows = mapping_rows(&pool, agenda).await;
    assert_eq!(rows.len(), 3);
    assert_eq!(rows.iter().map(|r| r.3).collect::<Vec<_>>(), vec![1, 2, 3]);
}

#[tokio::test]
async fn lookup_finds_generated_positions() {
    let pool = memory_pool().await;
    let agenda = seed_agenda(&pool).await;
    let mapel = seed_mapel(&pool, agenda, "siap").await;
    let s1 = seed_soal(&pool, mapel, Some(1)).await;
    let s2 = seed_soal(&pool, mapel, Some(2)).await;

    let index = SoalMappingIndex::new(pool.clone());
    assert_eq!(index.lookup(agenda, mapel, s1).await.unwrap(), None);

    index.generate_mapping(agenda).await.unwrap();
    assert_eq!(index.lookup(agenda, mapel, s1).await.unwrap(), Some(1));
    assert_eq!(index.lookup(agenda, mapel, s2).await.unwrap(), Some(2));
}
