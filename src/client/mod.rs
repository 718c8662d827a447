// src/client/mod.rs

pub mod api;
pub mod cache;
pub mod error;
pub mod kv;
pub mod localdb;
pub mod sync;

use std::sync::Arc;

use tokio::sync::{Notify, watch};

use crate::models::{
    jawaban::{GetSoalRequest, SaveJawabanRequest},
    paket::PaketUjian,
    soal::SoalPublic,
};

pub use api::{ExamApi, HttpExamApi};
pub use cache::OfflineCache;
pub use error::ClientError;
pub use kv::KvStore;
pub use localdb::LocalDb;
pub use sync::{DrainReport, SyncEngine};

/// Facade tying the offline cache and the sync engine together: every
/// save is locally durable the instant it returns, and the engine is
/// nudged to reconcile with the backend in the background.
pub struct ExamClient {
    cache: Arc<OfflineCache>,
    api: Arc<dyn ExamApi>,
    notify: Arc<Notify>,
}

impl ExamClient {
    /// Builds the client and its sync engine. The caller spawns
    /// `engine.run()` and flips `online_tx` on connectivity changes.
    pub fn new(
        api: Arc<dyn ExamApi>,
        kv: Arc<KvStore>,
        db: Arc<LocalDb>,
        online: watch::Receiver<bool>,
    ) -> (Self, SyncEngine) {
        let cache = Arc::new(OfflineCache::new(kv, db.clone()));
        let engine = SyncEngine::new(db, api.clone(), online);
        let client = Self {
            cache,
            api,
            notify: engine.notifier(),
        };
        (client, engine)
    }

    pub fn cache(&self) -> &Arc<OfflineCache> {
        &self.cache
    }

    pub async fn get_soal(&self, req: &GetSoalRequest) -> Result<Vec<SoalPublic>, ClientError> {
        self.cache.get_soal(self.api.as_ref(), req).await
    }

    /// Synchronous-feeling save: locally durable before returning, then
    /// the engine is nudged to deliver.
    pub fn save_jawaban(&self, payload: &SaveJawabanRequest) -> Result<i64, ClientError> {
        let id = self.cache.save_jawaban(payload)?;
        self.notify.notify_one();
        Ok(id)
    }

    pub fn finish_ujian(&self, payload: &SaveJawabanRequest) -> Result<i64, ClientError> {
        let id = self.cache.finish_ujian(payload)?;
        self.notify.notify_one();
        Ok(id)
    }

    pub async fn download_paket(&self, id_agenda: i64) -> Result<PaketUjian, ClientError> {
        self.cache.download_paket(self.api.as_ref(), id_agenda).await
    }
}
