// src/client/cache.rs

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::models::{
    jawaban::{GetSoalRequest, SaveJawabanRequest},
    paket::PaketUjian,
    soal::SoalPublic,
};

use super::{
    api::ExamApi,
    error::ClientError,
    kv::{self, KvStore},
    localdb::{LocalDb, QueueKind, TempAnswer},
};

/// Tiered offline cache: an in-memory map, the durable key-value store
/// and the structured local database, consulted in that order on reads
/// and all written on writes.
pub struct OfflineCache {
    mem: RwLock<HashMap<String, Value>>,
    kv: Arc<KvStore>,
    db: Arc<LocalDb>,
}

impl OfflineCache {
    pub fn new(kv: Arc<KvStore>, db: Arc<LocalDb>) -> Self {
        Self {
            mem: RwLock::new(HashMap::new()),
            kv,
            db,
        }
    }

    pub fn db(&self) -> &Arc<LocalDb> {
        &self.db
    }

    pub fn kv(&self) -> &Arc<KvStore> {
        &self.kv
    }

    fn mem_get(&self, key: &str) -> Option<Value> {
        self.mem.read().expect("mem tier poisoned").get(key).cloned()
    }

    fn mem_put(&self, key: &str, value: Value) {
        self.mem
            .write()
            .expect("mem tier poisoned")
            .insert(key.to_string(), value);
    }

    /// Read-through question fetch: memory, then kv, then local db, then
    /// the network, populating every faster tier on a hit from a slower
    /// one.
    pub async fn get_soal(
        &self,
        api: &dyn ExamApi,
        req: &GetSoalRequest,
    ) -> Result<Vec<SoalPublic>, ClientError> {
        let key = kv::soal_key(req.id_mapel);

        // Tier 1: memory.
        if let Some(v) = self.mem_get(&key) {
            if let Ok(soal) = serde_json::from_value::<Vec<SoalPublic>>(v) {
                return Ok(soal);
            }
        }

        // Tier 2: durable kv.
        if let Some(v) = self.kv.get(&key)? {
            if let Ok(soal) = serde_json::from_value::<Vec<SoalPublic>>(v.clone()) {
                if !soal.is_empty() {
                    self.mem_put(&key, v);
                    return Ok(soal);
                }
            }
        }

        // Tier 3: structured local db.
        let stored = self.db.questions_for(req.id_agenda, req.id_mapel)?;
        if !stored.is_empty() {
            let v = serde_json::to_value(&stored)?;
            self.kv.put(&key, &v)?;
            self.mem_put(&key, v);
            return Ok(stored);
        }

        // Network, fail-fast; a miss here surfaces to the caller.
        let resp = api.get_soal(req).await?;

        let v = serde_json::to_value(&resp.soal)?;
        self.kv.put(&key, &v)?;
        self.kv.put(
            &kv::jawaban_key(req.id_mapel),
            &Value::String(resp.jawaban.clone()),
        )?;
        self.db
            .put_questions(req.id_agenda, req.id_mapel, &resp.soal)?;
        self.mem_put(&key, v);

        Ok(resp.soal)
    }

    /// Locally durable answer save. Tiers 1 and 2 complete before this
    /// returns; the structured db write and queue append follow, and the
    /// sync engine picks the entry up asynchronously. Returns the queue
    /// entry id.
    pub fn save_jawaban(&self, payload: &SaveJawabanRequest) -> Result<i64, ClientError> {
        self.write_local(payload)?;
        self.db
            .enqueue(QueueKind::Save, &serde_json::to_value(payload)?)
    }

    /// Same local write path as save, queued as a terminal finish.
    pub fn finish_ujian(&self, payload: &SaveJawabanRequest) -> Result<i64, ClientError> {
        self.write_local(payload)?;
        self.db
            .enqueue(QueueKind::Finish, &serde_json::to_value(payload)?)
    }

    fn write_local(&self, payload: &SaveJawabanRequest) -> Result<(), ClientError> {
        let key = kv::jawaban_key(payload.id_mapel);
        let value = Value::String(payload.jawaban.clone());

        // Tier 1 + tier 2, strictly before any tier-3 or network work:
        // the save must survive a power loss the instant we return.
        self.mem_put(&key, value.clone());
        self.kv.put(&key, &value)?;

        // Tier 3: per-question temp answers, zipped against the locally
        // cached question set. Without a cached set only the aggregate
        // snapshot is stored; the queued payload still carries the full
        // string.
        let soal = self.cached_soal(payload.id_agenda, payload.id_mapel)?;
        if !soal.is_empty() {
            let now = chrono::Utc::now().timestamp_millis();
            let tokens: Vec<&str> = payload.jawaban.split('|').collect();
            for (i, s) in soal.iter().enumerate() {
                let token = tokens.get(i).copied().unwrap_or("-");
                self.db.put_temp_answer(&TempAnswer {
                    id_agenda: payload.id_agenda,
                    id_mapel: payload.id_mapel,
                    id_soal: s.id,
                    jawaban: token.to_string(),
                    synced: false,
                    timestamp: now,
                })?;
            }
        }
        Ok(())
    }

    fn cached_soal(
        &self,
        id_agenda: i64,
        id_mapel: i64,
    ) -> Result<Vec<SoalPublic>, ClientError> {
        let key = kv::soal_key(id_mapel);
        if let Some(v) = self.mem_get(&key) {
            if let Ok(soal) = serde_json::from_value(v) {
                return Ok(soal);
            }
        }
        if let Some(v) = self.kv.get(&key)? {
            if let Ok(soal) = serde_json::from_value(v) {
                return Ok(soal);
            }
        }
        self.db.questions_for(id_agenda, id_mapel)
    }

    /// The latest locally known per-subject answer string.
    pub fn latest_jawaban(&self, id_mapel: i64) -> Result<Option<String>, ClientError> {
        let key = kv::jawaban_key(id_mapel);
        if let Some(Value::String(s)) = self.mem_get(&key) {
            return Ok(Some(s));
        }
        match self.kv.get(&key)? {
            Some(Value::String(s)) => Ok(Some(s)),
            _ => Ok(None),
        }
    }

    /// Downloads one agenda's full package and stores it atomically. A
    /// failed download leaves any previously stored package untouched.
    pub async fn download_paket(
        &self,
        api: &dyn ExamApi,
        id_agenda: i64,
    ) -> Result<PaketUjian, ClientError> {
        let paket = api.download_paket(id_agenda).await?;

        self.db.save_paket(&paket)?;
        self.kv
            .put(kv::CACHED_AGENDA, &serde_json::to_value(&paket.agenda)?)?;
        self.kv.put(
            &kv::mapels_key(id_agenda),
            &serde_json::to_value(&paket.mapels)?,
        )?;

        // Warm the per-mapel tiers from the package.
        for mapel in &paket.mapels {
            let soal: Vec<&SoalPublic> =
                paket.soal.iter().filter(|s| s.id_mapel == mapel.id).collect();
            let v = serde_json::to_value(&soal)?;
            self.kv.put(&kv::soal_key(mapel.id), &v)?;
            self.mem_put(&kv::soal_key(mapel.id), v);
        }

        Ok(paket)
    }

    /// A previously downloaded package, if any (memory first, then the
    /// local db).
    pub fn cached_paket(&self, id_agenda: i64) -> Result<Option<PaketUjian>, ClientError> {
        let key = format!("paket_{}", id_agenda);
        if let Some(v) = self.mem_get(&key) {
            if let Ok(p) = serde_json::from_value(v) {
                return Ok(Some(p));
            }
        }
        let paket = self.db.load_paket(id_agenda)?;
        if let Some(p) = &paket {
            self.mem_put(&key, serde_json::to_value(p)?);
        }
        Ok(paket)
    }
}
