// src/client/api.rs

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::models::{
    jawaban::{GetSoalRequest, SaveJawabanRequest},
    mapel::Mapel,
    paket::PaketUjian,
    soal::SoalPublic,
};

use super::error::ClientError;

/// Failure is the common case on degraded school networks; fail fast and
/// fall back to cache rather than wait.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Response of the get-soal endpoint as the client sees it.
#[derive(Debug, Deserialize)]
pub struct GetSoalResponse {
    pub status: String,
    pub mulai_pada: Option<chrono::DateTime<chrono::Utc>>,
    pub jawaban: String,
    pub mapel: Mapel,
    pub soal: Vec<SoalPublic>,
}

#[derive(Debug, Deserialize)]
struct PaketResponse {
    paket: PaketUjian,
}

/// The backend as the client sees it. A trait seam so the cache and sync
/// engine can be driven against a scripted backend in tests.
#[async_trait]
pub trait ExamApi: Send + Sync {
    async fn get_soal(&self, req: &GetSoalRequest) -> Result<GetSoalResponse, ClientError>;
    async fn save_jawaban(&self, req: &SaveJawabanRequest) -> Result<(), ClientError>;
    async fn finish_ujian(&self, req: &SaveJawabanRequest) -> Result<(), ClientError>;
    async fn download_paket(&self, id_agenda: i64) -> Result<PaketUjian, ClientError>;
}

/// HTTP implementation against the ujian backend.
pub struct HttpExamApi {
    base: String,
    http: reqwest::Client,
}

impl HttpExamApi {
    pub fn new(base: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            base: base.into(),
            http,
        })
    }

    async fn check(&self, resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| v["message"].as_str().map(String::from))
            .unwrap_or_else(|| status.to_string());
        if status.is_client_error() {
            Err(ClientError::Rejected(message))
        } else {
            Err(ClientError::Network(message))
        }
    }
}

#[async_trait]
impl ExamApi for HttpExamApi {
    async fn get_soal(&self, req: &GetSoalRequest) -> Result<GetSoalResponse, ClientError> {
        let resp = self
            .http
            .post(format!("{}/api/ujian/get-soal", self.base))
            .json(req)
            .send()
            .await?;
        Ok(self.check(resp).await?.json().await?)
    }

    async fn save_jawaban(&self, req: &SaveJawabanRequest) -> Result<(), ClientError> {
        let resp = self
            .http
            .post(format!("{}/api/ujian/save-answer", self.base))
            .json(req)
            .send()
            .await?;
        self.check(resp).await?;
        Ok(())
    }

    async fn finish_ujian(&self, req: &SaveJawabanRequest) -> Result<(), ClientError> {
        let resp = self
            .http
            .post(format!("{}/api/ujian/finish-exam", self.base))
            .json(req)
            .send()
            .await?;
        self.check(resp).await?;
        Ok(())
    }

    async fn download_paket(&self, id_agenda: i64) -> Result<PaketUjian, ClientError> {
        let resp = self
            .http
            .get(format!("{}/api/agenda/{}/paket", self.base, id_agenda))
            .send()
            .await?;
        let body: PaketResponse = self.check(resp).await?.json().await?;
        Ok(body.paket)
    }
}
