// src/client/error.rs

use std::fmt;

/// Client-side error enum, mirroring the server's taxonomy: storage
/// failures stay local to one operation, network failures are retried by
/// the sync engine, rejections (4xx) are never retried automatically.
#[derive(Debug)]
pub enum ClientError {
    /// Local storage failure (one operation, not the whole cache).
    Storage(String),

    /// Transport failure or timeout; transient by assumption.
    Network(String),

    /// A stored record failed to parse; siblings are unaffected.
    Corrupt(String),

    /// The backend rejected the request (validation, conflict).
    Rejected(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Storage(msg) => write!(f, "storage error: {}", msg),
            ClientError::Network(msg) => write!(f, "network error: {}", msg),
            ClientError::Corrupt(msg) => write!(f, "corrupt record: {}", msg),
            ClientError::Rejected(msg) => write!(f, "rejected by server: {}", msg),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<rusqlite::Error> for ClientError {
    fn from(err: rusqlite::Error) -> Self {
        ClientError::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Corrupt(err.to_string())
    }
}
