// src/state.rs

use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRef;
use sqlx::SqlitePool;

use crate::{agenda_cache::AgendaCache, aggregator::CombinedAnswerAggregator, config::Config};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    pub aggregator: Arc<CombinedAnswerAggregator>,
    pub agenda_cache: Arc<AgendaCache>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: Config) -> Self {
        let aggregator = Arc::new(CombinedAnswerAggregator::new(pool.clone()));
        let agenda_cache = Arc::new(AgendaCache::new(Duration::from_secs(
            config.agenda_cache_ttl_secs,
        )));
        Self {
            pool,
            config,
            aggregator,
            agenda_cache,
        }
    }
}

impl FromRef<AppState> for SqlitePool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
