use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde_json::Value;
use sqlx::PgPool;

use crate::{config::AppConfig, db::build_pool};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db_pool: Option<PgPool>,
    pub metrics_cache: Cache<String, Value>,
    metrics_generation: Arc<AtomicU64>,
}

impl AppState {
    pub fn build(config: AppConfig) -> Result<Self, sqlx::Error> {
        let db_pool = build_pool(&config)?;
        let metrics_cache = Cache::builder()
            .max_capacity(config.metrics_cache_max_entries.max(1))
            .time_to_live(Duration::from_secs(config.metrics_cache_ttl_seconds.max(1)))
            .build();

        Ok(Self {
            config: Arc::new(config),
            db_pool,
            metrics_cache,
            metrics_generation: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Part of every metrics cache key. A payload computed from a snapshot
    /// read before a write lands under the old generation and is never served.
    pub fn metrics_generation(&self) -> u64 {
        self.metrics_generation.load(Ordering::Acquire)
    }

    /// Call after any write to the tables the metrics read from.
    pub fn invalidate_metrics(&self) {
        self.metrics_generation.fetch_add(1, Ordering::AcqRel);
        self.metrics_cache.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::AppState;
    use crate::config::AppConfig;

    #[tokio::test]
    async fn invalidation_advances_the_generation() {
        let state = AppState::build(AppConfig::default()).expect("state");
        let before = state.metrics_generation();
        state.clone().invalidate_metrics();
        assert_eq!(state.metrics_generation(), before + 1);
    }
}
