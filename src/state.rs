use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;

use crate::cache::CacheBackend;
use crate::config::Config;
use crate::engine::PracticeEngine;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    store: Arc<Store>,
    cache: CacheBackend,
    engine: Arc<PracticeEngine>,
    config: Arc<Config>,
    shutdown_tx: broadcast::Sender<()>,
    started_at: Instant,
}

impl AppState {
    pub fn new(
        store: Arc<Store>,
        cache: CacheBackend,
        engine: Arc<PracticeEngine>,
        config: &Config,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        Self {
            store,
            cache,
            engine,
            config: Arc::new(config.clone()),
            shutdown_tx,
            started_at: Instant::now(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Backend handle for health checks; the engine sees it as `dyn FastCache`.
    pub fn cache(&self) -> &CacheBackend {
        &self.cache
    }

    pub fn engine(&self) -> &Arc<PracticeEngine> {
        &self.engine
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn shutdown_rx(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
