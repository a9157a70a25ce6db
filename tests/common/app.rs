use std::sync::Arc;

use axum::Router;
use tempfile::TempDir;
use tokio::sync::broadcast;

use adaptive_practice::cache::{CacheBackend, MemoryCache};
use adaptive_practice::config::{Config, EngineEnvConfig, WorkerConfig};
use adaptive_practice::engine::{EngineConfig, PracticeEngine};
use adaptive_practice::routes::build_router;
use adaptive_practice::seed;
use adaptive_practice::state::AppState;
use adaptive_practice::store::Store;

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub cache: Arc<MemoryCache>,
    _temp_dir: TempDir,
}

/// Two topics with three items each.
pub const CATALOG: &str = r#"{
    "topics": [
        {"id": "fractions", "name": "Fractions"},
        {"id": "decimals", "name": "Decimals", "parameters": {"pInit": 0.3}}
    ],
    "items": [
        {"id": "f1", "topicId": "fractions", "content": "1/2 + 1/4"},
        {"id": "f2", "topicId": "fractions", "content": "3/4 - 1/8"},
        {"id": "f3", "topicId": "fractions", "content": "2/3 of 9"},
        {"id": "d1", "topicId": "decimals", "content": "0.1 + 0.2"},
        {"id": "d2", "topicId": "decimals", "content": "1.5 x 4"},
        {"id": "d3", "topicId": "decimals", "content": "7.2 / 0.9"}
    ]
}"#;

fn test_config(sled_path: String) -> Config {
    // Built directly rather than through env vars, which race across test threads.
    Config {
        host: std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
        port: 3000,
        log_level: "info".to_string(),
        enable_file_logs: false,
        log_dir: "./logs".to_string(),
        sled_path,
        cors_origin: "http://localhost:5173".to_string(),
        redis_url: None,
        redis_timeout_ms: 500,
        catalog_seed_path: None,
        worker: WorkerConfig {
            is_leader: false,
            enable_cache_sweep: false,
            enable_signal_warmup: false,
        },
        engine: EngineEnvConfig {
            rng_seed: Some(99),
            ..Default::default()
        },
    }
}

pub async fn spawn_app_with_catalog(catalog: Option<&str>) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let sled_path = temp_dir.path().join("practice-test.sled");
    let config = test_config(sled_path.to_string_lossy().to_string());

    let store = Arc::new(Store::open(&config.sled_path).expect("open store"));
    store.run_migrations().expect("run migrations");
    if let Some(raw) = catalog {
        seed::load_catalog_json(&store, raw).expect("seed catalog");
    }

    let cache = Arc::new(MemoryCache::new());
    let engine = Arc::new(
        PracticeEngine::new(
            store.clone(),
            cache.clone(),
            EngineConfig::from_env(&config.engine),
        )
        .expect("engine"),
    );
    let (shutdown_tx, _) = broadcast::channel::<()>(8);
    let backend = CacheBackend::Memory(cache.clone());
    let state = AppState::new(store, backend, engine, &config, shutdown_tx);

    TestApp {
        app: build_router(state.clone()),
        state,
        cache,
        _temp_dir: temp_dir,
    }
}

pub async fn spawn_test_app() -> TestApp {
    spawn_app_with_catalog(Some(CATALOG)).await
}
