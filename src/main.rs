use std::error::Error;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use adaptive_practice::cache::CacheBackend;
use adaptive_practice::config::Config;
use adaptive_practice::engine::{EngineConfig, PracticeEngine};
use adaptive_practice::logging::{init_tracing, LogConfig};
use adaptive_practice::routes::build_router;
use adaptive_practice::seed;
use adaptive_practice::state::AppState;
use adaptive_practice::store::Store;
use adaptive_practice::workers::WorkerManager;
use axum::http::header;
use tokio::sync::broadcast;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

type BoxError = Box<dyn Error + Send + Sync>;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = Config::from_env();
    init_tracing(&LogConfig::from(&config));
    tracing::info!("Starting adaptive-practice");

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Fatal startup error");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), BoxError> {
    let store = Arc::new(Store::open(&config.sled_path)?);
    store.run_migrations()?;

    if let Some(path) = &config.catalog_seed_path {
        seed::load_catalog_file(&store, Path::new(path))?;
    }

    let cache = CacheBackend::connect(config.redis_url.as_deref(), config.redis_timeout()).await?;
    let engine_config = EngineConfig::from_env(&config.engine);
    let engine = Arc::new(PracticeEngine::new(store.clone(), cache.shared(), engine_config)?);

    let (shutdown_tx, _) = broadcast::channel::<()>(8);

    let state = AppState::new(
        store.clone(),
        cache.clone(),
        engine.clone(),
        &config,
        shutdown_tx.clone(),
    );

    // Rebuild rankings from durable state; the cache may be empty or stale.
    {
        let engine = engine.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.warm_all_signals().await {
                tracing::warn!(error = %e, "Startup signal warm-up failed");
            }
        });
    }

    if config.worker.is_leader {
        let worker_manager = WorkerManager::new(
            cache.memory(),
            engine.clone(),
            shutdown_tx.subscribe(),
            &config.worker,
        );
        let handle = tokio::spawn(async move {
            if let Err(e) = worker_manager.start().await {
                tracing::error!(error = %e, "Worker manager failed");
            }
        });
        // Worker panics are logged; the HTTP server keeps running.
        tokio::spawn(async move {
            match handle.await {
                Err(e) => {
                    tracing::error!(error = %e, "Worker task panicked, HTTP server continues")
                }
                Ok(()) => tracing::info!("Worker manager exited normally"),
            }
        });
    }

    let app = build_router(state)
        .layer(build_cors_layer(&config)?)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new());

    let addr = SocketAddr::new(config.host, config.port);
    tracing::info!(%addr, "Listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx.clone()))
        .await;
    if let Err(e) = served {
        tracing::error!(error = %e, "HTTP server crashed");
    }

    tracing::info!("Flushing store before exit");
    if let Err(e) = store.flush() {
        tracing::error!(error = %e, "Failed to flush store before exit");
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

fn build_cors_layer(config: &Config) -> Result<CorsLayer, BoxError> {
    if config.cors_origin.trim() == "*" {
        // Wildcard is for development only and excludes credentials.
        return Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_credentials(false)
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
            .allow_methods(Any));
    }

    let origin = config
        .cors_origin
        .parse::<axum::http::HeaderValue>()
        .map_err(|e| format!("invalid CORS_ORIGIN '{}': {e}", config.cors_origin))?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_methods(Any))
}

async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable, waiting for Ctrl-C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
