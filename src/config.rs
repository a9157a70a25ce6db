use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub sled_path: String,
    pub cors_origin: String,
    /// Shared Redis cache; unset runs with the in-process cache.
    pub redis_url: Option<String>,
    pub redis_timeout_ms: u64,
    /// Optional JSON catalog loaded into the store at startup.
    pub catalog_seed_path: Option<String>,
    pub worker: WorkerConfig,
    pub engine: EngineEnvConfig,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub is_leader: bool,
    pub enable_cache_sweep: bool,
    pub enable_signal_warmup: bool,
}

/// Engine overrides taken from the environment; everything else uses `EngineConfig::default()`.
#[derive(Debug, Clone, Default)]
pub struct EngineEnvConfig {
    pub op_timeout_ms: Option<u64>,
    pub rng_seed: Option<u64>,
    pub mastery_cache_ttl_secs: Option<u64>,
    pub drill_ttl_secs: Option<u64>,
}

impl Config {
    pub fn redis_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.redis_timeout_ms.max(1))
    }

    pub fn from_env() -> Self {
        Self {
            host: env_or_parse("HOST", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            port: env_or_parse("PORT", 3000_u16),
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            sled_path: env_or("SLED_PATH", "./data/practice.sled"),
            cors_origin: env_or("CORS_ORIGIN", "http://localhost:5173"),
            redis_url: env_opt("REDIS_URL"),
            redis_timeout_ms: env_or_parse("REDIS_TIMEOUT_MS", 500_u64),
            catalog_seed_path: env_opt("CATALOG_SEED_PATH"),
            worker: WorkerConfig {
                is_leader: env_or_bool("WORKER_LEADER", true),
                enable_cache_sweep: env_or_bool("ENABLE_CACHE_SWEEP_WORKER", true),
                enable_signal_warmup: env_or_bool("ENABLE_SIGNAL_WARMUP_WORKER", true),
            },
            engine: EngineEnvConfig {
                op_timeout_ms: env_opt_parse("ENGINE_OP_TIMEOUT_MS"),
                rng_seed: env_opt_parse("ENGINE_RNG_SEED"),
                mastery_cache_ttl_secs: env_opt_parse("MASTERY_CACHE_TTL_SECS"),
                drill_ttl_secs: env_opt_parse("DRILL_TTL_SECS"),
            },
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Unset and blank values are both treated as absent.
pub fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_opt_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = env_opt(key)?;
    match raw.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Failed to parse env var, ignoring");
            None
        }
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}
