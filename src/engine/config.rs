use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::EngineEnvConfig;
use crate::engine::scheduler::Strategy;

/// Engine-wide BKT defaults, used when a topic carries no calibration of its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BktConfig {
    pub p_init: f64,
    pub p_transit: f64,
    pub p_guess: f64,
    pub p_slip: f64,
    /// Mastery is kept inside `[epsilon, 1 - epsilon]`.
    pub epsilon: f64,
}

impl Default for BktConfig {
    fn default() -> Self {
        Self {
            p_init: 0.1,
            p_transit: 0.1,
            p_guess: 0.2,
            p_slip: 0.1,
            epsilon: 1e-4,
        }
    }
}

/// Percent weights of the randomly rolled tiers, in priority order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierWeights {
    pub high_freq_wrong: u32,
    pub weak_point: u32,
    pub spaced_repetition: u32,
    pub advancement: u32,
    pub exploration: u32,
}

impl Default for TierWeights {
    fn default() -> Self {
        Self {
            high_freq_wrong: 40,
            weak_point: 30,
            spaced_repetition: 15,
            advancement: 10,
            exploration: 5,
        }
    }
}

impl TierWeights {
    fn bands(&self) -> [(Strategy, u32); 5] {
        [
            (Strategy::HighFreqWrong, self.high_freq_wrong),
            (Strategy::WeakPoint, self.weak_point),
            (Strategy::SpacedRepetition, self.spaced_repetition),
            (Strategy::Advancement, self.advancement),
            (Strategy::Exploration, self.exploration),
        ]
    }

    pub fn total(&self) -> u32 {
        self.bands().iter().map(|(_, w)| w).sum()
    }

    /// Maps a roll in `0..100` onto its tier through the cumulative bands.
    pub fn tier_for_roll(&self, roll: u32) -> Strategy {
        let mut upper = 0;
        for (strategy, weight) in self.bands() {
            upper += weight;
            if roll < upper {
                return strategy;
            }
        }
        Strategy::Exploration
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyConfig {
    pub weights: TierWeights,
    pub high_freq_top_n: usize,
    pub weak_top_n: usize,
    /// Topics at or above this mastery feed the advancement tier.
    pub advancement_threshold: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            weights: TierWeights::default(),
            high_freq_top_n: 10,
            weak_top_n: 5,
            advancement_threshold: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrillConfig {
    pub ttl_secs: u64,
    pub exit_streak: u32,
}

impl Default for DrillConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 600,
            exit_streak: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpacedRepetitionConfig {
    pub ease_factor: f64,
    pub pass_quality: u8,
    pub correct_quality: u8,
    pub wrong_quality: u8,
}

impl Default for SpacedRepetitionConfig {
    fn default() -> Self {
        Self {
            ease_factor: 2.5,
            pass_quality: 3,
            correct_quality: 4,
            wrong_quality: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    pub mastery_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            mastery_ttl_secs: 7 * 24 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    pub op_timeout_ms: u64,
    /// Fixed seed for reproducible selection; entropy when absent.
    #[serde(default)]
    pub rng_seed: Option<u64>,
    pub lock_prune_threshold: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            op_timeout_ms: 2000,
            rng_seed: None,
            lock_prune_threshold: 1000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default)]
    pub bkt: BktConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub drill: DrillConfig,
    #[serde(default)]
    pub spaced_repetition: SpacedRepetitionConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl EngineConfig {
    pub fn from_env(env: &EngineEnvConfig) -> Self {
        let mut config = Self::default();
        if let Some(ms) = env.op_timeout_ms {
            config.runtime.op_timeout_ms = ms;
        }
        config.runtime.rng_seed = env.rng_seed;
        if let Some(secs) = env.mastery_cache_ttl_secs {
            config.cache.mastery_ttl_secs = secs;
        }
        if let Some(secs) = env.drill_ttl_secs {
            config.drill.ttl_secs = secs;
        }
        config
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.runtime.op_timeout_ms)
    }

    pub fn mastery_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.mastery_ttl_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        let bkt = &self.bkt;
        for (name, value) in [
            ("bkt.p_init", bkt.p_init),
            ("bkt.p_transit", bkt.p_transit),
            ("bkt.p_guess", bkt.p_guess),
            ("bkt.p_slip", bkt.p_slip),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{name} must be in [0,1]"));
            }
        }
        if !(bkt.epsilon > 0.0 && bkt.epsilon < 0.5) {
            return Err("bkt.epsilon must be in (0,0.5)".to_string());
        }

        let total = self.strategy.weights.total();
        if total != 100 {
            return Err(format!("strategy.weights must sum to 100, got {total}"));
        }
        if self.strategy.high_freq_top_n == 0 || self.strategy.weak_top_n == 0 {
            return Err("strategy top-N sizes must be > 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.strategy.advancement_threshold) {
            return Err("strategy.advancement_threshold must be in [0,1]".to_string());
        }

        if self.drill.ttl_secs == 0 {
            return Err("drill.ttl_secs must be > 0".to_string());
        }
        if self.drill.exit_streak == 0 {
            return Err("drill.exit_streak must be > 0".to_string());
        }

        let sr = &self.spaced_repetition;
        if !(sr.ease_factor.is_finite() && sr.ease_factor >= 1.0) {
            return Err("spaced_repetition.ease_factor must be >= 1".to_string());
        }
        if sr.pass_quality > 5 || sr.correct_quality > 5 || sr.wrong_quality > 5 {
            return Err("spaced_repetition qualities must be in 0..=5".to_string());
        }
        if sr.correct_quality < sr.pass_quality || sr.wrong_quality >= sr.pass_quality {
            return Err(
                "spaced_repetition.correct_quality must pass and wrong_quality must fail"
                    .to_string(),
            );
        }

        if self.cache.mastery_ttl_secs == 0 {
            return Err("cache.mastery_ttl_secs must be > 0".to_string());
        }
        if self.runtime.op_timeout_ms == 0 {
            return Err("runtime.op_timeout_ms must be > 0".to_string());
        }
        Ok(())
    }
}
