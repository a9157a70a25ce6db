//! Knowledge state tracking: resolves a learner's current mastery of a topic
//! and applies the BKT update through the cache and durable store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::{keys, FastCache};
use crate::engine::bkt::{self, BktParams};
use crate::engine::repository::{MasteryStore, TopicCatalog};
use crate::engine::{EngineConfig, EngineError};
use crate::store::operations::catalog::Topic;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MasterySource {
    Cache,
    Durable,
    TopicPrior,
    DefaultPrior,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryUpdate {
    pub topic_id: String,
    pub previous: f64,
    pub probability: f64,
    pub source: MasterySource,
    pub version: u64,
}

/// A BKT step that has been computed but not yet written.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMastery {
    pub topic_id: String,
    pub previous: f64,
    pub probability: f64,
    pub source: MasterySource,
}

impl PendingMastery {
    pub fn committed(self, version: u64) -> MasteryUpdate {
        tracing::debug!(
            topic_id = %self.topic_id,
            previous = self.previous,
            probability = self.probability,
            source = ?self.source,
            version,
            "Mastery updated"
        );
        MasteryUpdate {
            topic_id: self.topic_id,
            previous: self.previous,
            probability: self.probability,
            source: self.source,
            version,
        }
    }
}

pub struct KnowledgeStateTracker {
    mastery: Arc<dyn MasteryStore>,
    topics: Arc<dyn TopicCatalog>,
    cache: Arc<dyn FastCache>,
    config: Arc<EngineConfig>,
}

fn finite_probability(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

impl KnowledgeStateTracker {
    pub fn new(
        mastery: Arc<dyn MasteryStore>,
        topics: Arc<dyn TopicCatalog>,
        cache: Arc<dyn FastCache>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            mastery,
            topics,
            cache,
            config,
        }
    }

    fn cached_mastery(&self, learner_id: &str, topic_id: &str) -> Option<f64> {
        match self.cache.hash_get(&keys::mastery_key(learner_id), topic_id) {
            Ok(Some(raw)) => raw.parse::<f64>().ok().and_then(finite_probability),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(learner_id, topic_id, error = %e, "Mastery cache read failed, using durable store");
                None
            }
        }
    }

    /// Current mastery, first hit wins: cache, durable record, topic prior, engine default.
    pub fn current_mastery(
        &self,
        learner_id: &str,
        topic_id: &str,
        params: &BktParams,
        topic_has_prior: bool,
    ) -> Result<(f64, MasterySource), EngineError> {
        if let Some(p) = self.cached_mastery(learner_id, topic_id) {
            return Ok((p, MasterySource::Cache));
        }
        if let Some(p) = self
            .mastery
            .load(learner_id, topic_id)?
            .map(|record| record.probability)
            .and_then(finite_probability)
        {
            return Ok((p, MasterySource::Durable));
        }
        if topic_has_prior {
            Ok((params.p_init, MasterySource::TopicPrior))
        } else {
            Ok((params.p_init, MasterySource::DefaultPrior))
        }
    }

    /// Resolves the current mastery, runs the BKT step and drops the cached
    /// value. Nothing durable is written; the caller commits `probability`.
    pub fn prepare(
        &self,
        learner_id: &str,
        topic: &Topic,
        correct: bool,
    ) -> Result<PendingMastery, EngineError> {
        let params = BktParams::resolve(Some(&topic.parameters), &self.config.bkt);
        let has_prior = topic
            .parameters
            .p_init
            .is_some_and(|p| p.is_finite());
        let (previous, source) = self.current_mastery(learner_id, &topic.id, &params, has_prior)?;
        let probability = bkt::update(previous, correct, &params, self.config.bkt.epsilon);

        if let Err(e) = self.cache.hash_delete(&keys::mastery_key(learner_id), &topic.id) {
            tracing::warn!(learner_id, topic_id = %topic.id, error = %e, "Mastery cache invalidation failed");
        }

        Ok(PendingMastery {
            topic_id: topic.id.clone(),
            previous,
            probability,
            source,
        })
    }

    /// Refills the cache once the durable write has landed.
    pub fn refresh_cache(&self, learner_id: &str, topic_id: &str, probability: f64) {
        let cache_key = keys::mastery_key(learner_id);
        let refill = self
            .cache
            .hash_set(&cache_key, topic_id, &probability.to_string())
            .and_then(|_| self.cache.expire(&cache_key, self.config.mastery_ttl()));
        if let Err(e) = refill {
            tracing::warn!(learner_id, topic_id, error = %e, "Mastery cache write skipped");
        }
    }

    /// Applies one observation for a resolved topic.
    ///
    /// The cached value is dropped before the durable write and refilled after
    /// it, so the cache is never ahead of the store.
    pub fn apply(
        &self,
        learner_id: &str,
        topic: &Topic,
        correct: bool,
        now: DateTime<Utc>,
    ) -> Result<MasteryUpdate, EngineError> {
        let pending = self.prepare(learner_id, topic, correct)?;

        let record = match self.mastery.save(learner_id, &topic.id, pending.probability, now) {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(learner_id, topic_id = %topic.id, error = %e, "Durable mastery write failed");
                return Err(e.into());
            }
        };
        self.refresh_cache(learner_id, &topic.id, pending.probability);

        Ok(pending.committed(record.version))
    }

    /// Resolves the topic first. An unknown topic is logged and leaves all state untouched.
    pub fn update_state(
        &self,
        learner_id: &str,
        topic_id: &str,
        correct: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<MasteryUpdate>, EngineError> {
        let Some(topic) = self.topics.topic(topic_id)? else {
            tracing::warn!(learner_id, topic_id, "Unknown topic, mastery update skipped");
            return Ok(None);
        };
        self.apply(learner_id, &topic, correct, now).map(Some)
    }
}
