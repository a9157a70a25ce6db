//! Per-learner ranking signals and the drill flag, kept in the fast cache.
//!
//! Rankings: wrong-answer counts and weakness (`1 - mastery`) per topic, due
//! time per item. The drill flag is a JSON value whose cache TTL matches its
//! expiry.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{self, keys, CacheError, FastCache};
use crate::engine::config::DrillConfig;
use crate::store::operations::mastery::MasteryRecord;
use crate::store::operations::review_history::ReviewHistory;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrillMode {
    pub topic_id: String,
    /// Epoch seconds.
    pub expires_at: i64,
    /// Consecutive correct answers on `topic_id` since the flag was (re)set.
    pub correct_streak: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrillTransition {
    Set(DrillMode),
    Clear,
    Unchanged,
}

impl DrillMode {
    pub fn is_active(&self, now: i64) -> bool {
        self.expires_at > now
    }

    /// Drill state after an answer on `topic_id`. Any wrong answer (re)targets
    /// the drill at its topic; correct answers on the drilled topic build the
    /// exit streak.
    pub fn after_answer(
        current: Option<&DrillMode>,
        topic_id: &str,
        correct: bool,
        now: i64,
        config: &DrillConfig,
    ) -> DrillTransition {
        let current = current.filter(|drill| drill.is_active(now));
        if !correct {
            return DrillTransition::Set(DrillMode {
                topic_id: topic_id.to_string(),
                expires_at: now.saturating_add(config.ttl_secs as i64),
                correct_streak: 0,
            });
        }
        match current {
            Some(drill) if drill.topic_id == topic_id => {
                let streak = drill.correct_streak.saturating_add(1);
                if streak >= config.exit_streak {
                    DrillTransition::Clear
                } else {
                    DrillTransition::Set(DrillMode {
                        correct_streak: streak,
                        ..drill.clone()
                    })
                }
            }
            _ => DrillTransition::Unchanged,
        }
    }
}

pub fn read_drill(
    cache: &dyn FastCache,
    learner_id: &str,
    now: i64,
) -> Result<Option<DrillMode>, CacheError> {
    let drill: Option<DrillMode> = cache::get_json(cache, &keys::drill_mode_key(learner_id))?;
    Ok(drill.filter(|d| d.is_active(now)))
}

pub fn apply_drill(
    cache: &dyn FastCache,
    learner_id: &str,
    transition: &DrillTransition,
    now: i64,
) -> Result<(), CacheError> {
    let key = keys::drill_mode_key(learner_id);
    match transition {
        DrillTransition::Set(drill) => {
            let remaining = (drill.expires_at - now).max(1) as u64;
            cache::set_json(cache, &key, drill, Some(Duration::from_secs(remaining)))
        }
        DrillTransition::Clear => cache.delete(&key),
        DrillTransition::Unchanged => Ok(()),
    }
}

pub fn record_wrong_answer(
    cache: &dyn FastCache,
    learner_id: &str,
    topic_id: &str,
) -> Result<f64, CacheError> {
    cache.sorted_set_increment(&keys::wrong_freq_key(learner_id), topic_id, 1.0)
}

pub fn set_weakness(
    cache: &dyn FastCache,
    learner_id: &str,
    topic_id: &str,
    mastery: f64,
) -> Result<(), CacheError> {
    cache.sorted_set_add(&keys::weak_topics_key(learner_id), topic_id, 1.0 - mastery)
}

pub fn set_review_due(
    cache: &dyn FastCache,
    learner_id: &str,
    item_id: &str,
    due_at: i64,
) -> Result<(), CacheError> {
    cache.sorted_set_add(&keys::review_due_key(learner_id), item_id, due_at as f64)
}

pub fn top_wrong_topics(
    cache: &dyn FastCache,
    learner_id: &str,
    n: usize,
) -> Result<Vec<String>, CacheError> {
    top_n(cache, &keys::wrong_freq_key(learner_id), n)
}

pub fn top_weak_topics(
    cache: &dyn FastCache,
    learner_id: &str,
    n: usize,
) -> Result<Vec<String>, CacheError> {
    top_n(cache, &keys::weak_topics_key(learner_id), n)
}

/// Topics whose mastery is at least `threshold`.
pub fn advanced_topics(
    cache: &dyn FastCache,
    learner_id: &str,
    threshold: f64,
) -> Result<Vec<String>, CacheError> {
    cache.sorted_set_range_by_score(
        &keys::weak_topics_key(learner_id),
        f64::NEG_INFINITY,
        1.0 - threshold,
    )
}

pub fn due_items(
    cache: &dyn FastCache,
    learner_id: &str,
    now: i64,
) -> Result<Vec<String>, CacheError> {
    cache.sorted_set_range_by_score(
        &keys::review_due_key(learner_id),
        f64::NEG_INFINITY,
        now as f64,
    )
}

fn top_n(cache: &dyn FastCache, key: &str, n: usize) -> Result<Vec<String>, CacheError> {
    if n == 0 {
        return Ok(Vec::new());
    }
    cache.sorted_set_range_desc(key, 0, n - 1)
}

/// Durable inputs for rebuilding one learner's rankings.
#[derive(Debug, Default)]
pub struct SignalSnapshot {
    pub mastery: Vec<MasteryRecord>,
    pub mistake_counts: HashMap<String, u32>,
    pub reviews: Vec<ReviewHistory>,
}

/// Replaces the learner's three rankings with the snapshot's view. The drill
/// flag and cached mastery are left alone.
pub fn rebuild(
    cache: &dyn FastCache,
    learner_id: &str,
    snapshot: &SignalSnapshot,
) -> Result<(), CacheError> {
    let wrong_key = keys::wrong_freq_key(learner_id);
    let weak_key = keys::weak_topics_key(learner_id);
    let due_key = keys::review_due_key(learner_id);
    for key in [&wrong_key, &weak_key, &due_key] {
        cache.delete(key)?;
    }

    for (topic_id, count) in &snapshot.mistake_counts {
        cache.sorted_set_add(&wrong_key, topic_id, f64::from(*count))?;
    }
    for record in &snapshot.mastery {
        cache.sorted_set_add(&weak_key, &record.topic_id, 1.0 - record.probability)?;
    }
    for review in &snapshot.reviews {
        cache.sorted_set_add(&due_key, &review.item_id, review.due_at as f64)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::cache::MemoryCache;

    fn drill_config() -> DrillConfig {
        DrillConfig {
            ttl_secs: 600,
            exit_streak: 2,
        }
    }

    #[test]
    fn wrong_answer_sets_and_retargets_drill() {
        let cfg = drill_config();
        let set = DrillMode::after_answer(None, "fractions", false, 1000, &cfg);
        let DrillTransition::Set(drill) = set else {
            panic!("expected drill to be set");
        };
        assert_eq!(drill.expires_at, 1600);

        let retarget = DrillMode::after_answer(Some(&drill), "decimals", false, 1100, &cfg);
        assert!(matches!(retarget, DrillTransition::Set(ref d) if d.topic_id == "decimals"));
    }

    #[test]
    fn exit_streak_clears_drill() {
        let cfg = drill_config();
        let drill = DrillMode {
            topic_id: "fractions".into(),
            expires_at: 2000,
            correct_streak: 0,
        };
        let first = DrillMode::after_answer(Some(&drill), "fractions", true, 1000, &cfg);
        let DrillTransition::Set(after_one) = first else {
            panic!("one correct answer should keep the drill");
        };
        assert_eq!(after_one.correct_streak, 1);
        assert_eq!(
            DrillMode::after_answer(Some(&after_one), "fractions", true, 1001, &cfg),
            DrillTransition::Clear
        );
        assert_eq!(
            DrillMode::after_answer(Some(&drill), "other", true, 1000, &cfg),
            DrillTransition::Unchanged
        );
    }

    #[test]
    fn drill_flag_round_trips_through_cache_until_expiry() {
        let cache = MemoryCache::new();
        let drill = DrillMode {
            topic_id: "t1".into(),
            expires_at: 1600,
            correct_streak: 0,
        };
        apply_drill(&cache, "l1", &DrillTransition::Set(drill.clone()), 1000).unwrap();
        assert_eq!(read_drill(&cache, "l1", 1000).unwrap(), Some(drill));
        assert_eq!(read_drill(&cache, "l1", 1600).unwrap(), None);

        apply_drill(&cache, "l1", &DrillTransition::Clear, 1000).unwrap();
        assert_eq!(read_drill(&cache, "l1", 1000).unwrap(), None);
    }

    #[test]
    fn rankings_feed_tier_queries() {
        let cache = MemoryCache::new();
        record_wrong_answer(&cache, "l1", "a").unwrap();
        record_wrong_answer(&cache, "l1", "b").unwrap();
        record_wrong_answer(&cache, "l1", "b").unwrap();
        assert_eq!(top_wrong_topics(&cache, "l1", 1).unwrap(), vec!["b"]);

        set_weakness(&cache, "l1", "strong", 0.9).unwrap();
        set_weakness(&cache, "l1", "weak", 0.2).unwrap();
        assert_eq!(top_weak_topics(&cache, "l1", 1).unwrap(), vec!["weak"]);
        assert_eq!(advanced_topics(&cache, "l1", 0.8).unwrap(), vec!["strong"]);

        set_review_due(&cache, "l1", "i1", 100).unwrap();
        set_review_due(&cache, "l1", "i2", 500).unwrap();
        assert_eq!(due_items(&cache, "l1", 200).unwrap(), vec!["i1"]);
    }

    #[test]
    fn rebuild_replaces_stale_rankings() {
        let cache = MemoryCache::new();
        record_wrong_answer(&cache, "l1", "stale").unwrap();

        let now = Utc::now();
        let snapshot = SignalSnapshot {
            mastery: vec![MasteryRecord {
                learner_id: "l1".into(),
                topic_id: "t1".into(),
                probability: 0.25,
                version: 3,
                created_at: now,
                updated_at: now,
            }],
            mistake_counts: HashMap::from([("t1".to_string(), 4)]),
            reviews: Vec::new(),
        };
        rebuild(&cache, "l1", &snapshot).unwrap();

        assert_eq!(top_wrong_topics(&cache, "l1", 10).unwrap(), vec!["t1"]);
        assert_eq!(top_weak_topics(&cache, "l1", 10).unwrap(), vec!["t1"]);
        assert!(due_items(&cache, "l1", i64::MAX).unwrap().is_empty());
    }
}
