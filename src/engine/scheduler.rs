//! Next-item selection across competing practice strategies.
//!
//! An active drill flag wins outright. Otherwise one roll in `0..100` picks a
//! tier through the configured cumulative bands; a tier with no candidates
//! falls straight through to exploration.

use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use serde::Serialize;

use crate::cache::{CacheError, FastCache};
use crate::engine::repository::ItemRepository;
use crate::engine::signals;
use crate::engine::{EngineConfig, EngineError};
use crate::store::operations::catalog::Item;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strategy {
    CorrectionDrill,
    HighFreqWrong,
    WeakPoint,
    SpacedRepetition,
    Advancement,
    Exploration,
}

impl Strategy {
    pub fn code(&self) -> &'static str {
        match self {
            Strategy::CorrectionDrill => "CORRECTION_DRILL",
            Strategy::HighFreqWrong => "HIGH_FREQ_WRONG",
            Strategy::WeakPoint => "WEAK_POINT",
            Strategy::SpacedRepetition => "SPACED_REPETITION",
            Strategy::Advancement => "ADVANCEMENT",
            Strategy::Exploration => "EXPLORATION",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Strategy::CorrectionDrill => "Correction drill",
            Strategy::HighFreqWrong => "Frequent mistakes",
            Strategy::WeakPoint => "Weak topics",
            Strategy::SpacedRepetition => "Due for review",
            Strategy::Advancement => "Advancement",
            Strategy::Exploration => "Exploration",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PracticeSelection {
    pub item: Item,
    pub strategy: Strategy,
}

pub struct PracticeScheduler {
    items: Arc<dyn ItemRepository>,
    cache: Arc<dyn FastCache>,
    config: Arc<EngineConfig>,
}

impl PracticeScheduler {
    pub fn new(
        items: Arc<dyn ItemRepository>,
        cache: Arc<dyn FastCache>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            items,
            cache,
            config,
        }
    }

    /// `Ok(None)` only when the catalog has nothing to offer at all.
    pub fn select_next(
        &self,
        learner_id: &str,
        now: i64,
        rng: &mut dyn RngCore,
    ) -> Result<Option<PracticeSelection>, EngineError> {
        let drill = self.signal(learner_id, "drill", |cache| {
            signals::read_drill(cache, learner_id, now)
        });
        if let Some(drill) = drill.flatten() {
            if let Some(item) = self.item_from_topics(&[drill.topic_id.clone()], rng)? {
                return Ok(Some(self.selected(learner_id, item, Strategy::CorrectionDrill)));
            }
            tracing::warn!(learner_id, topic_id = %drill.topic_id, "Drill topic has no items");
        }

        let roll = rng.gen_range(0..100);
        let tier = self.config.strategy.weights.tier_for_roll(roll);
        let candidate = match tier {
            Strategy::HighFreqWrong => {
                let n = self.config.strategy.high_freq_top_n;
                let topics = self.signal(learner_id, "wrong_freq", |cache| {
                    signals::top_wrong_topics(cache, learner_id, n)
                });
                self.item_from_topics(&topics.unwrap_or_default(), rng)?
            }
            Strategy::WeakPoint => {
                let n = self.config.strategy.weak_top_n;
                let topics = self.signal(learner_id, "weak_topics", |cache| {
                    signals::top_weak_topics(cache, learner_id, n)
                });
                self.item_from_topics(&topics.unwrap_or_default(), rng)?
            }
            Strategy::SpacedRepetition => {
                let due = self.signal(learner_id, "review_due", |cache| {
                    signals::due_items(cache, learner_id, now)
                });
                self.item_from_ids(due.unwrap_or_default(), rng)?
            }
            Strategy::Advancement => {
                let threshold = self.config.strategy.advancement_threshold;
                let topics = self.signal(learner_id, "advancement", |cache| {
                    signals::advanced_topics(cache, learner_id, threshold)
                });
                self.item_from_topics(&topics.unwrap_or_default(), rng)?
            }
            Strategy::Exploration | Strategy::CorrectionDrill => None,
        };

        if let Some(item) = candidate {
            return Ok(Some(self.selected(learner_id, item, tier)));
        }
        if tier != Strategy::Exploration {
            tracing::debug!(learner_id, roll, tier = tier.code(), "Tier empty, exploring");
        }

        match self.items.random_item(rng)? {
            Some(item) => Ok(Some(self.selected(learner_id, item, Strategy::Exploration))),
            None => {
                tracing::warn!(learner_id, "Catalog is empty, no item available");
                Ok(None)
            }
        }
    }

    /// Signal reads never fail selection; an unreadable signal counts as empty.
    fn signal<T>(
        &self,
        learner_id: &str,
        signal: &'static str,
        read: impl FnOnce(&dyn FastCache) -> Result<T, CacheError>,
    ) -> Option<T> {
        match read(self.cache.as_ref()) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(learner_id, signal, error = %e, "Signal read failed, treating as empty");
                None
            }
        }
    }

    /// A uniformly chosen topic that has items, then a uniform item within it.
    fn item_from_topics(
        &self,
        topic_ids: &[String],
        rng: &mut dyn RngCore,
    ) -> Result<Option<Item>, EngineError> {
        let mut order: Vec<&String> = topic_ids.iter().collect();
        order.shuffle(rng);
        for topic_id in order {
            let items = self.items.items_by_topic(topic_id)?;
            if let Some(item) = items.choose(rng) {
                return Ok(Some(item.clone()));
            }
        }
        Ok(None)
    }

    /// A uniformly chosen id that still resolves to an item.
    fn item_from_ids(
        &self,
        mut item_ids: Vec<String>,
        rng: &mut dyn RngCore,
    ) -> Result<Option<Item>, EngineError> {
        item_ids.shuffle(rng);
        for item_id in item_ids {
            if let Some(item) = self.items.item_by_id(&item_id)? {
                return Ok(Some(item));
            }
        }
        Ok(None)
    }

    fn selected(&self, learner_id: &str, item: Item, strategy: Strategy) -> PracticeSelection {
        tracing::debug!(learner_id, item_id = %item.id, strategy = strategy.code(), "Item selected");
        PracticeSelection { item, strategy }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::cache::MemoryCache;
    use crate::engine::signals::{DrillMode, DrillTransition};
    use crate::engine::tracker::tests::FailingCache;
    use crate::store::StoreError;

    const NOW: i64 = 1_700_000_000;

    /// In-memory catalog: `topics` topics with `per_topic` items each.
    struct MemoryItems {
        by_topic: HashMap<String, Vec<Item>>,
        all: Vec<Item>,
    }

    impl MemoryItems {
        fn new(topics: &[&str], per_topic: usize) -> Self {
            let mut by_topic = HashMap::new();
            let mut all = Vec::new();
            for topic in topics {
                let items: Vec<Item> = (0..per_topic)
                    .map(|i| Item {
                        id: format!("{topic}-{i}"),
                        topic_id: topic.to_string(),
                        content: format!("question {i} on {topic}"),
                        difficulty: 0.5,
                        kind: None,
                        created_at: Utc::now(),
                    })
                    .collect();
                all.extend(items.iter().cloned());
                by_topic.insert(topic.to_string(), items);
            }
            Self { by_topic, all }
        }
    }

    impl ItemRepository for MemoryItems {
        fn items_by_topic(&self, topic_id: &str) -> Result<Vec<Item>, StoreError> {
            Ok(self.by_topic.get(topic_id).cloned().unwrap_or_default())
        }

        fn random_item(&self, rng: &mut dyn RngCore) -> Result<Option<Item>, StoreError> {
            Ok(self.all.choose(rng).cloned())
        }

        fn item_by_id(&self, item_id: &str) -> Result<Option<Item>, StoreError> {
            Ok(self.all.iter().find(|i| i.id == item_id).cloned())
        }
    }

    fn scheduler(items: MemoryItems, cache: Arc<dyn FastCache>) -> PracticeScheduler {
        PracticeScheduler::new(Arc::new(items), cache, Arc::new(EngineConfig::default()))
    }

    /// Every ranked signal populated for learner `l1`.
    fn populated_cache() -> Arc<MemoryCache> {
        let cache = Arc::new(MemoryCache::new());
        signals::record_wrong_answer(cache.as_ref(), "l1", "wrong").unwrap();
        signals::set_weakness(cache.as_ref(), "l1", "weak", 0.2).unwrap();
        signals::set_weakness(cache.as_ref(), "l1", "strong", 0.9).unwrap();
        signals::set_review_due(cache.as_ref(), "l1", "due-0", NOW - 60).unwrap();
        cache
    }

    fn counts(scheduler: &PracticeScheduler, calls: usize, seed: u64) -> HashMap<Strategy, usize> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut counts = HashMap::new();
        for _ in 0..calls {
            let selection = scheduler.select_next("l1", NOW, &mut rng).unwrap().unwrap();
            *counts.entry(selection.strategy).or_default() += 1;
        }
        counts
    }

    #[test]
    fn drill_overrides_every_tier() {
        let cache = populated_cache();
        let drill = DrillMode {
            topic_id: "drill".into(),
            expires_at: NOW + 600,
            correct_streak: 0,
        };
        signals::apply_drill(cache.as_ref(), "l1", &DrillTransition::Set(drill), NOW).unwrap();
        let scheduler = scheduler(
            MemoryItems::new(&["drill", "wrong", "weak", "strong", "due"], 3),
            cache,
        );

        for seed in [1, 7, 42] {
            let mut rng = StdRng::seed_from_u64(seed);
            for _ in 0..1000 {
                let selection = scheduler.select_next("l1", NOW, &mut rng).unwrap().unwrap();
                assert_eq!(selection.strategy, Strategy::CorrectionDrill);
                assert_eq!(selection.item.topic_id, "drill");
            }
        }
    }

    #[test]
    fn drill_on_empty_topic_falls_through_to_the_roll() {
        let cache = populated_cache();
        let drill = DrillMode {
            topic_id: "retired".into(),
            expires_at: NOW + 600,
            correct_streak: 0,
        };
        signals::apply_drill(cache.as_ref(), "l1", &DrillTransition::Set(drill), NOW).unwrap();
        let scheduler = scheduler(MemoryItems::new(&["wrong", "weak", "strong", "due"], 3), cache);

        let counts = counts(&scheduler, 2_000, 13);
        assert!(!counts.contains_key(&Strategy::CorrectionDrill));
        assert!(counts[&Strategy::HighFreqWrong] > 0);
        assert!(counts[&Strategy::WeakPoint] > 0);
    }

    #[test]
    fn tier_distribution_follows_weights() {
        let scheduler = scheduler(
            MemoryItems::new(&["wrong", "weak", "strong", "due"], 3),
            populated_cache(),
        );
        let calls = 100_000;
        let counts = counts(&scheduler, calls, 2024);

        for (strategy, expected) in [
            (Strategy::HighFreqWrong, 0.40),
            (Strategy::WeakPoint, 0.30),
            (Strategy::SpacedRepetition, 0.15),
            (Strategy::Advancement, 0.10),
            (Strategy::Exploration, 0.05),
        ] {
            let observed = *counts.get(&strategy).unwrap_or(&0) as f64 / calls as f64;
            assert!(
                (observed - expected).abs() < 0.01,
                "{}: observed {observed}, expected {expected}",
                strategy.code()
            );
        }
        assert!(!counts.contains_key(&Strategy::CorrectionDrill));
    }

    #[test]
    fn empty_weak_tier_never_reports_weak_point() {
        let cache = Arc::new(MemoryCache::new());
        signals::record_wrong_answer(cache.as_ref(), "l1", "wrong").unwrap();
        let scheduler = scheduler(MemoryItems::new(&["wrong", "other"], 2), cache);

        let counts = counts(&scheduler, 5_000, 9);
        assert!(!counts.contains_key(&Strategy::WeakPoint));
        assert!(!counts.contains_key(&Strategy::SpacedRepetition));
        assert!(!counts.contains_key(&Strategy::Advancement));
        assert!(counts[&Strategy::HighFreqWrong] > 0);
    }

    #[test]
    fn cache_outage_degrades_to_exploration() {
        let scheduler = scheduler(MemoryItems::new(&["t1"], 2), Arc::new(FailingCache));
        let counts = counts(&scheduler, 500, 3);
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[&Strategy::Exploration], 500);
    }

    #[test]
    fn empty_catalog_yields_no_item() {
        let scheduler = scheduler(MemoryItems::new(&[], 0), populated_cache());
        let mut rng = StdRng::seed_from_u64(1);
        assert!(scheduler.select_next("l1", NOW, &mut rng).unwrap().is_none());
    }

    #[test]
    fn same_seed_same_choices() {
        let scheduler = scheduler(
            MemoryItems::new(&["wrong", "weak", "strong", "due"], 5),
            populated_cache(),
        );
        let pick = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..20)
                .map(|_| scheduler.select_next("l1", NOW, &mut rng).unwrap().unwrap().item.id)
                .collect::<Vec<_>>()
        };
        assert_eq!(pick(11), pick(11));
    }

    #[test]
    fn stale_due_ids_are_skipped() {
        let cache = Arc::new(MemoryCache::new());
        signals::set_review_due(cache.as_ref(), "l1", "deleted-item", NOW - 1).unwrap();
        let scheduler = scheduler(MemoryItems::new(&["t1"], 1), cache);

        let counts = counts(&scheduler, 1_000, 5);
        assert!(!counts.contains_key(&Strategy::SpacedRepetition));
    }
}
