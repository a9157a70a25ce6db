//! Engine entry points: answer submission, next-item selection, learner views
//! and signal warm-up. Each learner is serialized through its own async lock;
//! blocking store and cache work runs on the blocking pool under a timeout.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::cache::FastCache;
use crate::constants::{LEARNING_THRESHOLD, MASTERED_THRESHOLD, MAX_ANSWER_DURATION_SECS};
use crate::engine::scheduler::{PracticeScheduler, PracticeSelection};
use crate::engine::signals::{self, DrillMode, DrillTransition, SignalSnapshot};
use crate::engine::spaced_repetition;
use crate::engine::tracker::{KnowledgeStateTracker, MasteryUpdate};
use crate::engine::{EngineConfig, EngineError};
use crate::store::keys::validate_id;
use crate::store::operations::answers::AnswerRecord;
use crate::store::operations::catalog::Item;
use crate::store::operations::mistakes::MistakeEntry;
use crate::store::operations::review_history::ReviewHistory;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSubmission {
    pub learner_id: String,
    /// Informational; the item's own topic is authoritative.
    #[serde(default)]
    pub topic_id: Option<String>,
    pub item_id: String,
    pub is_correct: bool,
    #[serde(default)]
    pub duration_secs: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResult {
    pub answer_id: String,
    pub learner_id: String,
    pub item_id: String,
    pub topic_id: String,
    pub is_correct: bool,
    pub mastery: MasteryUpdate,
    pub next_review_at: i64,
    pub drill: Option<DrillMode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkipReason {
    UnknownItem,
    UnknownTopic,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SubmitOutcome {
    Applied(AnswerResult),
    Skipped { reason: SkipReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MasteryLevel {
    Mastered,
    Learning,
    Weak,
}

impl MasteryLevel {
    pub fn from_probability(p: f64) -> Self {
        if p >= MASTERED_THRESHOLD {
            MasteryLevel::Mastered
        } else if p >= LEARNING_THRESHOLD {
            MasteryLevel::Learning
        } else {
            MasteryLevel::Weak
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeState {
    pub topic_id: String,
    pub topic_name: String,
    pub mastery: f64,
    pub level: MasteryLevel,
    pub updated_at: DateTime<Utc>,
}

const GATE_OPEN: u8 = 0;
const GATE_COMMITTING: u8 = 1;
const GATE_ABANDONED: u8 = 2;

/// Decides, once, whether a blocking task commits or its timed-out caller walks away.
#[derive(Debug, Default)]
pub(crate) struct CommitGate(AtomicU8);

impl CommitGate {
    /// Claimed by the task right before its durable write.
    fn begin_commit(&self) -> bool {
        self.0
            .compare_exchange(GATE_OPEN, GATE_COMMITTING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Claimed by the caller on timeout. Fails once a commit has started.
    fn abandon(&self) -> bool {
        self.0
            .compare_exchange(GATE_OPEN, GATE_ABANDONED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

pub struct PracticeEngine {
    store: Arc<Store>,
    cache: Arc<dyn FastCache>,
    config: Arc<EngineConfig>,
    tracker: KnowledgeStateTracker,
    scheduler: PracticeScheduler,
    learner_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    rng: std::sync::Mutex<StdRng>,
}

impl PracticeEngine {
    pub fn new(
        store: Arc<Store>,
        cache: Arc<dyn FastCache>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        config.validate().map_err(EngineError::InvalidConfig)?;
        let config = Arc::new(config);
        let rng = match config.runtime.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            tracker: KnowledgeStateTracker::new(
                store.clone(),
                store.clone(),
                cache.clone(),
                config.clone(),
            ),
            scheduler: PracticeScheduler::new(store.clone(), cache.clone(), config.clone()),
            store,
            cache,
            config,
            learner_locks: Mutex::new(HashMap::new()),
            rng: std::sync::Mutex::new(rng),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<dyn FastCache> {
        &self.cache
    }

    async fn acquire_learner_lock(&self, learner_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.learner_locks.lock().await;

        // Only the table holds idle locks.
        if locks.len() > self.config.runtime.lock_prune_threshold {
            locks.retain(|_, v| Arc::strong_count(v) > 1);
        }

        locks
            .entry(learner_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Independent per-call generator forked from the engine's master RNG.
    fn fork_rng(&self) -> Result<StdRng, EngineError> {
        let mut master = self
            .rng
            .lock()
            .map_err(|_| EngineError::Unavailable("rng lock poisoned".to_string()))?;
        Ok(StdRng::seed_from_u64(master.gen()))
    }

    /// Runs blocking work on the blocking pool, bounded by the operation timeout.
    ///
    /// On timeout the caller gets `Timeout` only if the work has not started its
    /// durable commit; the work sees that through the gate and stops before
    /// writing. A commit already in flight is waited for and its result returned.
    /// Anything the work owns (such as a learner guard) is released only when
    /// it finishes.
    async fn run_blocking<T, F>(&self, operation: &'static str, work: F) -> Result<T, EngineError>
    where
        T: Send + 'static,
        F: FnOnce(&CommitGate) -> Result<T, EngineError> + Send + 'static,
    {
        let gate = Arc::new(CommitGate::default());
        let task_gate = Arc::clone(&gate);
        let mut task = tokio::task::spawn_blocking(move || work(&task_gate));

        let joined = match tokio::time::timeout(self.config.op_timeout(), &mut task).await {
            Ok(joined) => joined,
            Err(_) if gate.abandon() => {
                tracing::warn!(operation, timeout_ms = self.config.runtime.op_timeout_ms, "Engine operation timed out");
                return Err(EngineError::Timeout {
                    operation,
                    timeout_ms: self.config.runtime.op_timeout_ms,
                });
            }
            Err(_) => {
                tracing::debug!(operation, "Timeout hit during commit, waiting for it to finish");
                task.await
            }
        };

        match joined {
            Ok(result) => result,
            Err(join_error) => {
                tracing::error!(operation, error = %join_error, "Engine task failed");
                Err(EngineError::Unavailable(format!("{operation} failed")))
            }
        }
    }

    pub async fn submit_answer(
        self: &Arc<Self>,
        submission: AnswerSubmission,
    ) -> Result<SubmitOutcome, EngineError> {
        validate_id("learner", &submission.learner_id)?;
        validate_id("item", &submission.item_id)?;
        if submission.duration_secs > MAX_ANSWER_DURATION_SECS {
            return Err(StoreError::Validation(format!(
                "durationSecs must be <= {MAX_ANSWER_DURATION_SECS}"
            ))
            .into());
        }

        let lock = self.acquire_learner_lock(&submission.learner_id).await;
        let guard = lock.lock_owned().await;
        let engine = Arc::clone(self);
        let now = Utc::now();

        self.run_blocking("submit_answer", move |gate| {
            let _guard = guard;
            engine.apply_answer(&submission, now, gate)
        })
        .await
    }

    fn apply_answer(
        &self,
        submission: &AnswerSubmission,
        now: DateTime<Utc>,
        gate: &CommitGate,
    ) -> Result<SubmitOutcome, EngineError> {
        let learner_id = submission.learner_id.as_str();
        let correct = submission.is_correct;

        let Some(item) = self.store.get_item(&submission.item_id)? else {
            tracing::warn!(learner_id, item_id = %submission.item_id, "Unknown item, answer ignored");
            return Ok(SubmitOutcome::Skipped {
                reason: SkipReason::UnknownItem,
            });
        };
        if let Some(claimed) = submission.topic_id.as_deref() {
            if claimed != item.topic_id {
                tracing::warn!(
                    learner_id,
                    item_id = %item.id,
                    claimed_topic = claimed,
                    topic_id = %item.topic_id,
                    "Submitted topic does not match item, using item topic"
                );
            }
        }
        let Some(topic) = self.store.get_topic(&item.topic_id)? else {
            tracing::warn!(learner_id, topic_id = %item.topic_id, "Unknown topic, answer ignored");
            return Ok(SubmitOutcome::Skipped {
                reason: SkipReason::UnknownTopic,
            });
        };

        let pending = self.tracker.prepare(learner_id, &topic, correct)?;
        let review = self.plan_review(learner_id, &item, correct, now)?;
        let answer = AnswerRecord {
            id: uuid::Uuid::new_v4().to_string(),
            learner_id: learner_id.to_string(),
            item_id: item.id.clone(),
            topic_id: topic.id.clone(),
            is_correct: correct,
            duration_secs: submission.duration_secs,
            submitted_at: now,
        };

        if !gate.begin_commit() {
            tracing::info!(learner_id, item_id = %item.id, "Submission abandoned before commit");
            return Err(EngineError::Timeout {
                operation: "submit_answer",
                timeout_ms: self.config.runtime.op_timeout_ms,
            });
        }
        let record = match self.store.commit_answer(&answer, pending.probability, &review) {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(learner_id, item_id = %item.id, error = %e, "Answer commit failed");
                return Err(e.into());
            }
        };
        let mastery = pending.committed(record.version);

        self.tracker.refresh_cache(learner_id, &topic.id, mastery.probability);
        if !correct {
            if let Err(e) = signals::record_wrong_answer(self.cache.as_ref(), learner_id, &topic.id) {
                tracing::warn!(learner_id, topic_id = %topic.id, error = %e, "Wrong-answer signal skipped");
            }
        }
        let drill = self.update_drill(learner_id, &topic.id, correct, now.timestamp());
        if let Err(e) = signals::set_review_due(self.cache.as_ref(), learner_id, &item.id, review.due_at) {
            tracing::warn!(learner_id, item_id = %item.id, error = %e, "Review-due signal skipped");
        }
        if let Err(e) = signals::set_weakness(self.cache.as_ref(), learner_id, &topic.id, mastery.probability) {
            tracing::warn!(learner_id, topic_id = %topic.id, error = %e, "Weak-topic signal skipped");
        }

        tracing::info!(
            learner_id,
            item_id = %item.id,
            topic_id = %topic.id,
            correct,
            mastery = mastery.probability,
            next_review_at = review.due_at,
            "Answer applied"
        );

        Ok(SubmitOutcome::Applied(AnswerResult {
            answer_id: answer.id,
            learner_id: learner_id.to_string(),
            item_id: item.id,
            topic_id: topic.id,
            is_correct: correct,
            mastery,
            next_review_at: review.due_at,
            drill,
        }))
    }

    /// Returns the drill flag as it stands after this answer, as far as the cache allows.
    fn update_drill(&self, learner_id: &str, topic_id: &str, correct: bool, now: i64) -> Option<DrillMode> {
        let current = match signals::read_drill(self.cache.as_ref(), learner_id, now) {
            Ok(current) => current,
            Err(e) => {
                tracing::warn!(learner_id, error = %e, "Drill flag unreadable");
                None
            }
        };
        let transition = DrillMode::after_answer(current.as_ref(), topic_id, correct, now, &self.config.drill);
        if let Err(e) = signals::apply_drill(self.cache.as_ref(), learner_id, &transition, now) {
            tracing::warn!(learner_id, topic_id, error = %e, "Drill flag update skipped");
        }
        match transition {
            DrillTransition::Set(drill) => Some(drill),
            DrillTransition::Clear => None,
            DrillTransition::Unchanged => current,
        }
    }

    /// The item's review history after this answer. Not written here.
    fn plan_review(
        &self,
        learner_id: &str,
        item: &Item,
        correct: bool,
        now: DateTime<Utc>,
    ) -> Result<ReviewHistory, EngineError> {
        let sr = &self.config.spaced_repetition;
        let quality = if correct { sr.correct_quality } else { sr.wrong_quality };
        let (repetitions, interval) = self
            .store
            .get_review_history(learner_id, &item.id)?
            .map(|h| (h.repetitions, h.interval_days))
            .unwrap_or((0, 0));

        let interval_days = spaced_repetition::next_interval_days(
            interval,
            repetitions,
            quality,
            sr.pass_quality,
            sr.ease_factor,
        );
        let due_at = spaced_repetition::next_review_time(
            interval,
            repetitions,
            quality,
            sr.pass_quality,
            sr.ease_factor,
            now.timestamp(),
        );
        Ok(ReviewHistory {
            learner_id: learner_id.to_string(),
            item_id: item.id.clone(),
            topic_id: item.topic_id.clone(),
            repetitions: if quality >= sr.pass_quality {
                repetitions.saturating_add(1)
            } else {
                0
            },
            interval_days,
            last_quality: quality,
            due_at,
            updated_at: now,
        })
    }

    /// Waits for any in-flight submission of the learner, then selects.
    pub async fn select_next_item(
        self: &Arc<Self>,
        learner_id: &str,
    ) -> Result<Option<PracticeSelection>, EngineError> {
        validate_id("learner", learner_id)?;
        let mut rng = self.fork_rng()?;

        let lock = self.acquire_learner_lock(learner_id).await;
        let guard = lock.lock_owned().await;
        let engine = Arc::clone(self);
        let learner_id = learner_id.to_string();
        let now = Utc::now().timestamp();

        self.run_blocking("select_next_item", move |_| {
            let _guard = guard;
            engine.scheduler.select_next(&learner_id, now, &mut rng)
        })
        .await
    }

    /// Durable mastery per topic, weakest first.
    pub async fn knowledge_states(
        self: &Arc<Self>,
        learner_id: &str,
    ) -> Result<Vec<KnowledgeState>, EngineError> {
        validate_id("learner", learner_id)?;
        let store = self.store.clone();
        let learner_id = learner_id.to_string();

        self.run_blocking("knowledge_states", move |_| {
            let mut states = Vec::new();
            for record in store.list_mastery_for_learner(&learner_id)? {
                let topic_name = store
                    .get_topic(&record.topic_id)?
                    .map(|t| t.name)
                    .unwrap_or_else(|| record.topic_id.clone());
                states.push(KnowledgeState {
                    level: MasteryLevel::from_probability(record.probability),
                    topic_id: record.topic_id,
                    topic_name,
                    mastery: record.probability,
                    updated_at: record.updated_at,
                });
            }
            states.sort_by(|a, b| a.mastery.total_cmp(&b.mastery));
            Ok(states)
        })
        .await
    }

    pub async fn list_mistakes(
        self: &Arc<Self>,
        learner_id: &str,
        include_resolved: bool,
        limit: usize,
    ) -> Result<Vec<MistakeEntry>, EngineError> {
        validate_id("learner", learner_id)?;
        let store = self.store.clone();
        let learner_id = learner_id.to_string();

        self.run_blocking("list_mistakes", move |_| {
            let mut mistakes = store.list_mistakes(&learner_id, include_resolved)?;
            mistakes.truncate(limit);
            Ok(mistakes)
        })
        .await
    }

    pub async fn recent_answers(
        self: &Arc<Self>,
        learner_id: &str,
        limit: usize,
    ) -> Result<Vec<AnswerRecord>, EngineError> {
        validate_id("learner", learner_id)?;
        let store = self.store.clone();
        let learner_id = learner_id.to_string();

        self.run_blocking("recent_answers", move |_| {
            Ok(store.list_recent_answers(&learner_id, limit)?)
        })
        .await
    }

    /// Rebuilds the learner's rankings from durable data while holding the learner lock.
    pub async fn rebuild_learner_signals(self: &Arc<Self>, learner_id: &str) -> Result<(), EngineError> {
        validate_id("learner", learner_id)?;
        let lock = self.acquire_learner_lock(learner_id).await;
        let guard = lock.lock_owned().await;
        let engine = Arc::clone(self);
        let learner_id = learner_id.to_string();

        self.run_blocking("rebuild_signals", move |_| {
            let _guard = guard;
            let snapshot = SignalSnapshot {
                mastery: engine.store.list_mastery_for_learner(&learner_id)?,
                mistake_counts: engine.store.mistake_counts_by_topic(&learner_id)?,
                reviews: engine.store.list_review_history(&learner_id)?,
            };
            signals::rebuild(engine.cache.as_ref(), &learner_id, &snapshot).map_err(|e| {
                EngineError::Unavailable(format!("signal rebuild for {learner_id} failed: {e}"))
            })
        })
        .await
    }

    /// Rebuilds every learner with durable mastery. Returns how many succeeded;
    /// individual failures are logged and skipped.
    pub async fn warm_all_signals(self: &Arc<Self>) -> Result<usize, EngineError> {
        let store = self.store.clone();
        let learners = self
            .run_blocking("list_learners", move |_| Ok(store.list_learners_with_mastery()?))
            .await?;

        let mut warmed = 0;
        for learner_id in &learners {
            match self.rebuild_learner_signals(learner_id).await {
                Ok(()) => warmed += 1,
                Err(e) => tracing::warn!(learner_id = %learner_id, error = %e, "Signal warm-up failed"),
            }
        }
        tracing::info!(learners = learners.len(), warmed, "Signal warm-up finished");
        Ok(warmed)
    }
}
