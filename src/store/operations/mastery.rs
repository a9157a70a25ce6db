use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

/// Durable copy of a learner's mastery of one topic. `version` increases on every write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryRecord {
    pub learner_id: String,
    pub topic_id: String,
    pub probability: f64,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MasteryRecord {
    /// The record that supersedes `previous` (or starts the series at version 1).
    pub(crate) fn next(
        previous: Option<Self>,
        learner_id: &str,
        topic_id: &str,
        probability: f64,
        now: DateTime<Utc>,
    ) -> Self {
        match previous {
            Some(prev) => MasteryRecord {
                probability,
                version: prev.version + 1,
                updated_at: now,
                ..prev
            },
            None => MasteryRecord {
                learner_id: learner_id.to_string(),
                topic_id: topic_id.to_string(),
                probability,
                version: 1,
                created_at: now,
                updated_at: now,
            },
        }
    }
}

impl Store {
    pub fn get_mastery(
        &self,
        learner_id: &str,
        topic_id: &str,
    ) -> Result<Option<MasteryRecord>, StoreError> {
        let key = keys::mastery_key(learner_id, topic_id)?;
        match self.mastery_states.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// Inserts the first record for (learner, topic) or supersedes the existing one.
    pub fn upsert_mastery(
        &self,
        learner_id: &str,
        topic_id: &str,
        probability: f64,
        now: DateTime<Utc>,
    ) -> Result<MasteryRecord, StoreError> {
        if !probability.is_finite() {
            return Err(StoreError::Validation(format!(
                "mastery probability must be finite, got {probability}"
            )));
        }
        let key = keys::mastery_key(learner_id, topic_id)?;

        Self::cas_update(&self.mastery_states, &key, "mastery", |previous| {
            MasteryRecord::next(previous, learner_id, topic_id, probability, now)
        })
    }

    pub fn list_mastery_for_learner(
        &self,
        learner_id: &str,
    ) -> Result<Vec<MasteryRecord>, StoreError> {
        let prefix = keys::learner_prefix(learner_id)?;
        let mut records = Vec::new();
        for entry in self.mastery_states.scan_prefix(prefix.as_bytes()) {
            let (_, raw) = entry?;
            records.push(Self::deserialize(&raw)?);
        }
        Ok(records)
    }

    /// Distinct learners that have at least one durable mastery record.
    pub fn list_learners_with_mastery(&self) -> Result<Vec<String>, StoreError> {
        let mut learners: Vec<String> = Vec::new();
        for entry in self.mastery_states.iter() {
            let (key, _) = entry?;
            let Some(learner_id) = keys::learner_of(&key) else {
                continue;
            };
            // Keys are sorted, so duplicates are adjacent.
            if learners.last() != Some(&learner_id) {
                learners.push(learner_id);
            }
        }
        Ok(learners)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tempfile::tempdir;

    use crate::store::Store;

    #[test]
    fn upsert_inserts_then_updates_in_place() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("mastery-db").to_str().unwrap()).unwrap();

        let first = store.upsert_mastery("l1", "t1", 0.3, Utc::now()).unwrap();
        assert_eq!(first.version, 1);

        let second = store.upsert_mastery("l1", "t1", 0.6, Utc::now()).unwrap();
        assert_eq!(second.version, 2);
        assert_eq!(second.created_at, first.created_at);

        let stored = store.get_mastery("l1", "t1").unwrap().unwrap();
        assert_eq!(stored.probability, 0.6);
        assert_eq!(store.list_mastery_for_learner("l1").unwrap().len(), 1);
    }

    #[test]
    fn concurrent_upserts_never_lose_a_version() {
        let dir = tempdir().unwrap();
        let store = std::sync::Arc::new(
            Store::open(dir.path().join("mastery-race").to_str().unwrap()).unwrap(),
        );

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        store
                            .upsert_mastery("l1", "t1", 0.1 + i as f64 * 0.01, Utc::now())
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stored = store.get_mastery("l1", "t1").unwrap().unwrap();
        assert_eq!(stored.version, 40);
    }

    #[test]
    fn learners_are_listed_once() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("mastery-learners").to_str().unwrap()).unwrap();

        store.upsert_mastery("a", "t1", 0.3, Utc::now()).unwrap();
        store.upsert_mastery("a", "t2", 0.3, Utc::now()).unwrap();
        store.upsert_mastery("b", "t1", 0.3, Utc::now()).unwrap();

        assert_eq!(store.list_learners_with_mastery().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn non_finite_probability_is_rejected() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("mastery-nan").to_str().unwrap()).unwrap();
        assert!(store.upsert_mastery("l1", "t1", f64::NAN, Utc::now()).is_err());
    }
}
