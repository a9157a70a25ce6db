use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

/// Spaced-repetition progress of one learner on one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewHistory {
    pub learner_id: String,
    pub item_id: String,
    pub topic_id: String,
    /// Consecutive successful reviews; reset to 0 by a failed one.
    pub repetitions: u32,
    pub interval_days: u32,
    pub last_quality: u8,
    /// Epoch seconds.
    pub due_at: i64,
    pub updated_at: DateTime<Utc>,
}

impl Store {
    pub fn get_review_history(
        &self,
        learner_id: &str,
        item_id: &str,
    ) -> Result<Option<ReviewHistory>, StoreError> {
        let key = keys::review_history_key(learner_id, item_id)?;
        match self.review_history.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn list_review_history(&self, learner_id: &str) -> Result<Vec<ReviewHistory>, StoreError> {
        let prefix = keys::learner_prefix(learner_id)?;
        let mut entries = Vec::new();
        for entry in self.review_history.scan_prefix(prefix.as_bytes()) {
            let (_, raw) = entry?;
            entries.push(Self::deserialize(&raw)?);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use crate::store::operations::answers::tests::{answer, review_for};
    use crate::store::Store;

    #[test]
    fn history_is_overwritten_per_item() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("review-db").to_str().unwrap()).unwrap();

        let first = answer("a1", "i1", "t1", true);
        store.commit_answer(&first, 0.5, &review_for(&first)).unwrap();

        let second = answer("a2", "i1", "t1", true);
        let mut review = review_for(&second);
        review.repetitions = 2;
        review.interval_days = 6;
        store.commit_answer(&second, 0.6, &review).unwrap();

        let all = store.list_review_history("l1").unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].interval_days, 6);
        assert!(store.get_review_history("l2", "i1").unwrap().is_none());
    }
}
