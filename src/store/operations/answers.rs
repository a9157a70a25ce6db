use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::Transactional;

use crate::store::keys;
use crate::store::operations::mastery::MasteryRecord;
use crate::store::operations::mistakes::MistakeEntry;
use crate::store::operations::review_history::ReviewHistory;
use crate::store::{abort, map_transaction_error, Store, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub id: String,
    pub learner_id: String,
    pub item_id: String,
    pub topic_id: String,
    pub is_correct: bool,
    pub duration_secs: u32,
    pub submitted_at: DateTime<Utc>,
}

impl Store {
    /// Records one answer and everything it changes in a single transaction:
    /// the topic's mastery record, the answer log entry, the mistake book entry
    /// and the item's review history. Either all of them land or none do.
    pub fn commit_answer(
        &self,
        answer: &AnswerRecord,
        probability: f64,
        review: &ReviewHistory,
    ) -> Result<MasteryRecord, StoreError> {
        if !probability.is_finite() {
            return Err(StoreError::Validation(format!(
                "mastery probability must be finite, got {probability}"
            )));
        }
        if review.learner_id != answer.learner_id || review.item_id != answer.item_id {
            return Err(StoreError::Validation(
                "review history does not belong to the answered item".to_string(),
            ));
        }

        let mastery_key = keys::mastery_key(&answer.learner_id, &answer.topic_id)?;
        let answer_key = keys::answer_key(
            &answer.learner_id,
            answer.submitted_at.timestamp_millis(),
            &answer.id,
        )?;
        let mistake_key = keys::mistake_key(&answer.learner_id, &answer.item_id)?;
        let review_key = keys::review_history_key(&review.learner_id, &review.item_id)?;
        let answer_value = Self::serialize(answer)?;
        let review_value = Self::serialize(review)?;

        let trees = (
            &self.mastery_states,
            &self.answer_log,
            &self.mistake_book,
            &self.review_history,
        );
        let record = trees
            .transaction(|(tx_mastery, tx_answers, tx_mistakes, tx_reviews)| {
                let previous: Option<MasteryRecord> = tx_mastery
                    .get(mastery_key.as_bytes())?
                    .map(|raw| serde_json::from_slice(&raw))
                    .transpose()
                    .map_err(abort)?;
                let record = MasteryRecord::next(
                    previous,
                    &answer.learner_id,
                    &answer.topic_id,
                    probability,
                    answer.submitted_at,
                );
                tx_mastery.insert(
                    mastery_key.as_bytes(),
                    serde_json::to_vec(&record).map_err(abort)?,
                )?;

                tx_answers.insert(answer_key.as_bytes(), answer_value.as_slice())?;

                let mistake: Option<MistakeEntry> = tx_mistakes
                    .get(mistake_key.as_bytes())?
                    .map(|raw| serde_json::from_slice(&raw))
                    .transpose()
                    .map_err(abort)?;
                if let Some(entry) = MistakeEntry::after_answer(mistake, answer) {
                    tx_mistakes.insert(
                        mistake_key.as_bytes(),
                        serde_json::to_vec(&entry).map_err(abort)?,
                    )?;
                }

                tx_reviews.insert(review_key.as_bytes(), review_value.as_slice())?;
                Ok(record)
            })
            .map_err(map_transaction_error)?;

        tracing::debug!(
            learner_id = %answer.learner_id,
            item_id = %answer.item_id,
            version = record.version,
            "Answer committed"
        );
        Ok(record)
    }

    /// Newest first.
    pub fn list_recent_answers(
        &self,
        learner_id: &str,
        limit: usize,
    ) -> Result<Vec<AnswerRecord>, StoreError> {
        let prefix = keys::learner_prefix(learner_id)?;
        let mut answers = Vec::with_capacity(limit.min(64));
        for entry in self.answer_log.scan_prefix(prefix.as_bytes()) {
            if answers.len() >= limit {
                break;
            }
            let (_, raw) = entry?;
            answers.push(Self::deserialize(&raw)?);
        }
        Ok(answers)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::{Duration, Utc};
    use tempfile::tempdir;

    use super::AnswerRecord;
    use crate::store::keys;
    use crate::store::operations::mastery::MasteryRecord;
    use crate::store::operations::review_history::ReviewHistory;
    use crate::store::Store;

    pub(crate) fn answer(id: &str, item_id: &str, topic_id: &str, correct: bool) -> AnswerRecord {
        AnswerRecord {
            id: id.to_string(),
            learner_id: "l1".to_string(),
            item_id: item_id.to_string(),
            topic_id: topic_id.to_string(),
            is_correct: correct,
            duration_secs: 12,
            submitted_at: Utc::now(),
        }
    }

    pub(crate) fn review_for(answer: &AnswerRecord) -> ReviewHistory {
        ReviewHistory {
            learner_id: answer.learner_id.clone(),
            item_id: answer.item_id.clone(),
            topic_id: answer.topic_id.clone(),
            repetitions: u32::from(answer.is_correct),
            interval_days: 1,
            last_quality: if answer.is_correct { 4 } else { 0 },
            due_at: answer.submitted_at.timestamp() + 86_400,
            updated_at: answer.submitted_at,
        }
    }

    pub(crate) fn commit(store: &Store, answer: &AnswerRecord) -> MasteryRecord {
        store.commit_answer(answer, 0.5, &review_for(answer)).unwrap()
    }

    #[test]
    fn recent_answers_are_newest_first() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("answers-db").to_str().unwrap()).unwrap();

        for (id, offset) in [("a1", 0), ("a2", 10), ("a3", 5)] {
            let mut a = answer(id, "i1", "t1", true);
            a.submitted_at = a.submitted_at + Duration::seconds(offset);
            commit(&store, &a);
        }

        let recent = store.list_recent_answers("l1", 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, "a2");
        assert_eq!(recent[1].id, "a3");
    }

    #[test]
    fn commit_writes_every_tree() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("answers-commit").to_str().unwrap()).unwrap();

        let first = commit(&store, &answer("a1", "i1", "t1", false));
        let second = commit(&store, &answer("a2", "i1", "t1", false));
        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);
        assert_eq!(second.created_at, first.created_at);

        assert_eq!(store.get_mastery("l1", "t1").unwrap().unwrap().version, 2);
        assert_eq!(store.list_recent_answers("l1", 10).unwrap().len(), 2);
        assert_eq!(store.list_mistakes("l1", false).unwrap()[0].error_count, 2);
        assert!(store.get_review_history("l1", "i1").unwrap().is_some());
    }

    #[test]
    fn failed_commit_leaves_no_partial_writes() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("answers-abort").to_str().unwrap()).unwrap();
        let key = keys::mistake_key("l1", "i1").unwrap();
        store.mistake_book.insert(key.as_bytes(), b"not json".as_slice()).unwrap();

        let a = answer("a1", "i1", "t1", false);
        assert!(store.commit_answer(&a, 0.5, &review_for(&a)).is_err());

        assert!(store.get_mastery("l1", "t1").unwrap().is_none());
        assert!(store.list_recent_answers("l1", 10).unwrap().is_empty());
        assert!(store.get_review_history("l1", "i1").unwrap().is_none());
    }

    #[test]
    fn mismatched_review_is_rejected() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("answers-mismatch").to_str().unwrap()).unwrap();

        let a = answer("a1", "i1", "t1", true);
        let mut review = review_for(&a);
        review.item_id = "i2".into();
        assert!(store.commit_answer(&a, 0.5, &review).is_err());
        assert!(store.list_recent_answers("l1", 10).unwrap().is_empty());
    }

    #[test]
    fn non_finite_probability_is_rejected() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("answers-nan").to_str().unwrap()).unwrap();

        let a = answer("a1", "i1", "t1", true);
        assert!(store.commit_answer(&a, f64::NAN, &review_for(&a)).is_err());
    }
}
