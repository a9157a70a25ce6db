use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::operations::answers::AnswerRecord;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MistakeEntry {
    pub learner_id: String,
    pub item_id: String,
    pub topic_id: String,
    pub error_count: u32,
    pub last_error_at: DateTime<Utc>,
    pub resolved: bool,
}

impl MistakeEntry {
    /// Entry after one answer on the item, or `None` when the book does not change.
    ///
    /// A wrong answer counts and re-opens a resolved entry; a correct one
    /// resolves an open entry.
    pub(crate) fn after_answer(
        previous: Option<Self>,
        answer: &AnswerRecord,
    ) -> Option<Self> {
        match (previous, answer.is_correct) {
            (Some(prev), false) => Some(MistakeEntry {
                topic_id: answer.topic_id.clone(),
                error_count: prev.error_count.saturating_add(1),
                last_error_at: answer.submitted_at,
                resolved: false,
                ..prev
            }),
            (None, false) => Some(MistakeEntry {
                learner_id: answer.learner_id.clone(),
                item_id: answer.item_id.clone(),
                topic_id: answer.topic_id.clone(),
                error_count: 1,
                last_error_at: answer.submitted_at,
                resolved: false,
            }),
            (Some(prev), true) if !prev.resolved => Some(MistakeEntry {
                resolved: true,
                ..prev
            }),
            (_, true) => None,
        }
    }
}

impl Store {
    pub fn list_mistakes(
        &self,
        learner_id: &str,
        include_resolved: bool,
    ) -> Result<Vec<MistakeEntry>, StoreError> {
        let prefix = keys::learner_prefix(learner_id)?;
        let mut entries = Vec::new();
        for entry in self.mistake_book.scan_prefix(prefix.as_bytes()) {
            let (_, raw) = entry?;
            let mistake: MistakeEntry = Self::deserialize(&raw)?;
            if include_resolved || !mistake.resolved {
                entries.push(mistake);
            }
        }
        entries.sort_by(|a, b| {
            b.error_count
                .cmp(&a.error_count)
                .then_with(|| b.last_error_at.cmp(&a.last_error_at))
        });
        Ok(entries)
    }

    /// Cumulative wrong answers per topic, resolved entries included.
    pub fn mistake_counts_by_topic(
        &self,
        learner_id: &str,
    ) -> Result<HashMap<String, u32>, StoreError> {
        let mut counts: HashMap<String, u32> = HashMap::new();
        for mistake in self.list_mistakes(learner_id, true)? {
            *counts.entry(mistake.topic_id).or_default() += mistake.error_count;
        }
        Ok(counts)
    }
}
