//! Collaborator seams of the engine. `Store` implements all of them; tests swap in fakes.

use chrono::{DateTime, Utc};
use rand::RngCore;

use crate::store::operations::catalog::{Item, Topic, TopicParameters};
use crate::store::operations::mastery::MasteryRecord;
use crate::store::{Store, StoreError};

pub trait ItemRepository: Send + Sync {
    fn items_by_topic(&self, topic_id: &str) -> Result<Vec<Item>, StoreError>;

    fn random_item(&self, rng: &mut dyn RngCore) -> Result<Option<Item>, StoreError>;

    fn item_by_id(&self, item_id: &str) -> Result<Option<Item>, StoreError>;
}

pub trait TopicCatalog: Send + Sync {
    fn topic(&self, topic_id: &str) -> Result<Option<Topic>, StoreError>;

    fn parameters_for(&self, topic_id: &str) -> Result<Option<TopicParameters>, StoreError> {
        Ok(self.topic(topic_id)?.map(|topic| topic.parameters))
    }
}

pub trait MasteryStore: Send + Sync {
    fn load(&self, learner_id: &str, topic_id: &str) -> Result<Option<MasteryRecord>, StoreError>;

    /// Insert-or-update; concurrent writers must not lose versions.
    fn save(
        &self,
        learner_id: &str,
        topic_id: &str,
        probability: f64,
        now: DateTime<Utc>,
    ) -> Result<MasteryRecord, StoreError>;
}

impl ItemRepository for Store {
    fn items_by_topic(&self, topic_id: &str) -> Result<Vec<Item>, StoreError> {
        self.list_items_by_topic(topic_id)
    }

    fn random_item(&self, rng: &mut dyn RngCore) -> Result<Option<Item>, StoreError> {
        Store::random_item(self, rng)
    }

    fn item_by_id(&self, item_id: &str) -> Result<Option<Item>, StoreError> {
        self.get_item(item_id)
    }
}

impl TopicCatalog for Store {
    fn topic(&self, topic_id: &str) -> Result<Option<Topic>, StoreError> {
        self.get_topic(topic_id)
    }
}

impl MasteryStore for Store {
    fn load(&self, learner_id: &str, topic_id: &str) -> Result<Option<MasteryRecord>, StoreError> {
        self.get_mastery(learner_id, topic_id)
    }

    fn save(
        &self,
        learner_id: &str,
        topic_id: &str,
        probability: f64,
        now: DateTime<Utc>,
    ) -> Result<MasteryRecord, StoreError> {
        self.upsert_mastery(learner_id, topic_id, probability, now)
    }
}
