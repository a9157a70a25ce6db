use chrono::{DateTime, Utc};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use sled::Transactional;

use crate::store::keys;
use crate::store::{abort, map_transaction_error, Store, StoreError};

/// Per-topic BKT calibration; any field may be absent and then falls back to engine defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicParameters {
    #[serde(default)]
    pub p_init: Option<f64>,
    #[serde(default)]
    pub p_transit: Option<f64>,
    #[serde(default)]
    pub p_guess: Option<f64>,
    #[serde(default)]
    pub p_slip: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub parameters: TopicParameters,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub topic_id: String,
    pub content: String,
    #[serde(default)]
    pub difficulty: f64,
    #[serde(default)]
    pub kind: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Store {
    pub fn upsert_topic(&self, topic: &Topic) -> Result<(), StoreError> {
        let key = keys::topic_key(&topic.id)?;
        if let Some(parent_id) = &topic.parent_id {
            keys::validate_id("topic", parent_id)?;
        }
        self.topics.insert(key.as_bytes(), Self::serialize(topic)?)?;
        Ok(())
    }

    pub fn get_topic(&self, topic_id: &str) -> Result<Option<Topic>, StoreError> {
        let key = keys::topic_key(topic_id)?;
        match self.topics.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn list_topics(&self) -> Result<Vec<Topic>, StoreError> {
        let mut topics = Vec::new();
        for entry in self.topics.iter() {
            let (_, raw) = entry?;
            topics.push(Self::deserialize(&raw)?);
        }
        Ok(topics)
    }

    /// Writes the item and keeps the topic index in step, moving the index
    /// entry when the item changes topic.
    pub fn upsert_item(&self, item: &Item) -> Result<(), StoreError> {
        let key = keys::item_key(&item.id)?;
        let index_key = keys::item_topic_index_key(&item.topic_id, &item.id)?;
        let value = Self::serialize(item)?;

        (&self.items, &self.items_by_topic)
            .transaction(|(tx_items, tx_index)| {
                if let Some(old_raw) = tx_items.get(key.as_bytes())? {
                    let old: Item = serde_json::from_slice(&old_raw).map_err(abort)?;
                    if old.topic_id != item.topic_id {
                        let old_index_key =
                            keys::item_topic_index_key(&old.topic_id, &old.id).map_err(abort)?;
                        tx_index.remove(old_index_key.as_bytes())?;
                    }
                }

                tx_items.insert(key.as_bytes(), value.as_slice())?;
                tx_index.insert(index_key.as_bytes(), item.id.as_bytes())?;
                Ok(())
            })
            .map_err(map_transaction_error)?;

        Ok(())
    }

    pub fn get_item(&self, item_id: &str) -> Result<Option<Item>, StoreError> {
        let key = keys::item_key(item_id)?;
        match self.items.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// Items indexed under the topic; dangling index entries are skipped.
    pub fn list_items_by_topic(&self, topic_id: &str) -> Result<Vec<Item>, StoreError> {
        let prefix = keys::item_topic_index_prefix(topic_id)?;
        let mut items = Vec::new();

        for entry in self.items_by_topic.scan_prefix(prefix.as_bytes()) {
            let (_, item_id_raw) = entry?;
            let Ok(item_id) = std::str::from_utf8(&item_id_raw) else {
                tracing::warn!(topic_id, "Invalid UTF-8 in item topic index");
                continue;
            };
            match self.get_item(item_id)? {
                Some(item) if item.topic_id == topic_id => items.push(item),
                _ => tracing::debug!(topic_id, item_id, "Skipping stale topic index entry"),
            }
        }

        Ok(items)
    }

    pub fn count_items(&self) -> usize {
        self.items.len()
    }

    /// Uniform pick over the whole catalog using the caller's random source.
    pub fn random_item(&self, rng: &mut dyn RngCore) -> Result<Option<Item>, StoreError> {
        let count = self.items.len();
        if count == 0 {
            return Ok(None);
        }

        let index = rng.gen_range(0..count);
        match self.items.iter().nth(index) {
            Some(entry) => {
                let (_, raw) = entry?;
                Ok(Some(Self::deserialize(&raw)?))
            }
            // The tree shrank between len() and the scan.
            None => match self.items.first()? {
                Some((_, raw)) => Ok(Some(Self::deserialize(&raw)?)),
                None => Ok(None),
            },
        }
    }
}
