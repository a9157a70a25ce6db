//! Startup catalog import from a JSON file of topics and items.

use std::collections::HashSet;
use std::path::Path;

use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;

use crate::store::operations::catalog::{Item, Topic, TopicParameters};
use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("cannot read catalog seed {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid catalog seed: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeedTopic {
    id: String,
    name: String,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    parameters: TopicParameters,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeedItem {
    id: String,
    topic_id: String,
    content: String,
    #[serde(default)]
    difficulty: f64,
    #[serde(default)]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogSeed {
    #[serde(default)]
    topics: Vec<SeedTopic>,
    #[serde(default)]
    items: Vec<SeedItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeedSummary {
    pub topics: usize,
    pub items: usize,
    pub skipped_items: usize,
}

pub fn load_catalog_file(store: &Store, path: &Path) -> Result<SeedSummary, SeedError> {
    let raw = std::fs::read_to_string(path).map_err(|source| SeedError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_catalog_json(store, &raw)
}

/// Upserts every topic, then every item whose topic exists. Existing
/// `created_at` stamps are preserved so reseeding is idempotent.
pub fn load_catalog_json(store: &Store, raw: &str) -> Result<SeedSummary, SeedError> {
    let seed: CatalogSeed = serde_json::from_str(raw)?;
    let now = Utc::now();
    let mut summary = SeedSummary::default();

    for seed_topic in seed.topics {
        let created_at = store
            .get_topic(&seed_topic.id)?
            .map(|existing| existing.created_at)
            .unwrap_or(now);
        store.upsert_topic(&Topic {
            id: seed_topic.id,
            name: seed_topic.name,
            subject: seed_topic.subject,
            parent_id: seed_topic.parent_id,
            parameters: seed_topic.parameters,
            created_at,
        })?;
        summary.topics += 1;
    }

    let known: HashSet<String> = store.list_topics()?.into_iter().map(|t| t.id).collect();
    for seed_item in seed.items {
        if !known.contains(&seed_item.topic_id) {
            tracing::warn!(item_id = %seed_item.id, topic_id = %seed_item.topic_id, "Seed item references unknown topic, skipped");
            summary.skipped_items += 1;
            continue;
        }
        let created_at = store
            .get_item(&seed_item.id)?
            .map(|existing| existing.created_at)
            .unwrap_or(now);
        store.upsert_item(&Item {
            id: seed_item.id,
            topic_id: seed_item.topic_id,
            content: seed_item.content,
            difficulty: seed_item.difficulty,
            kind: seed_item.kind,
            created_at,
        })?;
        summary.items += 1;
    }

    tracing::info!(
        topics = summary.topics,
        items = summary.items,
        skipped_items = summary.skipped_items,
        "Catalog seed loaded"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    const SEED: &str = r#"{
        "topics": [
            {"id": "fractions", "name": "Fractions", "parameters": {"pGuess": 0.25}},
            {"id": "decimals", "name": "Decimals", "subject": "math"}
        ],
        "items": [
            {"id": "f1", "topicId": "fractions", "content": "1/2 + 1/4 = ?"},
            {"id": "d1", "topicId": "decimals", "content": "0.1 + 0.2 = ?", "difficulty": 0.3},
            {"id": "x1", "topicId": "ghost", "content": "orphan"}
        ]
    }"#;

    #[test]
    fn loads_topics_and_items() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("seed-db").to_str().unwrap()).unwrap();

        let summary = load_catalog_json(&store, SEED).unwrap();
        assert_eq!(
            summary,
            SeedSummary {
                topics: 2,
                items: 2,
                skipped_items: 1
            }
        );
        let fractions = store.get_topic("fractions").unwrap().unwrap();
        assert_eq!(fractions.parameters.p_guess, Some(0.25));
        assert_eq!(store.list_items_by_topic("decimals").unwrap().len(), 1);
    }

    #[test]
    fn reseeding_keeps_creation_time() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("reseed-db").to_str().unwrap()).unwrap();

        load_catalog_json(&store, SEED).unwrap();
        let before = store.get_item("f1").unwrap().unwrap().created_at;
        load_catalog_json(&store, SEED).unwrap();
        assert_eq!(store.get_item("f1").unwrap().unwrap().created_at, before);
        assert_eq!(store.count_items(), 2);
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("nofile-db").to_str().unwrap()).unwrap();
        let err = load_catalog_file(&store, &dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, SeedError::Io { .. }));
    }
}
