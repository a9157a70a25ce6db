pub mod keys;
pub mod migrate;
pub mod operations;
pub mod trees;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Db;
use thiserror::Error;

use crate::constants::MAX_CAS_RETRIES;

#[derive(Debug)]
pub struct Store {
    db: Db,
    pub mastery_states: sled::Tree,
    pub topics: sled::Tree,
    pub items: sled::Tree,
    pub items_by_topic: sled::Tree,
    pub review_history: sled::Tree,
    pub mistake_book: sled::Tree,
    pub answer_log: sled::Tree,
    pub meta: sled::Tree,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: entity={entity}, key={key}")]
    NotFound { entity: String, key: String },
    #[error("conflict: entity={entity}, key={key}")]
    Conflict { entity: String, key: String },
    #[error("CAS retry exhausted after {attempts} attempts: entity={entity}, key={key}")]
    CasRetryExhausted {
        entity: String,
        key: String,
        attempts: u32,
    },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("migration error at version {version}: {message}")]
    Migration { version: u32, message: String },
}

impl StoreError {
    /// Storage-level failures may succeed on retry; data errors will not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Sled(_) | StoreError::CasRetryExhausted { .. } | StoreError::Conflict { .. }
        )
    }
}

/// Aborts a sled transaction with a store error.
pub(crate) fn abort<E: Into<StoreError>>(error: E) -> ConflictableTransactionError<StoreError> {
    ConflictableTransactionError::Abort(error.into())
}

pub(crate) fn map_transaction_error(error: TransactionError<StoreError>) -> StoreError {
    match error {
        TransactionError::Abort(store_error) => store_error,
        TransactionError::Storage(storage_error) => StoreError::Sled(storage_error),
    }
}

impl Store {
    pub fn open(sled_path: &str) -> Result<Self, StoreError> {
        let db = sled::open(sled_path)?;
        let mastery_states = db.open_tree(trees::MASTERY_STATES)?;
        let topics = db.open_tree(trees::TOPICS)?;
        let items = db.open_tree(trees::ITEMS)?;
        let items_by_topic = db.open_tree(trees::ITEMS_BY_TOPIC)?;
        let review_history = db.open_tree(trees::REVIEW_HISTORY)?;
        let mistake_book = db.open_tree(trees::MISTAKE_BOOK)?;
        let answer_log = db.open_tree(trees::ANSWER_LOG)?;
        let meta = db.open_tree(trees::META)?;

        Ok(Self {
            db,
            mastery_states,
            topics,
            items,
            items_by_topic,
            review_history,
            mistake_book,
            answer_log,
            meta,
        })
    }

    pub fn run_migrations(&self) -> Result<(), StoreError> {
        migrate::run(self)
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    pub fn raw_db(&self) -> &Db {
        &self.db
    }

    pub(crate) fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(value)?)
    }

    pub(crate) fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Read-modify-write of one key as an optimistic compare-and-swap loop.
    ///
    /// `update` sees the currently stored value (or `None`) and returns the
    /// replacement; it may run several times under contention.
    pub(crate) fn cas_update<T, F>(
        tree: &sled::Tree,
        key: &str,
        entity: &str,
        mut update: F,
    ) -> Result<T, StoreError>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(Option<T>) -> T,
    {
        for attempt in 1..=MAX_CAS_RETRIES {
            let current = tree.get(key.as_bytes())?;
            let previous = current
                .as_ref()
                .map(|raw| Self::deserialize::<T>(raw))
                .transpose()?;
            let next = update(previous);
            let bytes = Self::serialize(&next)?;

            match tree.compare_and_swap(key.as_bytes(), current.as_ref(), Some(bytes))? {
                Ok(()) => return Ok(next),
                Err(_) => tracing::debug!(entity, key, attempt, "CAS conflict, retrying"),
            }
        }

        Err(StoreError::CasRetryExhausted {
            entity: entity.to_string(),
            key: key.to_string(),
            attempts: MAX_CAS_RETRIES,
        })
    }
}
