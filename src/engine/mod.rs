pub mod bkt;
pub mod config;
pub mod repository;
pub mod scheduler;
pub mod service;
pub mod signals;
pub mod spaced_repetition;
pub mod tracker;

use thiserror::Error;

use crate::store::StoreError;

pub use config::EngineConfig;
pub use scheduler::{PracticeSelection, Strategy};
pub use service::{AnswerResult, AnswerSubmission, PracticeEngine, SubmitOutcome};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{operation} timed out after {timeout_ms} ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },
    #[error("temporarily unavailable: {0}")]
    Unavailable(String),
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),
}

impl EngineError {
    /// Whether the caller should be told to retry rather than fix the request.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Timeout { .. } | EngineError::Unavailable(_) => true,
            EngineError::Store(e) => e.is_transient(),
            EngineError::InvalidConfig(_) => false,
        }
    }
}
