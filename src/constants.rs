/// Maximum compare-and-swap attempts for a single durable upsert.
pub const MAX_CAS_RETRIES: u32 = 20;

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Upper bound accepted for a single answer's duration.
pub const MAX_ANSWER_DURATION_SECS: u32 = 24 * 60 * 60;

/// Default page size for mistake and answer listings.
pub const DEFAULT_LIST_LIMIT: usize = 50;

pub const MAX_LIST_LIMIT: usize = 500;

/// Mastery at or above this is reported as MASTERED.
pub const MASTERED_THRESHOLD: f64 = 0.8;

/// Mastery at or above this (and below mastered) is reported as LEARNING.
pub const LEARNING_THRESHOLD: f64 = 0.4;
