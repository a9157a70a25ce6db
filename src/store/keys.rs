use crate::store::StoreError;

const KEY_SEPARATOR: char = ':';

/// Identifiers become sled key segments, so they must be non-empty and free of the separator.
pub fn validate_id(entity: &str, id: &str) -> Result<(), StoreError> {
    if id.trim().is_empty() {
        return Err(StoreError::Validation(format!("{entity} id must not be empty")));
    }
    if id.contains(KEY_SEPARATOR) {
        return Err(StoreError::Validation(format!(
            "{entity} id must not contain '{KEY_SEPARATOR}': {id}"
        )));
    }
    Ok(())
}

pub fn mastery_key(learner_id: &str, topic_id: &str) -> Result<String, StoreError> {
    validate_id("learner", learner_id)?;
    validate_id("topic", topic_id)?;
    Ok(format!("{learner_id}:{topic_id}"))
}

pub fn learner_prefix(learner_id: &str) -> Result<String, StoreError> {
    validate_id("learner", learner_id)?;
    Ok(format!("{learner_id}:"))
}

pub fn topic_key(topic_id: &str) -> Result<String, StoreError> {
    validate_id("topic", topic_id)?;
    Ok(topic_id.to_string())
}

pub fn item_key(item_id: &str) -> Result<String, StoreError> {
    validate_id("item", item_id)?;
    Ok(item_id.to_string())
}

pub fn item_topic_index_key(topic_id: &str, item_id: &str) -> Result<String, StoreError> {
    validate_id("topic", topic_id)?;
    validate_id("item", item_id)?;
    Ok(format!("{topic_id}:{item_id}"))
}

pub fn item_topic_index_prefix(topic_id: &str) -> Result<String, StoreError> {
    validate_id("topic", topic_id)?;
    Ok(format!("{topic_id}:"))
}

pub fn review_history_key(learner_id: &str, item_id: &str) -> Result<String, StoreError> {
    validate_id("learner", learner_id)?;
    validate_id("item", item_id)?;
    Ok(format!("{learner_id}:{item_id}"))
}

pub fn mistake_key(learner_id: &str, item_id: &str) -> Result<String, StoreError> {
    validate_id("learner", learner_id)?;
    validate_id("item", item_id)?;
    Ok(format!("{learner_id}:{item_id}"))
}

/// Newest answers sort first within a learner's prefix.
pub fn answer_key(learner_id: &str, timestamp_ms: i64, answer_id: &str) -> Result<String, StoreError> {
    validate_id("learner", learner_id)?;
    let ts = timestamp_ms.max(0) as u64;
    let reverse_ts = u64::MAX - ts;
    Ok(format!("{learner_id}:{reverse_ts:020}:{answer_id}"))
}

/// Splits a `{learner}:{rest}` key into its learner segment.
pub fn learner_of(key: &[u8]) -> Option<String> {
    let sep = key.iter().position(|b| *b == KEY_SEPARATOR as u8)?;
    std::str::from_utf8(&key[..sep]).ok().map(str::to_string)
}
