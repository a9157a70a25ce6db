pub const MASTERY_STATES: &str = "mastery_states";
pub const TOPICS: &str = "topics";
pub const ITEMS: &str = "items";
pub const ITEMS_BY_TOPIC: &str = "items_by_topic";
pub const REVIEW_HISTORY: &str = "review_history";
pub const MISTAKE_BOOK: &str = "mistake_book";
pub const ANSWER_LOG: &str = "answer_log";
pub const META: &str = "meta";
