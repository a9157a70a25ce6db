pub fn mastery_key(learner_id: &str) -> String {
    format!("learner:{}:mastery", learner_id)
}

pub fn wrong_freq_key(learner_id: &str) -> String {
    format!("learner:{}:wrong_freq", learner_id)
}

pub fn weak_topics_key(learner_id: &str) -> String {
    format!("learner:{}:weak_topics", learner_id)
}

pub fn review_due_key(learner_id: &str) -> String {
    format!("learner:{}:review_due", learner_id)
}

pub fn drill_mode_key(learner_id: &str) -> String {
    format!("learner:{}:drill_mode", learner_id)
}
