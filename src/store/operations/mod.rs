pub mod answers;
pub mod catalog;
pub mod mastery;
pub mod mistakes;
pub mod review_history;
