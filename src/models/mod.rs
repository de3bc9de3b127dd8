pub mod feedback;

pub use feedback::{FeedbackCreate, FeedbackRecord, PendingRecord, ScoredText, UpsertStats};
