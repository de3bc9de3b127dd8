pub mod format;
pub mod ingest;
pub mod progress;
pub mod search;

pub use format::format_feedback;
pub use ingest::{
    flatten, load_import_file, ImportDocument, ImportSummary, IngestService, QuestionAnswer,
    SurveyResponse,
};
pub use search::{CorpusStatus, FeedbackAnswer, FeedbackSearchService, SearchService};
