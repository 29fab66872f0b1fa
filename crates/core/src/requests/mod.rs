pub mod machine;
pub mod service;

pub use machine::SubmissionOutcome;
pub use service::{ApprovalService, HistoryEntry, RequestHistory, SweepReport};
