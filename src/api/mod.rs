pub mod client;
pub mod types;

pub use client::{ApiClient, StatusFetcher, TranscriptionWriter};
pub use types::{
    CancelOutcome, LineEdit, TaskFilter, TaskList, TaskProgress, TaskSnapshot, TaskStatus,
    TranscriptionLine, TranscriptionRecord, TranscriptionSource,
};
