pub mod config;
pub mod error;
pub mod ingest;
pub mod policy;
pub mod pool;
pub mod scheduler;
pub mod stt;
pub mod worker;
pub mod writer;

pub use config::QueueConfig;
pub use error::QueueError;
pub use ingest::{IngestOutcome, Ingestor};
pub use policy::{RetryDecision, RetryPolicy};
pub use pool::WorkerPool;
pub use scheduler::{RunStats, Scheduler};
pub use worker::Worker;
pub use stt::{MockSpeechToText, SpeechToText, TranscriptionError};
pub use writer::{CommitOutcome, TranscriptWriter};
