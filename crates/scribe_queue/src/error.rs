use scribe_vault::BlobError;
use thiserror::Error;

/// Engine failures never surface here: the scheduler absorbs both kinds of
/// [`crate::stt::TranscriptionError`] into the ledger.
#[derive(Error, Debug)]
pub enum QueueError {
	/// Upload could not be persisted. Metadata and blob writes are rolled
	/// back together, so nothing is left behind when this surfaces.
	#[error("ingestion failed: {0}")]
	Ingestion(String),
	#[error("store error: {0}")]
	Store(#[from] sqlx::Error),
	#[error("blob error: {0}")]
	Blob(#[from] BlobError),
	#[error("unknown owner for audio: user {0}")]
	UnknownOwner(i64),
	#[error("metrics error: {0}")]
	Metrics(#[from] prometheus::Error),
}
