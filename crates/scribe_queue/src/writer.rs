use crate::error::QueueError;
use scribe_store::AudioRepository;
use std::sync::Arc;

/// What a commit attempt did. `AlreadyCommitted` means another worker won the
/// race; the stored transcript is kept and the new one is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
	Committed,
	AlreadyCommitted,
}

/// Commits transcripts. First writer wins: the transcript column is set only
/// while it is NULL, and the failure ledger row is cleared in the same
/// transaction.
pub struct TranscriptWriter {
	repo: Arc<AudioRepository>,
}

impl TranscriptWriter {
	#[must_use]
	pub fn new(repo: Arc<AudioRepository>) -> Self {
		Self { repo }
	}

	pub async fn commit(&self, audio_id: i64, transcript: &str) -> Result<CommitOutcome, QueueError> {
		if self.repo.commit_transcript(audio_id, transcript).await? {
			tracing::info!(audio_id, chars = transcript.len(), "transcript committed");
			Ok(CommitOutcome::Committed)
		} else {
			tracing::debug!(audio_id, "transcript already committed, dropping duplicate");
			Ok(CommitOutcome::AlreadyCommitted)
		}
	}
}
