use crate::error::QueueError;
use crate::policy::{RetryDecision, RetryPolicy};
use crate::stt::{SpeechToText, TranscriptionError};
use crate::writer::TranscriptWriter;
use chrono::Utc;
use scribe_store::{AudioRepository, DueCandidate};
use scribe_vault::BlobStorage;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Tally of one scheduling pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
	pub examined: usize,
	pub completed: usize,
	pub retried: usize,
	pub exhausted: usize,
	pub skipped: usize,
}

enum JobOutcome {
	Completed,
	Retried,
	Exhausted,
}

/// Polls the store for untranscribed audios, claims them one at a time, and
/// runs them through the speech-to-text engine. Failure bookkeeping goes
/// through the ledger; the backoff arithmetic lives in [`RetryPolicy`].
pub struct Scheduler {
	repo: Arc<AudioRepository>,
	vault: Arc<dyn BlobStorage>,
	stt: Arc<dyn SpeechToText>,
	writer: TranscriptWriter,
	policy: RetryPolicy,
	claim_lease: Duration,
	worker_id: String,
}

impl Scheduler {
	#[must_use]
	pub fn new(repo: Arc<AudioRepository>, vault: Arc<dyn BlobStorage>, stt: Arc<dyn SpeechToText>, policy: RetryPolicy, claim_lease: Duration) -> Self {
		let writer = TranscriptWriter::new(repo.clone());
		Self {
			repo,
			vault,
			stt,
			writer,
			policy,
			claim_lease,
			worker_id: Uuid::new_v4().to_string(),
		}
	}

	#[must_use]
	pub fn worker_id(&self) -> &str {
		&self.worker_id
	}

	/// One scheduling pass: examine every untranscribed audio, skip the ones
	/// still inside their backoff window or claimed elsewhere, and run the
	/// rest. Per-job failures are absorbed into the ledger; only store-level
	/// errors bubble up.
	pub async fn run_due_jobs(&self) -> Result<RunStats, QueueError> {
		let now = Utc::now();
		let candidates = self.repo.list_due_candidates(now).await?;
		let mut stats = RunStats::default();

		for candidate in candidates {
			stats.examined += 1;

			if let Some(attempt) = &candidate.attempt {
				if !self.policy.is_due(attempt, now) {
					stats.skipped += 1;
					continue;
				}
			}

			let lease_until = now + chrono::Duration::from_std(self.claim_lease).unwrap_or_else(|_| chrono::Duration::seconds(300));
			if !self.repo.claim_audio(candidate.audio_id, &self.worker_id, now, lease_until).await? {
				stats.skipped += 1;
				continue;
			}

			// The snapshot is stale once the claim is won: another worker may
			// have failed this job in the meantime. Only the fresh ledger row
			// decides whether it still runs, and with what failure count.
			let attempt = self.repo.get_attempt(candidate.audio_id).await?;
			if attempt.as_ref().is_some_and(|a| !self.policy.is_due(a, now)) {
				if !self.repo.release_claim(candidate.audio_id, &self.worker_id).await? {
					tracing::warn!(audio_id = candidate.audio_id, worker = %self.worker_id, "claim was lost while skipping");
				}
				stats.skipped += 1;
				continue;
			}

			let outcome = self.process(&candidate, attempt.as_ref()).await;
			if !self.repo.release_claim(candidate.audio_id, &self.worker_id).await? {
				tracing::warn!(audio_id = candidate.audio_id, worker = %self.worker_id, "claim was lost while processing");
			}

			match outcome? {
				JobOutcome::Completed => stats.completed += 1,
				JobOutcome::Retried => stats.retried += 1,
				JobOutcome::Exhausted => stats.exhausted += 1,
			}
		}

		Ok(stats)
	}

	/// Clear the ledger row so an exhausted audio becomes eligible again on
	/// the next pass. Returns `false` when there was nothing to requeue.
	pub async fn requeue(&self, audio_id: i64) -> Result<bool, QueueError> {
		let reset = self.repo.reset_attempt(audio_id).await?;
		if reset {
			tracing::info!(audio_id, "exhausted job requeued");
		}
		Ok(reset)
	}

	/// Ledger rows at or above the retry ceiling, i.e. jobs that need manual
	/// intervention.
	pub async fn exhausted_jobs(&self) -> Result<Vec<scribe_store::DbTranscriptionAttempt>, QueueError> {
		Ok(self.repo.list_exhausted(self.policy.ceiling()).await?)
	}

	async fn process(&self, candidate: &DueCandidate, attempt: Option<&scribe_store::DbTranscriptionAttempt>) -> Result<JobOutcome, QueueError> {
		let language = match attempt {
			Some(attempt) => attempt.language.clone(),
			None => {
				self
					.repo
					.get_user(candidate.user_id)
					.await?
					.ok_or(QueueError::UnknownOwner(candidate.user_id))?
					.language
			}
		};
		let prior = attempt.map_or(0, |a| a.retries);

		let audio = match self.vault.get(&candidate.content_hash).await {
			Ok(bytes) => bytes,
			Err(err) => {
				tracing::warn!(audio_id = candidate.audio_id, error = %err, "blob fetch failed, treating as transient");
				return self.note_failure(candidate.audio_id, prior, &language).await;
			}
		};

		// The engine call is the slow part; no DB state is held across it
		// beyond the claim lease.
		match self.stt.transcribe(&audio, &language).await {
			Ok(transcript) => {
				self.writer.commit(candidate.audio_id, &transcript).await?;
				Ok(JobOutcome::Completed)
			}
			Err(TranscriptionError::Transient(reason)) => {
				tracing::warn!(audio_id = candidate.audio_id, language, reason, "transcription failed transiently");
				self.note_failure(candidate.audio_id, prior, &language).await
			}
			Err(TranscriptionError::Permanent(reason)) => {
				tracing::error!(audio_id = candidate.audio_id, language, reason, "transcription failed permanently");
				self.repo.pin_exhausted(candidate.audio_id, &language, self.policy.ceiling(), Utc::now()).await?;
				Ok(JobOutcome::Exhausted)
			}
		}
	}

	async fn note_failure(&self, audio_id: i64, prior: i64, language: &str) -> Result<JobOutcome, QueueError> {
		let now = Utc::now();
		self.repo.record_failure(audio_id, language, now).await?;

		match self.policy.decide(prior, now) {
			RetryDecision::Retry { next_eligible_at } => {
				tracing::info!(audio_id, retries = prior + 1, next_eligible_at = %next_eligible_at, "job scheduled for retry");
				Ok(JobOutcome::Retried)
			}
			RetryDecision::Exhaust => {
				tracing::error!(audio_id, retries = prior + 1, "retry ceiling reached, job exhausted");
				Ok(JobOutcome::Exhausted)
			}
		}
	}
}
