use crate::error::QueueError;
use bytes::Bytes;
use chrono::Utc;
use scribe_store::AudioRepository;
use scribe_vault::{content_digest, BlobStorage};
use std::sync::Arc;

/// Result of an upload. A dedup hit is a success, not an error: the caller
/// gets the id of the row that already owns these bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
	pub audio_id: i64,
	pub is_new_upload: bool,
}

/// Content-addressed ingestion: hash, dedup per owner, then write metadata
/// and blob atomically. A freshly inserted row with `transcription = NULL`
/// and no claim is itself the enqueued job.
pub struct Ingestor {
	repo: Arc<AudioRepository>,
	vault: Arc<dyn BlobStorage>,
}

impl Ingestor {
	#[must_use]
	pub fn new(repo: Arc<AudioRepository>, vault: Arc<dyn BlobStorage>) -> Self {
		Self { repo, vault }
	}

	///
	/// # Errors
	/// Returns `QueueError::Ingestion` if the blob write fails; the metadata
	/// row is rolled back so no audio exists without backing bytes.
	pub async fn ingest(&self, owner: i64, bytes: Bytes, duration_secs: Option<f64>) -> Result<IngestOutcome, QueueError> {
		let digest = content_digest(&bytes);

		if let Some(existing) = self.repo.find_audio_by_hash(owner, &digest).await? {
			tracing::debug!(owner, audio_id = existing.id, digest, "duplicate upload resolved to existing audio");
			return Ok(IngestOutcome {
				audio_id: existing.id,
				is_new_upload: false,
			});
		}

		let mut tx = self.repo.pool.begin().await?;
		let audio_id = match self.repo.insert_audio_with_transaction(&mut tx, owner, &digest, duration_secs, Utc::now()).await {
			Ok(id) => id,
			Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
				// Lost a race against a concurrent identical upload; the
				// winner's row is the answer.
				drop(tx);
				let existing = self
					.repo
					.find_audio_by_hash(owner, &digest)
					.await?
					.ok_or_else(|| QueueError::Ingestion("duplicate upload vanished mid-ingest".to_string()))?;
				return Ok(IngestOutcome {
					audio_id: existing.id,
					is_new_upload: false,
				});
			}
			Err(err) => return Err(err.into()),
		};

		if let Err(err) = self.vault.put(&digest, bytes).await {
			if let Err(rollback_err) = tx.rollback().await {
				tracing::warn!(error = %rollback_err, audio_id, "rollback after failed blob write also failed");
			}
			return Err(QueueError::Ingestion(format!("blob write failed: {err}")));
		}

		tx.commit().await?;
		tracing::info!(owner, audio_id, digest, "ingested new audio, transcription pending");
		Ok(IngestOutcome { audio_id, is_new_upload: true })
	}

	/// Delete an audio the caller owns. The metadata row and ledger row go
	/// first; the blob is removed only once no other audio references its
	/// hash, since identical bytes can be owned by several users.
	pub async fn delete(&self, owner: i64, audio_id: i64) -> Result<bool, QueueError> {
		let Some(audio) = self.repo.get_audio(audio_id).await? else {
			return Ok(false);
		};
		if audio.user_id != owner {
			return Ok(false);
		}

		let deleted = self.repo.delete_audio(audio_id).await?;
		// The count runs after the row delete and right before the blob
		// delete: an identical upload committing in between is visible here
		// and keeps the blob. The store's put also rewrites existing blobs,
		// so an upload that lands after this check restores the bytes itself.
		if deleted && self.repo.count_audios_with_hash(&audio.content_hash).await? == 0 {
			self.vault.delete(&audio.content_hash).await?;
			tracing::info!(owner, audio_id, digest = audio.content_hash, "deleted audio and its unreferenced blob");
		}
		Ok(deleted)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use scribe_store::NewUser;
	use scribe_vault::MemoryBlobStorage;
	use sqlx::sqlite::SqlitePoolOptions;

	async fn setup() -> (Arc<AudioRepository>, Arc<MemoryBlobStorage>, Ingestor, i64) {
		let pool = SqlitePoolOptions::new().max_connections(1).connect("sqlite::memory:").await.unwrap();
		let repo = Arc::new(AudioRepository::new(pool));
		repo.init_schema().await.unwrap();
		let owner = repo
			.create_user(NewUser {
				email: "ada@example.com".to_string(),
				username: None,
				password: None,
				language: "en".to_string(),
			})
			.await
			.unwrap();

		let vault = Arc::new(MemoryBlobStorage::new());
		let ingestor = Ingestor::new(repo.clone(), vault.clone());
		(repo, vault, ingestor, owner)
	}

	#[tokio::test]
	async fn test_new_upload_stores_row_and_blob() {
		let (repo, vault, ingestor, owner) = setup().await;
		let outcome = ingestor.ingest(owner, Bytes::from_static(b"voice note"), Some(2.5)).await.unwrap();

		assert!(outcome.is_new_upload);
		let audio = repo.get_audio(outcome.audio_id).await.unwrap().unwrap();
		assert!(audio.transcription.is_none());
		assert_eq!(audio.duration_secs, Some(2.5));
		assert!(vault.exists(&audio.content_hash).await.unwrap());
	}

	#[tokio::test]
	async fn test_reingest_is_idempotent() {
		let (repo, _vault, ingestor, owner) = setup().await;
		let bytes = Bytes::from_static(b"same bytes");

		let first = ingestor.ingest(owner, bytes.clone(), None).await.unwrap();
		let second = ingestor.ingest(owner, bytes, None).await.unwrap();

		assert!(first.is_new_upload);
		assert!(!second.is_new_upload);
		assert_eq!(first.audio_id, second.audio_id);
		assert_eq!(repo.get_audios_for_user(owner).await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn test_same_bytes_different_owner_is_a_new_upload() {
		let (repo, _vault, ingestor, owner) = setup().await;
		let other = repo
			.create_user(NewUser {
				email: "grace@example.com".to_string(),
				username: None,
				password: None,
				language: "en".to_string(),
			})
			.await
			.unwrap();

		let bytes = Bytes::from_static(b"shared bytes");
		let first = ingestor.ingest(owner, bytes.clone(), None).await.unwrap();
		let second = ingestor.ingest(other, bytes, None).await.unwrap();

		assert!(first.is_new_upload);
		assert!(second.is_new_upload);
		assert_ne!(first.audio_id, second.audio_id);
	}

	#[tokio::test]
	async fn test_failed_blob_write_rolls_back_metadata() {
		let (repo, vault, ingestor, owner) = setup().await;
		vault.fail_puts(true);

		let err = ingestor.ingest(owner, Bytes::from_static(b"doomed"), None).await.unwrap_err();
		assert!(matches!(err, QueueError::Ingestion(_)));

		// No orphaned row, no phantom job.
		assert!(repo.get_audios_for_user(owner).await.unwrap().is_empty());
		assert!(repo.list_due_candidates(Utc::now()).await.unwrap().is_empty());
		assert!(vault.is_empty().await);

		// The same bytes ingest cleanly once storage recovers.
		vault.fail_puts(false);
		let outcome = ingestor.ingest(owner, Bytes::from_static(b"doomed"), None).await.unwrap();
		assert!(outcome.is_new_upload);
	}

	#[tokio::test]
	async fn test_delete_removes_row_and_blob() {
		let (repo, vault, ingestor, owner) = setup().await;
		let outcome = ingestor.ingest(owner, Bytes::from_static(b"disposable"), None).await.unwrap();

		assert!(ingestor.delete(owner, outcome.audio_id).await.unwrap());
		assert!(repo.get_audio(outcome.audio_id).await.unwrap().is_none());
		assert!(vault.is_empty().await);

		// Already gone: a second delete is a no-op.
		assert!(!ingestor.delete(owner, outcome.audio_id).await.unwrap());
	}

	#[tokio::test]
	async fn test_reingest_after_delete_restores_the_blob() {
		let (repo, vault, ingestor, owner) = setup().await;
		let bytes = Bytes::from_static(b"back again");

		let first = ingestor.ingest(owner, bytes.clone(), None).await.unwrap();
		assert!(ingestor.delete(owner, first.audio_id).await.unwrap());
		assert!(vault.is_empty().await);

		// The same bytes uploaded again get a fresh row with backing bytes,
		// never a row pointing at a deleted blob.
		let second = ingestor.ingest(owner, bytes, None).await.unwrap();
		assert!(second.is_new_upload);
		let audio = repo.get_audio(second.audio_id).await.unwrap().unwrap();
		assert!(vault.exists(&audio.content_hash).await.unwrap());
	}

	#[tokio::test]
	async fn test_delete_keeps_blob_shared_with_another_owner() {
		let (repo, vault, ingestor, owner) = setup().await;
		let other = repo
			.create_user(NewUser {
				email: "grace@example.com".to_string(),
				username: None,
				password: None,
				language: "en".to_string(),
			})
			.await
			.unwrap();

		let bytes = Bytes::from_static(b"shared blob");
		let mine = ingestor.ingest(owner, bytes.clone(), None).await.unwrap();
		let theirs = ingestor.ingest(other, bytes, None).await.unwrap();

		assert!(ingestor.delete(owner, mine.audio_id).await.unwrap());
		let survivor = repo.get_audio(theirs.audio_id).await.unwrap().unwrap();
		assert!(vault.exists(&survivor.content_hash).await.unwrap());
	}

	#[tokio::test]
	async fn test_delete_refuses_foreign_audio() {
		let (repo, _vault, ingestor, owner) = setup().await;
		let other = repo
			.create_user(NewUser {
				email: "mallory@example.com".to_string(),
				username: None,
				password: None,
				language: "en".to_string(),
			})
			.await
			.unwrap();

		let outcome = ingestor.ingest(owner, Bytes::from_static(b"private"), None).await.unwrap();
		assert!(!ingestor.delete(other, outcome.audio_id).await.unwrap());
		assert!(repo.get_audio(outcome.audio_id).await.unwrap().is_some());
	}
}
