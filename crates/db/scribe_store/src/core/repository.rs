use super::model::{DbAudio, DbTranscriptionAttempt, DbUser, DueCandidate, NewUser};
use super::queries;
use super::schema;
use chrono::{DateTime, Utc};
use sqlx::{Error, SqlitePool};

pub struct AudioRepository {
	pub pool: SqlitePool,
}

impl AudioRepository {
	#[must_use]
	pub const fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	pub async fn init_schema(&self) -> Result<(), Error> {
		schema::init_schema(&self.pool).await
	}

	pub async fn create_user(&self, user: NewUser) -> Result<i64, Error> {
		queries::insert_user(&self.pool, user).await
	}

	pub async fn get_user(&self, id: i64) -> Result<Option<DbUser>, Error> {
		queries::get_user(&self.pool, id).await
	}

	pub async fn find_user_by_email(&self, email: &str) -> Result<Option<DbUser>, Error> {
		queries::find_user_by_email(&self.pool, email).await
	}

	/// Insert an audio row inside a caller-held transaction. The caller pairs
	/// this with the blob write and commits only once both have succeeded.
	pub async fn insert_audio_with_transaction(
		&self,
		tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
		user_id: i64,
		content_hash: &str,
		duration_secs: Option<f64>,
		created_at: DateTime<Utc>,
	) -> Result<i64, Error> {
		queries::insert_audio(tx, user_id, content_hash, duration_secs, created_at).await
	}

	pub async fn get_audio(&self, audio_id: i64) -> Result<Option<DbAudio>, Error> {
		queries::get_audio(&self.pool, audio_id).await
	}

	pub async fn find_audio_by_hash(&self, user_id: i64, content_hash: &str) -> Result<Option<DbAudio>, Error> {
		queries::find_audio_by_hash(&self.pool, user_id, content_hash).await
	}

	pub async fn get_audios_for_user(&self, user_id: i64) -> Result<Vec<DbAudio>, Error> {
		queries::get_audios_for_user(&self.pool, user_id).await
	}

	pub async fn count_audios_with_hash(&self, content_hash: &str) -> Result<i64, Error> {
		queries::count_audios_with_hash(&self.pool, content_hash).await
	}

	/// Delete the audio and its ledger row together. The schema also cascades,
	/// but doing it in one transaction keeps the pair atomic under any pragma.
	pub async fn delete_audio(&self, audio_id: i64) -> Result<bool, Error> {
		let mut tx = self.pool.begin().await?;
		queries::delete_attempt(&mut tx, audio_id).await?;
		let deleted = sqlx::query("DELETE FROM audios WHERE id = ?").bind(audio_id).execute(&mut *tx).await?.rows_affected() == 1;
		tx.commit().await?;
		Ok(deleted)
	}

	/// Persist a transcript and clear the failure ledger atomically. Returns
	/// `false` when the audio was already transcribed, in which case nothing
	/// is written and the caller reports a no-op.
	pub async fn commit_transcript(&self, audio_id: i64, transcription: &str) -> Result<bool, Error> {
		let mut tx = self.pool.begin().await?;
		let updated = queries::set_transcription_if_unset(&mut tx, audio_id, transcription).await?;
		if updated {
			queries::delete_attempt(&mut tx, audio_id).await?;
		}
		tx.commit().await?;
		Ok(updated)
	}

	pub async fn record_failure(&self, audio_id: i64, language: &str, now: DateTime<Utc>) -> Result<(), Error> {
		queries::upsert_failed_attempt(&self.pool, audio_id, language, now).await
	}

	pub async fn pin_exhausted(&self, audio_id: i64, language: &str, ceiling: i64, now: DateTime<Utc>) -> Result<(), Error> {
		queries::pin_attempt_at_ceiling(&self.pool, audio_id, language, ceiling, now).await
	}

	pub async fn get_attempt(&self, audio_id: i64) -> Result<Option<DbTranscriptionAttempt>, Error> {
		queries::get_attempt(&self.pool, audio_id).await
	}

	pub async fn reset_attempt(&self, audio_id: i64) -> Result<bool, Error> {
		queries::reset_attempt(&self.pool, audio_id).await
	}

	pub async fn list_attempts(&self) -> Result<Vec<DbTranscriptionAttempt>, Error> {
		queries::list_attempts(&self.pool).await
	}

	pub async fn list_exhausted(&self, ceiling: i64) -> Result<Vec<DbTranscriptionAttempt>, Error> {
		queries::list_exhausted(&self.pool, ceiling).await
	}

	pub async fn claim_audio(&self, audio_id: i64, worker_id: &str, now: DateTime<Utc>, lease_until: DateTime<Utc>) -> Result<bool, Error> {
		queries::claim_audio(&self.pool, audio_id, worker_id, now, lease_until).await
	}

	pub async fn release_claim(&self, audio_id: i64, worker_id: &str) -> Result<bool, Error> {
		queries::release_claim(&self.pool, audio_id, worker_id).await
	}

	pub async fn list_due_candidates(&self, now: DateTime<Utc>) -> Result<Vec<DueCandidate>, Error> {
		queries::list_due_candidates(&self.pool, now).await
	}
}
