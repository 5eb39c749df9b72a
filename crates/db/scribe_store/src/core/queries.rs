use crate::core::model::{DbAudio, DbTranscriptionAttempt, DbUser, DueCandidate, NewUser};
use chrono::{DateTime, Utc};
use sqlx::{Error, FromRow, Sqlite, SqlitePool, Transaction};

pub async fn insert_user(pool: &SqlitePool, user: NewUser) -> Result<i64, Error> {
	let id: (i64,) = sqlx::query_as("INSERT INTO users (email, username, password, language) VALUES (?, ?, ?, ?) RETURNING id")
		.bind(user.email.to_lowercase())
		.bind(user.username)
		.bind(user.password)
		.bind(user.language)
		.fetch_one(pool)
		.await?;
	Ok(id.0)
}

pub async fn get_user(pool: &SqlitePool, id: i64) -> Result<Option<DbUser>, Error> {
	sqlx::query_as("SELECT id, email, username, password, language FROM users WHERE id = ?")
		.bind(id)
		.fetch_optional(pool)
		.await
}

pub async fn find_user_by_email(pool: &SqlitePool, email: &str) -> Result<Option<DbUser>, Error> {
	sqlx::query_as("SELECT id, email, username, password, language FROM users WHERE email = ?")
		.bind(email.to_lowercase())
		.fetch_optional(pool)
		.await
}

pub async fn insert_audio(
	tx: &mut Transaction<'_, Sqlite>,
	user_id: i64,
	content_hash: &str,
	duration_secs: Option<f64>,
	created_at: DateTime<Utc>,
) -> Result<i64, Error> {
	let id: (i64,) = sqlx::query_as("INSERT INTO audios (user_id, content_hash, created_at, duration_secs) VALUES (?, ?, ?, ?) RETURNING id")
		.bind(user_id)
		.bind(content_hash)
		.bind(created_at)
		.bind(duration_secs)
		.fetch_one(&mut **tx)
		.await?;
	Ok(id.0)
}

pub async fn get_audio(pool: &SqlitePool, audio_id: i64) -> Result<Option<DbAudio>, Error> {
	sqlx::query_as(
		"SELECT id, user_id, content_hash, transcription, duration_secs, created_at, claimed_by, claimed_until
         FROM audios
         WHERE id = ?",
	)
	.bind(audio_id)
	.fetch_optional(pool)
	.await
}

pub async fn find_audio_by_hash(pool: &SqlitePool, user_id: i64, content_hash: &str) -> Result<Option<DbAudio>, Error> {
	sqlx::query_as(
		"SELECT id, user_id, content_hash, transcription, duration_secs, created_at, claimed_by, claimed_until
         FROM audios
         WHERE user_id = ? AND content_hash = ?",
	)
	.bind(user_id)
	.bind(content_hash)
	.fetch_optional(pool)
	.await
}

pub async fn get_audios_for_user(pool: &SqlitePool, user_id: i64) -> Result<Vec<DbAudio>, Error> {
	sqlx::query_as(
		"SELECT id, user_id, content_hash, transcription, duration_secs, created_at, claimed_by, claimed_until
         FROM audios
         WHERE user_id = ?
         ORDER BY id",
	)
	.bind(user_id)
	.fetch_all(pool)
	.await
}

pub async fn delete_audio(pool: &SqlitePool, audio_id: i64) -> Result<bool, Error> {
	let result = sqlx::query("DELETE FROM audios WHERE id = ?").bind(audio_id).execute(pool).await?;
	Ok(result.rows_affected() == 1)
}

/// How many audio rows (across all users) still reference a content hash.
/// Zero means the backing blob has no remaining owner.
pub async fn count_audios_with_hash(pool: &SqlitePool, content_hash: &str) -> Result<i64, Error> {
	let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM audios WHERE content_hash = ?")
		.bind(content_hash)
		.fetch_one(pool)
		.await?;
	Ok(count.0)
}

/// Set the transcription only if it has never been set. Returns whether the
/// write happened; `false` means the audio was already transcribed (or does
/// not exist) and the caller treats the commit as a no-op.
pub async fn set_transcription_if_unset(tx: &mut Transaction<'_, Sqlite>, audio_id: i64, transcription: &str) -> Result<bool, Error> {
	let result = sqlx::query("UPDATE audios SET transcription = ? WHERE id = ? AND transcription IS NULL")
		.bind(transcription)
		.bind(audio_id)
		.execute(&mut **tx)
		.await?;
	Ok(result.rows_affected() == 1)
}

pub async fn get_attempt(pool: &SqlitePool, audio_id: i64) -> Result<Option<DbTranscriptionAttempt>, Error> {
	sqlx::query_as(
		"SELECT id, audio_id, retries, language, created_at, last_retry_at
         FROM transcription_attempts
         WHERE audio_id = ?",
	)
	.bind(audio_id)
	.fetch_optional(pool)
	.await
}

/// Record one more failed attempt: first failure inserts the ledger row with
/// `retries = 1`, later failures increment in place and stamp the retry time.
pub async fn upsert_failed_attempt(pool: &SqlitePool, audio_id: i64, language: &str, now: DateTime<Utc>) -> Result<(), Error> {
	sqlx::query(
		"INSERT INTO transcription_attempts (audio_id, retries, language, created_at, last_retry_at)
         VALUES (?, 1, ?, ?, ?)
         ON CONFLICT(audio_id) DO UPDATE SET
             retries = retries + 1,
             last_retry_at = excluded.last_retry_at",
	)
	.bind(audio_id)
	.bind(language)
	.bind(now)
	.bind(now)
	.execute(pool)
	.await?;
	Ok(())
}

/// Pin the ledger row at the retry ceiling so the audio is never selected
/// again. Used when the transcription capability reports a permanent error.
pub async fn pin_attempt_at_ceiling(pool: &SqlitePool, audio_id: i64, language: &str, ceiling: i64, now: DateTime<Utc>) -> Result<(), Error> {
	sqlx::query(
		"INSERT INTO transcription_attempts (audio_id, retries, language, created_at, last_retry_at)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(audio_id) DO UPDATE SET
             retries = MAX(retries, excluded.retries),
             last_retry_at = excluded.last_retry_at",
	)
	.bind(audio_id)
	.bind(ceiling)
	.bind(language)
	.bind(now)
	.bind(now)
	.execute(pool)
	.await?;
	Ok(())
}

pub async fn delete_attempt(tx: &mut Transaction<'_, Sqlite>, audio_id: i64) -> Result<bool, Error> {
	let result = sqlx::query("DELETE FROM transcription_attempts WHERE audio_id = ?")
		.bind(audio_id)
		.execute(&mut **tx)
		.await?;
	Ok(result.rows_affected() == 1)
}

/// Manual requeue: zero the retry counter so the scheduler picks the audio
/// up again on its next pass.
pub async fn reset_attempt(pool: &SqlitePool, audio_id: i64) -> Result<bool, Error> {
	let result = sqlx::query("UPDATE transcription_attempts SET retries = 0, last_retry_at = NULL WHERE audio_id = ?")
		.bind(audio_id)
		.execute(pool)
		.await?;
	Ok(result.rows_affected() == 1)
}

pub async fn list_attempts(pool: &SqlitePool) -> Result<Vec<DbTranscriptionAttempt>, Error> {
	sqlx::query_as(
		"SELECT id, audio_id, retries, language, created_at, last_retry_at
         FROM transcription_attempts
         ORDER BY id",
	)
	.fetch_all(pool)
	.await
}

pub async fn list_exhausted(pool: &SqlitePool, ceiling: i64) -> Result<Vec<DbTranscriptionAttempt>, Error> {
	sqlx::query_as(
		"SELECT id, audio_id, retries, language, created_at, last_retry_at
         FROM transcription_attempts
         WHERE retries >= ?
         ORDER BY id",
	)
	.bind(ceiling)
	.fetch_all(pool)
	.await
}

/// Compare-and-swap claim. Wins only if the audio is still untranscribed and
/// no live lease is held; a lost race simply affects zero rows.
pub async fn claim_audio(
	pool: &SqlitePool,
	audio_id: i64,
	worker_id: &str,
	now: DateTime<Utc>,
	lease_until: DateTime<Utc>,
) -> Result<bool, Error> {
	let result = sqlx::query(
		"UPDATE audios
         SET claimed_by = ?, claimed_until = ?
         WHERE id = ?
           AND transcription IS NULL
           AND (claimed_until IS NULL OR claimed_until <= ?)",
	)
	.bind(worker_id)
	.bind(lease_until.timestamp_millis())
	.bind(audio_id)
	.bind(now.timestamp_millis())
	.execute(pool)
	.await?;
	Ok(result.rows_affected() == 1)
}

/// Release only the caller's own claim; a lease that already expired and was
/// re-claimed by another worker is left alone.
pub async fn release_claim(pool: &SqlitePool, audio_id: i64, worker_id: &str) -> Result<bool, Error> {
	let result = sqlx::query("UPDATE audios SET claimed_by = NULL, claimed_until = NULL WHERE id = ? AND claimed_by = ?")
		.bind(audio_id)
		.bind(worker_id)
		.execute(pool)
		.await?;
	Ok(result.rows_affected() == 1)
}

#[derive(FromRow)]
struct DueRow {
	audio_id: i64,
	user_id: i64,
	content_hash: String,
	attempt_id: Option<i64>,
	retries: Option<i64>,
	language: Option<String>,
	attempt_created_at: Option<DateTime<Utc>>,
	last_retry_at: Option<DateTime<Utc>>,
}

/// Every untranscribed audio not under a live claim, with its optional
/// failure ledger row. Backoff and ceiling filtering belong to the policy
/// layer, not to SQL.
pub async fn list_due_candidates(pool: &SqlitePool, now: DateTime<Utc>) -> Result<Vec<DueCandidate>, Error> {
	let rows: Vec<DueRow> = sqlx::query_as(
		"SELECT a.id AS audio_id,
                a.user_id AS user_id,
                a.content_hash AS content_hash,
                t.id AS attempt_id,
                t.retries AS retries,
                t.language AS language,
                t.created_at AS attempt_created_at,
                t.last_retry_at AS last_retry_at
         FROM audios a
         LEFT JOIN transcription_attempts t ON t.audio_id = a.id
         WHERE a.transcription IS NULL
           AND (a.claimed_until IS NULL OR a.claimed_until <= ?)
         ORDER BY a.id",
	)
	.bind(now.timestamp_millis())
	.fetch_all(pool)
	.await?;

	Ok(
		rows
			.into_iter()
			.map(|row| {
				let attempt = match (row.attempt_id, row.retries, row.language, row.attempt_created_at) {
					(Some(id), Some(retries), Some(language), Some(created_at)) => Some(DbTranscriptionAttempt {
						id,
						audio_id: row.audio_id,
						retries,
						language,
						created_at,
						last_retry_at: row.last_retry_at,
					}),
					_ => None,
				};
				DueCandidate {
					audio_id: row.audio_id,
					user_id: row.user_id,
					content_hash: row.content_hash,
					attempt,
				}
			})
			.collect(),
	)
}
