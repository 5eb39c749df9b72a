use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DbUser {
	pub id: i64,
	pub email: String,
	pub username: Option<String>,
	pub password: Option<String>,
	pub language: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
	pub email: String,
	pub username: Option<String>,
	pub password: Option<String>,
	pub language: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DbAudio {
	pub id: i64,
	pub user_id: i64,
	pub content_hash: String,
	pub transcription: Option<String>,
	pub duration_secs: Option<f64>,
	pub created_at: DateTime<Utc>,
	pub claimed_by: Option<String>,
	/// Lease expiry as unix millis. Kept as an integer so the claim
	/// compare-and-swap can compare it inside SQL.
	pub claimed_until: Option<i64>,
}

/// One mutable ledger row per audio. Present only while the audio has
/// outstanding transcription failures; removed on success and cascaded
/// away with its audio.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DbTranscriptionAttempt {
	pub id: i64,
	pub audio_id: i64,
	pub retries: i64,
	pub language: String,
	pub created_at: DateTime<Utc>,
	pub last_retry_at: Option<DateTime<Utc>>,
}

/// An untranscribed audio with its optional failure ledger row, as selected
/// for scheduling. Retry-eligibility filtering happens in the caller.
#[derive(Debug, Clone)]
pub struct DueCandidate {
	pub audio_id: i64,
	pub user_id: i64,
	pub content_hash: String,
	pub attempt: Option<DbTranscriptionAttempt>,
}
