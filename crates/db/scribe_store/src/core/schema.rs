use sqlx::{Error, SqlitePool};

pub async fn init_schema(pool: &SqlitePool) -> Result<(), Error> {
	sqlx::query(
		r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL UNIQUE,
            username TEXT,
            password TEXT,
            language TEXT NOT NULL DEFAULT 'en'
        )
        "#,
	)
	.execute(pool)
	.await?;

	sqlx::query(
		r#"
        CREATE TABLE IF NOT EXISTS audios (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            content_hash TEXT NOT NULL,
            transcription TEXT,
            duration_secs REAL,
            created_at DATETIME NOT NULL,
            claimed_by TEXT,
            claimed_until INTEGER,
            UNIQUE(user_id, content_hash)
        )
        "#,
	)
	.execute(pool)
	.await?;

	sqlx::query(
		r#"
        CREATE TABLE IF NOT EXISTS transcription_attempts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            audio_id INTEGER NOT NULL UNIQUE REFERENCES audios(id) ON DELETE CASCADE,
            retries INTEGER NOT NULL DEFAULT 0,
            language TEXT NOT NULL,
            created_at DATETIME NOT NULL,
            last_retry_at DATETIME
        )
        "#,
	)
	.execute(pool)
	.await?;

	sqlx::query("CREATE INDEX IF NOT EXISTS idx_audios_user ON audios(user_id)").execute(pool).await?;
	sqlx::query("CREATE INDEX IF NOT EXISTS idx_audios_untranscribed ON audios(transcription) WHERE transcription IS NULL")
		.execute(pool)
		.await?;
	sqlx::query("CREATE INDEX IF NOT EXISTS idx_attempts_audio ON transcription_attempts(audio_id)")
		.execute(pool)
		.await?;

	Ok(())
}
