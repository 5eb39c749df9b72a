use async_trait::async_trait;
use std::collections::VecDeque;
use thiserror::Error;
use tokio::sync::Mutex;

/// Failure contract of the transcription capability. Transient failures are
/// retried with backoff; permanent ones exhaust the job immediately.
#[derive(Error, Debug, Clone)]
pub enum TranscriptionError {
	#[error("transient transcription failure: {0}")]
	Transient(String),
	#[error("permanent transcription failure: {0}")]
	Permanent(String),
}

/// The speech-to-text engine, consumed as an opaque capability: bytes and a
/// 2-letter language hint in, transcript out. Implementations are expected
/// to block or suspend for a non-trivial duration.
#[async_trait]
pub trait SpeechToText: Send + Sync {
	///
	/// # Errors
	/// Returns `TranscriptionError::Transient` for failures worth retrying
	/// (network, timeout) and `TranscriptionError::Permanent` for inputs that
	/// will never transcribe (unsupported format or language).
	async fn transcribe(&self, audio: &[u8], language: &str) -> Result<String, TranscriptionError>;
}

/// Scripted engine for tests and local wiring. Outcomes are popped in
/// order; an empty script transcribes everything as "hello".
#[derive(Default)]
pub struct MockSpeechToText {
	script: Mutex<VecDeque<Result<String, TranscriptionError>>>,
	calls: Mutex<Vec<String>>,
}

impl MockSpeechToText {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn push_ok(&self, text: &str) {
		self.script.lock().await.push_back(Ok(text.to_string()));
	}

	pub async fn push_transient(&self, reason: &str) {
		self.script.lock().await.push_back(Err(TranscriptionError::Transient(reason.to_string())));
	}

	pub async fn push_permanent(&self, reason: &str) {
		self.script.lock().await.push_back(Err(TranscriptionError::Permanent(reason.to_string())));
	}

	/// Language hints seen so far, one per call.
	pub async fn languages(&self) -> Vec<String> {
		self.calls.lock().await.clone()
	}

	pub async fn call_count(&self) -> usize {
		self.calls.lock().await.len()
	}
}

#[async_trait]
impl SpeechToText for MockSpeechToText {
	async fn transcribe(&self, audio: &[u8], language: &str) -> Result<String, TranscriptionError> {
		tracing::info!(size = audio.len(), language, "mock transcribe");
		self.calls.lock().await.push(language.to_string());
		self.script.lock().await.pop_front().unwrap_or_else(|| Ok("hello".to_string()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_mock_defaults_to_hello() {
		let stt = MockSpeechToText::new();
		assert_eq!(stt.transcribe(b"pcm", "en").await.unwrap(), "hello");
		assert_eq!(stt.languages().await, vec!["en".to_string()]);
	}

	#[tokio::test]
	async fn test_mock_pops_script_in_order() {
		let stt = MockSpeechToText::new();
		stt.push_transient("network down").await;
		stt.push_ok("recovered").await;

		assert!(matches!(stt.transcribe(b"pcm", "en").await, Err(TranscriptionError::Transient(_))));
		assert_eq!(stt.transcribe(b"pcm", "en").await.unwrap(), "recovered");
		assert_eq!(stt.call_count().await, 2);
	}
}
