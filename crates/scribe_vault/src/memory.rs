use crate::{validate_digest, BlobError, BlobStorage};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// In-memory blob store for tests and local wiring. Can be armed to fail
/// writes so callers can exercise their rollback paths.
#[derive(Default)]
pub struct MemoryBlobStorage {
	blobs: RwLock<HashMap<String, Bytes>>,
	fail_puts: AtomicBool,
}

impl MemoryBlobStorage {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Make every subsequent `put` fail with `BlobError::Unavailable`.
	pub fn fail_puts(&self, fail: bool) {
		self.fail_puts.store(fail, Ordering::SeqCst);
	}

	pub async fn len(&self) -> usize {
		self.blobs.read().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.blobs.read().await.is_empty()
	}
}

#[async_trait]
impl BlobStorage for MemoryBlobStorage {
	async fn put(&self, digest: &str, bytes: Bytes) -> Result<(), BlobError> {
		validate_digest(digest)?;
		if self.fail_puts.load(Ordering::SeqCst) {
			return Err(BlobError::Unavailable("memory storage armed to fail".to_string()));
		}
		self.blobs.write().await.insert(digest.to_string(), bytes);
		Ok(())
	}

	async fn get(&self, digest: &str) -> Result<Bytes, BlobError> {
		validate_digest(digest)?;
		self.blobs.read().await.get(digest).cloned().ok_or_else(|| BlobError::NotFound(digest.to_string()))
	}

	async fn delete(&self, digest: &str) -> Result<(), BlobError> {
		validate_digest(digest)?;
		self.blobs.write().await.remove(digest);
		Ok(())
	}

	async fn exists(&self, digest: &str) -> Result<bool, BlobError> {
		validate_digest(digest)?;
		Ok(self.blobs.read().await.contains_key(digest))
	}
}
