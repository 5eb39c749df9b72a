mod local;
mod memory;

pub use local::LocalBlobStorage;
pub use memory::MemoryBlobStorage;

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlobError {
	#[error("blob not found: {0}")]
	NotFound(String),
	#[error("invalid digest: {0}")]
	InvalidDigest(String),
	#[error("storage unavailable: {0}")]
	Unavailable(String),
	#[error("io error: {0}")]
	Io(#[from] std::io::Error),
}

/// Content-addressed blob storage. Keys are lowercase hex SHA-256 digests
/// of the stored bytes; callers compute them with [`content_digest`].
#[async_trait]
pub trait BlobStorage: Send + Sync {
	///
	/// # Errors
	/// Returns an error if the backing store rejects the write. A `put` for a
	/// digest that already exists is a no-op.
	async fn put(&self, digest: &str, bytes: Bytes) -> Result<(), BlobError>;

	///
	/// # Errors
	/// Returns `BlobError::NotFound` if no blob exists under `digest`.
	async fn get(&self, digest: &str) -> Result<Bytes, BlobError>;

	///
	/// # Errors
	/// Returns an error if the backing store fails. Deleting a missing blob
	/// is not an error.
	async fn delete(&self, digest: &str) -> Result<(), BlobError>;

	///
	/// # Errors
	/// Returns an error if the backing store fails.
	async fn exists(&self, digest: &str) -> Result<bool, BlobError>;
}

/// Compute the content digest used as the dedup key and blob address.
#[must_use]
pub fn content_digest(bytes: &[u8]) -> String {
	let mut hasher = Sha256::new();
	hasher.update(bytes);
	format!("{:x}", hasher.finalize())
}

pub(crate) fn validate_digest(digest: &str) -> Result<(), BlobError> {
	if digest.len() == 64 && digest.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()) {
		Ok(())
	} else {
		Err(BlobError::InvalidDigest(digest.to_string()))
	}
}
