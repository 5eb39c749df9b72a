use crate::{validate_digest, BlobError, BlobStorage};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;

/// Filesystem blob store. Blobs live under `<root>/<first two hex chars>/<digest>`
/// so a large corpus does not pile every file into one directory.
pub struct LocalBlobStorage {
	root: PathBuf,
}

impl LocalBlobStorage {
	///
	/// # Errors
	/// Returns an error if the root directory cannot be created.
	pub async fn new(root: impl Into<PathBuf>) -> Result<Self, BlobError> {
		let root = root.into();
		tokio::fs::create_dir_all(&root).await?;
		Ok(Self { root })
	}

	fn blob_path(&self, digest: &str) -> PathBuf {
		self.root.join(&digest[..2]).join(digest)
	}
}

#[async_trait]
impl BlobStorage for LocalBlobStorage {
	async fn put(&self, digest: &str, bytes: Bytes) -> Result<(), BlobError> {
		validate_digest(digest)?;
		let path = self.blob_path(digest);
		let parent = path.parent().ok_or_else(|| BlobError::Unavailable("blob path has no parent".to_string()))?;
		tokio::fs::create_dir_all(parent).await?;

		// Write to a sibling temp file, then rename. A crashed write never
		// leaves a readable half-blob under the digest. An existing blob is
		// rewritten with the same bytes rather than skipped, so a put racing
		// a delete of the same digest always leaves the blob in place.
		let tmp = path.with_extension("part");
		tokio::fs::write(&tmp, &bytes).await?;
		tokio::fs::rename(&tmp, &path).await?;

		tracing::debug!(digest, size = bytes.len(), "stored blob");
		Ok(())
	}

	async fn get(&self, digest: &str) -> Result<Bytes, BlobError> {
		validate_digest(digest)?;
		match tokio::fs::read(self.blob_path(digest)).await {
			Ok(bytes) => Ok(Bytes::from(bytes)),
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(BlobError::NotFound(digest.to_string())),
			Err(err) => Err(err.into()),
		}
	}

	async fn delete(&self, digest: &str) -> Result<(), BlobError> {
		validate_digest(digest)?;
		match tokio::fs::remove_file(self.blob_path(digest)).await {
			Ok(()) => Ok(()),
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(err) => Err(err.into()),
		}
	}

	async fn exists(&self, digest: &str) -> Result<bool, BlobError> {
		validate_digest(digest)?;
		Ok(tokio::fs::try_exists(self.blob_path(digest)).await?)
	}
}
