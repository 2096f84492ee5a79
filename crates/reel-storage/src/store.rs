//! The artifact store seam.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reel_models::ArtifactRef;

use crate::error::{StorageError, StorageResult};

/// Uniform fetch/put/delete over binary blobs.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Copy the artifact into `dest_dir` and return the local path.
    async fn fetch(&self, artifact: &ArtifactRef, dest_dir: &Path) -> StorageResult<PathBuf>;

    /// Store a local file under `name` and return its reference.
    async fn put(&self, local_path: &Path, name: &str) -> StorageResult<ArtifactRef>;

    /// Remove an artifact. Deleting a missing artifact is not an error.
    async fn delete(&self, artifact: &ArtifactRef) -> StorageResult<()>;

    /// Whether the artifact currently exists.
    async fn exists(&self, artifact: &ArtifactRef) -> StorageResult<bool>;

    /// Backend name for logs.
    fn backend(&self) -> &'static str;
}

/// Reject keys that could escape the store root.
pub(crate) fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|part| part.is_empty() || part == "..")
    {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Content type from a key's extension.
pub(crate) fn content_type_for(key: &str) -> &'static str {
    let ext = key.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "srt" => "application/x-subrip",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("uploads/u1/talk.mp4").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/etc/passwd").is_err());
        assert!(validate_key("uploads/../secrets").is_err());
        assert!(validate_key("uploads//x.mp4").is_err());
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("a/b/clip.MP4"), "video/mp4");
        assert_eq!(content_type_for("captions.srt"), "application/x-subrip");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }
}
