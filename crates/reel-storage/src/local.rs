//! Local-disk artifact store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reel_models::ArtifactRef;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::store::{validate_key, ArtifactStore};

/// Configuration for the local store.
#[derive(Debug, Clone)]
pub struct LocalStoreConfig {
    /// Directory holding all artifacts
    pub root: PathBuf,
}

impl Default for LocalStoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./artifacts"),
        }
    }
}

impl LocalStoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            root: std::env::var("ARTIFACT_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.root),
        }
    }
}

/// Artifacts stored as plain files under a root directory.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(config: LocalStoreConfig) -> Self {
        Self { root: config.root }
    }

    pub fn from_env() -> Self {
        Self::new(LocalStoreConfig::from_env())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn fetch(&self, artifact: &ArtifactRef, dest_dir: &Path) -> StorageResult<PathBuf> {
        let src = self.path_for(artifact.as_str())?;
        if !tokio::fs::try_exists(&src).await? {
            return Err(StorageError::not_found(artifact.as_str()));
        }

        tokio::fs::create_dir_all(dest_dir).await?;
        let dest = dest_dir.join(artifact.file_name());
        debug!("Copying {} to {}", src.display(), dest.display());

        tokio::fs::copy(&src, &dest).await.map_err(|e| {
            StorageError::download_failed(format!("{}: {}", artifact, e))
        })?;
        Ok(dest)
    }

    async fn put(&self, local_path: &Path, name: &str) -> StorageResult<ArtifactRef> {
        let dest = self.path_for(name)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Copy to a sibling temp name first so readers never see a partial file
        let partial = dest.with_extension("partial");
        tokio::fs::copy(local_path, &partial)
            .await
            .map_err(|e| StorageError::upload_failed(format!("{}: {}", name, e)))?;
        tokio::fs::rename(&partial, &dest).await?;

        info!("Stored {} as {}", local_path.display(), name);
        Ok(ArtifactRef::new(name))
    }

    async fn delete(&self, artifact: &ArtifactRef) -> StorageResult<()> {
        let path = self.path_for(artifact.as_str())?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::delete_failed(format!("{}: {}", artifact, e))),
        }
    }

    async fn exists(&self, artifact: &ArtifactRef) -> StorageResult<bool> {
        let path = self.path_for(artifact.as_str())?;
        Ok(tokio::fs::try_exists(path).await?)
    }

    fn backend(&self) -> &'static str {
        "local"
    }
}
