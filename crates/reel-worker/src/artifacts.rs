//! Intermediate artifact bookkeeping for one job.
//!
//! Every file the pipeline creates is registered here and lock-protected
//! before any stage touches it. Superseded artifacts are deleted as soon as
//! the next one exists; on failure everything still live is removed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reel_models::{JobId, Stage};
use tracing::{debug, warn};

use crate::error::{WorkerError, WorkerResult};
use crate::lock_registry::LockRegistry;

/// Subdirectory of the job dir the source is fetched into. Stage outputs live
/// directly in the job dir, so an upload can never share a path with one.
const SOURCE_DIR: &str = "source";

/// Tracks the working artifact and everything created along the way.
#[derive(Debug)]
pub struct ArtifactTracker {
    job_id: JobId,
    locks: Arc<LockRegistry>,
    job_dir: PathBuf,
    /// Files that exist and are locked, in creation order
    live: Vec<PathBuf>,
    /// Every path ever registered, in creation order
    history: Vec<PathBuf>,
    working: Option<PathBuf>,
    seq: u32,
    dir_locked: bool,
}

impl ArtifactTracker {
    pub fn new(job_id: JobId, locks: Arc<LockRegistry>, work_dir: &Path) -> Self {
        let job_dir = work_dir.join(job_id.as_str());
        Self {
            job_id,
            locks,
            job_dir,
            live: Vec::new(),
            history: Vec::new(),
            working: None,
            seq: 0,
            dir_locked: false,
        }
    }

    pub fn job_dir(&self) -> &Path {
        &self.job_dir
    }

    pub fn source_dir(&self) -> PathBuf {
        self.job_dir.join(SOURCE_DIR)
    }

    /// Create the job dir and hold a lock on it for the whole run.
    ///
    /// A dir left by a crashed run keeps its old mtime; the lock keeps the
    /// sweep from pruning it while it is still empty.
    pub async fn prepare_dir(&mut self) -> WorkerResult<()> {
        self.locks.acquire(self.job_dir.clone(), &self.job_id)?;
        self.dir_locked = true;
        tokio::fs::create_dir_all(self.source_dir()).await?;
        Ok(())
    }

    /// Register the locally fetched source as the first working artifact.
    pub fn adopt_source(&mut self, path: PathBuf) -> WorkerResult<()> {
        if !path.starts_with(self.source_dir()) {
            return Err(WorkerError::internal(format!(
                "source {} is outside {}",
                path.display(),
                self.source_dir().display()
            )));
        }
        self.register(path.clone())?;
        self.working = Some(path);
        Ok(())
    }

    /// Allocate and lock a fresh output path for `stage`.
    pub fn register_output(&mut self, stage: Stage) -> WorkerResult<PathBuf> {
        if !stage.produces_artifact() {
            return Err(WorkerError::internal(format!("{stage} does not write an artifact")));
        }
        self.seq += 1;
        let path = self.job_dir.join(format!("{:02}-{}.mp4", self.seq, stage));
        self.register(path.clone())?;
        Ok(path)
    }

    fn register(&mut self, path: PathBuf) -> WorkerResult<()> {
        self.locks.acquire(path.clone(), &self.job_id)?;
        if !self.live.contains(&path) {
            self.live.push(path.clone());
            self.history.push(path);
        }
        Ok(())
    }

    /// The artifact the next stage reads.
    pub fn working(&self) -> WorkerResult<&Path> {
        self.working
            .as_deref()
            .ok_or_else(|| WorkerError::internal("no working artifact"))
    }

    /// Make `next` the working artifact and drop the one it supersedes.
    pub async fn advance(&mut self, next: PathBuf) {
        match self.working.replace(next.clone()) {
            Some(prev) if prev != next => self.remove(&prev).await,
            _ => {}
        }
    }

    /// Delete an output that will not become the working artifact.
    pub async fn discard(&mut self, path: &Path) {
        if self.working.as_deref() == Some(path) {
            return;
        }
        self.remove(path).await;
    }

    /// Remove the final local artifact after it has been persisted.
    pub async fn release_final(&mut self) {
        if let Some(last) = self.working.take() {
            self.remove(&last).await;
        }
        self.cleanup_all().await;
    }

    /// Best-effort removal of everything still live, plus the job dir.
    ///
    /// Deletion errors are logged and never returned so they cannot mask the
    /// failure that triggered cleanup.
    pub async fn cleanup_all(&mut self) -> usize {
        let live = std::mem::take(&mut self.live);
        let count = live.len();
        for path in live {
            delete_file(&path).await;
            self.locks.release(&path);
        }
        self.working = None;

        if let Err(e) = tokio::fs::remove_dir_all(&self.job_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(job_id = %self.job_id, dir = %self.job_dir.display(), error = %e, "Failed to remove job dir");
            }
        }
        self.release_dir();
        count
    }

    fn release_dir(&mut self) {
        if std::mem::take(&mut self.dir_locked) {
            self.locks.release(&self.job_dir);
        }
    }

    async fn remove(&mut self, path: &Path) {
        delete_file(path).await;
        self.locks.release(path);
        self.live.retain(|p| p != path);
    }

    pub fn live(&self) -> &[PathBuf] {
        &self.live
    }

    pub fn history(&self) -> &[PathBuf] {
        &self.history
    }
}

async fn delete_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Deleted artifact"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to delete artifact"),
    }
}

impl Drop for ArtifactTracker {
    // Reached with live entries only when the owning task was aborted mid-run.
    fn drop(&mut self) {
        for path in self.live.drain(..) {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Failed to delete artifact on drop");
                }
            }
            self.locks.release(&path);
        }
        self.release_dir();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn tracker(dir: &TempDir, locks: &Arc<LockRegistry>) -> ArtifactTracker {
        let mut t = ArtifactTracker::new(JobId::from_string("job-1"), Arc::clone(locks), dir.path());
        t.prepare_dir().await.unwrap();
        t
    }

    #[tokio::test]
    async fn test_advance_deletes_superseded() {
        let dir = TempDir::new().unwrap();
        let locks = Arc::new(LockRegistry::new());
        let mut t = tracker(&dir, &locks).await;

        let source = t.source_dir().join("talk.mp4");
        tokio::fs::write(&source, b"src").await.unwrap();
        t.adopt_source(source.clone()).unwrap();

        let out = t.register_output(Stage::TrimSilence).unwrap();
        assert!(out.ends_with("01-trim-silence.mp4"));
        tokio::fs::write(&out, b"trimmed").await.unwrap();
        // job dir, source, output
        assert_eq!(locks.len(), 3);

        t.advance(out.clone()).await;
        assert!(!source.exists());
        assert!(!locks.is_locked(&source));
        assert!(locks.is_locked(&out));
        assert_eq!(t.working().unwrap(), out.as_path());
    }

    #[tokio::test]
    async fn test_cleanup_all_removes_everything() {
        let dir = TempDir::new().unwrap();
        let locks = Arc::new(LockRegistry::new());
        let mut t = tracker(&dir, &locks).await;

        let source = t.source_dir().join("talk.mp4");
        tokio::fs::write(&source, b"src").await.unwrap();
        t.adopt_source(source).unwrap();
        let out = t.register_output(Stage::NormalizeAudio).unwrap();
        tokio::fs::write(&out, b"partial").await.unwrap();

        assert_eq!(t.cleanup_all().await, 2);
        assert!(locks.is_empty());
        assert!(!t.job_dir().exists());
        assert_eq!(t.history().len(), 2);
    }

    #[tokio::test]
    async fn test_discard_keeps_working() {
        let dir = TempDir::new().unwrap();
        let locks = Arc::new(LockRegistry::new());
        let mut t = tracker(&dir, &locks).await;

        let source = t.source_dir().join("talk.mp4");
        tokio::fs::write(&source, b"src").await.unwrap();
        t.adopt_source(source.clone()).unwrap();
        let out = t.register_output(Stage::OverlayHeadline).unwrap();

        t.discard(&out).await;
        assert!(!locks.is_locked(&out));
        assert!(source.exists());
        assert_eq!(t.live(), &[source]);
    }

    #[tokio::test]
    async fn test_drop_releases_locks() {
        let dir = TempDir::new().unwrap();
        let locks = Arc::new(LockRegistry::new());
        let source = {
            let mut t = tracker(&dir, &locks).await;
            let source = t.source_dir().join("talk.mp4");
            tokio::fs::write(&source, b"src").await.unwrap();
            t.adopt_source(source.clone()).unwrap();
            source
        };
        assert!(locks.is_empty());
        assert!(!source.exists());
    }

    #[tokio::test]
    async fn test_upload_named_like_stage_output_gets_distinct_path() {
        let dir = TempDir::new().unwrap();
        let locks = Arc::new(LockRegistry::new());
        let mut t = tracker(&dir, &locks).await;

        let source = t.source_dir().join("01-trim-silence.mp4");
        tokio::fs::write(&source, b"src").await.unwrap();
        t.adopt_source(source.clone()).unwrap();

        let out = t.register_output(Stage::TrimSilence).unwrap();
        assert_ne!(source, out);
        assert_eq!(t.live().len(), 2);

        tokio::fs::write(&out, b"trimmed").await.unwrap();
        t.advance(out.clone()).await;
        assert!(!source.exists());
        assert_eq!(tokio::fs::read(&out).await.unwrap(), b"trimmed");
    }

    #[tokio::test]
    async fn test_source_outside_source_dir_is_rejected() {
        let dir = TempDir::new().unwrap();
        let locks = Arc::new(LockRegistry::new());
        let mut t = tracker(&dir, &locks).await;

        let stray = t.job_dir().join("talk.mp4");
        assert!(t.adopt_source(stray).is_err());
    }

    #[tokio::test]
    async fn test_transcription_stages_get_no_output_path() {
        let dir = TempDir::new().unwrap();
        let locks = Arc::new(LockRegistry::new());
        let mut t = tracker(&dir, &locks).await;

        assert!(t.register_output(Stage::Retranscribe).is_err());
        assert!(t.register_output(Stage::SpeechCorrect).is_ok());
        assert_eq!(t.live().len(), 1);
    }

    #[tokio::test]
    async fn test_job_dir_locked_for_the_run() {
        let dir = TempDir::new().unwrap();
        let locks = Arc::new(LockRegistry::new());
        let job = JobId::from_string("job-1");
        let mut t = tracker(&dir, &locks).await;

        assert!(locks.is_locked(t.job_dir()));
        assert_eq!(locks.held_by(&job), 1);

        t.cleanup_all().await;
        assert_eq!(locks.held_by(&job), 0);

        // reused dir from an earlier run, dropped without cleanup
        {
            let _t = tracker(&dir, &locks).await;
            assert_eq!(locks.held_by(&job), 1);
        }
        assert!(locks.is_empty());
    }
}
