//! Retention sweep over the work directory.
//!
//! Deletes files older than the retention age unless the lock registry says a
//! running job still needs them. Crash leftovers have no lock entries, so the
//! age threshold alone reclaims them.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::WorkerResult;
use crate::lock_registry::LockRegistry;
use crate::retry::LogThrottle;

/// Counters from one sweep pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub scanned: usize,
    pub deleted: usize,
    pub skipped_locked: usize,
    pub errors: usize,
}

pub struct RetentionSweep {
    root: PathBuf,
    max_age: Duration,
    locks: Arc<LockRegistry>,
}

impl RetentionSweep {
    pub fn new(root: impl Into<PathBuf>, max_age: Duration, locks: Arc<LockRegistry>) -> Self {
        Self {
            root: root.into(),
            max_age,
            locks,
        }
    }

    /// One pass over the tree. Empty directories past the age threshold are
    /// removed as well.
    pub async fn sweep_once(&self) -> WorkerResult<SweepStats> {
        let mut stats = SweepStats::default();
        if !tokio::fs::try_exists(&self.root).await? {
            return Ok(stats);
        }

        let now = SystemTime::now();
        let mut dirs = vec![self.root.clone()];
        let mut visited = Vec::new();

        while let Some(dir) = dirs.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Sweep could not read directory");
                    stats.errors += 1;
                    continue;
                }
            };
            visited.push(dir.clone());

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let meta = match entry.metadata().await {
                    Ok(meta) => meta,
                    Err(_) => continue,
                };
                if meta.is_dir() {
                    dirs.push(path);
                    continue;
                }

                stats.scanned += 1;
                let age = meta
                    .modified()
                    .ok()
                    .and_then(|m| now.duration_since(m).ok())
                    .unwrap_or_default();
                if age < self.max_age {
                    continue;
                }
                if self.locks.is_locked(&path) {
                    debug!(path = %path.display(), "Sweep skipped locked artifact");
                    stats.skipped_locked += 1;
                    continue;
                }

                match tokio::fs::remove_file(&path).await {
                    Ok(()) => stats.deleted += 1,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Sweep failed to delete file");
                        stats.errors += 1;
                    }
                }
            }
        }

        // deepest first; remove_dir only succeeds on empty directories
        for dir in visited.iter().rev().filter(|d| d.as_path() != self.root.as_path()) {
            if dir.ancestors().any(|a| self.locks.is_locked(a)) {
                continue;
            }
            let old_enough = match tokio::fs::metadata(dir).await.and_then(|m| m.modified()) {
                Ok(modified) => now.duration_since(modified).unwrap_or_default() >= self.max_age,
                Err(_) => false,
            };
            if old_enough {
                let _ = tokio::fs::remove_dir(dir).await;
            }
        }

        metrics::counter!("retention_sweep_deleted_total").increment(stats.deleted as u64);
        Ok(stats)
    }

    /// Sweep every `interval` until shutdown is signalled.
    pub async fn run(self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        let mut failures = LogThrottle::new(3);
        info!(root = %self.root.display(), ?interval, max_age = ?self.max_age, "Retention sweep started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match self.sweep_once().await {
                        Ok(stats) => {
                            failures.success();
                            if stats.deleted > 0 {
                                info!(deleted = stats.deleted, skipped_locked = stats.skipped_locked, "Retention sweep pass");
                            }
                        }
                        Err(e) => {
                            if failures.failure() {
                                warn!("Retention sweep failed: {}", e);
                            }
                        }
                    }
                }
            }
        }
        info!("Retention sweep stopped");
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::JobId;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_sweep_respects_locks() {
        let dir = TempDir::new().unwrap();
        let job_dir = dir.path().join("job-1");
        tokio::fs::create_dir_all(&job_dir).await.unwrap();
        let locked = job_dir.join("01-trim-silence.mp4");
        let stale = job_dir.join("source.mp4");
        tokio::fs::write(&locked, b"in use").await.unwrap();
        tokio::fs::write(&stale, b"leftover").await.unwrap();
        let abandoned = dir.path().join("job-0");
        tokio::fs::create_dir_all(&abandoned).await.unwrap();

        let locks = Arc::new(LockRegistry::new());
        locks.acquire(&locked, &JobId::from_string("job-1")).unwrap();

        // zero age threshold: everything is old enough
        let sweep = RetentionSweep::new(dir.path(), Duration::ZERO, Arc::clone(&locks));
        let stats = sweep.sweep_once().await.unwrap();

        assert_eq!(stats.scanned, 2);
        assert_eq!(stats.deleted, 1);
        assert_eq!(stats.skipped_locked, 1);
        assert!(locked.exists());
        assert!(!stale.exists());
        assert!(job_dir.exists());
        assert!(!abandoned.exists());
    }

    #[tokio::test]
    async fn test_sweep_keeps_young_files_and_dirs() {
        let dir = TempDir::new().unwrap();
        let young = dir.path().join("fresh.mp4");
        tokio::fs::write(&young, b"new").await.unwrap();
        let empty = dir.path().join("starting-job");
        tokio::fs::create_dir_all(&empty).await.unwrap();

        let sweep = RetentionSweep::new(
            dir.path(),
            Duration::from_secs(3600),
            Arc::new(LockRegistry::new()),
        );
        let stats = sweep.sweep_once().await.unwrap();

        assert_eq!(stats.deleted, 0);
        assert!(young.exists());
        assert!(empty.exists());
    }

    #[tokio::test]
    async fn test_sweep_keeps_locked_job_dir_even_when_old_and_empty() {
        let dir = TempDir::new().unwrap();
        let reused = dir.path().join("job-7");
        let source_dir = reused.join("source");
        tokio::fs::create_dir_all(&source_dir).await.unwrap();

        let locks = Arc::new(LockRegistry::new());
        locks.acquire(reused.clone(), &JobId::from_string("job-7")).unwrap();

        let sweep = RetentionSweep::new(dir.path(), Duration::ZERO, Arc::clone(&locks));
        sweep.sweep_once().await.unwrap();
        assert!(source_dir.exists());

        locks.release(&reused);
        sweep.sweep_once().await.unwrap();
        assert!(!reused.exists());
    }

    #[tokio::test]
    async fn test_missing_root_is_empty_pass() {
        let sweep = RetentionSweep::new(
            "/nonexistent/reel-sweep",
            Duration::ZERO,
            Arc::new(LockRegistry::new()),
        );
        assert_eq!(sweep.sweep_once().await.unwrap(), SweepStats::default());
    }
}
