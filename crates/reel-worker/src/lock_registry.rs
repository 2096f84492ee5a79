//! In-process lock registry protecting in-use artifacts from the retention sweep.
//!
//! The registry is plain shared memory. It coordinates running pipelines with
//! a co-located sweep only; it is never persisted and does not span processes.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use reel_models::JobId;
use tracing::{debug, warn};

use crate::error::{WorkerError, WorkerResult};

/// One registered artifact.
#[derive(Debug, Clone)]
pub struct LockEntry {
    pub artifact_path: PathBuf,
    pub owner_job_id: JobId,
    pub acquired_at: DateTime<Utc>,
}

/// Concurrent map of artifact path to owning job.
#[derive(Debug, Default)]
pub struct LockRegistry {
    entries: DashMap<PathBuf, LockEntry>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `path` as in use by `owner`.
    ///
    /// Re-acquiring a path already held by the same owner is a no-op. A path
    /// held by another job is a conflict.
    pub fn acquire(&self, path: impl Into<PathBuf>, owner: &JobId) -> WorkerResult<()> {
        let path = path.into();
        match self.entries.entry(path.clone()) {
            Entry::Occupied(existing) => {
                let holder = &existing.get().owner_job_id;
                if holder == owner {
                    return Ok(());
                }
                warn!(path = %path.display(), holder = %holder, requester = %owner, "Lock conflict");
                Err(WorkerError::LockConflict {
                    path,
                    holder: holder.clone(),
                })
            }
            Entry::Vacant(slot) => {
                debug!(path = %path.display(), job_id = %owner, "Lock acquired");
                slot.insert(LockEntry {
                    artifact_path: path,
                    owner_job_id: owner.clone(),
                    acquired_at: Utc::now(),
                });
                Ok(())
            }
        }
    }

    /// Drop the entry for `path`. Returns whether an entry existed.
    pub fn release(&self, path: &Path) -> bool {
        let released = self.entries.remove(path).is_some();
        if released {
            debug!(path = %path.display(), "Lock released");
        }
        released
    }

    pub fn is_locked(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    /// Number of entries held by `job_id`.
    pub fn held_by(&self, job_id: &JobId) -> usize {
        self.entries
            .iter()
            .filter(|e| &e.value().owner_job_id == job_id)
            .count()
    }

    pub fn entry(&self, path: &Path) -> Option<LockEntry> {
        self.entries.get(path).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_acquire_same_owner_is_noop() {
        let registry = LockRegistry::new();
        let job = JobId::from_string("job-a");
        let path = PathBuf::from("/work/job-a/01-trim-silence.mp4");

        registry.acquire(&path, &job).unwrap();
        let first = registry.entry(&path).unwrap().acquired_at;
        registry.acquire(&path, &job).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.entry(&path).unwrap().acquired_at, first);
    }

    #[test]
    fn test_acquire_conflict_for_other_owner() {
        let registry = LockRegistry::new();
        let path = PathBuf::from("/work/shared.mp4");
        registry.acquire(&path, &JobId::from_string("a")).unwrap();

        let err = registry
            .acquire(&path, &JobId::from_string("b"))
            .unwrap_err();
        match err {
            WorkerError::LockConflict { holder, .. } => assert_eq!(holder.as_str(), "a"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_release_reports_presence() {
        let registry = LockRegistry::new();
        let path = PathBuf::from("/work/x.mp4");
        registry.acquire(&path, &JobId::from_string("a")).unwrap();

        assert!(registry.release(&path));
        assert!(!registry.release(&path));
        assert!(!registry.is_locked(&path));
    }

    #[test]
    fn test_held_by_counts_per_job() {
        let registry = LockRegistry::new();
        let a = JobId::from_string("a");
        let b = JobId::from_string("b");
        registry.acquire("/w/a1", &a).unwrap();
        registry.acquire("/w/a2", &a).unwrap();
        registry.acquire("/w/b1", &b).unwrap();

        assert_eq!(registry.held_by(&a), 2);
        assert_eq!(registry.held_by(&b), 1);
    }

    #[tokio::test]
    async fn test_concurrent_acquire_single_holder() {
        let registry = Arc::new(LockRegistry::new());
        let path = PathBuf::from("/w/contended.mp4");

        let mut handles = Vec::new();
        for i in 0..16 {
            let registry = Arc::clone(&registry);
            let path = path.clone();
            handles.push(tokio::spawn(async move {
                registry.acquire(path, &JobId::from_string(format!("job-{i}"))).is_ok()
            }));
        }

        let mut winners = 0;
        for h in handles {
            if h.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(registry.len(), 1);
    }
}
