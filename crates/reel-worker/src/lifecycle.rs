//! Job record lifecycle: submission, reprocess reset, atomic claim and the
//! terminal write.
//!
//! The claim is the only cross-process coordination point. It relies solely
//! on the store's conditional update; in-process locking would not stop a
//! second worker process from running the same job.

use std::sync::Arc;

use reel_firestore::JobStore;
use reel_models::{JobId, JobRecord, JobStatus, JobUpdate};
use tracing::{debug, info};

use crate::error::{WorkerError, WorkerResult};
use crate::quota::QuotaGate;

/// Outcome of `submit_or_reprocess`.
#[derive(Debug, Clone)]
pub enum Submission {
    /// A new PENDING record was created.
    Created(JobRecord),
    /// An existing record is PENDING again (reset, or already pending).
    Reprocessing(JobRecord),
}

impl Submission {
    pub fn record(&self) -> &JobRecord {
        match self {
            Submission::Created(r) | Submission::Reprocessing(r) => r,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.record().id
    }
}

/// Terminal outcome written by `finish`.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Completed { output_ref: String },
    Failed { error: String, kind: reel_models::FailureKind },
}

pub struct JobLifecycle {
    store: Arc<dyn JobStore>,
    quota: Arc<dyn QuotaGate>,
}

impl JobLifecycle {
    pub fn new(store: Arc<dyn JobStore>, quota: Arc<dyn QuotaGate>) -> Self {
        Self { store, quota }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Create a PENDING record, or reset `existing` to PENDING for its owner.
    ///
    /// Fresh submissions consume quota; reprocessing does not.
    pub async fn submit_or_reprocess(
        &self,
        owner_id: &str,
        source_artifact_name: &str,
        existing: Option<&JobId>,
    ) -> WorkerResult<Submission> {
        match existing {
            None => self.submit(owner_id, source_artifact_name).await,
            Some(id) => self.reprocess(owner_id, source_artifact_name, id).await,
        }
    }

    async fn submit(&self, owner_id: &str, source_artifact_name: &str) -> WorkerResult<Submission> {
        if !self.quota.try_consume(owner_id).await? {
            return Err(WorkerError::QuotaExceeded(format!(
                "owner {owner_id} has no submissions left"
            )));
        }

        let record = JobRecord::new_pending(owner_id, source_artifact_name);
        self.store.create(&record).await?;
        info!(job_id = %record.id, owner_id, "Job submitted");
        Ok(Submission::Created(record))
    }

    /// Reset a terminal record to PENDING.
    ///
    /// The reset is conditional on the status that was read. Losing it means
    /// another request moved the record first, so this one must not run it.
    /// Store-level write conflicts are retried inside the store.
    async fn reprocess(
        &self,
        owner_id: &str,
        source_artifact_name: &str,
        id: &JobId,
    ) -> WorkerResult<Submission> {
        let record = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| WorkerError::not_found(format!("job {id}")))?;

        if !record.is_owned_by(owner_id) {
            return Err(WorkerError::Unauthorized(format!(
                "job {id} is not owned by {owner_id}"
            )));
        }

        match record.status {
            JobStatus::Processing => Err(WorkerError::AlreadyInProgress(id.clone())),
            JobStatus::Pending => {
                debug!(job_id = %id, "Reprocess requested for a job that is already pending");
                Ok(Submission::Reprocessing(record))
            }
            JobStatus::Completed | JobStatus::Failed => {
                let reset = JobUpdate::reset_for_reprocess().source_artifact_name(source_artifact_name);
                let changed = self
                    .store
                    .conditional_update(id, record.status, JobStatus::Pending, reset)
                    .await?;
                if changed == 0 {
                    info!(job_id = %id, read = %record.status, "Reset lost to a concurrent request");
                    return Err(WorkerError::AlreadyInProgress(id.clone()));
                }

                let fresh = self
                    .store
                    .get(id)
                    .await?
                    .ok_or_else(|| WorkerError::not_found(format!("job {id}")))?;
                info!(job_id = %id, previous = %record.status, "Job reset for reprocessing");
                Ok(Submission::Reprocessing(fresh))
            }
        }
    }

    /// Atomic PENDING to PROCESSING. `true` only for the single winner.
    pub async fn claim(&self, id: &JobId) -> WorkerResult<bool> {
        let changed = self
            .store
            .conditional_update(id, JobStatus::Pending, JobStatus::Processing, JobUpdate::new())
            .await?;
        let won = changed == 1;
        debug!(job_id = %id, won, "Claim attempted");
        Ok(won)
    }

    /// Terminal write. Called once per execution, by the claim winner only.
    pub async fn finish(&self, id: &JobId, outcome: JobOutcome) -> WorkerResult<()> {
        let update = match outcome {
            JobOutcome::Completed { output_ref } => JobUpdate::completed(output_ref),
            JobOutcome::Failed { error, kind } => JobUpdate::failed(error, kind),
        };
        self.store.update(id, update).await?;
        Ok(())
    }
}
