//! The job record store seam.

use async_trait::async_trait;
use reel_models::{JobId, JobRecord, JobStatus, JobUpdate};

use crate::error::FirestoreResult;

/// Durable table of job records keyed by id.
///
/// `conditional_update` is the only primitive the claim relies on. It must be
/// atomic against concurrent callers in any process; an eventually
/// consistent backend cannot implement this trait correctly.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new record. Fails with `AlreadyExists` if the id is taken.
    async fn create(&self, record: &JobRecord) -> FirestoreResult<()>;

    /// Fetch a record, `None` if absent.
    async fn get(&self, id: &JobId) -> FirestoreResult<Option<JobRecord>>;

    /// Set `status = new_status` plus `extra` only where `status == expected`.
    ///
    /// Returns the number of records changed: 1 if this caller won, 0 if the
    /// record is missing or its status differs.
    async fn conditional_update(
        &self,
        id: &JobId,
        expected: JobStatus,
        new_status: JobStatus,
        extra: JobUpdate,
    ) -> FirestoreResult<u64>;

    /// Unconditional field patch. Fails with `NotFound` if the id is absent.
    async fn update(&self, id: &JobId, update: JobUpdate) -> FirestoreResult<()>;
}
