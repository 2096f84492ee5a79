//! In-process job store.
//!
//! Conditional updates hold the DashMap shard lock across the check and the
//! write, so they are atomic within one process. Suitable for tests and
//! single-process deployments only.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use reel_models::{JobId, JobRecord, JobStatus, JobUpdate};
use tracing::debug;

use crate::error::{FirestoreError, FirestoreResult};
use crate::store::JobStore;

#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    records: DashMap<JobId, JobRecord>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Ids of every stored record, in no particular order.
    pub fn ids(&self) -> Vec<JobId> {
        self.records.iter().map(|r| r.key().clone()).collect()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, record: &JobRecord) -> FirestoreResult<()> {
        match self.records.entry(record.id.clone()) {
            Entry::Occupied(_) => Err(FirestoreError::AlreadyExists(record.id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, id: &JobId) -> FirestoreResult<Option<JobRecord>> {
        Ok(self.records.get(id).map(|r| r.value().clone()))
    }

    async fn conditional_update(
        &self,
        id: &JobId,
        expected: JobStatus,
        new_status: JobStatus,
        extra: JobUpdate,
    ) -> FirestoreResult<u64> {
        let Some(mut record) = self.records.get_mut(id) else {
            return Ok(0);
        };
        if record.status != expected {
            debug!(job_id = %id, current = %record.status, expected = %expected, "Conditional update skipped");
            return Ok(0);
        }
        record.apply(&extra.status(new_status));
        Ok(1)
    }

    async fn update(&self, id: &JobId, update: JobUpdate) -> FirestoreResult<()> {
        let mut record = self
            .records
            .get_mut(id)
            .ok_or_else(|| FirestoreError::not_found(id.to_string()))?;
        record.apply(&update);
        Ok(())
    }
}
