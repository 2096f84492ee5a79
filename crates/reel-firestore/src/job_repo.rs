//! Firestore-backed job store.
//!
//! The conditional update reads the document, checks its status, then patches
//! with an `updateTime` precondition. A lost race surfaces as a failed
//! precondition and the loop re-reads, so two writers can never both observe
//! the expected status and win.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reel_models::{FailureKind, JobId, JobRecord, JobStatus, JobUpdate};
use tracing::debug;

use crate::client::{FirestoreClient, Precondition};
use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_precondition_conflict;
use crate::store::JobStore;
use crate::types::{Document, ToFirestoreValue, Value};

/// Re-read attempts after a lost updateTime race.
const MAX_CONDITIONAL_ATTEMPTS: u32 = 5;

/// Job records stored as documents in one collection.
#[derive(Clone)]
pub struct FirestoreJobStore {
    client: FirestoreClient,
    collection: String,
}

impl FirestoreJobStore {
    pub fn new(client: FirestoreClient) -> Self {
        let collection = client.config().jobs_collection.clone();
        Self { client, collection }
    }

    /// Create from environment variables.
    pub fn from_env() -> FirestoreResult<Self> {
        Ok(Self::new(FirestoreClient::from_env()?))
    }

    async fn get_document(&self, id: &JobId) -> FirestoreResult<Option<Document>> {
        self.client
            .with_retry("get_job", || self.client.get_document(&self.collection, id.as_str()))
            .await
    }
}

fn record_to_fields(record: &JobRecord) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("owner_id".to_string(), record.owner_id.to_firestore_value());
    fields.insert(
        "source_artifact_name".to_string(),
        record.source_artifact_name.to_firestore_value(),
    );
    fields.insert("status".to_string(), record.status.as_str().to_firestore_value());
    fields.insert(
        "output_artifact_ref".to_string(),
        record.output_artifact_ref.to_firestore_value(),
    );
    fields.insert(
        "error_message".to_string(),
        record.error_message.to_firestore_value(),
    );
    fields.insert(
        "failure_kind".to_string(),
        record.failure_kind.map(|k| k.as_str()).to_firestore_value(),
    );
    fields.insert("created_at".to_string(), record.created_at.to_firestore_value());
    fields.insert("updated_at".to_string(), record.updated_at.to_firestore_value());
    fields
}

fn update_to_fields(update: &JobUpdate) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    if let Some(status) = update.status {
        fields.insert("status".to_string(), status.as_str().to_firestore_value());
    }
    if let Some(ref source) = update.source_artifact_name {
        fields.insert("source_artifact_name".to_string(), source.to_firestore_value());
    }
    if let Some(ref output) = update.output_artifact_ref {
        fields.insert("output_artifact_ref".to_string(), output.to_firestore_value());
    }
    if let Some(ref message) = update.error_message {
        fields.insert("error_message".to_string(), message.to_firestore_value());
    }
    if let Some(kind) = update.failure_kind {
        fields.insert(
            "failure_kind".to_string(),
            kind.map(|k| k.as_str()).to_firestore_value(),
        );
    }
    fields.insert("updated_at".to_string(), Utc::now().to_firestore_value());
    fields
}

fn record_from_document(id: &JobId, doc: &Document) -> FirestoreResult<JobRecord> {
    let required = |field: &str| {
        doc.get::<String>(field).ok_or_else(|| {
            FirestoreError::invalid_response(format!("job {} missing field {}", id, field))
        })
    };
    let timestamp = |field: &str| {
        doc.get::<DateTime<Utc>>(field).ok_or_else(|| {
            FirestoreError::invalid_response(format!("job {} missing timestamp {}", id, field))
        })
    };

    let status: JobStatus = required("status")?
        .parse()
        .map_err(|e| FirestoreError::invalid_response(format!("job {}: {}", id, e)))?;
    let failure_kind = doc
        .get::<String>("failure_kind")
        .and_then(|k| k.parse::<FailureKind>().ok());

    Ok(JobRecord {
        id: id.clone(),
        owner_id: required("owner_id")?,
        source_artifact_name: required("source_artifact_name")?,
        status,
        output_artifact_ref: doc.get("output_artifact_ref"),
        error_message: doc.get("error_message"),
        failure_kind,
        created_at: timestamp("created_at")?,
        updated_at: timestamp("updated_at")?,
    })
}

#[async_trait]
impl JobStore for FirestoreJobStore {
    async fn create(&self, record: &JobRecord) -> FirestoreResult<()> {
        self.client
            .create_document(&self.collection, record.id.as_str(), record_to_fields(record))
            .await?;
        debug!(job_id = %record.id, "Created job record");
        Ok(())
    }

    async fn get(&self, id: &JobId) -> FirestoreResult<Option<JobRecord>> {
        match self.get_document(id).await? {
            Some(doc) => Ok(Some(record_from_document(id, &doc)?)),
            None => Ok(None),
        }
    }

    async fn conditional_update(
        &self,
        id: &JobId,
        expected: JobStatus,
        new_status: JobStatus,
        extra: JobUpdate,
    ) -> FirestoreResult<u64> {
        let update = extra.status(new_status);
        let mask = update.field_paths();

        for attempt in 0..MAX_CONDITIONAL_ATTEMPTS {
            let Some(doc) = self.get_document(id).await? else {
                return Ok(0);
            };

            let current = record_from_document(id, &doc)?.status;
            if current != expected {
                debug!(job_id = %id, current = %current, expected = %expected, "Conditional update skipped");
                return Ok(0);
            }

            let update_time = doc.update_time.clone().ok_or_else(|| {
                FirestoreError::invalid_response(format!("job {} has no updateTime", id))
            })?;

            match self
                .client
                .update_document(
                    &self.collection,
                    id.as_str(),
                    update_to_fields(&update),
                    &mask,
                    Some(Precondition::UpdateTime(&update_time)),
                )
                .await
            {
                Ok(_) => return Ok(1),
                Err(e) if e.is_precondition_failed() => {
                    debug!(
                        job_id = %id,
                        attempt = attempt + 1,
                        "Job record changed concurrently, re-reading"
                    );
                    record_precondition_conflict(&self.collection);
                    tokio::time::sleep(Duration::from_millis(20 * (attempt as u64 + 1))).await;
                }
                // The document vanished between read and write
                Err(FirestoreError::NotFound(_)) => return Ok(0),
                Err(e) => return Err(e),
            }
        }

        Err(FirestoreError::PreconditionFailed(format!(
            "job {} kept changing after {} attempts",
            id, MAX_CONDITIONAL_ATTEMPTS
        )))
    }

    async fn update(&self, id: &JobId, update: JobUpdate) -> FirestoreResult<()> {
        let mask = update.field_paths();
        let fields = update_to_fields(&update);
        self.client
            .with_retry("update_job", || {
                self.client.update_document(
                    &self.collection,
                    id.as_str(),
                    fields.clone(),
                    &mask,
                    Some(Precondition::Exists),
                )
            })
            .await?;
        Ok(())
    }
}
