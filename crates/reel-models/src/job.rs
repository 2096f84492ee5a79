//! Job record definitions.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job processing status.
///
/// Transitions are monotonic within one execution attempt:
/// `Pending -> Processing -> {Completed | Failed}`. Only an owner resubmission
/// moves a terminal record back to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting to be claimed by a worker
    #[default]
    Pending,
    /// Claimed and being processed
    Processing,
    /// Completed successfully
    Completed,
    /// Failed with a recorded cause
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether `self -> next` is an allowed lifecycle edge.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
                | (JobStatus::Completed, JobStatus::Pending)
                | (JobStatus::Failed, JobStatus::Pending)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = JobStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(JobStatusParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown job status: {0}")]
pub struct JobStatusParseError(String);

/// Coarse classification of why a job failed.
///
/// Lets callers choose between "retry later" (timeout, cancelled) and
/// "fix the input" (not found, stage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NotFound,
    Stage,
    Timeout,
    Cancelled,
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::NotFound => "not_found",
            FailureKind::Stage => "stage",
            FailureKind::Timeout => "timeout",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Internal => "internal",
        }
    }

    /// True when resubmitting the same input may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, FailureKind::Timeout | FailureKind::Cancelled)
    }
}

impl FromStr for FailureKind {
    type Err = JobStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_found" => Ok(FailureKind::NotFound),
            "stage" => Ok(FailureKind::Stage),
            "timeout" => Ok(FailureKind::Timeout),
            "cancelled" => Ok(FailureKind::Cancelled),
            "internal" => Ok(FailureKind::Internal),
            _ => Err(JobStatusParseError(s.to_string())),
        }
    }
}

/// Durable record of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobRecord {
    /// Unique job ID
    pub id: JobId,

    /// Owner of the job
    pub owner_id: String,

    /// Name of the submitted source artifact
    pub source_artifact_name: String,

    /// Lifecycle status
    #[serde(default)]
    pub status: JobStatus,

    /// Reference of the persisted output (set on completion)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_artifact_ref: Option<String>,

    /// Failure cause (set on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Failure classification (set on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Create a fresh pending record.
    pub fn new_pending(owner_id: impl Into<String>, source_artifact_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            owner_id: owner_id.into(),
            source_artifact_name: source_artifact_name.into(),
            status: JobStatus::Pending,
            output_artifact_ref: None,
            error_message: None,
            failure_kind: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owned_by(&self, owner_id: &str) -> bool {
        self.owner_id == owner_id
    }

    /// Apply a field patch and bump `updated_at`.
    pub fn apply(&mut self, update: &JobUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(ref source) = update.source_artifact_name {
            self.source_artifact_name = source.clone();
        }
        if let Some(ref output) = update.output_artifact_ref {
            self.output_artifact_ref = output.clone();
        }
        if let Some(ref message) = update.error_message {
            self.error_message = message.clone();
        }
        if let Some(kind) = update.failure_kind {
            self.failure_kind = kind;
        }
        self.updated_at = Utc::now();
    }
}

/// Partial update of a [`JobRecord`].
///
/// Outer `None` means "leave untouched"; `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub source_artifact_name: Option<String>,
    pub output_artifact_ref: Option<Option<String>>,
    pub error_message: Option<Option<String>>,
    pub failure_kind: Option<Option<FailureKind>>,
}

impl JobUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn source_artifact_name(mut self, name: impl Into<String>) -> Self {
        self.source_artifact_name = Some(name.into());
        self
    }

    pub fn output_artifact_ref(mut self, output: Option<String>) -> Self {
        self.output_artifact_ref = Some(output);
        self
    }

    pub fn error(mut self, message: Option<String>, kind: Option<FailureKind>) -> Self {
        self.error_message = Some(message);
        self.failure_kind = Some(kind);
        self
    }

    /// Patch for a successful terminal write.
    pub fn completed(output_ref: impl Into<String>) -> Self {
        Self::new()
            .status(JobStatus::Completed)
            .output_artifact_ref(Some(output_ref.into()))
            .error(None, None)
    }

    /// Patch for a failed terminal write.
    pub fn failed(message: impl Into<String>, kind: FailureKind) -> Self {
        Self::new()
            .status(JobStatus::Failed)
            .output_artifact_ref(None)
            .error(Some(message.into()), Some(kind))
    }

    /// Patch that resets a terminal record for reprocessing.
    pub fn reset_for_reprocess() -> Self {
        Self::new()
            .status(JobStatus::Pending)
            .output_artifact_ref(None)
            .error(None, None)
    }

    /// Field names touched by this patch (used for store update masks).
    pub fn field_paths(&self) -> Vec<&'static str> {
        let mut paths = Vec::new();
        if self.status.is_some() {
            paths.push("status");
        }
        if self.source_artifact_name.is_some() {
            paths.push("source_artifact_name");
        }
        if self.output_artifact_ref.is_some() {
            paths.push("output_artifact_ref");
        }
        if self.error_message.is_some() {
            paths.push("error_message");
        }
        if self.failure_kind.is_some() {
            paths.push("failure_kind");
        }
        paths.push("updated_at");
        paths
    }
}
