//! Worker error types.

use std::fmt::Display;
use std::path::PathBuf;

use reel_models::{FailureKind, JobId, Stage};
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The claim was lost to another execution. Not a fault.
    #[error("Job {0} is already in progress")]
    AlreadyInProgress(JobId),

    #[error("Stage {stage} failed: {message}")]
    StageFailed { stage: Stage, message: String },

    #[error("Job timed out after {0} seconds")]
    Timeout(u64),

    #[error("Job cancelled by shutdown")]
    Cancelled,

    #[error("Artifact {path} is locked by job {holder}")]
    LockConflict { path: PathBuf, holder: JobId },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(#[from] reel_storage::StorageError),

    #[error("Job store error: {0}")]
    Store(#[from] reel_firestore::FirestoreError),

    #[error("Media error: {0}")]
    Media(#[from] reel_media::MediaError),

    #[error("ML service error: {0}")]
    Ml(#[from] reel_ml_client::MlError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// A stage failure carrying the cause's message.
    ///
    /// FFmpeg failures get the last stderr line appended since the exit code
    /// alone is rarely actionable.
    pub fn stage(stage: Stage, cause: impl Into<WorkerError>) -> Self {
        let cause = cause.into();
        let message = match &cause {
            WorkerError::Media(media) => match media.stderr_tail() {
                Some(tail) => format!("{media}: {tail}"),
                None => media.to_string(),
            },
            WorkerError::StageFailed { message, .. } => message.clone(),
            other => other.to_string(),
        };
        Self::StageFailed { stage, message }
    }

    pub fn stage_message(stage: Stage, message: impl Display) -> Self {
        Self::StageFailed {
            stage,
            message: message.to_string(),
        }
    }

    /// Whether the error means the source artifact or job does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            WorkerError::NotFound(_) => true,
            WorkerError::Storage(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// Classification persisted on a FAILED record.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            e if e.is_not_found() => FailureKind::NotFound,
            WorkerError::StageFailed { .. } => FailureKind::Stage,
            WorkerError::Timeout(_) => FailureKind::Timeout,
            WorkerError::Cancelled => FailureKind::Cancelled,
            _ => FailureKind::Internal,
        }
    }
}
