//! Ingress contract: request validation, submission, execution and the
//! mapping of internal errors onto a small set of stable public codes.
//!
//! Internal error text is logged here and never returned to the caller.

use std::fmt;
use std::sync::Arc;

use reel_models::{ArtifactRef, JobId, JobStatus, StageConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use validator::{Validate, ValidationError};

use crate::error::WorkerError;
use crate::executor::JobExecutor;
use crate::pipeline::PipelineJob;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct IngressRequest {
    #[validate(custom(function = "validate_artifact_ref"))]
    pub source_artifact_ref: String,

    #[validate(length(min = 1, max = 128))]
    pub owner_id: String,

    #[serde(default)]
    #[validate(nested)]
    pub stage_config: StageConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_job_id: Option<JobId>,
}

fn validate_artifact_ref(key: &str) -> Result<(), ValidationError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|part| part.is_empty() || part == "..");
    if bad {
        return Err(ValidationError::new("invalid_artifact_ref"));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressResponse {
    pub job_id: JobId,
    pub output_artifact_ref: String,
}

/// Stable public error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IngressCode {
    ValidationError,
    Unauthorized,
    QuotaExceeded,
    NotFound,
    AlreadyProcessing,
    InternalError,
}

impl IngressCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngressCode::ValidationError => "VALIDATION_ERROR",
            IngressCode::Unauthorized => "UNAUTHORIZED",
            IngressCode::QuotaExceeded => "QUOTA_EXCEEDED",
            IngressCode::NotFound => "NOT_FOUND",
            IngressCode::AlreadyProcessing => "ALREADY_PROCESSING",
            IngressCode::InternalError => "INTERNAL_ERROR",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            IngressCode::ValidationError => 400,
            IngressCode::Unauthorized => 401,
            IngressCode::QuotaExceeded => 403,
            IngressCode::NotFound => 404,
            IngressCode::AlreadyProcessing => 409,
            IngressCode::InternalError => 500,
        }
    }

    pub fn public_message(&self) -> &'static str {
        match self {
            IngressCode::ValidationError => "The request is invalid",
            IngressCode::Unauthorized => "You do not have access to this job",
            IngressCode::QuotaExceeded => "Submission quota exceeded",
            IngressCode::NotFound => "The job or its source artifact was not found",
            IngressCode::AlreadyProcessing => "The job is already being processed",
            IngressCode::InternalError => "Processing failed",
        }
    }
}

impl fmt::Display for IngressCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&WorkerError> for IngressCode {
    fn from(err: &WorkerError) -> Self {
        match err {
            WorkerError::Validation(_) => IngressCode::ValidationError,
            WorkerError::Unauthorized(_) => IngressCode::Unauthorized,
            WorkerError::QuotaExceeded(_) => IngressCode::QuotaExceeded,
            WorkerError::AlreadyInProgress(_) => IngressCode::AlreadyProcessing,
            e if e.is_not_found() => IngressCode::NotFound,
            _ => IngressCode::InternalError,
        }
    }
}

/// Public error: a code, its fixed message, and the job id when one exists.
#[derive(Debug, Clone, Error, Serialize)]
#[error("{code}: {message}")]
pub struct IngressError {
    pub code: IngressCode,
    pub status: u16,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
}

impl IngressError {
    pub fn new(code: IngressCode, job_id: Option<JobId>) -> Self {
        Self {
            code,
            status: code.http_status(),
            message: code.public_message(),
            job_id,
        }
    }

    fn from_worker(err: &WorkerError, job_id: Option<JobId>) -> Self {
        let code = IngressCode::from(err);
        match code {
            IngressCode::InternalError => {
                warn!(job_id = ?job_id.as_ref().map(JobId::as_str), "Request failed: {}", err)
            }
            _ => info!(job_id = ?job_id.as_ref().map(JobId::as_str), code = %code, "Request rejected: {}", err),
        }
        Self::new(code, job_id)
    }
}

pub struct IngressHandler {
    executor: Arc<JobExecutor>,
}

impl IngressHandler {
    pub fn new(executor: Arc<JobExecutor>) -> Self {
        Self { executor }
    }

    /// Validate, submit (or reset for reprocessing), execute.
    ///
    /// Validation failures have no side effects on any job record.
    pub async fn handle(&self, request: IngressRequest) -> Result<IngressResponse, IngressError> {
        if let Err(e) = request.validate() {
            info!("Rejected invalid request: {}", e);
            return Err(IngressError::new(IngressCode::ValidationError, None));
        }

        let submission = self
            .executor
            .lifecycle()
            .submit_or_reprocess(
                &request.owner_id,
                &request.source_artifact_ref,
                request.existing_job_id.as_ref(),
            )
            .await
            .map_err(|e| IngressError::from_worker(&e, request.existing_job_id.clone()))?;

        let job = PipelineJob {
            job_id: submission.job_id().clone(),
            owner_id: request.owner_id,
            source: ArtifactRef::new(request.source_artifact_ref),
            stage_config: request.stage_config,
        };

        let report = self
            .executor
            .execute(&job)
            .await
            .map_err(|e| IngressError::from_worker(&e, Some(job.job_id.clone())))?;

        match (report.status, report.output_artifact) {
            (JobStatus::Completed, Some(output)) => Ok(IngressResponse {
                job_id: job.job_id,
                output_artifact_ref: output,
            }),
            _ => {
                let cause = report
                    .failure
                    .unwrap_or_else(|| WorkerError::internal("job ended without output"));
                Err(IngressError::from_worker(&cause, Some(job.job_id)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::Stage;

    fn request() -> IngressRequest {
        IngressRequest {
            source_artifact_ref: "uploads/u1/talk.mp4".into(),
            owner_id: "u1".into(),
            stage_config: StageConfig::default(),
            existing_job_id: None,
        }
    }

    #[test]
    fn test_request_validation() {
        assert!(request().validate().is_ok());

        let mut bad = request();
        bad.source_artifact_ref = "../etc/passwd".into();
        assert!(bad.validate().is_err());

        let mut bad = request();
        bad.owner_id = String::new();
        assert!(bad.validate().is_err());

        let mut bad = request();
        bad.stage_config.headline = reel_models::HeadlineSource::Literal("  ".into());
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let req: IngressRequest = serde_json::from_str(
            r#"{"source_artifact_ref":"uploads/u1/a.mp4","owner_id":"u1"}"#,
        )
        .unwrap();
        assert!(req.stage_config.trim_silence);
        assert!(req.existing_job_id.is_none());
    }

    #[test]
    fn test_code_mapping() {
        let cases = [
            (WorkerError::validation("x"), IngressCode::ValidationError, 400),
            (WorkerError::Unauthorized("x".into()), IngressCode::Unauthorized, 401),
            (WorkerError::QuotaExceeded("x".into()), IngressCode::QuotaExceeded, 403),
            (WorkerError::not_found("x"), IngressCode::NotFound, 404),
            (
                WorkerError::AlreadyInProgress(JobId::from_string("j")),
                IngressCode::AlreadyProcessing,
                409,
            ),
            (
                WorkerError::stage_message(Stage::BurnCaptions, "ffmpeg exploded at /tmp/x"),
                IngressCode::InternalError,
                500,
            ),
            (WorkerError::Timeout(600), IngressCode::InternalError, 500),
        ];
        for (err, code, status) in cases {
            let public = IngressError::from_worker(&err, None);
            assert_eq!(public.code, code);
            assert_eq!(public.status, status);
        }
    }

    #[test]
    fn test_public_error_hides_detail() {
        let err = WorkerError::stage_message(Stage::BurnCaptions, "ffmpeg exploded at /tmp/secret");
        let public = IngressError::from_worker(&err, Some(JobId::from_string("j-1")));
        let json = serde_json::to_string(&public).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("INTERNAL_ERROR"));
        assert!(json.contains("j-1"));
    }
}
