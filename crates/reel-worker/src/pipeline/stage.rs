//! Stage outcomes and the per-execution report.

use std::path::PathBuf;

use reel_models::{FailurePolicy, JobId, JobStatus, Stage};
use serde::Serialize;

use crate::error::WorkerError;

/// Result of one stage, after failure classification.
#[derive(Debug)]
pub enum StageOutcome {
    /// The stage produced a new working artifact.
    Success(PathBuf),
    /// The stage failed under a DEGRADE policy; `artifact` is the pre-stage input.
    Degraded { artifact: PathBuf, cause: String },
    /// The stage failed under a FATAL policy.
    Fatal(WorkerError),
}

impl StageOutcome {
    /// Classify a stage result by the stage's failure policy.
    pub fn classify(
        stage: Stage,
        result: Result<PathBuf, WorkerError>,
        pre_stage: PathBuf,
    ) -> Self {
        match result {
            Ok(artifact) => StageOutcome::Success(artifact),
            Err(e) => match stage.failure_policy() {
                FailurePolicy::Degrade => StageOutcome::Degraded {
                    artifact: pre_stage,
                    cause: e.to_string(),
                },
                FailurePolicy::Fatal => StageOutcome::Fatal(WorkerError::stage(stage, e)),
            },
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StageOutcome::Success(_) => "success",
            StageOutcome::Degraded { .. } => "degraded",
            StageOutcome::Fatal(_) => "fatal",
        }
    }
}

/// A stage that failed without failing the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DegradedStage {
    pub stage: Stage,
    pub cause: String,
}

/// What one execution did, returned to callers and tests.
#[derive(Debug, Serialize)]
pub struct ExecutionReport {
    pub job_id: JobId,
    pub status: JobStatus,
    pub output_artifact: Option<String>,
    pub degraded: Vec<DegradedStage>,
    pub transcription_calls: u32,
    /// Stages that ran (successfully or degraded), in order
    pub stages_run: Vec<Stage>,
    #[serde(skip)]
    pub failure: Option<WorkerError>,
}

impl ExecutionReport {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            status: JobStatus::Processing,
            output_artifact: None,
            degraded: Vec::new(),
            transcription_calls: 0,
            stages_run: Vec::new(),
            failure: None,
        }
    }

    pub fn record_degraded(&mut self, stage: Stage, cause: impl Into<String>) {
        self.degraded.push(DegradedStage {
            stage,
            cause: cause.into(),
        });
    }

    pub fn was_degraded(&self, stage: Stage) -> bool {
        self.degraded.iter().any(|d| d.stage == stage)
    }
}
