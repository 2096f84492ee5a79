//! Job executor: claim, run, clean up, record the outcome.
//!
//! This is the only place that writes a job's terminal status.

use std::sync::Arc;

use reel_models::{ArtifactRef, JobStatus};
use tokio::sync::watch;
use tracing::{error, info, warn, Instrument};

use crate::error::{WorkerError, WorkerResult};
use crate::lifecycle::{JobLifecycle, JobOutcome};
use crate::logging::JobLogger;
use crate::pipeline::{ExecutionReport, PipelineExecutor, PipelineJob, PipelineRun};

pub struct JobExecutor {
    pipeline: Arc<PipelineExecutor>,
    lifecycle: Arc<JobLifecycle>,
    shutdown: watch::Receiver<bool>,
}

impl JobExecutor {
    pub fn new(
        pipeline: Arc<PipelineExecutor>,
        lifecycle: Arc<JobLifecycle>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            pipeline,
            lifecycle,
            shutdown,
        }
    }

    pub fn lifecycle(&self) -> &Arc<JobLifecycle> {
        &self.lifecycle
    }

    /// Claim and execute `job`.
    ///
    /// A lost claim returns `AlreadyInProgress` without touching anything.
    /// Every other outcome, success or failure, is recorded on the job and
    /// returned in the report.
    pub async fn execute(&self, job: &PipelineJob) -> WorkerResult<ExecutionReport> {
        if !self.lifecycle.claim(&job.job_id).await? {
            info!(job_id = %job.job_id, "Claim lost, job already in progress");
            return Err(WorkerError::AlreadyInProgress(job.job_id.clone()));
        }

        let logger = JobLogger::new(&job.job_id, "execute");
        let span = logger.create_span();
        self.execute_claimed(job, &logger).instrument(span).await
    }

    async fn execute_claimed(
        &self,
        job: &PipelineJob,
        logger: &JobLogger,
    ) -> WorkerResult<ExecutionReport> {
        let config = self.pipeline.config();
        let mut run = PipelineRun::new(
            job.job_id.clone(),
            Arc::clone(&self.pipeline.services().locks),
            &config.work_dir,
        );

        let result = self.run_bounded(job, &mut run).await;
        let report = match result {
            Ok(artifact) => self.complete(job, run, artifact, logger).await?,
            Err(e) => self.fail(job, run, e, logger).await?,
        };

        let status = report.status.as_str();
        metrics::counter!("pipeline_jobs_total", "status" => status).increment(1);
        Ok(report)
    }

    /// The pipeline under the job timeout and the shutdown signal.
    ///
    /// When either fires the pipeline future is dropped, which abandons the
    /// in-flight external call; a late result is never observed.
    async fn run_bounded(&self, job: &PipelineJob, run: &mut PipelineRun) -> WorkerResult<ArtifactRef> {
        let limit = self.pipeline.config().job_timeout;
        let mut shutdown = self.shutdown.clone();

        tokio::select! {
            result = tokio::time::timeout(limit, self.pipeline.run(job, run)) => match result {
                Ok(inner) => inner,
                Err(_) => Err(WorkerError::Timeout(limit.as_secs())),
            },
            _ = shutdown_requested(&mut shutdown) => Err(WorkerError::Cancelled),
        }
    }

    async fn complete(
        &self,
        job: &PipelineJob,
        run: PipelineRun,
        artifact: ArtifactRef,
        logger: &JobLogger,
    ) -> WorkerResult<ExecutionReport> {
        let PipelineRun { mut tracker, mut report } = run;
        // persist already released the final artifact; this catches stragglers
        tracker.cleanup_all().await;

        self.lifecycle
            .finish(
                &job.job_id,
                JobOutcome::Completed {
                    output_ref: artifact.to_string(),
                },
            )
            .await?;

        report.status = JobStatus::Completed;
        report.output_artifact = Some(artifact.to_string());
        if report.degraded.is_empty() {
            logger.log_completion("all stages succeeded");
        } else {
            logger.log_completion(&format!("{} stage(s) degraded", report.degraded.len()));
        }
        Ok(report)
    }

    async fn fail(
        &self,
        job: &PipelineJob,
        run: PipelineRun,
        cause: WorkerError,
        logger: &JobLogger,
    ) -> WorkerResult<ExecutionReport> {
        let PipelineRun { mut tracker, mut report } = run;
        let removed = tracker.cleanup_all().await;
        let kind = cause.failure_kind();
        error!(
            job_id = %job.job_id,
            kind = kind.as_str(),
            removed_artifacts = removed,
            "Job failed: {}",
            cause
        );

        if let Err(e) = self
            .lifecycle
            .finish(
                &job.job_id,
                JobOutcome::Failed {
                    error: cause.to_string(),
                    kind,
                },
            )
            .await
        {
            // the record stays PROCESSING; reconciliation is external
            warn!(job_id = %job.job_id, "Failed to record job failure: {}", e);
            logger.log_error(&format!("terminal write failed: {e}"));
            return Err(e);
        }

        report.status = JobStatus::Failed;
        report.output_artifact = None;
        report.failure = Some(cause);
        Ok(report)
    }
}

/// Resolves once shutdown is signalled. A dropped sender never resolves.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    let closed = rx.wait_for(|stop| *stop).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}
