//! The post-production pipeline.
//!
//! Stages run in a fixed order, each reading the current working artifact
//! and, if it produces one, writing a fresh lock-protected file that replaces
//! it. The only overlap is early transcription of the source, which runs
//! alongside silence trimming and is joined before anything else proceeds.
//!
//! Stage functions never touch the job record. They return a result that is
//! classified into a [`StageOutcome`]; the executor owns every state write.

mod plan;
mod stage;

pub use plan::StagePlan;
pub use stage::{DegradedStage, ExecutionReport, StageOutcome};

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use reel_ml_client::TranscribeOptions;
use reel_models::{output_key, ArtifactRef, JobId, Stage, StageConfig, Transcript};
use reel_storage::StorageError;
use tracing::{debug, info, warn};

use crate::artifacts::ArtifactTracker;
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::headline::resolve_headline;
use crate::lock_registry::LockRegistry;
use crate::logging::JobLogger;
use crate::naming::output_file_name;
use crate::retry::{retry_transient, Backoff};
use crate::services::Services;
use crate::speech_correction::plan_cuts;

/// What to run: one claimed job.
#[derive(Debug, Clone)]
pub struct PipelineJob {
    pub job_id: JobId,
    pub owner_id: String,
    pub source: ArtifactRef,
    pub stage_config: StageConfig,
}

/// Mutable state of one execution.
///
/// Lives outside the pipeline future so the executor can still clean up
/// after the future is dropped by a timeout or shutdown.
#[derive(Debug)]
pub struct PipelineRun {
    pub tracker: ArtifactTracker,
    pub report: ExecutionReport,
}

impl PipelineRun {
    pub fn new(job_id: JobId, locks: Arc<LockRegistry>, work_dir: &Path) -> Self {
        Self {
            tracker: ArtifactTracker::new(job_id.clone(), locks, work_dir),
            report: ExecutionReport::new(job_id),
        }
    }
}

pub struct PipelineExecutor {
    services: Services,
    config: WorkerConfig,
}

async fn timed<F: Future>(fut: F) -> (F::Output, Duration) {
    let started = Instant::now();
    let out = fut.await;
    (out, started.elapsed())
}

impl PipelineExecutor {
    pub fn new(services: Services, config: WorkerConfig) -> Self {
        Self { services, config }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run every activated stage and persist the result.
    pub async fn run(&self, job: &PipelineJob, run: &mut PipelineRun) -> WorkerResult<ArtifactRef> {
        let logger = JobLogger::new(&job.job_id, "pipeline");
        let plan = StagePlan::from_config(&job.stage_config);
        logger.log_start(&format!("{} stage(s) planned", plan.stages().len()));

        self.fetch_source(job, run).await?;

        let early_transcript = self.trim_and_pretranscribe(&plan, run, &logger).await?;

        if plan.contains(Stage::NormalizeAudio) {
            let engine = &self.services.engine;
            self.run_stage(Stage::NormalizeAudio, run, &logger, |input, output| async move {
                engine.normalize_audio(&input, &output).await?;
                Ok(())
            })
            .await?;
        }

        let mut transcript = None;
        if plan.contains(Stage::Transcribe) {
            let mut options = TranscribeOptions::words();
            if job.stage_config.speech_correction {
                options = options.with_disfluencies();
            }
            let path = run.tracker.working()?.to_path_buf();
            transcript = self
                .transcribe(Stage::Transcribe, &path, options, run, &logger)
                .await?;
        }

        let mut captions_transcript = transcript.clone();
        if plan.contains(Stage::SpeechCorrect) {
            let applied = self
                .speech_correct(transcript.as_ref(), run, &logger)
                .await?;

            // cut spans shift every later timestamp
            if applied && plan.contains(Stage::Retranscribe) {
                let path = run.tracker.working()?.to_path_buf();
                captions_transcript = self
                    .transcribe(Stage::Retranscribe, &path, TranscribeOptions::words(), run, &logger)
                    .await?;
                if captions_transcript.is_some() {
                    transcript = captions_transcript.clone();
                }
            } else if applied {
                // text is still usable for the headline, timestamps are not
                captions_transcript = None;
            }
        }

        if plan.contains(Stage::BurnCaptions) {
            match captions_transcript.as_ref() {
                Some(current) => {
                    let engine = &self.services.engine;
                    self.run_stage(Stage::BurnCaptions, run, &logger, |input, output| async move {
                        engine.burn_captions(&input, &output, current).await?;
                        Ok(())
                    })
                    .await?;
                }
                None => {
                    logger.log_warning("Captions skipped: no transcript aligned with the working artifact");
                }
            }
        }

        let mut headline = None;
        if plan.contains(Stage::OverlayHeadline) {
            let source = &job.stage_config.headline;
            let text_source = transcript.as_ref().or(early_transcript.as_ref());
            let engine = &self.services.engine;
            let generator = self.services.generator.as_ref();
            let max_chars = self.config.hook_max_chars;
            headline = self
                .run_stage(Stage::OverlayHeadline, run, &logger, |input, output| async move {
                    let text = resolve_headline(source, text_source, generator, max_chars)
                        .await?
                        .ok_or_else(|| WorkerError::internal("headline enabled but resolved to none"))?;
                    engine.overlay_headline(&input, &output, &text).await?;
                    Ok(text)
                })
                .await?;
        }

        if let Some(ratio) = job.stage_config.aspect_ratio {
            let engine = &self.services.engine;
            self.run_stage(Stage::ConvertAspectRatio, run, &logger, |input, output| async move {
                engine.convert_aspect(&input, &output, ratio).await?;
                Ok(())
            })
            .await?;
        }

        let artifact = self.persist(job, headline.as_deref(), run).await?;
        logger.log_completion(&format!("persisted as {}", artifact));
        Ok(artifact)
    }

    async fn fetch_source(&self, job: &PipelineJob, run: &mut PipelineRun) -> WorkerResult<()> {
        run.tracker.prepare_dir().await?;

        // lock the landing path before the store writes to it
        let source_dir = run.tracker.source_dir();
        let expected = source_dir.join(job.source.file_name());
        run.tracker.adopt_source(expected.clone())?;

        let fetched = self.services.artifacts.fetch(&job.source, &source_dir).await?;
        if fetched != expected {
            run.tracker.adopt_source(fetched)?;
        }
        Ok(())
    }

    /// Silence trimming, overlapped with early transcription of the source
    /// when only headline text is needed.
    ///
    /// The source is not released until both have finished.
    async fn trim_and_pretranscribe(
        &self,
        plan: &StagePlan,
        run: &mut PipelineRun,
        logger: &JobLogger,
    ) -> WorkerResult<Option<Transcript>> {
        let input = run.tracker.working()?.to_path_buf();
        let trim_output = if plan.contains(Stage::TrimSilence) {
            Some(run.tracker.register_output(Stage::TrimSilence)?)
        } else {
            None
        };
        let early = plan.contains(Stage::EarlyTranscribe);
        if early {
            run.report.transcription_calls += 1;
        }

        let engine = &self.services.engine;
        let speech = &self.services.speech;
        let trim_fut = async {
            match &trim_output {
                Some(out) => Some(timed(engine.trim_silence(&input, out)).await),
                None => None,
            }
        };
        let early_fut = async {
            if early {
                Some(timed(speech.transcribe(&input, TranscribeOptions::default())).await)
            } else {
                None
            }
        };
        let (trimmed, early_result) = tokio::join!(trim_fut, early_fut);

        if let (Some(output), Some((result, elapsed))) = (trim_output, trimmed) {
            match result {
                Ok(outcome) => {
                    info!(
                        applied = outcome.applied,
                        duration_secs = outcome.duration_secs,
                        removed_secs = outcome.removed_secs,
                        "Silence trim finished"
                    );
                    self.finish_stage(Stage::TrimSilence, StageOutcome::Success(output), elapsed, run, logger)
                        .await?;
                }
                Err(e) => {
                    run.tracker.discard(&output).await;
                    let outcome = StageOutcome::classify(Stage::TrimSilence, Err(e.into()), input.clone());
                    self.finish_stage(Stage::TrimSilence, outcome, elapsed, run, logger)
                        .await?;
                }
            }
        }

        match early_result {
            Some((Ok(transcript), elapsed)) => {
                record_stage_metrics(Stage::EarlyTranscribe, "success", elapsed);
                logger.log_stage(Stage::EarlyTranscribe, elapsed.as_secs_f64());
                run.report.stages_run.push(Stage::EarlyTranscribe);
                Ok(Some(transcript))
            }
            Some((Err(e), elapsed)) => {
                let outcome = StageOutcome::classify(Stage::EarlyTranscribe, Err(e.into()), input);
                self.finish_stage(Stage::EarlyTranscribe, outcome, elapsed, run, logger)
                    .await?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Run an artifact-producing stage.
    ///
    /// Returns `None` when a DEGRADE stage failed; the working artifact is
    /// then unchanged.
    async fn run_stage<T, F, Fut>(
        &self,
        stage: Stage,
        run: &mut PipelineRun,
        logger: &JobLogger,
        op: F,
    ) -> WorkerResult<Option<T>>
    where
        F: FnOnce(PathBuf, PathBuf) -> Fut,
        Fut: Future<Output = WorkerResult<T>>,
    {
        let input = run.tracker.working()?.to_path_buf();
        let output = run.tracker.register_output(stage)?;

        let (result, elapsed) = timed(op(input.clone(), output.clone())).await;
        let (outcome, value) = match result {
            Ok(value) => (StageOutcome::Success(output), Some(value)),
            Err(e) => {
                run.tracker.discard(&output).await;
                (StageOutcome::classify(stage, Err(e), input), None)
            }
        };
        self.finish_stage(stage, outcome, elapsed, run, logger).await?;
        Ok(value)
    }

    /// Transcription stage; produces text, not an artifact.
    async fn transcribe(
        &self,
        stage: Stage,
        path: &Path,
        options: TranscribeOptions,
        run: &mut PipelineRun,
        logger: &JobLogger,
    ) -> WorkerResult<Option<Transcript>> {
        run.report.transcription_calls += 1;
        let (result, elapsed) = timed(self.services.speech.transcribe(path, options)).await;
        match result {
            Ok(transcript) => {
                record_stage_metrics(stage, "success", elapsed);
                run.report.stages_run.push(stage);
                logger.log_stage(stage, elapsed.as_secs_f64());
                Ok(Some(transcript))
            }
            Err(e) => {
                let outcome = StageOutcome::classify(stage, Err(e.into()), path.to_path_buf());
                self.finish_stage(stage, outcome, elapsed, run, logger).await?;
                Ok(None)
            }
        }
    }

    /// Plan and apply speech-correction cuts. Returns whether anything was cut.
    async fn speech_correct(
        &self,
        transcript: Option<&Transcript>,
        run: &mut PipelineRun,
        logger: &JobLogger,
    ) -> WorkerResult<bool> {
        let words = match transcript.and_then(|t| t.words.as_deref()) {
            Some(words) if !words.is_empty() => words,
            _ => {
                logger.log_warning("Speech correction skipped: no word-level timestamps");
                return Ok(false);
            }
        };

        let cuts = plan_cuts(words, &self.config.correction);
        if cuts.is_empty() {
            logger.log_progress("Speech correction found nothing to remove");
            return Ok(false);
        }

        let removed: f64 = cuts.iter().map(|c| c.duration()).sum();
        logger.log_progress(&format!("Removing {} span(s), {:.2}s", cuts.len(), removed));

        let engine = &self.services.engine;
        let cuts = &cuts;
        self.run_stage(Stage::SpeechCorrect, run, logger, |input, output| async move {
            engine.cut_spans(&input, &output, cuts).await?;
            Ok(())
        })
        .await?;
        Ok(true)
    }

    /// Apply a classified outcome to the run.
    async fn finish_stage(
        &self,
        stage: Stage,
        outcome: StageOutcome,
        elapsed: Duration,
        run: &mut PipelineRun,
        logger: &JobLogger,
    ) -> WorkerResult<()> {
        record_stage_metrics(stage, outcome.label(), elapsed);
        match outcome {
            StageOutcome::Success(artifact) => {
                run.tracker.advance(artifact).await;
                run.report.stages_run.push(stage);
                logger.log_stage(stage, elapsed.as_secs_f64());
                Ok(())
            }
            StageOutcome::Degraded { artifact, cause } => {
                logger.log_degraded(stage, &cause);
                debug!(stage = %stage, artifact = %artifact.display(), "Continuing with pre-stage artifact");
                run.report.stages_run.push(stage);
                run.report.record_degraded(stage, cause);
                Ok(())
            }
            StageOutcome::Fatal(e) => {
                logger.log_error(&e.to_string());
                Err(e)
            }
        }
    }

    /// Upload the final artifact and drop the local copy.
    async fn persist(
        &self,
        job: &PipelineJob,
        headline: Option<&str>,
        run: &mut PipelineRun,
    ) -> WorkerResult<ArtifactRef> {
        let final_path = run.tracker.working()?.to_path_buf();
        let name = output_file_name(
            headline,
            job.source.as_str(),
            self.config.output_name_max_len,
        );
        let key = output_key(&job.owner_id, &job.job_id, &name);

        let backoff = Backoff::new("persist_output", self.config.persist_retries);
        let artifacts = &self.services.artifacts;
        let artifact = retry_transient(&backoff, StorageError::is_retryable, || {
            artifacts.put(&final_path, &key)
        })
        .await
        .map_err(|e| {
            warn!(job_id = %job.job_id, key = %key, "Persist failed: {}", e);
            WorkerError::Storage(e)
        })?;

        run.tracker.release_final().await;
        run.report.output_artifact = Some(artifact.to_string());
        Ok(artifact)
    }
}

fn record_stage_metrics(stage: Stage, outcome: &'static str, elapsed: Duration) {
    metrics::histogram!("pipeline_stage_duration_seconds", "stage" => stage.as_str())
        .record(elapsed.as_secs_f64());
    metrics::counter!(
        "pipeline_stage_outcomes_total",
        "stage" => stage.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}
