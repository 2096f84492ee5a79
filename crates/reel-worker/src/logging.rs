//! Structured job logging.
//!
//! Provides consistent, structured logging for job execution with tracing
//! spans and contextual information, plus subscriber setup for binaries.

use reel_models::{JobId, Stage};
use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Job logger for structured logging with consistent formatting.
///
/// Every event carries `job_id` and `operation` fields.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    operation: String,
}

impl JobLogger {
    /// Create a new job logger for a specific job and operation.
    pub fn new(job_id: &JobId, operation: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job progress: {}", message
        );
    }

    /// Log a stage that finished, with its wall time.
    pub fn log_stage(&self, stage: Stage, elapsed_secs: f64) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            stage = %stage,
            elapsed_secs,
            "Stage complete"
        );
    }

    /// Log a DEGRADE-classified stage failure.
    pub fn log_degraded(&self, stage: Stage, cause: &str) {
        warn!(
            job_id = %self.job_id,
            operation = %self.operation,
            stage = %stage,
            cause = %cause,
            "Stage degraded, continuing with pre-stage artifact"
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Create a tracing span for this job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            operation = %self.operation
        )
    }
}

/// Install the global subscriber.
///
/// JSON output when `LOG_FORMAT=json`, ANSI text otherwise. `RUST_LOG`
/// directives are honored on top of `reel=info`.
pub fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    for directive in ["reel=info", "reel_worker=info", "reel_media=info"] {
        if let Ok(d) = directive.parse() {
            env_filter = env_filter.add_directive(d);
        }
    }

    // try_init: tests and embedding hosts may have installed one already
    if use_json {
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .try_init();
    }
}
