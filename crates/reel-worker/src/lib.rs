//! Reelsmith post-production worker.
//!
//! This crate provides:
//! - Job record lifecycle with an atomic claim
//! - The in-process lock registry and per-job artifact bookkeeping
//! - The stage pipeline with FATAL/DEGRADE failure classification
//! - The ingress contract and its stable error codes
//! - A retention sweep for the work directory
//! - Graceful shutdown and timeouts

pub mod artifacts;
pub mod config;
pub mod error;
pub mod executor;
pub mod headline;
pub mod ingress;
pub mod lifecycle;
pub mod lock_registry;
pub mod logging;
pub mod naming;
pub mod pipeline;
pub mod quota;
pub mod retry;
pub mod services;
pub mod speech_correction;
pub mod sweep;

pub use artifacts::ArtifactTracker;
pub use config::{ArtifactBackend, JobStoreBackend, WorkerConfig};
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use ingress::{IngressCode, IngressError, IngressHandler, IngressRequest, IngressResponse};
pub use lifecycle::{JobLifecycle, JobOutcome, Submission};
pub use lock_registry::{LockEntry, LockRegistry};
pub use logging::{init_tracing, JobLogger};
pub use pipeline::{ExecutionReport, PipelineExecutor, PipelineJob, PipelineRun, StagePlan};
pub use quota::{QuotaGate, UnlimitedQuota};
pub use services::{Services, UnavailableGenerator};
pub use sweep::{RetentionSweep, SweepStats};
