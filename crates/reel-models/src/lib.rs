//! Shared data models for the Reelsmith post-production pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Job records, statuses and field patches
//! - Stage configuration and the fixed stage order
//! - Transcripts and time spans
//! - Artifact references

pub mod artifact;
pub mod aspect;
pub mod job;
pub mod stage;
pub mod transcript;

// Re-export common types
pub use artifact::{output_key, ArtifactRef};
pub use aspect::{AspectRatio, AspectRatioParseError};
pub use job::{FailureKind, JobId, JobRecord, JobStatus, JobUpdate};
pub use stage::{FailurePolicy, HeadlineSource, Stage, StageConfig};
pub use transcript::{keep_spans, merge_spans, TimeSpan, TimedText, Transcript};
