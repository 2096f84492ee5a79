//! FFmpeg CLI media engine.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - Progress parsing from `-progress pipe:2`
//! - Cancellation and timeout support via tokio, with `kill_on_drop` children
//! - Silence trimming from `silencedetect` analysis
//! - The `MediaEngine` trait covering every post-production stage

pub mod captions;
pub mod command;
pub mod engine;
pub mod error;
pub mod filters;
pub mod probe;
pub mod progress;
pub mod silence_removal;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use engine::{FfmpegEngine, FfmpegEngineConfig, MediaEngine, TrimOutcome};
pub use error::{MediaError, MediaResult};
pub use probe::{probe_video, VideoInfo};
pub use progress::FfmpegProgress;
pub use silence_removal::SilenceTrimConfig;
