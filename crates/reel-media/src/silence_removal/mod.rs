//! Silence trimming driven by FFmpeg `silencedetect`.
//!
//! ```text
//! input ──► silencedetect ──► parse log ──► Keep/Cut segmenter ──► keep-span render
//! ```
//!
//! Trimming is skipped when too little would be cut to be worth a re-encode,
//! or when so much would be cut that the result is unusable.

mod config;
mod detect;
mod segmenter;

use reel_models::TimeSpan;
use tracing::{debug, warn};

pub use config::SilenceTrimConfig;
pub use detect::{parse_silence_log, SilenceInterval};
pub use segmenter::{
    compute_segment_stats, segments_from_silences, Segment, SegmentLabel, SegmentStats,
};

/// Decide whether a timeline is worth applying.
pub fn should_apply(segments: &[Segment], config: &SilenceTrimConfig) -> bool {
    if segments.is_empty() {
        return false;
    }

    let stats = compute_segment_stats(segments);

    if stats.cut_count == 0 {
        debug!("No silence detected, skipping silence trim");
        return false;
    }

    if stats.keep_ratio < config.min_keep_ratio {
        warn!(
            keep_ratio = format!("{:.1}%", stats.keep_ratio * 100.0),
            min_keep_ratio = format!("{:.1}%", config.min_keep_ratio * 100.0),
            "Not enough speech content, skipping silence trim"
        );
        return false;
    }

    let cut_ratio = 1.0 - stats.keep_ratio;
    if cut_ratio < config.min_cut_ratio {
        debug!(
            cut_ratio = format!("{:.1}%", cut_ratio * 100.0),
            "Cut too small to be worth re-encoding, skipping silence trim"
        );
        return false;
    }

    true
}

/// Keep segments as time spans in seconds.
pub fn keep_time_spans(segments: &[Segment]) -> Vec<TimeSpan> {
    segments
        .iter()
        .filter(|s| s.label == SegmentLabel::Keep)
        .map(|s| TimeSpan::new(s.start_ms as f64 / 1000.0, s.end_ms as f64 / 1000.0))
        .collect()
}

/// Result of planning a trim from an analysis log.
#[derive(Debug, Clone)]
pub struct TrimPlan {
    pub segments: Vec<Segment>,
    pub apply: bool,
}

impl TrimPlan {
    pub fn keep_spans(&self) -> Vec<TimeSpan> {
        keep_time_spans(&self.segments)
    }

    pub fn stats(&self) -> SegmentStats {
        compute_segment_stats(&self.segments)
    }
}

/// Plan a trim from `silencedetect` output for an input of `total_secs`.
pub fn plan_trim(log: &str, total_secs: f64, config: &SilenceTrimConfig) -> TrimPlan {
    let total_ms = (total_secs.max(0.0) * 1000.0).round() as u64;
    let silences = parse_silence_log(log, total_ms);
    let segments = segments_from_silences(&silences, total_ms, config);
    let apply = should_apply(&segments, config);
    TrimPlan { segments, apply }
}
