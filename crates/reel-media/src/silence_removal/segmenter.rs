//! Converts detected silences into a Keep/Cut timeline.
//!
//! Each silence longer than `min_silence_ms` becomes a Cut, shrunk on both
//! sides by the speech paddings so word attacks and tails survive. A silence
//! touching the start of the input gets no post-speech padding and one
//! touching the end gets no pre-speech padding, since there is no speech on
//! that side to protect.

use super::config::SilenceTrimConfig;
use super::detect::SilenceInterval;

/// Label indicating whether a segment should be kept or cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentLabel {
    /// Keep this segment in the output.
    Keep,
    /// Cut (remove) this segment from the output.
    Cut,
}

/// A time segment with a Keep or Cut label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Start time in milliseconds.
    pub start_ms: u64,
    /// End time in milliseconds.
    pub end_ms: u64,
    /// Whether to keep or cut this segment.
    pub label: SegmentLabel,
}

impl Segment {
    /// Duration of this segment in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }

    /// Duration of this segment in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.duration_ms() as f64 / 1000.0
    }
}

/// Build the Keep/Cut timeline covering `[0, total_ms)`.
pub fn segments_from_silences(
    silences: &[SilenceInterval],
    total_ms: u64,
    config: &SilenceTrimConfig,
) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut cursor = 0u64;

    let mut sorted = silences.to_vec();
    sorted.sort_by_key(|s| s.start_ms);

    for silence in sorted {
        let end_ms = silence.end_ms.min(total_ms);
        if end_ms.saturating_sub(silence.start_ms) < config.min_silence_ms {
            continue;
        }

        let cut_start = if silence.start_ms == 0 {
            0
        } else {
            silence.start_ms + config.post_speech_padding_ms
        };
        let cut_end = if end_ms >= total_ms {
            total_ms
        } else {
            end_ms.saturating_sub(config.pre_speech_padding_ms)
        };

        let cut_start = cut_start.max(cursor);
        if cut_end <= cut_start {
            // Padding swallowed the whole gap
            continue;
        }

        if cut_start > cursor {
            segments.push(Segment {
                start_ms: cursor,
                end_ms: cut_start,
                label: SegmentLabel::Keep,
            });
        }
        segments.push(Segment {
            start_ms: cut_start,
            end_ms: cut_end,
            label: SegmentLabel::Cut,
        });
        cursor = cut_end;
    }

    if cursor < total_ms {
        segments.push(Segment {
            start_ms: cursor,
            end_ms: total_ms,
            label: SegmentLabel::Keep,
        });
    }

    segments
}

/// Calculate statistics about the segments.
pub fn compute_segment_stats(segments: &[Segment]) -> SegmentStats {
    let mut total_keep_ms = 0u64;
    let mut total_cut_ms = 0u64;
    let mut keep_count = 0usize;
    let mut cut_count = 0usize;

    for segment in segments {
        let duration = segment.duration_ms();
        match segment.label {
            SegmentLabel::Keep => {
                total_keep_ms += duration;
                keep_count += 1;
            }
            SegmentLabel::Cut => {
                total_cut_ms += duration;
                cut_count += 1;
            }
        }
    }

    let total_ms = total_keep_ms + total_cut_ms;
    let keep_ratio = if total_ms > 0 {
        total_keep_ms as f64 / total_ms as f64
    } else {
        1.0
    };

    SegmentStats {
        total_keep_ms,
        total_cut_ms,
        keep_count,
        cut_count,
        keep_ratio,
    }
}

/// Statistics about Keep/Cut segments.
#[derive(Debug, Clone)]
pub struct SegmentStats {
    /// Total duration of Keep segments in milliseconds.
    pub total_keep_ms: u64,
    /// Total duration of Cut segments in milliseconds.
    pub total_cut_ms: u64,
    /// Number of Keep segments.
    pub keep_count: usize,
    /// Number of Cut segments.
    pub cut_count: usize,
    /// Ratio of kept content (0.0 to 1.0).
    pub keep_ratio: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silence(start_ms: u64, end_ms: u64) -> SilenceInterval {
        SilenceInterval { start_ms, end_ms }
    }

    #[test]
    fn test_no_silence_keeps_everything() {
        let segments = segments_from_silences(&[], 3000, &SilenceTrimConfig::default());
        assert_eq!(
            segments,
            vec![Segment {
                start_ms: 0,
                end_ms: 3000,
                label: SegmentLabel::Keep
            }]
        );
    }

    #[test]
    fn test_mid_gap_is_padded() {
        // 10s input, 2s gap at [3s, 5s]
        let segments =
            segments_from_silences(&[silence(3000, 5000)], 10_000, &SilenceTrimConfig::default());
        let labels: Vec<_> = segments.iter().map(|s| s.label).collect();
        assert_eq!(labels, vec![SegmentLabel::Keep, SegmentLabel::Cut, SegmentLabel::Keep]);
        assert_eq!((segments[1].start_ms, segments[1].end_ms), (3200, 4800));

        let stats = compute_segment_stats(&segments);
        assert_eq!(stats.total_keep_ms, 8400);
        assert_eq!(stats.total_cut_ms, 1600);
    }

    #[test]
    fn test_short_silence_not_cut() {
        let segments =
            segments_from_silences(&[silence(500, 900)], 1500, &SilenceTrimConfig::default());
        assert!(segments.iter().all(|s| s.label == SegmentLabel::Keep));
    }

    #[test]
    fn test_leading_and_trailing_silence() {
        let segments = segments_from_silences(
            &[silence(0, 2000), silence(7000, 10_000)],
            10_000,
            &SilenceTrimConfig::default(),
        );
        assert_eq!(
            segments,
            vec![
                Segment { start_ms: 0, end_ms: 1800, label: SegmentLabel::Cut },
                Segment { start_ms: 1800, end_ms: 7200, label: SegmentLabel::Keep },
                Segment { start_ms: 7200, end_ms: 10_000, label: SegmentLabel::Cut },
            ]
        );
    }

    #[test]
    fn test_padding_swallows_gap() {
        let config = SilenceTrimConfig::default()
            .with_min_silence_ms(300)
            .with_padding_ms(200, 200);
        let segments = segments_from_silences(&[silence(1000, 1350)], 3000, &config);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].label, SegmentLabel::Keep);
    }

    #[test]
    fn test_segment_stats() {
        let segments = vec![
            Segment { start_ms: 0, end_ms: 1000, label: SegmentLabel::Keep },
            Segment { start_ms: 1000, end_ms: 2000, label: SegmentLabel::Cut },
            Segment { start_ms: 2000, end_ms: 3000, label: SegmentLabel::Keep },
        ];

        let stats = compute_segment_stats(&segments);
        assert_eq!(stats.total_keep_ms, 2000);
        assert_eq!(stats.total_cut_ms, 1000);
        assert_eq!(stats.keep_count, 2);
        assert_eq!(stats.cut_count, 1);
        assert!((stats.keep_ratio - 0.667).abs() < 0.01);
    }
}
