//! Transcript and timeline types.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A piece of text aligned to `[start, end)` seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TimedText {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl TimedText {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// Output of a speech-to-text call.
///
/// Timestamps are relative to the artifact that was transcribed; a transcript
/// is stale once a stage cuts or shifts that artifact's timeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Transcript {
    pub full_text: String,
    #[serde(default)]
    pub segments: Vec<TimedText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub words: Option<Vec<TimedText>>,
}

impl Transcript {
    pub fn is_empty(&self) -> bool {
        self.full_text.trim().is_empty() && self.segments.is_empty()
    }

    pub fn has_words(&self) -> bool {
        self.words.as_ref().is_some_and(|w| !w.is_empty())
    }

    /// End of the last timed element, in seconds.
    pub fn end_time(&self) -> f64 {
        let seg_end = self.segments.last().map(|s| s.end).unwrap_or(0.0);
        let word_end = self
            .words
            .as_ref()
            .and_then(|w| w.last())
            .map(|w| w.end)
            .unwrap_or(0.0);
        seg_end.max(word_end)
    }
}

/// A half-open time range in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TimeSpan {
    pub start: f64,
    pub end: f64,
}

impl TimeSpan {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// Sort and merge spans that overlap or sit closer than `gap` seconds.
pub fn merge_spans(mut spans: Vec<TimeSpan>, gap: f64) -> Vec<TimeSpan> {
    spans.retain(|s| s.end > s.start);
    spans.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut merged: Vec<TimeSpan> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(last) if span.start <= last.end + gap => {
                last.end = last.end.max(span.end);
            }
            _ => merged.push(span),
        }
    }
    merged
}

/// Complement of `cuts` within `[0, total)`.
pub fn keep_spans(cuts: &[TimeSpan], total: f64) -> Vec<TimeSpan> {
    let mut keeps = Vec::new();
    let mut cursor = 0.0;
    for cut in merge_spans(cuts.to_vec(), 0.0) {
        let start = cut.start.clamp(0.0, total);
        if start > cursor {
            keeps.push(TimeSpan::new(cursor, start));
        }
        cursor = cursor.max(cut.end.clamp(0.0, total));
    }
    if cursor < total {
        keeps.push(TimeSpan::new(cursor, total));
    }
    keeps
}
