//! SubRip caption rendering.

use reel_models::{TimedText, Transcript};

/// Maximum words per cue when grouping word-level timings.
pub const MAX_WORDS_PER_CUE: usize = 7;
/// Maximum cue length in seconds when grouping word-level timings.
pub const MAX_CUE_SECS: f64 = 3.0;

/// Group a transcript into caption cues.
///
/// Word-level timings give short, tightly aligned cues; segment timings are
/// used as-is otherwise.
pub fn build_cues(transcript: &Transcript) -> Vec<TimedText> {
    match transcript.words.as_deref() {
        Some(words) if !words.is_empty() => group_words(words),
        _ => transcript
            .segments
            .iter()
            .filter(|s| !s.text.trim().is_empty())
            .map(|s| TimedText::new(s.start, s.end, s.text.trim()))
            .collect(),
    }
}

fn group_words(words: &[TimedText]) -> Vec<TimedText> {
    let mut cues = Vec::new();
    let mut current: Vec<&TimedText> = Vec::new();

    for word in words.iter().filter(|w| !w.text.trim().is_empty()) {
        if let Some(first) = current.first() {
            let too_long = word.end - first.start > MAX_CUE_SECS;
            if current.len() >= MAX_WORDS_PER_CUE || too_long {
                cues.push(join_cue(&current));
                current.clear();
            }
        }
        current.push(word);
    }
    if !current.is_empty() {
        cues.push(join_cue(&current));
    }
    cues
}

fn join_cue(words: &[&TimedText]) -> TimedText {
    let text = words
        .iter()
        .map(|w| w.text.trim())
        .collect::<Vec<_>>()
        .join(" ");
    let start = words.first().map(|w| w.start).unwrap_or_default();
    let end = words.last().map(|w| w.end).unwrap_or(start);
    TimedText::new(start, end, text)
}

/// Render cues as an SRT document.
pub fn to_srt(cues: &[TimedText]) -> String {
    let mut out = String::new();
    for (i, cue) in cues.iter().enumerate() {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            srt_timestamp(cue.start),
            srt_timestamp(cue.end.max(cue.start)),
            cue.text
        ));
    }
    out
}

/// `HH:MM:SS,mmm`
fn srt_timestamp(secs: f64) -> String {
    let total_ms = (secs.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let s = (total_ms / 1000) % 60;
    let m = (total_ms / 60_000) % 60;
    let h = total_ms / 3_600_000;
    format!("{:02}:{:02}:{:02},{:03}", h, m, s, ms)
}
