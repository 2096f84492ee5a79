//! Speech-correction cut planning.
//!
//! Works on a word-level transcript and marks spans to remove: filler words,
//! false starts (truncated words written with a trailing `-`), and the first
//! occurrence of an immediately repeated word or word pair.

use reel_models::{merge_spans, TimeSpan, TimedText};

const DEFAULT_FILLERS: [&str; 9] = ["um", "uh", "erm", "er", "ah", "hmm", "mm", "uhm", "umm"];

#[derive(Debug, Clone)]
pub struct CorrectionConfig {
    /// Lowercase filler tokens
    pub fillers: Vec<String>,
    /// A cut extends to the next word when the pause before it is at most this long (seconds)
    pub join_gap: f64,
    /// Cuts closer than this are merged (seconds)
    pub merge_gap: f64,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            fillers: DEFAULT_FILLERS.iter().map(|s| s.to_string()).collect(),
            join_gap: 0.3,
            merge_gap: 0.05,
        }
    }
}

/// Lowercase and strip surrounding punctuation.
fn normalize(word: &str) -> String {
    word.trim()
        .trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
        .to_lowercase()
}

fn is_false_start(word: &str) -> bool {
    let w = word.trim().trim_end_matches(|c: char| matches!(c, ',' | '.' | '…'));
    w.len() > 1 && (w.ends_with('-') || w.ends_with('—'))
}

/// Spans to cut, sorted and merged. Empty when nothing is removable.
pub fn plan_cuts(words: &[TimedText], config: &CorrectionConfig) -> Vec<TimeSpan> {
    let tokens: Vec<String> = words.iter().map(|w| normalize(&w.text)).collect();
    let mut marked = vec![false; words.len()];

    for i in 0..words.len() {
        let token = &tokens[i];
        if config.fillers.iter().any(|f| f == token) || is_false_start(&words[i].text) {
            marked[i] = true;
            continue;
        }
        if token.is_empty() {
            continue;
        }
        if tokens.get(i + 1) == Some(token) {
            marked[i] = true;
            continue;
        }
        if i + 3 < words.len()
            && !tokens[i + 1].is_empty()
            && tokens[i] == tokens[i + 2]
            && tokens[i + 1] == tokens[i + 3]
        {
            marked[i] = true;
            marked[i + 1] = true;
        }
    }

    let spans = marked
        .iter()
        .enumerate()
        .filter(|(_, &m)| m)
        .map(|(i, _)| {
            let word = &words[i];
            let end = match words.get(i + 1) {
                Some(next) if next.start - word.end <= config.join_gap => next.start.max(word.end),
                _ => word.end,
            };
            TimeSpan::new(word.start, end)
        })
        .collect();

    merge_spans(spans, config.merge_gap)
}
